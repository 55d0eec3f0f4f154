//! 8x8 二维 DCT-II 正/反变换.
//!
//! 基矩阵 `A[k][n] = c(k) * cos((2n+1)kπ/16)`, `c(0) = √(1/8)`, 其余 `c(k) = √(1/4)`.
//! 正变换 `Y = A · X · Aᵀ`, 反变换 `X = Aᵀ · Y · A`. 亮度按四个 8x8 象限分别变换,
//! 两个色度块各变换一次. 系数保持实数精度, 只有量化会丢失信息.

use std::f64::consts::PI;

use ying_core::Block;

use crate::macroblock::{
    Coefficients, DecodedResidual, Dequantized, Macroblock, Planes, Quadrant, Residual,
};

/// 变换块边长
pub const TRANSFORM_SIZE: usize = 8;

type Block8 = Block<f64, TRANSFORM_SIZE>;

/// DCT 基矩阵 (正交)
#[derive(Debug, Clone)]
pub struct DctBasis {
    weights: [[f64; TRANSFORM_SIZE]; TRANSFORM_SIZE],
}

impl DctBasis {
    pub fn new() -> Self {
        let mut weights = [[0.0; TRANSFORM_SIZE]; TRANSFORM_SIZE];
        for (k, row) in weights.iter_mut().enumerate() {
            let scale = if k == 0 { (1.0f64 / 8.0).sqrt() } else { (1.0f64 / 4.0).sqrt() };
            for (n, w) in row.iter_mut().enumerate() {
                *w = scale * ((2 * n + 1) as f64 * k as f64 * PI / 16.0).cos();
            }
        }
        Self { weights }
    }

    /// 基函数 k 在位置 n 的权重
    pub fn weight(&self, k: usize, n: usize) -> f64 {
        self.weights[k][n]
    }

    /// Y = A · X · Aᵀ
    pub fn forward(&self, input: &Block8) -> Block8 {
        let a = &self.weights;
        // T = A · X
        let t = Block8::from_fn(|k, col| {
            (0..TRANSFORM_SIZE).map(|n| a[k][n] * input[(n, col)]).sum()
        });
        // Y = T · Aᵀ
        Block8::from_fn(|k, l| (0..TRANSFORM_SIZE).map(|n| t[(k, n)] * a[l][n]).sum())
    }

    /// X = Aᵀ · Y · A
    pub fn inverse(&self, input: &Block8) -> Block8 {
        let a = &self.weights;
        // T = Aᵀ · Y
        let t = Block8::from_fn(|n, col| {
            (0..TRANSFORM_SIZE).map(|k| a[k][n] * input[(k, col)]).sum()
        });
        // X = T · A
        Block8::from_fn(|n, m| (0..TRANSFORM_SIZE).map(|l| t[(n, l)] * a[l][m]).sum())
    }
}

impl Default for DctBasis {
    fn default() -> Self {
        Self::new()
    }
}

/// 宏块变换器
///
/// 关闭时为恒等变换: 系数等于残差, 反变换时再原样取回.
#[derive(Debug, Clone)]
pub struct Transform {
    basis: DctBasis,
    enabled: bool,
}

impl Transform {
    pub fn new(enabled: bool) -> Self {
        Self {
            basis: DctBasis::new(),
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 残差 → 系数
    pub fn forward(&self, mb: Macroblock<Residual>) -> Macroblock<Coefficients> {
        let input = mb.planes().map(f64::from);
        let output = if self.enabled {
            self.apply(&input, |block| self.basis.forward(block))
        } else {
            input
        };
        mb.advance(output)
    }

    /// 反量化系数 → 残差 (四舍五入到整数)
    pub fn inverse(&self, mb: Macroblock<Dequantized>) -> Macroblock<DecodedResidual> {
        let output = if self.enabled {
            self.apply(mb.planes(), |block| self.basis.inverse(block))
        } else {
            *mb.planes()
        };
        mb.advance(output.map(|v| v.round() as i32))
    }

    fn apply(&self, planes: &Planes<f64>, f: impl Fn(&Block8) -> Block8) -> Planes<f64> {
        let mut luma = planes.luma;
        for quadrant in Quadrant::ALL {
            let (row, col) = quadrant.luma_origin();
            let sub: Block8 = planes.luma.sub_block(row, col);
            luma.put_sub_block(row, col, &f(&sub));
        }
        Planes {
            luma,
            cb: f(&planes.cb),
            cr: f(&planes.cr),
        }
    }
}
