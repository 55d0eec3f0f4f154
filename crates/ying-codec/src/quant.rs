//! 均匀标量量化.
//!
//! 量化 `level = sign(c) * round(|c| / step)`, 反量化 `c' = level * step`.
//! 关闭量化时 step 为 1: 系数只取整, 对整数输入是恒等.

use ying_core::YingResult;

use crate::config::validate_qp;
use crate::macroblock::{Coefficients, Dequantized, Macroblock, Quantized};

/// 标量量化器
#[derive(Debug, Clone, Copy)]
pub struct Quantizer {
    qp: i32,
    enabled: bool,
}

impl Quantizer {
    /// 创建量化器, qp 不合法时返回 `InvalidQp`
    pub fn new(qp: i32, enabled: bool) -> YingResult<Self> {
        validate_qp(qp)?;
        Ok(Self { qp, enabled })
    }

    /// 配置的量化参数
    pub fn qp(&self) -> i32 {
        self.qp
    }

    /// 实际生效的量化步长
    pub fn step(&self) -> i32 {
        if self.enabled { self.qp } else { 1 }
    }

    /// 系数 → 量化电平, 宏块记录生效的步长
    pub fn quantize(&self, mb: Macroblock<Coefficients>) -> Macroblock<Quantized> {
        let step = self.step();
        let levels = mb.planes().map(|c| quantize_coefficient(c, step));
        let mut mb: Macroblock<Quantized> = mb.advance(levels);
        mb.set_qp(step);
        mb
    }

    /// 量化电平 → 系数
    ///
    /// 使用宏块自身携带的步长, 因此对从码流重建的宏块同样适用.
    pub fn dequantize(mb: Macroblock<Quantized>) -> Macroblock<Dequantized> {
        let step = mb.qp();
        let coeffs = mb.planes().map(|level| dequantize_level(level, step));
        mb.advance(coeffs)
    }
}

/// 单个系数量化 (四舍五入远离零)
#[inline]
pub fn quantize_coefficient(coefficient: f64, step: i32) -> i32 {
    let magnitude = (coefficient.abs() / f64::from(step)).round() as i32;
    if coefficient < 0.0 { -magnitude } else { magnitude }
}

/// 单个电平反量化
#[inline]
pub fn dequantize_level(level: i32, step: i32) -> f64 {
    f64::from(level) * f64::from(step)
}
