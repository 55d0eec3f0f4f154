//! 运动估计与运动补偿.
//!
//! 每个宏块先把参考帧中搜索窗口覆盖的亮度 (坐标裁剪到图像内) 收集到搜索缓冲区,
//! 然后对整块 16x16 与四个 8x8 象限分别做三步对数搜索, 按 SSE 与分区开销
//! 决定是否分区. 亮度预测直接取自搜索缓冲区, 色度预测按宏块级裁剪后的目标位置
//! 除以 2 定位; 重建时用同样的规则重新生成预测, 绝不重新搜索.

use std::sync::Arc;

use log::trace;
use ying_core::{Block, YingError, YingResult};

use crate::config::SearchWindow;
use crate::macroblock::{
    ChromaBlock, ChromaPlane, DecodedResidual, LumaBlock, MB_SIZE, Macroblock, MotionField,
    MotionVector, Planes, Prediction, Quadrant, Raw, Reconstructed, Residual,
};
use crate::picture::Picture;

/// 搜索区域: 亮度块内的左上角与边长
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Region {
    row: usize,
    col: usize,
    size: usize,
}

impl Region {
    const WHOLE: Region = Region {
        row: 0,
        col: 0,
        size: MB_SIZE,
    };

    fn quadrant(quadrant: Quadrant) -> Self {
        let (row, col) = quadrant.luma_origin();
        Self { row, col, size: 8 }
    }
}

/// 参考帧亮度搜索缓冲区
///
/// 尺寸为 `(2 * half + 16)` (每个方向), 缓冲区 (0, 0) 对应参考帧中
/// `(x0 - half_width, y0 - half_height)`, 越界坐标逐分量裁剪到图像边缘.
#[derive(Debug, Clone)]
pub struct SearchBuffer {
    half_width: i32,
    half_height: i32,
    width: usize,
    height: usize,
    samples: Vec<u8>,
}

impl SearchBuffer {
    /// 为位于 `(x0, y0)` 的宏块收集搜索窗口
    pub fn gather(
        reference: &Picture<Reconstructed>,
        window: SearchWindow,
        (x0, y0): (i32, i32),
    ) -> Self {
        let half_width = window.half_width as i32;
        let half_height = window.half_height as i32;
        let width = 2 * window.half_width as usize + MB_SIZE;
        let height = 2 * window.half_height as usize + MB_SIZE;
        let mut samples = Vec::with_capacity(width * height);
        for by in 0..height as i32 {
            for bx in 0..width as i32 {
                samples.push(reference.luma_clamped(x0 - half_width + bx, y0 - half_height + by));
            }
        }
        Self {
            half_width,
            half_height,
            width,
            height,
            samples,
        }
    }

    /// 缓冲区尺寸 (宽, 高)
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// 候选向量是否落在缓冲区覆盖范围内
    pub fn is_reachable(&self, mv: MotionVector) -> bool {
        (0..=2 * self.half_width).contains(&(self.half_width + mv.x))
            && (0..=2 * self.half_height).contains(&(self.half_height + mv.y))
    }

    /// 以 `mv` 偏移后宏块内 `(row, col)` 处的参考亮度, 调用方保证向量可达
    pub fn sample(&self, mv: MotionVector, row: usize, col: usize) -> u8 {
        let y = (self.half_height + mv.y) as usize + row;
        let x = (self.half_width + mv.x) as usize + col;
        self.samples[y * self.width + x]
    }

    /// 区域内的亮度 SSE, 不可达的候选返回 `u64::MAX`
    fn region_sse(&self, original: &LumaBlock<u8>, mv: MotionVector, region: Region) -> u64 {
        if !self.is_reachable(mv) {
            return u64::MAX;
        }
        let mut total = 0u64;
        for row in region.row..region.row + region.size {
            for col in region.col..region.col + region.size {
                let d = i64::from(original[(row, col)]) - i64::from(self.sample(mv, row, col));
                total += (d * d) as u64;
            }
        }
        total
    }
}

/// 单个宏块的运动决策
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionDecision {
    /// 最终采用的运动信息
    pub field: MotionField,
    /// 整块最优 SSE
    pub whole_cost: u64,
    /// 四个象限最优 SSE 之和
    pub quadrant_cost: u64,
}

/// 运动补偿器
///
/// 持有当前参考帧 (只读, 帧边界处整体替换), 同时负责 "搜索并相减" 与
/// "按记录的向量加回" 两个方向.
#[derive(Debug, Clone)]
pub struct MotionCompensator {
    window: SearchWindow,
    partition_cost: u64,
    enabled: bool,
    reference: Option<Arc<Picture<Reconstructed>>>,
}

impl MotionCompensator {
    pub fn new(window: SearchWindow, partition_cost: u64, enabled: bool) -> Self {
        Self {
            window,
            partition_cost,
            enabled,
            reference: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 当前参考帧
    pub fn reference(&self) -> Option<&Arc<Picture<Reconstructed>>> {
        self.reference.as_ref()
    }

    /// 安装新的参考帧, 返回被替换的旧参考帧
    pub fn install_reference(
        &mut self,
        picture: Arc<Picture<Reconstructed>>,
    ) -> Option<Arc<Picture<Reconstructed>>> {
        self.reference.replace(picture)
    }

    /// 三步对数搜索
    ///
    /// 步长依次为 `half`, `half / 2`, `1` (至少为 1). 首轮先评估中心再评估八邻域,
    /// 之后各轮沿用已知的中心代价只评估八邻域. 只有严格更小的 SSE 才会替换当前最优.
    fn log_search(
        &self,
        buffer: &SearchBuffer,
        original: &LumaBlock<u8>,
        region: Region,
    ) -> (MotionVector, u64) {
        let steps = search_steps(self.window);
        let mut best_mv = MotionVector::ZERO;
        let mut best_cost = buffer.region_sse(original, best_mv, region);

        for (step_x, step_y) in steps {
            let center = best_mv;
            for dx in -1..=1 {
                for dy in -1..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let candidate =
                        MotionVector::new(center.x + dx * step_x, center.y + dy * step_y);
                    let cost = buffer.region_sse(original, candidate, region);
                    if cost < best_cost {
                        best_mv = candidate;
                        best_cost = cost;
                    }
                }
            }
        }
        (best_mv, best_cost)
    }

    /// 在给定的搜索缓冲区上做整块与四象限搜索, 决定是否分区
    pub fn decide(&self, buffer: &SearchBuffer, original: &LumaBlock<u8>) -> MotionDecision {
        let (whole_mv, whole_cost) = self.log_search(buffer, original, Region::WHOLE);

        let mut vectors = [MotionVector::ZERO; 4];
        let mut quadrant_cost = 0u64;
        for quadrant in Quadrant::ALL {
            let (mv, cost) = self.log_search(buffer, original, Region::quadrant(quadrant));
            vectors[quadrant.index()] = mv;
            quadrant_cost = quadrant_cost.saturating_add(cost);
        }

        let field = if quadrant_cost.saturating_add(self.partition_cost) < whole_cost {
            MotionField::partitioned(vectors)
        } else {
            MotionField::whole(whole_mv)
        };
        MotionDecision {
            field,
            whole_cost,
            quadrant_cost,
        }
    }

    /// 搜索运动向量并减去运动补偿预测
    ///
    /// 关闭或尚无参考帧时直接输出原始采样作为残差.
    pub fn compensate(&self, mb: Macroblock<Raw>) -> Macroblock<Residual> {
        let Some(reference) = self.reference.as_deref().filter(|_| self.enabled) else {
            return mb.without_prediction();
        };
        let origin = mb.pixel_origin();
        let buffer = SearchBuffer::gather(reference, self.window, origin);
        let decision = self.decide(&buffer, mb.luma());
        trace!(
            "宏块 {}: 分区={}, 向量={:?}, 整块 SSE={}, 四象限 SSE={}",
            mb.index(),
            decision.field.partitioned,
            decision.field.vectors,
            decision.whole_cost,
            decision.quadrant_cost
        );

        let luma = Block::from_fn(|row, col| {
            buffer.sample(decision.field.vector(quadrant_of(row, col)), row, col)
        });
        let predicted = Planes {
            luma,
            cb: chroma_prediction(reference, ChromaPlane::Cb, origin, &decision.field),
            cr: chroma_prediction(reference, ChromaPlane::Cr, origin, &decision.field),
        };
        mb.subtract_prediction(Prediction::Inter(decision.field), &predicted)
    }

    /// 按宏块记录的向量重新生成预测并加回
    pub fn reconstruct(
        &self,
        mb: Macroblock<DecodedResidual>,
    ) -> YingResult<Macroblock<Reconstructed>> {
        match mb.prediction() {
            Prediction::Inter(field) => {
                let reference = self.reference.as_deref().ok_or_else(|| {
                    YingError::Internal(format!("宏块 {} 需要参考帧, 但尚未安装", mb.index()))
                })?;
                let predicted = predict_from_reference(reference, mb.pixel_origin(), &field);
                Ok(mb.add_prediction(&predicted))
            }
            Prediction::None => Ok(mb.clip()),
            Prediction::Intra(_) => Err(YingError::Internal(format!(
                "宏块 {} 携带帧内预测, 不能按运动补偿重建",
                mb.index()
            ))),
        }
    }
}

/// 各轮搜索的 (水平, 垂直) 步长
fn search_steps(window: SearchWindow) -> [(i32, i32); 3] {
    let hw = window.half_width as i32;
    let hh = window.half_height as i32;
    [
        (hw.max(1), hh.max(1)),
        ((hw / 2).max(1), (hh / 2).max(1)),
        (1, 1),
    ]
}

/// 亮度位置所属的象限
fn quadrant_of(row: usize, col: usize) -> Quadrant {
    match (row >= 8, col >= 8) {
        (false, false) => Quadrant::TopLeft,
        (false, true) => Quadrant::TopRight,
        (true, false) => Quadrant::BottomLeft,
        (true, true) => Quadrant::BottomRight,
    }
}

/// 直接从参考帧生成完整预测 (亮度逐像素裁剪坐标, 与搜索缓冲区取值一致)
pub fn predict_from_reference(
    reference: &Picture<Reconstructed>,
    (x0, y0): (i32, i32),
    field: &MotionField,
) -> Planes<u8> {
    let luma = Block::from_fn(|row, col| {
        let mv = field.vector(quadrant_of(row, col));
        reference.luma_clamped(x0 + mv.x + col as i32, y0 + mv.y + row as i32)
    });
    Planes {
        luma,
        cb: chroma_prediction(reference, ChromaPlane::Cb, (x0, y0), field),
        cr: chroma_prediction(reference, ChromaPlane::Cr, (x0, y0), field),
    }
}

/// 色度预测
///
/// 每个象限的目标位置先在宏块级别裁剪到 `[0, W - 16] x [0, H - 16]`,
/// 再对象限内的偶数亮度位置除以 2 得到色度坐标.
fn chroma_prediction(
    reference: &Picture<Reconstructed>,
    plane: ChromaPlane,
    (x0, y0): (i32, i32),
    field: &MotionField,
) -> ChromaBlock<u8> {
    let max_x = reference.width() as i32 - MB_SIZE as i32;
    let max_y = reference.height() as i32 - MB_SIZE as i32;
    Block::from_fn(|crow, ccol| {
        let (row, col) = (crow * 2, ccol * 2);
        let mv = field.vector(quadrant_of(row, col));
        let xa = (x0 + mv.x).clamp(0, max_x) as usize;
        let ya = (y0 + mv.y).clamp(0, max_y) as usize;
        reference.chroma(plane, (xa + col) / 2, (ya + row) / 2)
    })
}
