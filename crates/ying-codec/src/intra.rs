//! 帧内预测.
//!
//! 每个宏块从同一帧中已重建的左侧/上方邻居取边缘采样, 计算 DC, 垂直, 水平,
//! 对角四个候选, 以亮度 SSE 选择最优模式, 色度沿用同一模式.
//! 预测与重建共用同一组边缘采样的收集逻辑, 两个方向不会出现分歧.

use log::trace;
use ying_core::{Block, YingError, YingResult, sse};

use crate::macroblock::{
    CHROMA_MB_SIZE, ChromaPlane, DecodedResidual, MB_SIZE, Macroblock, Planes, Prediction, Raw,
    Reconstructed, Residual,
};
use crate::picture::ReconstructionBuffer;

/// 邻居不可用时使用的边缘采样值
pub const DEFAULT_EDGE_SAMPLE: u8 = 128;

/// 帧内预测模式 (按选择优先级排列)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum IntraMode {
    /// 边缘均值
    Dc = 0,
    /// 上边缘向下复制
    Vertical = 1,
    /// 左边缘向右复制
    Horizontal = 2,
    /// 对角 (左上 → 右下) 传播
    Diagonal = 3,
}

impl IntraMode {
    /// 按优先级排列的全部模式, SSE 相同时靠前者胜出
    pub const ALL: [IntraMode; 4] = [
        IntraMode::Dc,
        IntraMode::Vertical,
        IntraMode::Horizontal,
        IntraMode::Diagonal,
    ];

    /// 码流中的 2 比特编号
    pub fn index(self) -> usize {
        self as usize
    }

    /// 由码流编号解析
    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }
}

/// 一个平面的预测边缘: 左列, 上行, 左上角
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeSamples<const N: usize> {
    pub left: [u8; N],
    pub top: [u8; N],
    pub corner: u8,
}

impl<const N: usize> EdgeSamples<N> {
    /// 全部为默认值的边缘
    pub fn unavailable() -> Self {
        Self {
            left: [DEFAULT_EDGE_SAMPLE; N],
            top: [DEFAULT_EDGE_SAMPLE; N],
            corner: DEFAULT_EDGE_SAMPLE,
        }
    }

    /// 从邻居块收集边缘
    ///
    /// 任一相邻边缘缺失时左上角都取默认值, 而不只是两者都缺失时.
    pub fn gather(
        left: Option<&Block<u8, N>>,
        above: Option<&Block<u8, N>>,
        diagonal: Option<&Block<u8, N>>,
    ) -> Self {
        let mut edges = Self::unavailable();
        if let Some(block) = left {
            for (row, sample) in edges.left.iter_mut().enumerate() {
                *sample = block[(row, N - 1)];
            }
        }
        if let Some(block) = above {
            edges.top = block.rows()[N - 1];
        }
        if let (Some(_), Some(_), Some(block)) = (left, above, diagonal) {
            edges.corner = block[(N - 1, N - 1)];
        }
        edges
    }

    /// 生成指定模式的预测块
    pub fn predict(&self, mode: IntraMode) -> Block<u8, N> {
        match mode {
            IntraMode::Dc => Block::filled(self.dc()),
            IntraMode::Vertical => Block::from_fn(|_, col| self.top[col]),
            IntraMode::Horizontal => Block::from_fn(|row, _| self.left[row]),
            IntraMode::Diagonal => self.diagonal(),
        }
    }

    /// 2N 个边缘采样的四舍五入均值
    fn dc(&self) -> u8 {
        let sum: u32 = self
            .left
            .iter()
            .chain(self.top.iter())
            .map(|&s| u32::from(s))
            .sum();
        ((sum + N as u32) / (2 * N as u32)) as u8
    }

    /// 首行首列用 (1,2,1)/4 滤波播种, 其余沿对角线向右下复制
    fn diagonal(&self) -> Block<u8, N> {
        let filter = |a: u8, b: u8, c: u8| -> u8 {
            ((u32::from(a) + 2 * u32::from(b) + u32::from(c) + 2) >> 2) as u8
        };
        // 把角点接在边缘前面, 统一成 edge[-1] = corner
        let extended = |edge: &[u8; N], i: usize| -> u8 {
            if i == 0 { self.corner } else { edge[i - 1] }
        };

        let mut block = Block::filled(0u8);
        block[(0, 0)] = filter(self.left[0], self.corner, self.top[0]);
        for i in 1..N {
            block[(i, 0)] = filter(extended(&self.left, i - 1), self.left[i - 1], self.left[i]);
            block[(0, i)] = filter(extended(&self.top, i - 1), self.top[i - 1], self.top[i]);
        }
        for row in 1..N {
            for col in 1..N {
                block[(row, col)] = block[(row - 1, col - 1)];
            }
        }
        block
    }
}

/// 一个宏块三个平面的边缘采样
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighbors {
    pub luma: EdgeSamples<MB_SIZE>,
    pub cb: EdgeSamples<CHROMA_MB_SIZE>,
    pub cr: EdgeSamples<CHROMA_MB_SIZE>,
}

impl Neighbors {
    /// 从当前帧的重建缓冲区收集 `index` 号宏块的邻居边缘
    pub fn gather(buffer: &ReconstructionBuffer, index: usize) -> Self {
        let left = buffer.left_of(index).map(|mb| mb.planes());
        let above = buffer.above(index).map(|mb| mb.planes());
        let diagonal = match (left, above) {
            (Some(_), Some(_)) => buffer.above(index - 1).map(|mb| mb.planes()),
            _ => None,
        };

        let chroma = |plane: ChromaPlane| {
            EdgeSamples::gather(
                left.map(|p| p.chroma(plane)),
                above.map(|p| p.chroma(plane)),
                diagonal.map(|p| p.chroma(plane)),
            )
        };
        Self {
            luma: EdgeSamples::gather(
                left.map(|p| &p.luma),
                above.map(|p| &p.luma),
                diagonal.map(|p| &p.luma),
            ),
            cb: chroma(ChromaPlane::Cb),
            cr: chroma(ChromaPlane::Cr),
        }
    }

    /// 指定模式下三个平面的预测
    pub fn predict(&self, mode: IntraMode) -> Planes<u8> {
        Planes {
            luma: self.luma.predict(mode),
            cb: self.cb.predict(mode),
            cr: self.cr.predict(mode),
        }
    }
}

/// 帧内预测器
///
/// 同时提供 "预测并相减" 与 "加回预测重建" 两个方向, 共享同一套邻居收集.
#[derive(Debug, Clone, Copy)]
pub struct IntraPredictor {
    enabled: bool,
}

impl IntraPredictor {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 对原始亮度块评估四个候选, 返回最优模式及其 SSE
    ///
    /// 只有严格更小的 SSE 才会替换当前最优, 相等时保留优先级高的模式.
    pub fn select_mode(
        original: &Block<u8, MB_SIZE>,
        edges: &EdgeSamples<MB_SIZE>,
    ) -> (IntraMode, u64) {
        let mut best = (IntraMode::Dc, u64::MAX);
        for mode in IntraMode::ALL {
            let cost = sse(original, &edges.predict(mode));
            if cost < best.1 {
                best = (mode, cost);
            }
        }
        best
    }

    /// 选择模式并减去预测
    ///
    /// 邻居取自当前帧已重建的宏块; 关闭时直接输出原始采样作为残差.
    pub fn predict(
        &self,
        mb: Macroblock<Raw>,
        buffer: &ReconstructionBuffer,
    ) -> Macroblock<Residual> {
        if !self.enabled {
            return mb.without_prediction();
        }
        let neighbors = Neighbors::gather(buffer, mb.index());
        let (mode, cost) = Self::select_mode(mb.luma(), &neighbors.luma);
        trace!("宏块 {}: 帧内模式 {:?}, SSE={}", mb.index(), mode, cost);
        let predicted = neighbors.predict(mode);
        mb.subtract_prediction(Prediction::Intra(mode), &predicted)
    }

    /// 用宏块记录的模式重新生成预测并加回
    pub fn reconstruct(
        mb: Macroblock<DecodedResidual>,
        buffer: &ReconstructionBuffer,
    ) -> YingResult<Macroblock<Reconstructed>> {
        match mb.prediction() {
            Prediction::Intra(mode) => {
                let predicted = Neighbors::gather(buffer, mb.index()).predict(mode);
                Ok(mb.add_prediction(&predicted))
            }
            Prediction::None => Ok(mb.clip()),
            Prediction::Inter(_) => Err(YingError::Internal(format!(
                "宏块 {} 携带帧间预测, 不能按帧内重建",
                mb.index()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macroblock::Stage;

    fn edges16(left: u8, top: u8, corner: u8) -> EdgeSamples<16> {
        EdgeSamples {
            left: [left; 16],
            top: [top; 16],
            corner,
        }
    }

    fn recon_mb(index: usize, mb_x: u32, mb_y: u32, value: u8) -> Macroblock<Reconstructed> {
        Macroblock::assemble(index, mb_x, mb_y, 0, Prediction::None, Planes::filled(value))
    }

    #[test]
    fn test_dc_over_uniform_neighborhood_is_exact() {
        for value in [0u8, 1, 77, 128, 254, 255] {
            let edges = edges16(value, value, value);
            let block = edges.predict(IntraMode::Dc);
            assert!(block.iter().all(|s| s == value), "均匀邻域 {} 的 DC 预测应精确", value);

            let chroma = EdgeSamples::<8> {
                left: [value; 8],
                top: [value; 8],
                corner: value,
            };
            assert!(chroma.predict(IntraMode::Dc).iter().all(|s| s == value));
        }
    }

    #[test]
    fn test_dc_rounding() {
        // 16 个 10 和 16 个 11: 均值 10.5 → 11
        let edges = edges16(10, 11, 0);
        assert!(edges.predict(IntraMode::Dc).iter().all(|s| s == 11));
    }

    #[test]
    fn test_vertical_and_horizontal_replicate_edges() {
        let mut edges = edges16(0, 0, 0);
        for i in 0..16 {
            edges.top[i] = i as u8 * 10;
            edges.left[i] = 200 - i as u8;
        }
        let v = edges.predict(IntraMode::Vertical);
        let h = edges.predict(IntraMode::Horizontal);
        for row in 0..16 {
            for col in 0..16 {
                assert_eq!(v[(row, col)], col as u8 * 10);
                assert_eq!(h[(row, col)], 200 - row as u8);
            }
        }
    }

    #[test]
    fn test_diagonal_seeding_and_propagation() {
        let mut edges = EdgeSamples::<8> {
            left: [0; 8],
            top: [0; 8],
            corner: 40,
        };
        for i in 0..8 {
            edges.left[i] = 8 * i as u8;
            edges.top[i] = 100 + 4 * i as u8;
        }
        let block = edges.predict(IntraMode::Diagonal);
        // (left0 + 2*corner + top0 + 2) >> 2 = (0 + 80 + 100 + 2) >> 2
        assert_eq!(block[(0, 0)], 45);
        // (corner + 2*left0 + left1 + 2) >> 2 = (40 + 0 + 8 + 2) >> 2
        assert_eq!(block[(1, 0)], 12);
        // (corner + 2*top0 + top1 + 2) >> 2 = (40 + 200 + 104 + 2) >> 2
        assert_eq!(block[(0, 1)], 86);
        // (left0 + 2*left1 + left2 + 2) >> 2 = (0 + 16 + 16 + 2) >> 2
        assert_eq!(block[(2, 0)], 8);
        // (top1 + 2*top2 + top3 + 2) >> 2 = (104 + 216 + 112 + 2) >> 2
        assert_eq!(block[(0, 3)], 108);
        for row in 1..8 {
            for col in 1..8 {
                assert_eq!(block[(row, col)], block[(row - 1, col - 1)]);
            }
        }
    }

    #[test]
    fn test_ties_resolve_by_priority() {
        // 均匀边缘: 四个候选完全相同, 应选 DC
        let edges = edges16(90, 90, 90);
        let original = Block::filled(50u8);
        assert_eq!(IntraPredictor::select_mode(&original, &edges).0, IntraMode::Dc);

        // 垂直与水平 SSE 相等且都优于 DC 与对角时, 垂直胜出
        let mut edges = edges16(0, 0, 0);
        for i in 8..16 {
            edges.top[i] = 255;
            edges.left[i] = 255;
        }
        let original = Block::from_fn(|row, col| if row >= 8 && col >= 8 { 255 } else { 0 });
        let v = sse(&original, &edges.predict(IntraMode::Vertical));
        let h = sse(&original, &edges.predict(IntraMode::Horizontal));
        let dc = sse(&original, &edges.predict(IntraMode::Dc));
        let diagonal = sse(&original, &edges.predict(IntraMode::Diagonal));
        assert_eq!(v, h);
        assert!(dc > v && diagonal > v);
        assert_eq!(IntraPredictor::select_mode(&original, &edges), (IntraMode::Vertical, v));

        // 水平预测完全匹配时严格更优
        let edges = edges16(30, 200, 30);
        let horizontal = edges.predict(IntraMode::Horizontal);
        assert_eq!(
            IntraPredictor::select_mode(&horizontal, &edges),
            (IntraMode::Horizontal, 0)
        );
    }

    #[test]
    fn test_first_row_and_column_use_defaults() {
        // 2x2 宏块的帧
        let mut buffer = ReconstructionBuffer::new(2, 2);
        let top_left = Neighbors::gather(&buffer, 0);
        assert_eq!(top_left.luma, EdgeSamples::unavailable());
        assert_eq!(top_left.cr, EdgeSamples::unavailable());

        buffer.push(recon_mb(0, 0, 0, 10)).expect("宏块 0");
        let first_row = Neighbors::gather(&buffer, 1);
        assert_eq!(first_row.luma.left, [10; 16]);
        assert_eq!(first_row.luma.top, [DEFAULT_EDGE_SAMPLE; 16]);
        assert_eq!(first_row.luma.corner, DEFAULT_EDGE_SAMPLE);

        buffer.push(recon_mb(1, 1, 0, 20)).expect("宏块 1");
        let first_col = Neighbors::gather(&buffer, 2);
        assert_eq!(first_col.luma.left, [DEFAULT_EDGE_SAMPLE; 16]);
        assert_eq!(first_col.cb.top, [10; 8]);
        // 只缺左邻居时左上角同样取默认值
        assert_eq!(first_col.luma.corner, DEFAULT_EDGE_SAMPLE);

        buffer.push(recon_mb(2, 0, 1, 30)).expect("宏块 2");
        let interior = Neighbors::gather(&buffer, 3);
        assert_eq!(interior.luma.left, [30; 16]);
        assert_eq!(interior.luma.top, [20; 16]);
        assert_eq!(interior.luma.corner, 10);
        assert_eq!(interior.cr.corner, 10);
    }

    #[test]
    fn test_predict_and_reconstruct_share_mode() {
        let predictor = IntraPredictor::new(true);
        let buffer = ReconstructionBuffer::new(1, 1);
        let raw = Macroblock::new(0, 0, 0, Planes::filled(140u8));
        let residual = predictor.predict(raw, &buffer);
        assert_eq!(residual.stage(), Stage::Residual);
        let Prediction::Intra(mode) = residual.prediction() else {
            panic!("应选择帧内模式");
        };
        assert_eq!(mode, IntraMode::Dc);
        assert!(residual.luma().iter().all(|r| r == 12));

        let planes = *residual.planes();
        let decoded: Macroblock<DecodedResidual> = residual.advance(planes);
        let recon = IntraPredictor::reconstruct(decoded, &buffer).expect("帧内重建");
        assert!(recon.planes().cb.iter().all(|s| s == 140));
    }

    #[test]
    fn test_disabled_predictor_passes_through() {
        let predictor = IntraPredictor::new(false);
        let buffer = ReconstructionBuffer::new(1, 1);
        let residual = predictor.predict(Macroblock::new(0, 0, 0, Planes::filled(9u8)), &buffer);
        assert_eq!(residual.prediction(), Prediction::None);
        assert!(residual.luma().iter().all(|r| r == 9));
    }

    #[test]
    fn test_mode_index_round_trip() {
        for mode in IntraMode::ALL {
            assert_eq!(IntraMode::from_index(mode.index() as u32), Some(mode));
        }
        assert_eq!(IntraMode::from_index(4), None);
    }
}
