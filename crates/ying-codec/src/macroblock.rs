//! 宏块数据模型与流水线阶段.
//!
//! 宏块由 16x16 亮度块和两个 8x8 色度块 (4:2:0) 组成.
//! 流水线阶段以类型参数编码: `Macroblock<Raw>` → `Macroblock<Residual>` →
//! `Macroblock<Coefficients>` → `Macroblock<Quantized>` → `Macroblock<Dequantized>` →
//! `Macroblock<DecodedResidual>` → `Macroblock<Reconstructed>`.
//! 每个阶段转换都消耗上一阶段的值, 因此乱序调用在编译期即被拒绝.

use std::fmt;
use std::marker::PhantomData;

use ying_core::{Block, clip_sample};

use crate::intra::IntraMode;

/// 宏块亮度边长
pub const MB_SIZE: usize = 16;
/// 宏块色度边长 (4:2:0)
pub const CHROMA_MB_SIZE: usize = 8;

/// 16x16 亮度块
pub type LumaBlock<T> = Block<T, MB_SIZE>;
/// 8x8 色度块
pub type ChromaBlock<T> = Block<T, CHROMA_MB_SIZE>;

/// 色度平面
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromaPlane {
    /// Cb (U)
    Cb,
    /// Cr (V)
    Cr,
}

/// 一个宏块的三个平面
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Planes<T> {
    /// 亮度 16x16
    pub luma: LumaBlock<T>,
    /// Cb 8x8
    pub cb: ChromaBlock<T>,
    /// Cr 8x8
    pub cr: ChromaBlock<T>,
}

impl<T: Copy> Planes<T> {
    /// 三个平面全部填充为 `value`
    pub fn filled(value: T) -> Self {
        Self {
            luma: Block::filled(value),
            cb: Block::filled(value),
            cr: Block::filled(value),
        }
    }

    /// 获取指定色度平面
    pub fn chroma(&self, plane: ChromaPlane) -> &ChromaBlock<T> {
        match plane {
            ChromaPlane::Cb => &self.cb,
            ChromaPlane::Cr => &self.cr,
        }
    }

    /// 获取指定色度平面 (可变)
    pub fn chroma_mut(&mut self, plane: ChromaPlane) -> &mut ChromaBlock<T> {
        match plane {
            ChromaPlane::Cb => &mut self.cb,
            ChromaPlane::Cr => &mut self.cr,
        }
    }

    /// 三个平面逐点映射
    pub fn map<U: Copy>(&self, mut f: impl FnMut(T) -> U) -> Planes<U> {
        Planes {
            luma: self.luma.map(&mut f),
            cb: self.cb.map(&mut f),
            cr: self.cr.map(&mut f),
        }
    }

    /// 与另一组平面逐点组合
    pub fn zip_map<U: Copy, V: Copy>(
        &self,
        other: &Planes<U>,
        mut f: impl FnMut(T, U) -> V,
    ) -> Planes<V> {
        Planes {
            luma: self.luma.zip_map(&other.luma, &mut f),
            cb: self.cb.zip_map(&other.cb, &mut f),
            cr: self.cr.zip_map(&other.cr, &mut f),
        }
    }
}

/// 整像素运动向量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MotionVector {
    pub x: i32,
    pub y: i32,
}

impl MotionVector {
    pub const ZERO: Self = Self { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// 8x8 象限 (分区) 编号
///
/// ```text
/// [0|1]
/// [2|3]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quadrant {
    TopLeft = 0,
    TopRight = 1,
    BottomLeft = 2,
    BottomRight = 3,
}

impl Quadrant {
    /// 按编号顺序的全部象限
    pub const ALL: [Quadrant; 4] = [
        Quadrant::TopLeft,
        Quadrant::TopRight,
        Quadrant::BottomLeft,
        Quadrant::BottomRight,
    ];

    /// 象限左上角在亮度块中的 (行, 列) 偏移
    pub const fn luma_origin(self) -> (usize, usize) {
        match self {
            Quadrant::TopLeft => (0, 0),
            Quadrant::TopRight => (0, 8),
            Quadrant::BottomLeft => (8, 0),
            Quadrant::BottomRight => (8, 8),
        }
    }

    pub const fn index(self) -> usize {
        self as usize
    }
}

/// 宏块的运动信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionField {
    /// 是否使用四个独立的 8x8 分区向量
    pub partitioned: bool,
    /// 按象限编号排列的向量; 未分区时四个槽位相同
    pub vectors: [MotionVector; 4],
}

impl MotionField {
    /// 整块 (16x16) 运动: 四个槽位都是同一个向量
    pub fn whole(mv: MotionVector) -> Self {
        Self {
            partitioned: false,
            vectors: [mv; 4],
        }
    }

    /// 四分区运动
    pub fn partitioned(vectors: [MotionVector; 4]) -> Self {
        Self {
            partitioned: true,
            vectors,
        }
    }

    /// 指定象限使用的向量
    pub fn vector(&self, quadrant: Quadrant) -> MotionVector {
        self.vectors[quadrant.index()]
    }
}

/// 宏块已选定的预测方式 (随宏块在整条流水线中传递, 重建时原样复用)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Prediction {
    /// 不预测 (工具关闭时的直通)
    #[default]
    None,
    /// 帧内预测模式
    Intra(IntraMode),
    /// 帧间运动补偿
    Inter(MotionField),
}

/// 流水线阶段标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// 原始像素
    Raw,
    /// 预测残差
    Residual,
    /// 变换系数
    Coefficients,
    /// 量化电平
    Quantized,
    /// 反量化系数
    Dequantized,
    /// 反变换后的残差
    DecodedResidual,
    /// 重建像素 (已裁剪)
    Reconstructed,
}

mod sealed {
    pub trait Sealed {}
}

/// 流水线阶段类型标记
pub trait PipelineStage: sealed::Sealed {
    /// 该阶段的采样类型
    type Sample: Copy + Default + PartialEq + fmt::Debug;
    /// 阶段标签
    const STAGE: Stage;
}

macro_rules! pipeline_stage {
    ($(#[$doc:meta])* $name:ident, $sample:ty) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name;

        impl sealed::Sealed for $name {}

        impl PipelineStage for $name {
            type Sample = $sample;
            const STAGE: Stage = Stage::$name;
        }
    };
}

pipeline_stage!(
    /// 原始 8 位像素
    Raw, u8
);
pipeline_stage!(
    /// 原始值减去预测后的有符号残差
    Residual, i32
);
pipeline_stage!(
    /// 正变换输出 (实数系数)
    Coefficients, f64
);
pipeline_stage!(
    /// 量化电平 (送往熵编码器的值)
    Quantized, i32
);
pipeline_stage!(
    /// 反量化后的系数
    Dequantized, f64
);
pipeline_stage!(
    /// 反变换后取整的残差
    DecodedResidual, i32
);
pipeline_stage!(
    /// 加回预测并裁剪后的重建像素
    Reconstructed, u8
);

/// 宏块
pub struct Macroblock<S: PipelineStage> {
    /// 光栅顺序下的线性索引
    index: usize,
    /// 宏块列
    mb_x: u32,
    /// 宏块行
    mb_y: u32,
    /// 生效的量化步长 (量化之前为 0)
    qp: i32,
    /// 已选定的预测方式
    prediction: Prediction,
    /// 当前阶段的采样
    planes: Planes<S::Sample>,
    _stage: PhantomData<S>,
}

impl<S: PipelineStage> Clone for Macroblock<S> {
    fn clone(&self) -> Self {
        Self {
            index: self.index,
            mb_x: self.mb_x,
            mb_y: self.mb_y,
            qp: self.qp,
            prediction: self.prediction,
            planes: self.planes,
            _stage: PhantomData,
        }
    }
}

impl<S: PipelineStage> fmt::Debug for Macroblock<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Macroblock")
            .field("stage", &S::STAGE)
            .field("index", &self.index)
            .field("mb_x", &self.mb_x)
            .field("mb_y", &self.mb_y)
            .field("qp", &self.qp)
            .field("prediction", &self.prediction)
            .finish_non_exhaustive()
    }
}

impl<S: PipelineStage> Macroblock<S> {
    pub(crate) fn assemble(
        index: usize,
        mb_x: u32,
        mb_y: u32,
        qp: i32,
        prediction: Prediction,
        planes: Planes<S::Sample>,
    ) -> Self {
        Self {
            index,
            mb_x,
            mb_y,
            qp,
            prediction,
            planes,
            _stage: PhantomData,
        }
    }

    /// 保留位置与元数据, 进入下一阶段
    pub(crate) fn advance<T: PipelineStage>(self, planes: Planes<T::Sample>) -> Macroblock<T> {
        Macroblock::assemble(
            self.index,
            self.mb_x,
            self.mb_y,
            self.qp,
            self.prediction,
            planes,
        )
    }

    pub(crate) fn set_qp(&mut self, qp: i32) {
        self.qp = qp;
    }

    /// 当前阶段
    pub fn stage(&self) -> Stage {
        S::STAGE
    }

    /// 光栅顺序索引
    pub fn index(&self) -> usize {
        self.index
    }

    /// 宏块坐标 (列, 行)
    pub fn position(&self) -> (u32, u32) {
        (self.mb_x, self.mb_y)
    }

    /// 左上角亮度像素坐标 (x, y)
    pub fn pixel_origin(&self) -> (i32, i32) {
        (self.mb_x as i32 * MB_SIZE as i32, self.mb_y as i32 * MB_SIZE as i32)
    }

    /// 生效的量化步长
    pub fn qp(&self) -> i32 {
        self.qp
    }

    /// 已选定的预测方式
    pub fn prediction(&self) -> Prediction {
        self.prediction
    }

    /// 当前阶段的全部采样
    pub fn planes(&self) -> &Planes<S::Sample> {
        &self.planes
    }

    /// 当前阶段的亮度采样
    pub fn luma(&self) -> &LumaBlock<S::Sample> {
        &self.planes.luma
    }
}

impl Macroblock<Raw> {
    /// 由原始像素创建宏块
    pub fn new(index: usize, mb_x: u32, mb_y: u32, planes: Planes<u8>) -> Self {
        Self::assemble(index, mb_x, mb_y, 0, Prediction::None, planes)
    }

    /// 减去预测, 留下残差, 同时记录所选的预测方式
    pub fn subtract_prediction(
        self,
        prediction: Prediction,
        predicted: &Planes<u8>,
    ) -> Macroblock<Residual> {
        let residual = self
            .planes
            .zip_map(predicted, |orig, pred| i32::from(orig) - i32::from(pred));
        let mut mb: Macroblock<Residual> = self.advance(residual);
        mb.prediction = prediction;
        mb
    }

    /// 不做预测: 残差即原始采样
    pub fn without_prediction(self) -> Macroblock<Residual> {
        let residual = self.planes.map(i32::from);
        let mut mb: Macroblock<Residual> = self.advance(residual);
        mb.prediction = Prediction::None;
        mb
    }
}

impl Macroblock<Quantized> {
    /// 由传输的数据 (位置, 预测元数据, 量化电平, qp) 构造宏块
    ///
    /// 解码端只持有这些信息; 重建路径从这里开始, 不依赖任何未传输的原始像素.
    pub fn from_coded(
        index: usize,
        mb_x: u32,
        mb_y: u32,
        qp: i32,
        prediction: Prediction,
        levels: Planes<i32>,
    ) -> Self {
        Self::assemble(index, mb_x, mb_y, qp, prediction, levels)
    }
}

impl Macroblock<DecodedResidual> {
    /// 加回预测并裁剪到 [0, 255]
    pub fn add_prediction(self, predicted: &Planes<u8>) -> Macroblock<Reconstructed> {
        let samples = self
            .planes
            .zip_map(predicted, |res, pred| clip_sample(res + i32::from(pred)));
        self.advance(samples)
    }

    /// 无预测时直接裁剪
    pub fn clip(self) -> Macroblock<Reconstructed> {
        let samples = self.planes.map(clip_sample);
        self.advance(samples)
    }
}
