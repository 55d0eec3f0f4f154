//! # ying-codec
//!
//! Ying 视频编码器预测核心: 基于宏块的混合编码 (帧内/运动补偿预测, 8x8 DCT, 标量量化),
//! 以及让编码端参考帧与解码端逐比特一致的闭环重建.
//!
//! ## 流水线
//!
//! 宏块按光栅顺序依次经过 `Raw → Residual → Coefficients → Quantized`, 量化电平交给
//! 熵编码器后再镜像解码 `Quantized → Dequantized → DecodedResidual → Reconstructed`.
//! 每个阶段都是独立的类型, 乱序调用无法通过编译.
//!
//! ## 使用示例
//!
//! ```rust
//! use ying_codec::{Encoder, EncoderConfig, Picture};
//!
//! let mut encoder = Encoder::new(EncoderConfig::new(32, 32)).unwrap();
//! let picture = Picture::from_fn(32, 32, |x, y| (x * 4 + y) as u8, |_, _, _| 128).unwrap();
//! let frame = encoder.encode_frame(picture).unwrap();
//! assert_eq!(frame.stats.index, 0);
//! assert!(encoder.reference().is_some());
//! ```

pub mod config;
pub mod decoder;
pub mod encoder;
pub mod entropy;
pub mod intra;
pub mod macroblock;
pub mod motion;
pub mod picture;
pub mod quant;
pub mod source;
pub mod transform;

// 重导出常用类型
pub use config::{CodingTools, EncoderConfig, SearchWindow};
pub use decoder::{Decoder, reconstruct_macroblock};
pub use encoder::{EncodedFrame, Encoder, FrameStats};
pub use entropy::{EntropyCoder, ExpGolombCoder, FrameHeader, FrameKind};
pub use intra::{IntraMode, IntraPredictor};
pub use macroblock::{
    ChromaPlane, Macroblock, MotionField, MotionVector, Planes, Prediction, Quadrant, Stage,
};
pub use motion::MotionCompensator;
pub use picture::{Picture, ReconstructionBuffer};
pub use quant::Quantizer;
pub use source::{FrameSource, MemorySource, YuvReader};
pub use transform::Transform;
