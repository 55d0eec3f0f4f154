//! # Ying (影)
//!
//! 纯 Rust 实现的块混合视频编码器预测核心.
//!
//! Ying 把每帧划分为 16x16 宏块, 依次完成:
//! - **预测**: 帧内 (DC/垂直/水平/对角) 或运动补偿 (整块/四分区对数搜索)
//! - **变换**: 8x8 二维 DCT-II
//! - **量化**: 均匀标量量化, 电平以指数哥伦布码写出
//! - **闭环重建**: 编码端按解码端的方式重建, 作为下一帧的参考
//!
//! # 快速开始
//!
//! ```rust
//! use ying::codec::{Decoder, Encoder, EncoderConfig, Picture};
//!
//! let mut encoder = Encoder::new(EncoderConfig::new(32, 16)).unwrap();
//! let mut decoder = Decoder::new();
//! for t in 0..3u32 {
//!     let picture = Picture::from_fn(32, 16, |x, y| (x * 3 + y + t * 5) as u8, |_, _, _| 128)
//!         .unwrap();
//!     let frame = encoder.encode_frame(picture).unwrap();
//!     let decoded = decoder.decode_frame(&frame.payload).unwrap();
//!     assert_eq!(
//!         decoded.to_yuv420(),
//!         encoder.reference().unwrap().to_yuv420()
//!     );
//! }
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `ying-core` | 错误类型, 比特读写, 定长方块 |
//! | `ying-codec` | 宏块流水线, 预测, 变换, 量化, 熵编码 |

/// 核心类型与工具
pub use ying_core as core;

/// 编码器预测核心
pub use ying_codec as codec;

/// 获取 Ying 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
