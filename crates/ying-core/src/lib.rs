//! # ying-core
//!
//! Ying 视频编码器核心库, 提供基础类型定义、错误处理和工具函数.
//!
//! 本 crate 为预测核心 (ying-codec) 与命令行工具提供底层基础设施:
//! 统一错误类型、按位读写器以及固定尺寸的采样块.

pub mod bitreader;
pub mod bitwriter;
pub mod block;
pub mod error;

// 重导出常用类型
pub use block::{Block, SAMPLE_MAX, clip_sample, sse};
pub use error::{YingError, YingResult};
