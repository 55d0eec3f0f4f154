//! 统一错误类型定义.
//!
//! 所有 Ying crate 共用的错误类型, 支持跨模块传播.
//!
//! 宏块级别的可恢复情况 (邻居缺失, 搜索越界) 一律以默认值回退处理,
//! 不会出现在这里; 这里只有配置错误、I/O 错误和内部不变量被破坏.

use thiserror::Error;

/// Ying 统一错误类型
#[derive(Debug, Error)]
pub enum YingError {
    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 量化参数越界 (致命配置错误, 在处理任何帧之前检出)
    #[error("无效量化参数: qp={0}, 有效范围 2..=52")]
    InvalidQp(i32),

    /// 无效数据 (截断的输入帧, 损坏的码流等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 已到达流末尾
    #[error("已到达流末尾")]
    Eof,

    /// 内部错误 (不应发生)
    #[error("内部错误: {0}")]
    Internal(String),
}

/// Ying 统一 Result 类型
pub type YingResult<T> = Result<T, YingError>;
