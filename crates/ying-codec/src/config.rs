//! 编码器配置.
//!
//! 搜索窗口, 量化参数与各编码工具开关都是显式的配置值,
//! 由 [`Encoder::new`](crate::encoder::Encoder::new) 在处理任何帧之前统一校验.

use bitflags::bitflags;
use ying_core::{YingError, YingResult};

/// 最小量化参数
pub const MIN_QP: i32 = 2;
/// 最大量化参数
pub const MAX_QP: i32 = 52;
/// 默认量化参数
pub const DEFAULT_QP: i32 = 16;
/// 默认 I 帧间隔
pub const DEFAULT_INTRA_PERIOD: u32 = 10;
/// 默认搜索窗口半宽 (每个方向)
pub const DEFAULT_SEARCH_RANGE: u32 = 16;
/// 搜索窗口半宽上限
pub const MAX_SEARCH_RANGE: u32 = 64;
/// 单个方向上的最大宏块数 (16384 像素)
pub const MAX_DIMENSION_MBS: u32 = 1024;
/// 默认分区信令开销 (以 SSE 为单位, 经验值)
pub const DEFAULT_PARTITION_COST: u64 = 10_000;

bitflags! {
    /// 编码工具开关
    ///
    /// 关闭某个工具时, 对应阶段变为直通 (对残差恒等), 而不是被跳过.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CodingTools: u8 {
        /// 帧内预测
        const INTRA     = 1 << 0;
        /// 运动补偿
        const MOTION    = 1 << 1;
        /// 8x8 DCT 变换
        const TRANSFORM = 1 << 2;
        /// 标量量化
        const QUANTIZE  = 1 << 3;
    }
}

impl Default for CodingTools {
    fn default() -> Self {
        Self::all()
    }
}

/// 运动搜索窗口
///
/// 以半宽表示: 运动向量分量落在 `[-half, half]` 内.
/// 搜索缓冲区尺寸为 `(2 * half + 16)` (每个方向).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchWindow {
    /// 水平半宽 (像素)
    pub half_width: u32,
    /// 垂直半宽 (像素)
    pub half_height: u32,
}

impl SearchWindow {
    /// 创建两个方向半宽相同的搜索窗口
    pub const fn square(half: u32) -> Self {
        Self {
            half_width: half,
            half_height: half,
        }
    }
}

impl Default for SearchWindow {
    fn default() -> Self {
        Self::square(DEFAULT_SEARCH_RANGE)
    }
}

/// 编码器配置
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderConfig {
    /// 图像宽度 (像素, 必须是 16 的倍数)
    pub width: u32,
    /// 图像高度 (像素, 必须是 16 的倍数)
    pub height: u32,
    /// 量化参数 (2..=52)
    pub qp: i32,
    /// I 帧间隔 (>= 1), 每个间隔的第 0 帧为 I 帧
    pub intra_period: u32,
    /// 运动搜索窗口
    pub search_window: SearchWindow,
    /// 编码工具开关
    pub tools: CodingTools,
    /// 四分区相对整块的信令开销
    pub partition_cost: u64,
}

impl EncoderConfig {
    /// 以默认参数创建指定尺寸的配置
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            qp: DEFAULT_QP,
            intra_period: DEFAULT_INTRA_PERIOD,
            search_window: SearchWindow::default(),
            tools: CodingTools::default(),
            partition_cost: DEFAULT_PARTITION_COST,
        }
    }

    /// 宽度 (宏块数)
    pub fn width_mbs(&self) -> u32 {
        self.width / 16
    }

    /// 高度 (宏块数)
    pub fn height_mbs(&self) -> u32 {
        self.height / 16
    }

    /// 校验配置
    ///
    /// 任何一项不合法都是致命的配置错误, 必须在处理第一帧之前返回.
    pub fn validate(&self) -> YingResult<()> {
        validate_qp(self.qp)?;

        if self.width == 0 || self.height == 0 {
            return Err(YingError::InvalidArgument(format!(
                "图像尺寸不能为 0: {}x{}",
                self.width, self.height
            )));
        }
        if self.width % 16 != 0 || self.height % 16 != 0 {
            return Err(YingError::InvalidArgument(format!(
                "图像尺寸必须是 16 的倍数: {}x{}",
                self.width, self.height
            )));
        }
        if self.width_mbs() > MAX_DIMENSION_MBS || self.height_mbs() > MAX_DIMENSION_MBS {
            return Err(YingError::InvalidArgument(format!(
                "图像尺寸 {}x{} 超过上限 {} 像素",
                self.width,
                self.height,
                MAX_DIMENSION_MBS * 16
            )));
        }
        if self.intra_period == 0 {
            return Err(YingError::InvalidArgument("I 帧间隔必须 >= 1".into()));
        }

        let window = self.search_window;
        for half in [window.half_width, window.half_height] {
            if half == 0 || half > MAX_SEARCH_RANGE {
                return Err(YingError::InvalidArgument(format!(
                    "搜索窗口半宽 {} 超出范围 1..={}",
                    half, MAX_SEARCH_RANGE
                )));
            }
        }

        Ok(())
    }
}

/// 校验量化参数是否落在 [MIN_QP, MAX_QP]
pub fn validate_qp(qp: i32) -> YingResult<()> {
    if (MIN_QP..=MAX_QP).contains(&qp) {
        Ok(())
    } else {
        Err(YingError::InvalidQp(qp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EncoderConfig::new(352, 288);
        assert!(config.validate().is_ok());
        assert_eq!(config.width_mbs(), 22);
        assert_eq!(config.height_mbs(), 18);
        assert_eq!(config.tools, CodingTools::all());
    }

    #[test]
    fn test_non_positive_qp_is_fatal() {
        for qp in [0, -1, 1, 53] {
            let config = EncoderConfig {
                qp,
                ..EncoderConfig::new(32, 32)
            };
            assert!(
                matches!(config.validate(), Err(YingError::InvalidQp(v)) if v == qp),
                "qp={} 应被拒绝",
                qp
            );
        }
        assert!(validate_qp(MIN_QP).is_ok());
        assert!(validate_qp(MAX_QP).is_ok());
    }

    #[test]
    fn test_rejects_bad_geometry() {
        assert!(EncoderConfig::new(0, 16).validate().is_err());
        assert!(EncoderConfig::new(20, 16).validate().is_err());
        let limit = MAX_DIMENSION_MBS * 16;
        assert!(EncoderConfig::new(limit, 16).validate().is_ok());
        assert!(EncoderConfig::new(16, limit + 16).validate().is_err());

        let zero_period = EncoderConfig {
            intra_period: 0,
            ..EncoderConfig::new(16, 16)
        };
        assert!(zero_period.validate().is_err());

        let bad_window = EncoderConfig {
            search_window: SearchWindow {
                half_width: 8,
                half_height: 0,
            },
            ..EncoderConfig::new(16, 16)
        };
        assert!(bad_window.validate().is_err());
    }

    #[test]
    fn test_tools_are_independent() {
        let tools = CodingTools::INTRA | CodingTools::QUANTIZE;
        assert!(tools.contains(CodingTools::INTRA));
        assert!(!tools.contains(CodingTools::MOTION));
        assert!(!tools.contains(CodingTools::TRANSFORM));
        assert_eq!(tools.bits(), 0b1001);
    }
}
