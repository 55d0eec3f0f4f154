//! 码流解码与宏块重建.
//!
//! [`reconstruct_macroblock`] 是编码端镜像解码与解码端共用的唯一重建路径:
//! 反量化, 反变换, 按宏块记录的预测 (模式或向量) 加回, 裁剪.

use std::sync::Arc;

use log::debug;
use ying_core::YingResult;
use ying_core::bitreader::BitReader;

use crate::config::{CodingTools, SearchWindow};
use crate::entropy::{FrameHeader, read_macroblock};
use crate::intra::IntraPredictor;
use crate::macroblock::{Macroblock, Prediction, Quantized, Reconstructed};
use crate::motion::MotionCompensator;
use crate::picture::{Picture, ReconstructionBuffer};
use crate::quant::Quantizer;
use crate::transform::Transform;

/// 由量化电平与预测元数据重建宏块
///
/// 帧内宏块从 `buffer` (当前帧已重建部分) 取邻居, 帧间宏块从 `motion` 持有的参考帧取预测.
pub fn reconstruct_macroblock(
    mb: Macroblock<Quantized>,
    transform: &Transform,
    motion: &MotionCompensator,
    buffer: &ReconstructionBuffer,
) -> YingResult<Macroblock<Reconstructed>> {
    let residual = transform.inverse(Quantizer::dequantize(mb));
    match residual.prediction() {
        Prediction::Intra(_) => IntraPredictor::reconstruct(residual, buffer),
        Prediction::Inter(_) => motion.reconstruct(residual),
        Prediction::None => Ok(residual.clip()),
    }
}

/// 码流解码器
///
/// 每次解码一帧码流, 重建结果成为下一帧的参考.
#[derive(Debug)]
pub struct Decoder {
    motion: MotionCompensator,
    frames_decoded: u64,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            motion: MotionCompensator::new(SearchWindow::default(), 0, true),
            frames_decoded: 0,
        }
    }

    /// 已解码的帧数
    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    /// 当前参考帧 (最近一次解码的结果)
    pub fn reference(&self) -> Option<&Arc<Picture<Reconstructed>>> {
        self.motion.reference()
    }

    /// 解码一帧
    pub fn decode_frame(&mut self, payload: &[u8]) -> YingResult<Arc<Picture<Reconstructed>>> {
        let mut reader = BitReader::new(payload);
        let header = FrameHeader::parse(&mut reader)?;
        let transform = Transform::new(header.tools.contains(CodingTools::TRANSFORM));

        let mut buffer = ReconstructionBuffer::new(header.width_mbs, header.height_mbs);
        for index in 0..header.macroblock_count() {
            let mb = read_macroblock(&mut reader, &header, index)?;
            let recon = reconstruct_macroblock(mb, &transform, &self.motion, &buffer)?;
            buffer.push(recon)?;
        }

        let picture = Arc::new(buffer.finish()?);
        self.motion.install_reference(Arc::clone(&picture));
        debug!(
            "解码第 {} 帧 ({}), {} 个宏块",
            self.frames_decoded,
            header.kind.as_char(),
            header.macroblock_count()
        );
        self.frames_decoded += 1;
        Ok(picture)
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncoderConfig;
    use crate::encoder::Encoder;
    use crate::entropy::FrameKind;
    use ying_core::YingError;
    use ying_core::bitwriter::BitWriter;

    fn header(width_mbs: u32, height_mbs: u32, kind: FrameKind) -> FrameHeader {
        FrameHeader {
            width_mbs,
            height_mbs,
            qp: 16,
            intra_period: 4,
            tools: CodingTools::MOTION,
            kind,
        }
    }

    #[test]
    fn test_oversized_header_is_rejected() {
        let mut writer = BitWriter::new();
        header(70_000, 70_000, FrameKind::Intra).write(&mut writer);
        let payload = writer.finish();

        let mut decoder = Decoder::new();
        assert!(matches!(
            decoder.decode_frame(&payload),
            Err(YingError::InvalidData(_))
        ));
        assert_eq!(decoder.frames_decoded(), 0);
    }

    #[test]
    fn test_huge_vector_keeps_previous_reference() {
        let config = EncoderConfig {
            tools: CodingTools::MOTION,
            ..EncoderConfig::new(16, 16)
        };
        let mut encoder = Encoder::new(config).expect("合法配置");
        let picture = Picture::from_fn(16, 16, |x, y| (x * 9 + y) as u8, |_, _, _| 128)
            .expect("合法尺寸");
        let intra = encoder.encode_frame(picture).expect("编码 I 帧");

        let mut decoder = Decoder::new();
        let first = decoder.decode_frame(&intra.payload).expect("解码 I 帧");

        let mut writer = BitWriter::new();
        header(1, 1, FrameKind::Predicted).write(&mut writer);
        writer.write_flag(false);
        writer.write_se(i32::MAX);
        writer.write_se(0);
        for _ in 0..6 {
            writer.write_ue(0);
        }
        let payload = writer.finish();

        assert!(matches!(
            decoder.decode_frame(&payload),
            Err(YingError::InvalidData(_))
        ));
        assert_eq!(decoder.frames_decoded(), 1);
        let reference = decoder.reference().expect("参考帧仍在");
        assert!(Arc::ptr_eq(reference, &first));
    }
}
