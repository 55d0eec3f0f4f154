//! 编码协调器.
//!
//! 按光栅顺序逐宏块执行: 预测 (帧内或运动补偿) → 变换 → 量化 → 熵编码 →
//! 镜像解码 (反量化, 反变换, 加回同一预测, 裁剪). 整帧全部宏块重建完成后,
//! 才把重建帧安装为新的参考帧; 任何一步失败时旧参考帧保持不变.

use std::sync::Arc;

use bytes::Bytes;
use log::{debug, trace};
use ying_core::{YingError, YingResult, sse};

use crate::config::{CodingTools, EncoderConfig};
use crate::decoder::reconstruct_macroblock;
use crate::entropy::{EntropyCoder, ExpGolombCoder, FrameHeader, FrameKind};
use crate::intra::IntraPredictor;
use crate::macroblock::{MotionVector, Prediction, Raw, Reconstructed};
use crate::motion::MotionCompensator;
use crate::picture::{Picture, ReconstructionBuffer};
use crate::quant::Quantizer;
use crate::source::FrameSource;
use crate::transform::Transform;

/// 单帧编码统计
#[derive(Debug, Clone, PartialEq)]
pub struct FrameStats {
    /// 帧序号 (从 0 开始)
    pub index: u64,
    /// 帧类型
    pub kind: FrameKind,
    /// 本帧输出的比特数 (帧头 + 全部宏块)
    pub bits: u64,
    /// 各帧内模式的宏块数 (DC, 垂直, 水平, 对角)
    pub intra_modes: [u32; 4],
    /// 使用四分区的宏块数
    pub partitioned: u32,
    /// 使用整块向量的宏块数
    pub whole: u32,
    /// 重建亮度与原始亮度的 SSE
    pub luma_sse: u64,
    /// 亮度采样数
    pub luma_samples: u64,
    /// P 帧每个宏块的首个向量 (光栅顺序); I 帧为空
    pub vectors: Vec<MotionVector>,
}

impl FrameStats {
    fn new(index: u64, kind: FrameKind) -> Self {
        Self {
            index,
            kind,
            bits: 0,
            intra_modes: [0; 4],
            partitioned: 0,
            whole: 0,
            luma_sse: 0,
            luma_samples: 0,
            vectors: Vec::new(),
        }
    }

    /// 亮度 PSNR (dB), 无损时为正无穷
    pub fn psnr(&self) -> f64 {
        if self.luma_sse == 0 {
            return f64::INFINITY;
        }
        let mse = self.luma_sse as f64 / self.luma_samples as f64;
        10.0 * (255.0 * 255.0 / mse).log10()
    }

    fn record(&mut self, prediction: &Prediction) {
        match prediction {
            Prediction::Intra(mode) => self.intra_modes[mode.index()] += 1,
            Prediction::Inter(field) => {
                if field.partitioned {
                    self.partitioned += 1;
                } else {
                    self.whole += 1;
                }
                self.vectors.push(field.vectors[0]);
            }
            Prediction::None => {
                if self.kind == FrameKind::Predicted {
                    self.vectors.push(MotionVector::ZERO);
                }
            }
        }
    }
}

/// 一帧的编码结果
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// 统计信息
    pub stats: FrameStats,
    /// 字节对齐的码流
    pub payload: Bytes,
}

/// 编码器
pub struct Encoder<C: EntropyCoder = ExpGolombCoder> {
    config: EncoderConfig,
    intra: IntraPredictor,
    motion: MotionCompensator,
    transform: Transform,
    quantizer: Quantizer,
    coder: C,
    frames_encoded: u64,
}

impl Encoder<ExpGolombCoder> {
    /// 使用默认的指数哥伦布熵编码器创建编码器
    pub fn new(config: EncoderConfig) -> YingResult<Self> {
        Self::with_coder(config, ExpGolombCoder::new())
    }
}

impl<C: EntropyCoder> Encoder<C> {
    /// 使用指定的熵编码器创建编码器
    ///
    /// 配置在这里一次性校验, 非法配置 (如 qp <= 0) 不会进入任何帧的处理.
    pub fn with_coder(config: EncoderConfig, coder: C) -> YingResult<Self> {
        config.validate()?;
        let tools = config.tools;
        Ok(Self {
            intra: IntraPredictor::new(tools.contains(CodingTools::INTRA)),
            motion: MotionCompensator::new(
                config.search_window,
                config.partition_cost,
                tools.contains(CodingTools::MOTION),
            ),
            transform: Transform::new(tools.contains(CodingTools::TRANSFORM)),
            quantizer: Quantizer::new(config.qp, tools.contains(CodingTools::QUANTIZE))?,
            coder,
            config,
            frames_encoded: 0,
        })
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// 已编码的帧数
    pub fn frames_encoded(&self) -> u64 {
        self.frames_encoded
    }

    /// 当前参考帧 (最近一帧的重建结果)
    pub fn reference(&self) -> Option<&Arc<Picture<Reconstructed>>> {
        self.motion.reference()
    }

    pub fn coder(&self) -> &C {
        &self.coder
    }

    pub fn into_coder(self) -> C {
        self.coder
    }

    /// 累计输出的比特数
    pub fn total_bits(&self) -> u64 {
        self.coder.total_bits()
    }

    /// 判定第 `index` 帧的类型
    ///
    /// 每个 I 帧间隔的第 0 帧为 I 帧; 尚无参考帧时也只能编码为 I 帧.
    pub fn classify(&self, index: u64) -> FrameKind {
        if index % u64::from(self.config.intra_period) == 0 || self.motion.reference().is_none() {
            FrameKind::Intra
        } else {
            FrameKind::Predicted
        }
    }

    /// 编码一帧
    pub fn encode_frame(&mut self, picture: Picture<Raw>) -> YingResult<EncodedFrame> {
        if picture.width_mbs() != self.config.width_mbs()
            || picture.height_mbs() != self.config.height_mbs()
        {
            return Err(YingError::InvalidArgument(format!(
                "图像尺寸 {}x{} 与配置 {}x{} 不一致",
                picture.width(),
                picture.height(),
                self.config.width,
                self.config.height
            )));
        }

        let index = self.frames_encoded;
        let kind = self.classify(index);
        let header = FrameHeader {
            width_mbs: picture.width_mbs(),
            height_mbs: picture.height_mbs(),
            qp: self.config.qp,
            intra_period: self.config.intra_period,
            tools: self.config.tools,
            kind,
        };

        let mut stats = FrameStats::new(index, kind);
        stats.luma_samples = u64::from(picture.width()) * u64::from(picture.height());
        stats.bits += self.coder.write_header(&header)?;

        let reconstructed = match self.encode_macroblocks(picture, kind, &mut stats) {
            Ok(reconstructed) => reconstructed,
            Err(e) => {
                self.coder.abort_frame();
                return Err(e);
            }
        };
        let payload = self.coder.finish_frame()?;
        self.motion.install_reference(Arc::new(reconstructed));
        self.frames_encoded += 1;

        match kind {
            FrameKind::Intra => debug!(
                "#{:3} I {:8} 比特, 模式 DC/V/H/D = {:?}, PSNR {:.2} dB",
                index,
                stats.bits,
                stats.intra_modes,
                stats.psnr()
            ),
            FrameKind::Predicted => debug!(
                "#{:3} P {:8} 比特, 分区/整块 = {}/{}, PSNR {:.2} dB",
                index,
                stats.bits,
                stats.partitioned,
                stats.whole,
                stats.psnr()
            ),
        }

        Ok(EncodedFrame { stats, payload })
    }

    /// 按光栅顺序编码并镜像重建一帧的全部宏块
    fn encode_macroblocks(
        &mut self,
        picture: Picture<Raw>,
        kind: FrameKind,
        stats: &mut FrameStats,
    ) -> YingResult<Picture<Reconstructed>> {
        let mut buffer = ReconstructionBuffer::new(picture.width_mbs(), picture.height_mbs());
        for mb in picture.into_macroblocks() {
            let original = *mb.luma();
            let residual = match kind {
                FrameKind::Intra => self.intra.predict(mb, &buffer),
                FrameKind::Predicted => self.motion.compensate(mb),
            };
            stats.record(&residual.prediction());

            let quantized = self.quantizer.quantize(self.transform.forward(residual));
            let bits = self.coder.write_macroblock(&quantized)?;
            stats.bits += bits;
            trace!("宏块 {}: {:?}, {} 比特", quantized.index(), quantized.prediction(), bits);

            let recon =
                reconstruct_macroblock(quantized, &self.transform, &self.motion, &buffer)?;
            stats.luma_sse += sse(&original, recon.luma());
            buffer.push(recon)?;
        }
        buffer.finish()
    }

    /// 编码帧源中的全部帧, 每帧结果交给 `sink`
    pub fn encode_all<S, F>(&mut self, source: &mut S, mut sink: F) -> YingResult<Vec<FrameStats>>
    where
        S: FrameSource,
        F: FnMut(&Self, &EncodedFrame) -> YingResult<()>,
    {
        let mut all = Vec::new();
        while let Some(picture) = source.next_picture()? {
            let frame = self.encode_frame(picture)?;
            sink(&*self, &frame)?;
            all.push(frame.stats);
        }
        Ok(all)
    }
}
