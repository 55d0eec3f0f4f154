//! 熵编码接口与指数哥伦布参考实现.
//!
//! 每帧先写帧头 (宏块宽高, qp, I 帧间隔, 四个工具开关, 帧类型), 再按光栅顺序写
//! 每个宏块的预测元数据与六个 8x8 量化块 (四个亮度象限, Cb, Cr).
//! 量化块按之字形顺序编码为 `ue(非零个数)` 加若干 `(ue(游程), se(电平))` 对.

use bytes::Bytes;
use ying_core::bitreader::BitReader;
use ying_core::bitwriter::BitWriter;
use ying_core::{Block, YingError, YingResult};

use crate::config::{CodingTools, MAX_DIMENSION_MBS, MAX_SEARCH_RANGE, validate_qp};
use crate::intra::IntraMode;
use crate::macroblock::{
    CHROMA_MB_SIZE, MB_SIZE, Macroblock, MotionField, MotionVector, Planes, Prediction, Quadrant,
    Quantized,
};

/// 8x8 之字形扫描顺序 (行优先下标)
pub const ZIGZAG_SCAN: [usize; 64] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40, 48, 41, 34, 27,
    20, 13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, 58,
    59, 52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];

/// 帧类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// 仅帧内预测
    Intra,
    /// 以上一重建帧为参考的预测帧
    Predicted,
}

impl FrameKind {
    /// 单字符标记 (日志与统计输出)
    pub fn as_char(self) -> char {
        match self {
            FrameKind::Intra => 'I',
            FrameKind::Predicted => 'P',
        }
    }
}

/// 帧头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// 宽度 (宏块数)
    pub width_mbs: u32,
    /// 高度 (宏块数)
    pub height_mbs: u32,
    /// 量化参数
    pub qp: i32,
    /// I 帧间隔
    pub intra_period: u32,
    /// 工具开关
    pub tools: CodingTools,
    /// 帧类型
    pub kind: FrameKind,
}

impl FrameHeader {
    /// 宏块总数
    pub fn macroblock_count(&self) -> usize {
        self.width_mbs as usize * self.height_mbs as usize
    }

    /// 本帧宏块实际使用的量化步长
    pub fn step(&self) -> i32 {
        if self.tools.contains(CodingTools::QUANTIZE) {
            self.qp
        } else {
            1
        }
    }

    /// 写入帧头
    pub fn write(&self, writer: &mut BitWriter) {
        writer.write_ue(self.width_mbs);
        writer.write_ue(self.height_mbs);
        writer.write_ue(self.qp as u32);
        writer.write_ue(self.intra_period);
        for tool in [
            CodingTools::INTRA,
            CodingTools::MOTION,
            CodingTools::TRANSFORM,
            CodingTools::QUANTIZE,
        ] {
            writer.write_flag(self.tools.contains(tool));
        }
        writer.write_flag(self.kind == FrameKind::Predicted);
    }

    /// 解析帧头
    pub fn parse(reader: &mut BitReader) -> YingResult<Self> {
        let width_mbs = reader.read_ue()?;
        let height_mbs = reader.read_ue()?;
        let qp = i32::try_from(reader.read_ue()?)
            .map_err(|_| YingError::InvalidData("帧头 qp 超出范围".into()))?;
        validate_qp(qp)?;
        let intra_period = reader.read_ue()?;
        if width_mbs == 0 || height_mbs == 0 || intra_period == 0 {
            return Err(YingError::InvalidData(format!(
                "帧头字段无效: {}x{} 宏块, I 帧间隔 {}",
                width_mbs, height_mbs, intra_period
            )));
        }
        if width_mbs > MAX_DIMENSION_MBS || height_mbs > MAX_DIMENSION_MBS {
            return Err(YingError::InvalidData(format!(
                "帧头尺寸 {}x{} 宏块超过上限 {}",
                width_mbs, height_mbs, MAX_DIMENSION_MBS
            )));
        }

        let mut tools = CodingTools::empty();
        for tool in [
            CodingTools::INTRA,
            CodingTools::MOTION,
            CodingTools::TRANSFORM,
            CodingTools::QUANTIZE,
        ] {
            tools.set(tool, reader.read_flag()?);
        }
        let kind = if reader.read_flag()? {
            FrameKind::Predicted
        } else {
            FrameKind::Intra
        };

        Ok(Self {
            width_mbs,
            height_mbs,
            qp,
            intra_period,
            tools,
            kind,
        })
    }

    /// 本帧宏块应携带的预测类型是否与帧头一致
    fn expects_prediction(&self, prediction: &Prediction) -> bool {
        match (self.kind, prediction) {
            (FrameKind::Intra, Prediction::Intra(_)) => self.tools.contains(CodingTools::INTRA),
            (FrameKind::Predicted, Prediction::Inter(_)) => {
                self.tools.contains(CodingTools::MOTION)
            }
            (FrameKind::Intra, Prediction::None) => !self.tools.contains(CodingTools::INTRA),
            (FrameKind::Predicted, Prediction::None) => !self.tools.contains(CodingTools::MOTION),
            _ => false,
        }
    }
}

/// 熵编码器
///
/// 编码协调器每帧先调用一次 `write_header()`, 然后按光栅顺序对每个宏块调用
/// `write_macroblock()`, 最后调用 `finish_frame()` 取出该帧码流.
pub trait EntropyCoder {
    /// 写入帧头
    ///
    /// # 返回
    /// 帧头占用的比特数
    fn write_header(&mut self, header: &FrameHeader) -> YingResult<u64>;

    /// 写入一个宏块的预测元数据与量化电平
    ///
    /// # 返回
    /// 该宏块占用的比特数
    fn write_macroblock(&mut self, mb: &Macroblock<Quantized>) -> YingResult<u64>;

    /// 结束当前帧, 返回字节对齐的码流
    fn finish_frame(&mut self) -> YingResult<Bytes>;

    /// 放弃当前帧: 丢弃本帧已写入的数据, 累计比特数回到帧头之前
    fn abort_frame(&mut self);

    /// 累计输出的比特数 (不含字节对齐填充)
    fn total_bits(&self) -> u64;
}

/// 指数哥伦布熵编码器
#[derive(Default)]
pub struct ExpGolombCoder {
    writer: BitWriter,
    header: Option<FrameHeader>,
    frame_bits: u64,
    total_bits: u64,
}

impl ExpGolombCoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntropyCoder for ExpGolombCoder {
    fn write_header(&mut self, header: &FrameHeader) -> YingResult<u64> {
        if self.header.is_some() {
            return Err(YingError::Internal("上一帧尚未结束就写入新帧头".into()));
        }
        let before = self.writer.bits_written();
        header.write(&mut self.writer);
        let bits = (self.writer.bits_written() - before) as u64;
        self.header = Some(*header);
        self.frame_bits = bits;
        self.total_bits += bits;
        Ok(bits)
    }

    fn write_macroblock(&mut self, mb: &Macroblock<Quantized>) -> YingResult<u64> {
        let header = self
            .header
            .ok_or_else(|| YingError::Internal("写入宏块前必须先写帧头".into()))?;
        let prediction = mb.prediction();
        if !header.expects_prediction(&prediction) {
            return Err(YingError::Internal(format!(
                "宏块 {} 的预测 {:?} 与 {:?} 帧不一致",
                mb.index(),
                prediction,
                header.kind
            )));
        }

        let before = self.writer.bits_written();
        write_prediction(&mut self.writer, &prediction);
        for_each_block(mb.planes(), |block| write_block(&mut self.writer, block));
        let bits = (self.writer.bits_written() - before) as u64;
        self.frame_bits += bits;
        self.total_bits += bits;
        Ok(bits)
    }

    fn finish_frame(&mut self) -> YingResult<Bytes> {
        if self.header.take().is_none() {
            return Err(YingError::Internal("没有正在编码的帧".into()));
        }
        self.frame_bits = 0;
        Ok(Bytes::from(self.writer.take_bytes()))
    }

    fn abort_frame(&mut self) {
        if self.header.take().is_some() {
            self.writer.take_bytes();
            self.total_bits -= self.frame_bits;
            self.frame_bits = 0;
        }
    }

    fn total_bits(&self) -> u64 {
        self.total_bits
    }
}

fn write_prediction(writer: &mut BitWriter, prediction: &Prediction) {
    match prediction {
        Prediction::None => {}
        Prediction::Intra(mode) => writer.write_bits(mode.index() as u32, 2),
        Prediction::Inter(field) => {
            writer.write_flag(field.partitioned);
            let count = if field.partitioned { 4 } else { 1 };
            for mv in &field.vectors[..count] {
                writer.write_se(mv.x);
                writer.write_se(mv.y);
            }
        }
    }
}

/// 按码流顺序访问六个 8x8 块
fn for_each_block(planes: &Planes<i32>, mut f: impl FnMut(&Block<i32, 8>)) {
    for quadrant in Quadrant::ALL {
        let (row, col) = quadrant.luma_origin();
        f(&planes.luma.sub_block(row, col));
    }
    f(&planes.cb);
    f(&planes.cr);
}

fn write_block(writer: &mut BitWriter, block: &Block<i32, 8>) {
    let levels: Vec<i32> = ZIGZAG_SCAN
        .iter()
        .map(|&pos| block[(pos / 8, pos % 8)])
        .collect();
    let nonzero = levels.iter().filter(|&&l| l != 0).count();
    writer.write_ue(nonzero as u32);

    let mut run = 0u32;
    for level in levels {
        if level == 0 {
            run += 1;
        } else {
            writer.write_ue(run);
            writer.write_se(level);
            run = 0;
        }
    }
}

fn read_block(reader: &mut BitReader) -> YingResult<Block<i32, 8>> {
    let nonzero = reader.read_ue()? as usize;
    if nonzero > 64 {
        return Err(YingError::InvalidData(format!("非零系数个数 {} 超过 64", nonzero)));
    }
    let mut block = Block::filled(0);
    let mut pos = 0usize;
    for _ in 0..nonzero {
        pos += reader.read_ue()? as usize;
        if pos >= 64 {
            return Err(YingError::InvalidData("游程越过块末尾".into()));
        }
        let level = reader.read_se()?;
        let scan = ZIGZAG_SCAN[pos];
        block[(scan / 8, scan % 8)] = level;
        pos += 1;
    }
    Ok(block)
}

/// 读取一个运动向量, 分量不得超出最大搜索半宽
fn read_vector(reader: &mut BitReader) -> YingResult<MotionVector> {
    let x = reader.read_se()?;
    let y = reader.read_se()?;
    if x.unsigned_abs() > MAX_SEARCH_RANGE || y.unsigned_abs() > MAX_SEARCH_RANGE {
        return Err(YingError::InvalidData(format!(
            "运动向量 ({}, {}) 超出 ±{}",
            x, y, MAX_SEARCH_RANGE
        )));
    }
    Ok(MotionVector::new(x, y))
}

/// 从码流读取一个宏块 (解码端)
///
/// 只依赖帧头与码流中的数据: 位置由光栅索引推出, 步长由帧头推出.
pub fn read_macroblock(
    reader: &mut BitReader,
    header: &FrameHeader,
    index: usize,
) -> YingResult<Macroblock<Quantized>> {
    let prediction = match header.kind {
        FrameKind::Intra if header.tools.contains(CodingTools::INTRA) => {
            let code = reader.read_bits(2)?;
            let mode = IntraMode::from_index(code)
                .ok_or_else(|| YingError::InvalidData(format!("无效帧内模式 {}", code)))?;
            Prediction::Intra(mode)
        }
        FrameKind::Predicted if header.tools.contains(CodingTools::MOTION) => {
            if reader.read_flag()? {
                let mut vectors = [MotionVector::ZERO; 4];
                for mv in &mut vectors {
                    *mv = read_vector(reader)?;
                }
                Prediction::Inter(MotionField::partitioned(vectors))
            } else {
                Prediction::Inter(MotionField::whole(read_vector(reader)?))
            }
        }
        _ => Prediction::None,
    };

    let mut luma = Block::<i32, MB_SIZE>::filled(0);
    for quadrant in Quadrant::ALL {
        let (row, col) = quadrant.luma_origin();
        luma.put_sub_block(row, col, &read_block(reader)?);
    }
    let cb: Block<i32, CHROMA_MB_SIZE> = read_block(reader)?;
    let cr: Block<i32, CHROMA_MB_SIZE> = read_block(reader)?;

    let width = header.width_mbs as usize;
    Ok(Macroblock::from_coded(
        index,
        (index % width) as u32,
        (index / width) as u32,
        header.step(),
        prediction,
        Planes { luma, cb, cr },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(kind: FrameKind, tools: CodingTools) -> FrameHeader {
        FrameHeader {
            width_mbs: 2,
            height_mbs: 1,
            qp: 12,
            intra_period: 5,
            tools,
            kind,
        }
    }

    fn quantized(
        index: usize,
        prediction: Prediction,
        levels: Planes<i32>,
    ) -> Macroblock<Quantized> {
        Macroblock::from_coded(index, index as u32, 0, 12, prediction, levels)
    }

    #[test]
    fn test_zigzag_is_permutation() {
        let mut seen = [false; 64];
        for &pos in &ZIGZAG_SCAN {
            assert!(!seen[pos], "位置 {} 重复", pos);
            seen[pos] = true;
        }
        assert_eq!(ZIGZAG_SCAN[2], 8);
        assert_eq!(ZIGZAG_SCAN[63], 63);
    }

    #[test]
    fn test_header_parse_matches_write() {
        let original = header(FrameKind::Predicted, CodingTools::MOTION | CodingTools::TRANSFORM);
        let mut writer = BitWriter::new();
        original.write(&mut writer);
        let data = writer.finish();
        let parsed = FrameHeader::parse(&mut BitReader::new(&data)).expect("解析帧头");
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_header_rejects_bad_qp() {
        let mut writer = BitWriter::new();
        writer.write_ue(1);
        writer.write_ue(1);
        writer.write_ue(0);
        writer.write_ue(1);
        writer.write_bits(0, 5);
        let data = writer.finish();
        assert!(matches!(
            FrameHeader::parse(&mut BitReader::new(&data)),
            Err(YingError::InvalidQp(0))
        ));
    }

    #[test]
    fn test_header_rejects_oversized_picture() {
        let mut writer = BitWriter::new();
        writer.write_ue(70_000);
        writer.write_ue(70_000);
        writer.write_ue(16);
        writer.write_ue(1);
        writer.write_bits(0, 5);
        let data = writer.finish();
        assert!(matches!(
            FrameHeader::parse(&mut BitReader::new(&data)),
            Err(YingError::InvalidData(_))
        ));

        let largest = FrameHeader {
            width_mbs: MAX_DIMENSION_MBS,
            height_mbs: MAX_DIMENSION_MBS,
            ..header(FrameKind::Intra, CodingTools::all())
        };
        let mut writer = BitWriter::new();
        largest.write(&mut writer);
        let data = writer.finish();
        let parsed = FrameHeader::parse(&mut BitReader::new(&data)).expect("上限尺寸合法");
        assert_eq!(parsed.macroblock_count(), 1024 * 1024);
    }

    /// 构造只含一个整块向量宏块的 P 帧码流
    fn predicted_payload(x: i32, y: i32) -> Vec<u8> {
        let mut writer = BitWriter::new();
        header(FrameKind::Predicted, CodingTools::MOTION).write(&mut writer);
        writer.write_flag(false);
        writer.write_se(x);
        writer.write_se(y);
        for _ in 0..6 {
            writer.write_ue(0);
        }
        writer.finish()
    }

    #[test]
    fn test_vector_range_is_checked() {
        for (x, y) in [(i32::MAX, 0), (0, i32::MIN), (65, 0), (0, -65)] {
            let data = predicted_payload(x, y);
            let mut reader = BitReader::new(&data);
            let hdr = FrameHeader::parse(&mut reader).expect("帧头");
            assert!(
                matches!(read_macroblock(&mut reader, &hdr, 0), Err(YingError::InvalidData(_))),
                "向量 ({}, {}) 应被拒绝",
                x,
                y
            );
        }

        let data = predicted_payload(64, -64);
        let mut reader = BitReader::new(&data);
        let hdr = FrameHeader::parse(&mut reader).expect("帧头");
        let mb = read_macroblock(&mut reader, &hdr, 0).expect("边界向量合法");
        assert_eq!(
            mb.prediction(),
            Prediction::Inter(MotionField::whole(MotionVector::new(64, -64)))
        );
    }

    #[test]
    fn test_abort_frame_discards_partial_data() {
        let hdr = header(FrameKind::Intra, CodingTools::all());
        let mut coder = ExpGolombCoder::new();
        coder.write_header(&hdr).expect("帧头");
        let mb = quantized(0, Prediction::Intra(IntraMode::Dc), Planes::filled(0));
        coder.write_macroblock(&mb).expect("宏块");
        coder.abort_frame();
        assert_eq!(coder.total_bits(), 0);
        assert!(coder.finish_frame().is_err());

        let header_bits = coder.write_header(&hdr).expect("放弃后可以开始新帧");
        let bits = coder.write_macroblock(&mb).expect("宏块");
        let payload = coder.finish_frame().expect("结束帧");
        assert_eq!(coder.total_bits(), header_bits + bits);

        let mut reader = BitReader::new(&payload);
        assert_eq!(FrameHeader::parse(&mut reader).expect("帧头"), hdr);
        let decoded = read_macroblock(&mut reader, &hdr, 0).expect("宏块");
        assert_eq!(decoded.prediction(), Prediction::Intra(IntraMode::Dc));

        // 没有进行中的帧时放弃是空操作
        coder.abort_frame();
        assert_eq!(coder.total_bits(), header_bits + bits);
    }

    #[test]
    fn test_empty_block_costs_one_bit() {
        let mut writer = BitWriter::new();
        write_block(&mut writer, &Block::filled(0));
        assert_eq!(writer.bits_written(), 1);
    }

    #[test]
    fn test_macroblock_stream_is_decodable() {
        let mut luma = Block::filled(0);
        luma[(0, 0)] = 25;
        luma[(3, 9)] = -4;
        luma[(15, 15)] = 1;
        let mut cb = Block::filled(0);
        cb[(7, 0)] = -300;
        let levels = Planes {
            luma,
            cb,
            cr: Block::filled(0),
        };
        let field = MotionField::partitioned([
            MotionVector::new(1, -2),
            MotionVector::new(-7, 0),
            MotionVector::new(16, 16),
            MotionVector::new(0, -16),
        ]);

        let hdr = header(FrameKind::Predicted, CodingTools::all());
        let mut coder = ExpGolombCoder::new();
        let header_bits = coder.write_header(&hdr).expect("帧头");
        let mb0 = quantized(0, Prediction::Inter(field), levels);
        let still = Prediction::Inter(MotionField::whole(MotionVector::ZERO));
        let mb1 = quantized(1, still, Planes::filled(0));
        let bits0 = coder.write_macroblock(&mb0).expect("宏块 0");
        let bits1 = coder.write_macroblock(&mb1).expect("宏块 1");
        // 分区位 + (0,0) 两个 se + 六个空块
        assert_eq!(bits1, 1 + 2 + 6);
        assert_eq!(coder.total_bits(), header_bits + bits0 + bits1);
        let payload = coder.finish_frame().expect("结束帧");

        let mut reader = BitReader::new(&payload);
        let parsed = FrameHeader::parse(&mut reader).expect("帧头");
        assert_eq!(parsed, hdr);
        let decoded0 = read_macroblock(&mut reader, &parsed, 0).expect("宏块 0");
        assert_eq!(decoded0.prediction(), Prediction::Inter(field));
        assert_eq!(decoded0.planes(), &levels);
        assert_eq!(decoded0.qp(), 12);
        let decoded1 = read_macroblock(&mut reader, &parsed, 1).expect("宏块 1");
        assert_eq!(decoded1.position(), (1, 0));
        assert_eq!(decoded1.prediction(), mb1.prediction());
    }

    #[test]
    fn test_intra_mode_uses_two_bits() {
        let hdr = header(FrameKind::Intra, CodingTools::all());
        let mut coder = ExpGolombCoder::new();
        coder.write_header(&hdr).expect("帧头");
        let mb = quantized(0, Prediction::Intra(IntraMode::Diagonal), Planes::filled(0));
        assert_eq!(coder.write_macroblock(&mb).expect("宏块"), 2 + 6);
    }

    #[test]
    fn test_coder_enforces_frame_protocol() {
        let mut coder = ExpGolombCoder::new();
        let mb = quantized(0, Prediction::None, Planes::filled(0));
        assert!(matches!(coder.write_macroblock(&mb), Err(YingError::Internal(_))));
        assert!(coder.finish_frame().is_err());

        // 帧内工具开启时, 无预测的宏块与帧头矛盾
        coder
            .write_header(&header(FrameKind::Intra, CodingTools::all()))
            .expect("帧头");
        assert!(coder.write_macroblock(&mb).is_err());
        let still = Prediction::Inter(MotionField::whole(MotionVector::ZERO));
        let inter = quantized(0, still, Planes::filled(0));
        assert!(coder.write_macroblock(&inter).is_err());
        assert!(coder.write_header(&header(FrameKind::Intra, CodingTools::all())).is_err());
        assert!(coder.finish_frame().is_ok());
    }

    #[test]
    fn test_quantize_off_uses_unit_step() {
        let hdr = header(FrameKind::Intra, CodingTools::INTRA | CodingTools::TRANSFORM);
        assert_eq!(hdr.step(), 1);
        assert_eq!(header(FrameKind::Intra, CodingTools::all()).step(), 12);
    }
}
