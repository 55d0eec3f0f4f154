//! 比特流读取器.
//!
//! 提供从字节缓冲区中按位读取数据的能力, 与 BitWriter 对应.
//!
//! 按大端位序读取 (MSB first). 用于解析帧头并在测试中回读熵编码器的输出.

use crate::{YingError, YingResult};

/// 比特流读取器
///
/// 从字节缓冲区中按位读取数据, 使用大端位序 (MSB first).
///
/// # 示例
/// ```
/// use ying_core::bitreader::BitReader;
///
/// let data = [0b10110001, 0b01010101];
/// let mut br = BitReader::new(&data);
/// assert_eq!(br.read_bits(4).unwrap(), 0b1011);
/// assert_eq!(br.read_bits(4).unwrap(), 0b0001);
/// assert_eq!(br.read_bits(8).unwrap(), 0b01010101);
/// ```
pub struct BitReader<'a> {
    /// 源数据
    data: &'a [u8],
    /// 当前字节索引
    byte_pos: usize,
    /// 当前字节中的位位置 (0-7, 0 表示最高位)
    bit_pos: u8,
}

impl<'a> BitReader<'a> {
    /// 创建新的比特流读取器
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    /// 剩余可读位数
    fn bits_left(&self) -> usize {
        if self.byte_pos >= self.data.len() {
            return 0;
        }
        (self.data.len() - self.byte_pos) * 8 - self.bit_pos as usize
    }

    /// 读取 1 个位
    fn read_bit(&mut self) -> YingResult<u32> {
        if self.byte_pos >= self.data.len() {
            return Err(YingError::Eof);
        }

        let bit = (self.data[self.byte_pos] >> (7 - self.bit_pos)) & 1;
        self.bit_pos += 1;
        if self.bit_pos >= 8 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }

        Ok(u32::from(bit))
    }

    /// 读取布尔标志 (1 位)
    pub fn read_flag(&mut self) -> YingResult<bool> {
        Ok(self.read_bit()? == 1)
    }

    /// 读取 N 个位 (最多 32 位)
    ///
    /// 按大端位序读取, 返回值的低 N 位有效.
    pub fn read_bits(&mut self, n: u32) -> YingResult<u32> {
        if n == 0 {
            return Ok(0);
        }
        if n > 32 {
            return Err(YingError::InvalidArgument(format!(
                "read_bits: n={} 超过 32 位",
                n,
            )));
        }
        if (n as usize) > self.bits_left() {
            return Err(YingError::Eof);
        }

        let mut result: u32 = 0;
        let mut remaining = n;

        while remaining > 0 {
            let available = 8 - self.bit_pos as u32;
            let to_read = remaining.min(available);

            // 从当前字节中提取位
            let shift = available - to_read;
            let mask = ((1u32 << to_read) - 1) as u8;
            let bits = (self.data[self.byte_pos] >> shift) & mask;

            result = (result << to_read) | u32::from(bits);

            self.bit_pos += to_read as u8;
            if self.bit_pos >= 8 {
                self.bit_pos = 0;
                self.byte_pos += 1;
            }
            remaining -= to_read;
        }

        Ok(result)
    }

    /// 读取无符号指数哥伦布码 ue(v)
    pub fn read_ue(&mut self) -> YingResult<u32> {
        let value = self.read_exp_golomb()?;
        u32::try_from(value)
            .map_err(|_| YingError::InvalidData(format!("ue(v) 超出 u32 范围: {}", value)))
    }

    /// 读取有符号指数哥伦布码 se(v)
    pub fn read_se(&mut self) -> YingResult<i32> {
        let mapped = self.read_exp_golomb()? as i64;
        let value = if mapped & 1 == 1 {
            (mapped + 1) / 2
        } else {
            -(mapped / 2)
        };
        i32::try_from(value)
            .map_err(|_| YingError::InvalidData(format!("se(v) 超出 i32 范围: {}", value)))
    }

    fn read_exp_golomb(&mut self) -> YingResult<u64> {
        let mut leading_zeros = 0u32;
        while self.read_bit()? == 0 {
            leading_zeros += 1;
            if leading_zeros > 32 {
                return Err(YingError::InvalidData(
                    "指数哥伦布码前导零超过 32 位".into(),
                ));
            }
        }
        let mut suffix = 0u64;
        let mut remaining = leading_zeros;
        while remaining > 0 {
            let n = remaining.min(32);
            suffix = (suffix << n) | u64::from(self.read_bits(n)?);
            remaining -= n;
        }
        Ok(((1u64 << leading_zeros) | suffix) - 1)
    }
}
