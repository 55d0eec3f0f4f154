//! 比特流写入器.
//!
//! 提供向字节缓冲区按位写入数据的能力, 是熵编码器的基础设施.
//!
//! 按大端位序写入 (MSB first), 与 BitReader 对应.
//! 除定长字段外, 还支持指数哥伦布码 (ue/se), 用于头部字段、运动向量与游程-电平对.

/// 比特流写入器
///
/// 向字节缓冲区按位写入数据, 使用大端位序 (MSB first).
///
/// # 示例
/// ```
/// use ying_core::bitwriter::BitWriter;
///
/// let mut bw = BitWriter::new();
/// bw.write_bits(0b1011, 4);
/// bw.write_ue(0); // "1"
/// bw.write_ue(1); // "010"
/// let data = bw.finish();
/// assert_eq!(data, vec![0b10111010]);
/// ```
pub struct BitWriter {
    /// 输出缓冲区
    data: Vec<u8>,
    /// 当前字节 (正在填充)
    current_byte: u8,
    /// 当前字节中已填充的位数 (0-7)
    bit_count: u8,
}

impl BitWriter {
    /// 创建新的比特流写入器
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            current_byte: 0,
            bit_count: 0,
        }
    }

    /// 获取已写入的总位数
    pub fn bits_written(&self) -> usize {
        self.data.len() * 8 + self.bit_count as usize
    }

    /// 写入 1 个位
    fn write_bit(&mut self, bit: u32) {
        self.current_byte = (self.current_byte << 1) | (bit & 1) as u8;
        self.bit_count += 1;
        if self.bit_count >= 8 {
            self.data.push(self.current_byte);
            self.current_byte = 0;
            self.bit_count = 0;
        }
    }

    /// 写入布尔标志 (1 位)
    pub fn write_flag(&mut self, flag: bool) {
        self.write_bit(u32::from(flag));
    }

    /// 写入 N 个位 (最多 32 位)
    ///
    /// 值的低 N 位被写入, 高位在前 (大端).
    pub fn write_bits(&mut self, value: u32, n: u32) {
        debug_assert!(n <= 32, "write_bits: n={} 超过 32 位", n);

        if n == 0 {
            return;
        }

        let mut remaining = n;
        while remaining > 0 {
            let available = 8 - self.bit_count as u32;
            let to_write = remaining.min(available);

            // 提取要写入的位
            let shift = remaining - to_write;
            let mask = if to_write >= 32 {
                u32::MAX
            } else {
                (1u32 << to_write) - 1
            };
            let bits = ((value >> shift) & mask) as u8;

            if to_write >= 8 {
                // 整字节写入 (bit_count 必定为 0)
                self.current_byte = bits;
            } else {
                self.current_byte = (self.current_byte << to_write) | bits;
            }
            self.bit_count += to_write as u8;

            if self.bit_count >= 8 {
                self.data.push(self.current_byte);
                self.current_byte = 0;
                self.bit_count = 0;
            }

            remaining -= to_write;
        }
    }

    /// 写入 N 个位 (最多 64 位)
    fn write_bits_u64(&mut self, value: u64, n: u32) {
        if n <= 32 {
            self.write_bits(value as u32, n);
        } else {
            let high_bits = n - 32;
            self.write_bits((value >> 32) as u32, high_bits);
            self.write_bits(value as u32, 32);
        }
    }

    /// 写入无符号指数哥伦布码 ue(v)
    ///
    /// 编码 `v + 1` 的有效位长 L: 先写 L-1 个 0, 再写 L 位的 `v + 1`.
    pub fn write_ue(&mut self, value: u32) {
        self.write_exp_golomb(u64::from(value));
    }

    /// 写入有符号指数哥伦布码 se(v)
    ///
    /// 映射规则: k > 0 → 2k-1, k <= 0 → -2k, 再按 ue 写入.
    pub fn write_se(&mut self, value: i32) {
        let value = i64::from(value);
        let mapped = if value > 0 {
            (2 * value - 1) as u64
        } else {
            (-2 * value) as u64
        };
        self.write_exp_golomb(mapped);
    }

    fn write_exp_golomb(&mut self, value: u64) {
        let code = value + 1;
        let len = 64 - code.leading_zeros();
        let mut zeros = len - 1;
        while zeros > 0 {
            let n = zeros.min(32);
            self.write_bits(0, n);
            zeros -= n;
        }
        self.write_bits_u64(code, len);
    }

    /// 对齐到字节边界 (用 0 填充)
    fn align_to_byte(&mut self) {
        if self.bit_count > 0 {
            let pad = 8 - self.bit_count;
            self.current_byte <<= pad;
            self.data.push(self.current_byte);
            self.current_byte = 0;
            self.bit_count = 0;
        }
    }

    /// 完成写入, 返回字节数据
    ///
    /// 如果当前不在字节边界, 自动用 0 填充.
    pub fn finish(mut self) -> Vec<u8> {
        self.align_to_byte();
        self.data
    }

    /// 对齐并取出已写入的全部字节, 写入器重置为空
    ///
    /// 用于逐帧输出: 每帧结束时取出该帧的字节数据.
    pub fn take_bytes(&mut self) -> Vec<u8> {
        self.align_to_byte();
        std::mem::take(&mut self.data)
    }
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}
