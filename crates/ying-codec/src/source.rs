//! 帧源: 按顺序惰性地产生待编码的原始图像.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use log::debug;
use ying_core::{YingError, YingResult};

use crate::macroblock::Raw;
use crate::picture::Picture;

/// 帧源
pub trait FrameSource {
    /// 取出下一帧
    ///
    /// # 返回
    /// - `Ok(Some(picture))`: 下一帧
    /// - `Ok(None)`: 序列结束
    fn next_picture(&mut self) -> YingResult<Option<Picture<Raw>>>;
}

/// 平面 I420 (8 位, 4:2:0) 原始视频读取器
pub struct YuvReader<R: Read> {
    reader: R,
    width: u32,
    height: u32,
    frames_read: u64,
    buffer: Vec<u8>,
}

impl YuvReader<BufReader<File>> {
    /// 打开 I420 文件
    pub fn open(path: impl AsRef<Path>, width: u32, height: u32) -> YingResult<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        debug!("打开 YUV 文件: {} ({}x{})", path.display(), width, height);
        Self::new(BufReader::new(file), width, height)
    }
}

impl<R: Read> YuvReader<R> {
    /// 包装任意字节流
    pub fn new(reader: R, width: u32, height: u32) -> YingResult<Self> {
        if width == 0 || height == 0 || width % 16 != 0 || height % 16 != 0 {
            return Err(YingError::InvalidArgument(format!(
                "YUV 尺寸必须是 16 的非零倍数: {}x{}",
                width, height
            )));
        }
        Ok(Self {
            reader,
            width,
            height,
            frames_read: 0,
            buffer: vec![0; Self::frame_len(width, height)],
        })
    }

    /// 一帧的字节数
    pub fn frame_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 3 / 2
    }

    /// 已读取的帧数
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// 尽量填满缓冲区, 返回实际读取的字节数
    fn fill(&mut self) -> YingResult<usize> {
        let mut filled = 0;
        while filled < self.buffer.len() {
            match self.reader.read(&mut self.buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }
}

impl<R: Read> FrameSource for YuvReader<R> {
    fn next_picture(&mut self) -> YingResult<Option<Picture<Raw>>> {
        let filled = self.fill()?;
        if filled == 0 {
            return Ok(None);
        }
        if filled < self.buffer.len() {
            return Err(YingError::InvalidData(format!(
                "第 {} 帧数据不完整: {}/{} 字节",
                self.frames_read,
                filled,
                self.buffer.len()
            )));
        }

        let luma_len = self.width as usize * self.height as usize;
        let chroma_len = luma_len / 4;
        let (y, rest) = self.buffer.split_at(luma_len);
        let (u, v) = rest.split_at(chroma_len);
        let picture = Picture::from_yuv420(self.width, self.height, y, u, v)?;
        self.frames_read += 1;
        Ok(Some(picture))
    }
}

/// 内存帧源
#[derive(Debug, Default)]
pub struct MemorySource {
    pictures: VecDeque<Picture<Raw>>,
}

impl MemorySource {
    pub fn new(pictures: impl IntoIterator<Item = Picture<Raw>>) -> Self {
        Self {
            pictures: pictures.into_iter().collect(),
        }
    }

    /// 剩余帧数
    pub fn remaining(&self) -> usize {
        self.pictures.len()
    }
}

impl FrameSource for MemorySource {
    fn next_picture(&mut self) -> YingResult<Option<Picture<Raw>>> {
        Ok(self.pictures.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn frame_bytes(width: u32, height: u32, seed: u8) -> Vec<u8> {
        (0..YuvReader::<Cursor<Vec<u8>>>::frame_len(width, height))
            .map(|i| (i as u8).wrapping_add(seed))
            .collect()
    }

    #[test]
    fn test_reads_frames_until_end() {
        let mut data = frame_bytes(16, 16, 0);
        data.extend(frame_bytes(16, 16, 7));
        let mut reader = YuvReader::new(Cursor::new(data), 16, 16).expect("合法尺寸");

        let first = reader.next_picture().expect("读取").expect("第一帧");
        assert_eq!(first.macroblocks()[0].luma()[(0, 1)], 1);
        let second = reader.next_picture().expect("读取").expect("第二帧");
        assert_eq!(second.macroblocks()[0].luma()[(0, 0)], 7);
        // Cb 平面从第 256 字节开始
        assert_eq!(second.macroblocks()[0].planes().cb[(0, 0)], (256u32 + 7) as u8);
        assert!(reader.next_picture().expect("读取").is_none());
        assert_eq!(reader.frames_read(), 2);
    }

    #[test]
    fn test_truncated_frame_is_invalid_data() {
        let mut data = frame_bytes(16, 16, 0);
        data.truncate(100);
        let mut reader = YuvReader::new(Cursor::new(data), 16, 16).expect("合法尺寸");
        assert!(matches!(reader.next_picture(), Err(YingError::InvalidData(_))));
    }

    #[test]
    fn test_rejects_bad_dimensions() {
        assert!(YuvReader::new(Cursor::new(Vec::new()), 15, 16).is_err());
        assert!(YuvReader::new(Cursor::new(Vec::new()), 0, 0).is_err());
    }

    #[test]
    fn test_memory_source_is_ordered() {
        let a = Picture::from_fn(16, 16, |_, _| 1, |_, _, _| 0).expect("a");
        let b = Picture::from_fn(16, 16, |_, _| 2, |_, _, _| 0).expect("b");
        let mut source = MemorySource::new([a, b]);
        assert_eq!(source.remaining(), 2);
        let first = source.next_picture().expect("读取").expect("a");
        assert_eq!(first.macroblocks()[0].luma()[(0, 0)], 1);
        assert!(source.next_picture().expect("读取").is_some());
        assert!(source.next_picture().expect("读取").is_none());
    }
}
