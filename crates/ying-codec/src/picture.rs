//! 图像 (宏块网格) 与重建缓冲区.
//!
//! 图像以光栅顺序保存全部宏块, 宽高都以宏块为单位.
//! 参考帧必须是 `Picture<Reconstructed>`: 运动补偿只能引用解码端同样能得到的像素.

use std::io::Write;

use ying_core::{Block, YingError, YingResult};

use crate::macroblock::{
    CHROMA_MB_SIZE, ChromaPlane, MB_SIZE, Macroblock, PipelineStage, Planes, Raw, Reconstructed,
};

/// 宏块网格
#[derive(Debug, Clone)]
pub struct Picture<S: PipelineStage> {
    width_mbs: u32,
    height_mbs: u32,
    macroblocks: Vec<Macroblock<S>>,
}

impl<S: PipelineStage> Picture<S> {
    /// 宽度 (宏块数)
    pub fn width_mbs(&self) -> u32 {
        self.width_mbs
    }

    /// 高度 (宏块数)
    pub fn height_mbs(&self) -> u32 {
        self.height_mbs
    }

    /// 亮度宽度 (像素)
    pub fn width(&self) -> u32 {
        self.width_mbs * MB_SIZE as u32
    }

    /// 亮度高度 (像素)
    pub fn height(&self) -> u32 {
        self.height_mbs * MB_SIZE as u32
    }

    /// 宏块总数
    pub fn len(&self) -> usize {
        self.macroblocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macroblocks.is_empty()
    }

    /// 按光栅索引获取宏块
    pub fn macroblock(&self, index: usize) -> Option<&Macroblock<S>> {
        self.macroblocks.get(index)
    }

    /// 全部宏块 (光栅顺序)
    pub fn macroblocks(&self) -> &[Macroblock<S>] {
        &self.macroblocks
    }

    /// 拆成宏块序列 (光栅顺序)
    pub fn into_macroblocks(self) -> Vec<Macroblock<S>> {
        self.macroblocks
    }
}

impl<S: PipelineStage<Sample = u8>> Picture<S> {
    /// 读取亮度采样, 坐标逐分量裁剪到图像范围内
    pub fn luma_clamped(&self, x: i32, y: i32) -> u8 {
        let x = x.clamp(0, self.width() as i32 - 1) as usize;
        let y = y.clamp(0, self.height() as i32 - 1) as usize;
        let mb = (y / MB_SIZE) * self.width_mbs as usize + x / MB_SIZE;
        self.macroblocks[mb].planes().luma[(y % MB_SIZE, x % MB_SIZE)]
    }

    /// 读取色度采样 (色度平面坐标, 调用方保证在范围内)
    pub fn chroma(&self, plane: ChromaPlane, cx: usize, cy: usize) -> u8 {
        let mb = (cy / CHROMA_MB_SIZE) * self.width_mbs as usize + cx / CHROMA_MB_SIZE;
        self.macroblocks[mb].planes().chroma(plane)[(cy % CHROMA_MB_SIZE, cx % CHROMA_MB_SIZE)]
    }

    /// 展开为 I420 三个平面 (Y, U, V)
    pub fn to_yuv420(&self) -> [Vec<u8>; 3] {
        let width = self.width() as usize;
        let height = self.height() as usize;
        let chroma_width = width / 2;
        let mut y = vec![0u8; width * height];
        let mut u = vec![0u8; width * height / 4];
        let mut v = vec![0u8; width * height / 4];

        for mb in &self.macroblocks {
            let (mb_x, mb_y) = mb.position();
            let (px, py) = (mb_x as usize * MB_SIZE, mb_y as usize * MB_SIZE);
            let planes = mb.planes();
            for (row, samples) in planes.luma.rows().iter().enumerate() {
                let start = (py + row) * width + px;
                y[start..start + MB_SIZE].copy_from_slice(samples);
            }
            let (cx, cy) = (px / 2, py / 2);
            for row in 0..CHROMA_MB_SIZE {
                let start = (cy + row) * chroma_width + cx;
                u[start..start + CHROMA_MB_SIZE].copy_from_slice(&planes.cb.rows()[row]);
                v[start..start + CHROMA_MB_SIZE].copy_from_slice(&planes.cr.rows()[row]);
            }
        }
        [y, u, v]
    }

    /// 以 I420 格式写出一帧
    pub fn write_yuv420<W: Write>(&self, writer: &mut W) -> YingResult<()> {
        for plane in self.to_yuv420() {
            writer.write_all(&plane)?;
        }
        Ok(())
    }
}

impl Picture<Raw> {
    /// 由 I420 平面数据构造原始图像
    ///
    /// 宽高必须是 16 的非零倍数, 各平面长度必须与尺寸一致.
    pub fn from_yuv420(width: u32, height: u32, y: &[u8], u: &[u8], v: &[u8]) -> YingResult<Self> {
        check_dimensions(width, height)?;
        let (w, h) = (width as usize, height as usize);
        if y.len() != w * h || u.len() != w * h / 4 || v.len() != w * h / 4 {
            return Err(YingError::InvalidData(format!(
                "I420 平面长度不匹配: {}x{} 需要 {}/{}/{}, 实际 {}/{}/{}",
                width,
                height,
                w * h,
                w * h / 4,
                w * h / 4,
                y.len(),
                u.len(),
                v.len()
            )));
        }

        let width_mbs = width / MB_SIZE as u32;
        let height_mbs = height / MB_SIZE as u32;
        let chroma_width = w / 2;
        let mut macroblocks = Vec::with_capacity(width_mbs as usize * height_mbs as usize);
        for mb_y in 0..height_mbs {
            for mb_x in 0..width_mbs {
                let (px, py) = (mb_x as usize * MB_SIZE, mb_y as usize * MB_SIZE);
                let (cx, cy) = (px / 2, py / 2);
                let planes = Planes {
                    luma: Block::from_fn(|row, col| y[(py + row) * w + px + col]),
                    cb: Block::from_fn(|row, col| u[(cy + row) * chroma_width + cx + col]),
                    cr: Block::from_fn(|row, col| v[(cy + row) * chroma_width + cx + col]),
                };
                let index = macroblocks.len();
                macroblocks.push(Macroblock::new(index, mb_x, mb_y, planes));
            }
        }

        Ok(Self {
            width_mbs,
            height_mbs,
            macroblocks,
        })
    }

    /// 由逐像素函数构造原始图像 (测试与合成序列使用)
    ///
    /// `luma(x, y)` 给出亮度, `chroma(plane, cx, cy)` 给出色度平面坐标处的色度.
    pub fn from_fn(
        width: u32,
        height: u32,
        mut luma: impl FnMut(u32, u32) -> u8,
        mut chroma: impl FnMut(ChromaPlane, u32, u32) -> u8,
    ) -> YingResult<Self> {
        check_dimensions(width, height)?;
        let (cw, ch) = (width / 2, height / 2);
        let y: Vec<u8> = (0..height)
            .flat_map(|py| (0..width).map(move |px| (px, py)))
            .map(|(px, py)| luma(px, py))
            .collect();
        let mut u = Vec::with_capacity(cw as usize * ch as usize);
        let mut v = Vec::with_capacity(cw as usize * ch as usize);
        for cy in 0..ch {
            for cx in 0..cw {
                u.push(chroma(ChromaPlane::Cb, cx, cy));
                v.push(chroma(ChromaPlane::Cr, cx, cy));
            }
        }
        Self::from_yuv420(width, height, &y, &u, &v)
    }
}

fn check_dimensions(width: u32, height: u32) -> YingResult<()> {
    if width == 0 || height == 0 || width % MB_SIZE as u32 != 0 || height % MB_SIZE as u32 != 0 {
        return Err(YingError::InvalidArgument(format!(
            "图像尺寸必须是 16 的非零倍数: {}x{}",
            width, height
        )));
    }
    Ok(())
}

/// 重建缓冲区
///
/// 按光栅顺序收集一帧中已重建的宏块. 帧内预测从这里读取左侧与上方邻居,
/// 帧结束后整体转换为新的参考帧.
#[derive(Debug)]
pub struct ReconstructionBuffer {
    width_mbs: u32,
    height_mbs: u32,
    macroblocks: Vec<Macroblock<Reconstructed>>,
}

impl ReconstructionBuffer {
    /// 创建空缓冲区
    pub fn new(width_mbs: u32, height_mbs: u32) -> Self {
        Self {
            width_mbs,
            height_mbs,
            macroblocks: Vec::with_capacity(width_mbs as usize * height_mbs as usize),
        }
    }

    /// 宽度 (宏块数)
    pub fn width_mbs(&self) -> u32 {
        self.width_mbs
    }

    /// 已完成的宏块数
    pub fn completed(&self) -> usize {
        self.macroblocks.len()
    }

    /// 一帧的宏块总数
    pub fn capacity(&self) -> usize {
        (self.width_mbs * self.height_mbs) as usize
    }

    /// 获取已重建的宏块
    pub fn get(&self, index: usize) -> Option<&Macroblock<Reconstructed>> {
        self.macroblocks.get(index)
    }

    /// 左侧邻居 (同一宏块行)
    pub fn left_of(&self, index: usize) -> Option<&Macroblock<Reconstructed>> {
        if index % self.width_mbs as usize == 0 {
            return None;
        }
        self.get(index - 1)
    }

    /// 上方邻居
    pub fn above(&self, index: usize) -> Option<&Macroblock<Reconstructed>> {
        index
            .checked_sub(self.width_mbs as usize)
            .and_then(|above| self.get(above))
    }

    /// 追加下一个重建宏块, 必须严格按光栅顺序
    pub fn push(&mut self, mb: Macroblock<Reconstructed>) -> YingResult<()> {
        let expected = self.macroblocks.len();
        if mb.index() != expected || expected >= self.capacity() {
            return Err(YingError::Internal(format!(
                "重建顺序错误: 期望宏块 {}, 实际 {} (共 {})",
                expected,
                mb.index(),
                self.capacity()
            )));
        }
        self.macroblocks.push(mb);
        Ok(())
    }

    /// 完成整帧, 只有全部宏块都已重建时才成功
    pub fn finish(self) -> YingResult<Picture<Reconstructed>> {
        if self.macroblocks.len() != self.capacity() {
            return Err(YingError::Internal(format!(
                "重建帧不完整: {}/{} 个宏块",
                self.macroblocks.len(),
                self.capacity()
            )));
        }
        Ok(Picture {
            width_mbs: self.width_mbs,
            height_mbs: self.height_mbs,
            macroblocks: self.macroblocks,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::macroblock::Prediction;

    /// 将原始图像原样转为重建图像 (仅测试使用)
    pub(crate) fn as_reconstructed(picture: &Picture<Raw>) -> Picture<Reconstructed> {
        let mut buffer = ReconstructionBuffer::new(picture.width_mbs(), picture.height_mbs());
        for mb in picture.macroblocks() {
            let (mb_x, mb_y) = mb.position();
            buffer
                .push(Macroblock::assemble(
                    mb.index(),
                    mb_x,
                    mb_y,
                    0,
                    Prediction::None,
                    *mb.planes(),
                ))
                .expect("按顺序追加");
        }
        buffer.finish().expect("完整帧")
    }

    fn gradient(width: u32, height: u32) -> Picture<Raw> {
        Picture::from_fn(
            width,
            height,
            |x, y| ((x * 3 + y * 5) % 256) as u8,
            |plane, cx, cy| match plane {
                ChromaPlane::Cb => (cx * 7 % 256) as u8,
                ChromaPlane::Cr => (cy * 11 % 256) as u8,
            },
        )
        .expect("合法尺寸")
    }

    #[test]
    fn test_yuv420_layout_round_trip() {
        let picture = gradient(48, 32);
        assert_eq!(picture.width_mbs(), 3);
        assert_eq!(picture.height_mbs(), 2);
        assert_eq!(picture.len(), 6);

        let [y, u, v] = picture.to_yuv420();
        assert_eq!(y.len(), 48 * 32);
        assert_eq!(u.len(), 24 * 16);
        assert_eq!(y[17 * 48 + 33], ((33 * 3 + 17 * 5) % 256) as u8);
        assert_eq!(u[9 * 24 + 20], (20 * 7 % 256) as u8);
        assert_eq!(v[9 * 24 + 20], (9 * 11 % 256) as u8);

        let rebuilt = Picture::from_yuv420(48, 32, &y, &u, &v).expect("重新构造");
        for (a, b) in rebuilt.macroblocks().iter().zip(picture.macroblocks()) {
            assert_eq!(a.planes(), b.planes());
            assert_eq!(a.position(), b.position());
        }
    }

    #[test]
    fn test_rejects_bad_dimensions_and_lengths() {
        assert!(Picture::from_yuv420(24, 16, &[0; 384], &[0; 96], &[0; 96]).is_err());
        assert!(Picture::from_yuv420(16, 16, &[0; 255], &[0; 64], &[0; 64]).is_err());
        assert!(Picture::from_yuv420(16, 16, &[0; 256], &[0; 64], &[0; 64]).is_ok());
    }

    #[test]
    fn test_clamped_luma_access() {
        let recon = as_reconstructed(&gradient(32, 32));
        assert_eq!(recon.luma_clamped(-5, -9), recon.luma_clamped(0, 0));
        assert_eq!(recon.luma_clamped(100, 3), recon.luma_clamped(31, 3));
        assert_eq!(recon.luma_clamped(20, 18), ((20 * 3 + 18 * 5) % 256) as u8);
        assert_eq!(recon.chroma(ChromaPlane::Cb, 12, 3), (12 * 7 % 256) as u8);
    }

    #[test]
    fn test_buffer_is_all_or_nothing() {
        let picture = gradient(32, 16);
        let mut buffer = ReconstructionBuffer::new(2, 1);
        let first = &picture.macroblocks()[0];
        buffer
            .push(Macroblock::assemble(0, 0, 0, 0, Prediction::None, *first.planes()))
            .expect("第一个宏块");
        assert!(buffer.left_of(0).is_none());
        assert!(buffer.above(1).is_none());
        assert!(buffer.left_of(1).is_some());

        let out_of_order = Macroblock::assemble(5, 1, 0, 0, Prediction::None, *first.planes());
        assert!(matches!(buffer.push(out_of_order), Err(YingError::Internal(_))));
        assert!(matches!(buffer.finish(), Err(YingError::Internal(_))));
    }

    #[test]
    fn test_write_yuv420_size() {
        let recon = as_reconstructed(&gradient(16, 32));
        let mut out = Vec::new();
        recon.write_yuv420(&mut out).expect("写入内存");
        assert_eq!(out.len(), 16 * 32 * 3 / 2);
    }
}
