//! 码流文件格式: 每帧一个 `u32` 大端长度前缀, 后接该帧的字节对齐码流.

use std::io::{ErrorKind, Read, Write};

use ying_core::{YingError, YingResult};

/// 写出一帧
pub(crate) fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> YingResult<()> {
    let len = u32::try_from(payload.len())
        .map_err(|_| YingError::InvalidArgument(format!("帧过大: {} 字节", payload.len())))?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    Ok(())
}

/// 读取一帧, 文件在帧边界处结束时返回 `None`
pub(crate) fn read_frame<R: Read>(reader: &mut R) -> YingResult<Option<Vec<u8>>> {
    let mut prefix = [0u8; 4];
    match reader.read_exact(&mut prefix) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(prefix) as usize;
    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .map_err(|_| YingError::InvalidData(format!("码流帧被截断, 需要 {} 字节", len)))?;
    Ok(Some(payload))
}
