//! `decode` 子命令.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};

use tracing::info;
use ying_codec::Decoder;
use ying_core::YingResult;

use crate::DecodeArgs;
use crate::stream::read_frame;

/// 解码整个码流文件, 返回解码的帧数
pub(crate) fn run(args: &DecodeArgs) -> YingResult<u64> {
    let mut input = BufReader::new(File::open(&args.input)?);
    let mut output = BufWriter::new(File::create(&args.output)?);
    let mut decoder = Decoder::new();

    while let Some(payload) = read_frame(&mut input)? {
        let picture = decoder.decode_frame(&payload)?;
        picture.write_yuv420(&mut output)?;
    }
    output.flush()?;

    info!(
        "解码完成: {} 帧 -> {}",
        decoder.frames_decoded(),
        args.output.display()
    );
    Ok(decoder.frames_decoded())
}
