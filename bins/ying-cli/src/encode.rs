//! `encode` 子命令.

use std::fs::File;
use std::io::{BufWriter, Write};

use tracing::info;
use ying_codec::{Encoder, FrameKind, FrameStats, YuvReader};
use ying_core::YingResult;

use crate::EncodeArgs;
use crate::stream::write_frame;

/// 每帧一行: 序号, 类型, 比特数, 模式统计, PSNR
pub(crate) fn format_stats(stats: &FrameStats) -> String {
    let modes = match stats.kind {
        FrameKind::Intra => format!(
            "{:4} {:4} {:4} {:4}",
            stats.intra_modes[0], stats.intra_modes[1], stats.intra_modes[2], stats.intra_modes[3]
        ),
        FrameKind::Predicted => format!("{:4} {:4}", stats.partitioned, stats.whole),
    };
    format!(
        "#{:3} {} {:8} {} {:6.2}",
        stats.index,
        stats.kind.as_char(),
        stats.bits,
        modes,
        stats.psnr()
    )
}

pub(crate) fn run(args: &EncodeArgs) -> YingResult<Vec<FrameStats>> {
    let config = args.coding.config(&args.input, args.qp, args.interval);
    let mut encoder = Encoder::new(config.clone())?;
    let mut source = YuvReader::open(&args.input.input, config.width, config.height)?;

    eprintln!("输入: {}", args.input.input.display());
    eprintln!("尺寸: {}x{}", config.width, config.height);
    eprintln!("QP: {}, I 帧间隔: {}", config.qp, config.intra_period);
    eprintln!(
        "搜索窗口: {}x{}, 工具: {:?}",
        2 * config.search_window.half_width,
        2 * config.search_window.half_height,
        config.tools
    );

    let mut output = BufWriter::new(File::create(&args.output)?);
    let mut recon = match &args.recon {
        Some(path) => Some(BufWriter::new(File::create(path)?)),
        None => None,
    };
    let mut mv_csv = match &args.mv_csv {
        Some(path) => {
            let mut csv = BufWriter::new(File::create(path)?);
            writeln!(csv, "frame,mb,x,y")?;
            Some(csv)
        }
        None => None,
    };

    let stats = encoder.encode_all(&mut source, |encoder, frame| {
        write_frame(&mut output, &frame.payload)?;
        if let (Some(writer), Some(reference)) = (recon.as_mut(), encoder.reference()) {
            reference.write_yuv420(writer)?;
        }
        if let Some(csv) = mv_csv.as_mut() {
            for (mb, mv) in frame.stats.vectors.iter().enumerate() {
                writeln!(csv, "{},{},{},{}", frame.stats.index, mb, mv.x, mv.y)?;
            }
        }
        println!("{}", format_stats(&frame.stats));
        Ok(())
    })?;

    output.flush()?;
    if let Some(mut writer) = recon {
        writer.flush()?;
    }
    if let Some(mut csv) = mv_csv {
        csv.flush()?;
    }

    println!("\nTotal: {:8}", encoder.total_bits());
    info!(
        "编码完成: {} 帧, {} 比特 -> {}",
        stats.len(),
        encoder.total_bits(),
        args.output.display()
    );
    Ok(stats)
}
