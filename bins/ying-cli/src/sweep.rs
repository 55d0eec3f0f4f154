//! `sweep` 子命令: 在 I 帧间隔 × qp 网格上编码同一序列.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};

use serde::Serialize;
use tracing::info;
use ying_codec::{Encoder, FrameSource, MemorySource, Picture, YuvReader};
use ying_codec::macroblock::Raw;
use ying_core::{YingError, YingResult};

use crate::SweepArgs;

/// 网格上的一个采样点
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct SweepPoint {
    pub interval: u32,
    pub qp: i32,
    pub frames: usize,
    pub bits: u64,
    /// 整个序列的亮度 PSNR (dB); 无损时为 null
    pub psnr: Option<f64>,
}

/// 展开参数网格 (间隔在外层, qp 在内层)
pub(crate) fn grid(args: &SweepArgs) -> YingResult<Vec<(u32, i32)>> {
    if args.qp_step <= 0 {
        return Err(YingError::InvalidArgument(format!(
            "qp 步进必须为正: {}",
            args.qp_step
        )));
    }
    if args.interval_min == 0 || args.interval_min > args.interval_max {
        return Err(YingError::InvalidArgument(format!(
            "I 帧间隔范围无效: {}..={}",
            args.interval_min, args.interval_max
        )));
    }
    let qps: Vec<i32> = (args.qp_min..=args.qp_max)
        .step_by(args.qp_step as usize)
        .collect();
    Ok((args.interval_min..=args.interval_max)
        .flat_map(|interval| qps.iter().map(move |&qp| (interval, qp)))
        .collect())
}

/// 由总 SSE 与采样数计算 PSNR
fn sequence_psnr(sse: u64, samples: u64) -> Option<f64> {
    (sse > 0).then(|| 10.0 * (255.0 * 255.0 * samples as f64 / sse as f64).log10())
}

pub(crate) fn run(args: &SweepArgs) -> YingResult<Vec<SweepPoint>> {
    let points = grid(args)?;
    // 先校验整个网格, 任何非法组合都不会开始编码
    for &(interval, qp) in &points {
        args.coding.config(&args.input, qp, interval).validate()?;
    }

    let mut reader = YuvReader::open(&args.input.input, args.input.width, args.input.height)?;
    let mut pictures: Vec<Picture<Raw>> = Vec::new();
    while let Some(picture) = reader.next_picture()? {
        pictures.push(picture);
    }
    eprintln!(
        "输入: {} ({} 帧), 共 {} 组参数",
        args.input.input.display(),
        pictures.len(),
        points.len()
    );

    let mut results = BufWriter::new(
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&args.results)?,
    );

    let mut all = Vec::with_capacity(points.len());
    for (interval, qp) in points {
        let mut encoder = Encoder::new(args.coding.config(&args.input, qp, interval))?;
        let mut source = MemorySource::new(pictures.iter().cloned());
        let stats = encoder.encode_all(&mut source, |_, _| Ok(()))?;

        let sse: u64 = stats.iter().map(|s| s.luma_sse).sum();
        let samples: u64 = stats.iter().map(|s| s.luma_samples).sum();
        let point = SweepPoint {
            interval,
            qp,
            frames: stats.len(),
            bits: encoder.total_bits(),
            psnr: sequence_psnr(sse, samples),
        };
        let psnr = point.psnr.map_or_else(|| "inf".to_string(), |p| format!("{:.3}", p));
        writeln!(results, "{}, {}, {}, {}", interval, qp, point.bits, psnr)?;
        info!("interval={} qp={} bits={} psnr={}", interval, qp, point.bits, psnr);
        all.push(point);
    }
    results.flush()?;

    if let Some(path) = &args.json {
        let file = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(file, &all)
            .map_err(|e| YingError::Internal(format!("写出 JSON 失败: {e}")))?;
    }
    Ok(all)
}
