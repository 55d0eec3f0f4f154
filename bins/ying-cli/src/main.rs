//! ying-cli - Ying 视频编码命令行工具
//!
//! 子命令:
//! - `encode`: 编码一个 I420 原始视频文件, 可选输出重建帧与运动向量 CSV
//! - `decode`: 解码 `encode` 产生的码流文件, 输出 I420 重建帧
//! - `sweep`: 在 I 帧间隔 × qp 网格上反复编码同一输入, 记录码率与 PSNR

mod decode;
mod encode;
mod logging;
mod stream;
mod sweep;

use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};
use ying_codec::config::{
    CodingTools, DEFAULT_INTRA_PERIOD, DEFAULT_PARTITION_COST, DEFAULT_QP, DEFAULT_SEARCH_RANGE,
    EncoderConfig, SearchWindow,
};

#[derive(Parser, Debug)]
#[command(name = "ying-cli", version, about = "基于宏块的混合视频编码器")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// 日志级别 (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 编码 I420 原始视频
    Encode(EncodeArgs),
    /// 解码码流文件
    Decode(DecodeArgs),
    /// 参数扫描 (I 帧间隔 × qp)
    Sweep(SweepArgs),
}

/// 输入文件与尺寸
#[derive(Args, Debug, Clone)]
struct InputArgs {
    /// 输入 I420 文件路径
    #[arg(short, long)]
    input: PathBuf,

    /// 图像宽度 (像素, 16 的倍数)
    #[arg(long)]
    width: u32,

    /// 图像高度 (像素, 16 的倍数)
    #[arg(long)]
    height: u32,
}

/// 编码工具参数 (encode 与 sweep 共用)
#[derive(Args, Debug, Clone)]
struct CodingArgs {
    /// 搜索窗口水平半宽
    #[arg(long, default_value_t = DEFAULT_SEARCH_RANGE)]
    search_width: u32,

    /// 搜索窗口垂直半宽
    #[arg(long, default_value_t = DEFAULT_SEARCH_RANGE)]
    search_height: u32,

    /// 四分区的信令开销 (SSE 单位)
    #[arg(long, default_value_t = DEFAULT_PARTITION_COST)]
    partition_cost: u64,

    /// 关闭帧内预测
    #[arg(long)]
    no_intra: bool,

    /// 关闭运动补偿
    #[arg(long)]
    no_motion: bool,

    /// 关闭 DCT 变换
    #[arg(long)]
    no_transform: bool,

    /// 关闭量化
    #[arg(long)]
    no_quantize: bool,
}

impl CodingArgs {
    fn tools(&self) -> CodingTools {
        let mut tools = CodingTools::all();
        tools.set(CodingTools::INTRA, !self.no_intra);
        tools.set(CodingTools::MOTION, !self.no_motion);
        tools.set(CodingTools::TRANSFORM, !self.no_transform);
        tools.set(CodingTools::QUANTIZE, !self.no_quantize);
        tools
    }

    fn config(&self, input: &InputArgs, qp: i32, intra_period: u32) -> EncoderConfig {
        EncoderConfig {
            qp,
            intra_period,
            search_window: SearchWindow {
                half_width: self.search_width,
                half_height: self.search_height,
            },
            tools: self.tools(),
            partition_cost: self.partition_cost,
            ..EncoderConfig::new(input.width, input.height)
        }
    }
}

#[derive(Args, Debug)]
struct EncodeArgs {
    #[command(flatten)]
    input: InputArgs,

    /// 输出码流文件路径
    #[arg(short, long)]
    output: PathBuf,

    /// 量化参数 (2..=52)
    #[arg(long, default_value_t = DEFAULT_QP)]
    qp: i32,

    /// I 帧间隔
    #[arg(long, default_value_t = DEFAULT_INTRA_PERIOD)]
    interval: u32,

    /// 输出重建帧 (I420) 到文件
    #[arg(long)]
    recon: Option<PathBuf>,

    /// 输出 P 帧运动向量 CSV (frame,mb,x,y)
    #[arg(long)]
    mv_csv: Option<PathBuf>,

    #[command(flatten)]
    coding: CodingArgs,
}

#[derive(Args, Debug)]
struct DecodeArgs {
    /// 输入码流文件路径
    #[arg(short, long)]
    input: PathBuf,

    /// 输出 I420 文件路径
    #[arg(short, long)]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct SweepArgs {
    #[command(flatten)]
    input: InputArgs,

    /// 最小 I 帧间隔
    #[arg(long, default_value_t = 1)]
    interval_min: u32,

    /// 最大 I 帧间隔 (含)
    #[arg(long, default_value_t = 9)]
    interval_max: u32,

    /// 最小 qp
    #[arg(long, default_value_t = 2)]
    qp_min: i32,

    /// 最大 qp (含)
    #[arg(long, default_value_t = 50)]
    qp_max: i32,

    /// qp 步进
    #[arg(long, default_value_t = 2)]
    qp_step: i32,

    /// 结果 CSV (追加写入: interval, qp, bits, psnr)
    #[arg(long, default_value = "results.csv")]
    results: PathBuf,

    /// 同时输出 JSON 结果
    #[arg(long)]
    json: Option<PathBuf>,

    #[command(flatten)]
    coding: CodingArgs,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = logging::init("ying-cli", cli.verbose) {
        eprintln!("警告: {e}");
    }

    let result = match &cli.command {
        Command::Encode(args) => encode::run(args).map(|_| ()),
        Command::Decode(args) => decode::run(args).map(|_| ()),
        Command::Sweep(args) => sweep::run(args).map(|_| ()),
    };

    if let Err(e) = result {
        eprintln!("错误: {e}");
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_encode() {
        let cli = Cli::try_parse_from([
            "ying-cli", "encode", "-i", "in.yuv", "--width", "352", "--height", "288", "-o",
            "out.ying", "--qp", "20", "--no-motion", "-vv",
        ])
        .expect("解析参数");
        assert_eq!(cli.verbose, 2);
        let Command::Encode(args) = cli.command else {
            panic!("应为 encode 子命令");
        };
        let config = args.coding.config(&args.input, args.qp, args.interval);
        assert_eq!(config.qp, 20);
        assert_eq!(config.intra_period, DEFAULT_INTRA_PERIOD);
        assert_eq!(config.width_mbs(), 22);
        assert!(!config.tools.contains(CodingTools::MOTION));
        assert!(config.tools.contains(CodingTools::INTRA));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cli_parses_sweep_defaults() {
        let cli = Cli::try_parse_from([
            "ying-cli", "sweep", "-i", "in.yuv", "--width", "32", "--height", "32",
        ])
        .expect("解析参数");
        let Command::Sweep(args) = cli.command else {
            panic!("应为 sweep 子命令");
        };
        assert_eq!((args.interval_min, args.interval_max), (1, 9));
        assert_eq!((args.qp_min, args.qp_max, args.qp_step), (2, 50, 2));
        assert_eq!(args.coding.tools(), CodingTools::all());
    }
}
