//! 病灶中心定位.
//!
//! ```text
//! # 批处理: 每行一个 wmap 路径
//! find-epicenter [OPTIONS] <subjects.txt>
//!
//! # 单个被试
//! find-epicenter [OPTIONS] <wmap> <w_thr> <n_overlap> <FC_thr> [mask]
//! ```
//!
//! 查找表目录取自 `--tables`, `$EPICENTER_TABLE_DIR` 或 `$HOME/dataset/epicenter`.
//! 日志级别可通过 `RUST_LOG` 调整.

mod result;
mod runner;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use epi_berry::consts::{
    DEFAULT_FC_PERCENTILE, DEFAULT_MIN_OVERLAP, DEFAULT_TOP_K, DEFAULT_W_THRESHOLD,
};

/// 命令行参数.
#[derive(Parser, Debug)]
#[command(
    name = "find-epicenter",
    version,
    about = "Rank candidate epicenter parcels by Dice similarity"
)]
pub struct Cli {
    /// `<subjects.txt>`, or `<wmap> <w_thr> <n_overlap> <FC_thr> [mask]`
    #[arg(required = true, num_args = 1..=5)]
    inputs: Vec<String>,

    /// Report file to append to. Single-subject mode prints to stdout when omitted
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Directory holding parcels.bin and seedmaps.npz
    #[arg(short = 't', long = "tables")]
    tables: Option<PathBuf>,

    /// Gray-matter mask (default: $EPICENTER_MASK or <tables>/merged_ho_cereb_stn_comb.nii)
    #[arg(short = 'm', long = "mask", conflicts_with = "no_mask")]
    mask: Option<PathBuf>,

    /// Threshold the wmap without any mask
    #[arg(long = "no-mask")]
    no_mask: bool,

    /// wmap threshold in batch mode
    #[arg(long = "w-thr", default_value_t = DEFAULT_W_THRESHOLD)]
    w_thr: f64,

    /// Minimum parcel overlap (voxels) in batch mode
    #[arg(long = "n-overlap", default_value_t = DEFAULT_MIN_OVERLAP)]
    n_overlap: usize,

    /// Seed map threshold in batch mode
    #[arg(long = "fc-thr", default_value_t = DEFAULT_FC_PERCENTILE)]
    fc_thr: f64,

    /// Treat w_thr as a percentile of nonzero wmap values
    #[arg(long = "w-percentile")]
    w_percentile: bool,

    /// Treat FC_thr as an absolute cutoff instead of a percentile
    #[arg(long = "fc-absolute")]
    fc_absolute: bool,

    /// Keep values strictly above the wmap threshold
    #[arg(long = "exclusive")]
    exclusive: bool,

    /// Number of candidates to report
    #[arg(short = 'k', long = "top-k", default_value_t = DEFAULT_TOP_K)]
    top_k: usize,

    /// Append z-scored coefficients to each report line
    #[arg(long = "z-scores")]
    z_scores: bool,

    /// Worker threads (default: available parallelism)
    #[arg(short = 'j', long = "threads")]
    threads: Option<usize>,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // --help 与 --version 走 stdout
            return if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    if let Err(e) = simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .env()
        .init()
    {
        eprintln!("logger: {e}");
    }

    let res = runner::run(&cli);
    res.analyze();
    res.exit_code()
}
