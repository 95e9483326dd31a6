//! 程序运行函数.

use crate::result::RunResult;
use crate::Cli;
use epi_berry::batch::{self, ReportWriter};
use epi_berry::data::{Bound, NiftiLoader, ThresholdRule, Volume};
use epi_berry::dataset::{LookupTables, NpzSeedMaps};
use epi_berry::epicenter::{EpicenterFinder, EpicenterParams};
use epi_berry::error::{AtStage, EpiError, EpiResult, Stage};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use utils::loader;

/// 批处理未指定输出文件时的报告文件名.
const DEFAULT_REPORT: &str = "epicenters.txt";

/// 实际运行.
pub fn run(cli: &Cli) -> RunResult {
    match cli.inputs.as_slice() {
        [subjects] => run_batch(cli, Path::new(subjects)),
        [wmap, w_thr, n_overlap, fc_thr, rest @ ..] if rest.len() <= 1 => {
            let parsed = parse_single(w_thr, n_overlap, fc_thr);
            match parsed {
                Ok((w, n, fc)) => run_single(cli, Path::new(wmap), w, n, fc, rest.first()),
                Err(e) => RunResult::Setup(e),
            }
        }
        other => RunResult::Setup(EpiError::InvalidParameter(format!(
            "expected 1 or 4-5 positional arguments, found {}",
            other.len()
        ))),
    }
}

fn parse_single(w_thr: &str, n_overlap: &str, fc_thr: &str) -> EpiResult<(f64, usize, f64)> {
    fn bad(name: &str, v: &str) -> EpiError {
        EpiError::InvalidParameter(format!("{name} `{v}` is not a number"))
    }
    Ok((
        w_thr.parse().map_err(|_| bad("w_thr", w_thr))?,
        n_overlap.parse().map_err(|_| bad("n_overlap", n_overlap))?,
        fc_thr.parse().map_err(|_| bad("FC_thr", fc_thr))?,
    ))
}

fn params(cli: &Cli, w_thr: f64, n_overlap: usize, fc_thr: f64) -> EpicenterParams {
    EpicenterParams {
        w_threshold: if cli.w_percentile {
            ThresholdRule::Percentile(w_thr)
        } else {
            ThresholdRule::Absolute(w_thr)
        },
        bound: if cli.exclusive {
            Bound::Exclusive
        } else {
            Bound::Inclusive
        },
        min_overlap: n_overlap,
        seed_threshold: if cli.fc_absolute {
            ThresholdRule::Absolute(fc_thr)
        } else {
            ThresholdRule::Percentile(fc_thr)
        },
        top_k: cli.top_k,
        z_scores: cli.z_scores,
    }
}

fn workers(cli: &Cli) -> NonZeroUsize {
    cli.threads
        .and_then(NonZeroUsize::new)
        .unwrap_or_else(utils::workers)
}

/// 进程级只读状态: 查找表与掩膜.
struct Setup {
    tables: LookupTables<NpzSeedMaps>,
    mask: Option<Volume>,
}

fn setup(cli: &Cli, mask_arg: Option<&String>) -> EpiResult<Setup> {
    let dir = match cli.tables.clone().or_else(loader::table_dir_from_env_or_home) {
        Some(d) => d,
        None => {
            return Err(EpiError::InvalidParameter(
                "no table directory: pass --tables or set $EPICENTER_TABLE_DIR".to_string(),
            ))
        }
    };
    let tables = loader::lookup_tables(&dir, workers(cli))?;

    let mask = if cli.no_mask {
        None
    } else {
        let path = mask_arg
            .map(PathBuf::from)
            .or_else(|| cli.mask.clone())
            .unwrap_or_else(|| loader::mask_path_from_env_or(&dir));
        Some(loader::load_mask(path)?)
    };
    Ok(Setup { tables, mask })
}

fn finder<'a>(
    s: &'a Setup,
    params: EpicenterParams,
) -> EpiResult<EpicenterFinder<'a, NpzSeedMaps, NiftiLoader>> {
    let f = EpicenterFinder::new(&s.tables.parcels, &s.tables.seed_maps, NiftiLoader, params)?;
    match s.mask.as_ref() {
        Some(m) => f.with_mask(m),
        None => Ok(f),
    }
}

fn run_batch(cli: &Cli, subjects: &Path) -> RunResult {
    let go = || -> EpiResult<_> {
        let list = batch::read_subject_list(subjects)?;
        let s = setup(cli, None)?;
        let f = finder(&s, params(cli, cli.w_thr, cli.n_overlap, cli.fc_thr))?;
        let out = cli
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_REPORT));
        let writer = ReportWriter::append_to_file(&out)?;
        log::info!("appending report lines to {}", out.display());
        batch::run_all(&f, &list, &writer, workers(cli))
    };
    match go() {
        Ok(summary) => RunResult::Batch(summary),
        Err(e) => RunResult::Setup(e),
    }
}

fn run_single(
    cli: &Cli,
    wmap: &Path,
    w_thr: f64,
    n_overlap: usize,
    fc_thr: f64,
    mask: Option<&String>,
) -> RunResult {
    let prepared = setup(cli, mask).and_then(|s| {
        let writer = cli
            .output
            .as_ref()
            .map(ReportWriter::append_to_file)
            .transpose()?;
        Ok((s, writer))
    });
    let (s, writer) = match prepared {
        Ok(p) => p,
        Err(e) => return RunResult::Setup(e),
    };
    let f = match finder(&s, params(cli, w_thr, n_overlap, fc_thr)) {
        Ok(f) => f,
        Err(e) => return RunResult::Setup(e),
    };

    let res = f.run_one(wmap).and_then(|line| match writer.as_ref() {
        Some(w) => w.append(&line).at(Stage::Report).map(|_| (line, true)),
        None => Ok((line, false)),
    });
    match res {
        Ok((line, written)) => RunResult::Single { line, written },
        Err(e) => RunResult::Subject(wmap.to_owned(), e),
    }
}
