//! 离线构建查找表.
//!
//! 读取 `<parcels>/vol_{id}.nii` 与 `<seed-maps>/1ST_vol_{id}/spmT_0001.nii` (`id = 1..=N`),
//! 写出 `<out>/parcels.bin` 与 `<out>/seedmaps.npz`.

use std::borrow::Cow;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use epi_berry::consts::atlas::{parcel_filename, seed_map_filename, BRAINNETOME_SUIT_LEN};
use epi_berry::consts::{PARCEL_TABLE_FILENAME, SEED_MAP_ARCHIVE_FILENAME};
use epi_berry::data::Grid;
use epi_berry::dataset::generic::volume_loader;
use epi_berry::dataset::{write_npz_from, ParcelTable};
use epi_berry::error::{EpiError, EpiResult};
use utils::loader;

/// 命令行参数.
#[derive(Parser, Debug)]
#[command(name = "build-tables", version, about = "Build parcel and seed-map lookup tables")]
struct Args {
    /// Directory holding vol_{id}.nii parcel images
    #[arg(long = "parcels")]
    parcels: PathBuf,

    /// Directory holding 1ST_vol_{id}/spmT_0001.nii seed maps
    #[arg(long = "seed-maps")]
    seed_maps: PathBuf,

    /// Number of parcels; ids run from 1 to N
    #[arg(short = 'n', long = "count", default_value_t = BRAINNETOME_SUIT_LEN)]
    count: u32,

    /// Output directory (default: $EPICENTER_TABLE_DIR or $HOME/dataset/epicenter)
    #[arg(short = 'o', long = "out")]
    out: Option<PathBuf>,
}

fn build(args: &Args) -> EpiResult<()> {
    let out = args
        .out
        .clone()
        .or_else(loader::table_dir_from_env_or_home)
        .ok_or_else(|| {
            EpiError::InvalidParameter("no output directory: pass --out".to_string())
        })?;
    std::fs::create_dir_all(&out)?;

    let parcels = ParcelTable::from_volumes(volume_loader(
        1..=args.count,
        &args.parcels,
        parcel_filename,
    ))?;
    log::info!("{} parcels on a {:?} grid", parcels.len(), parcels.shape());
    parcels.save(out.join(PARCEL_TABLE_FILENAME))?;

    let shape = parcels.shape();
    let maps = volume_loader(1..=args.count, &args.seed_maps, seed_map_filename).map(
        |(id, map)| {
            let map = map.and_then(|m| {
                if m.shape() == shape {
                    Ok(m)
                } else {
                    Err(EpiError::ShapeMismatch(shape, m.shape()))
                }
            });
            (id, map.map(Cow::Owned))
        },
    );
    let n = write_npz_from(out.join(SEED_MAP_ARCHIVE_FILENAME), maps)?;
    log::info!("{n} seed maps written to {}", out.display());
    Ok(())
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(a) => a,
        Err(e) => {
            let _ = e.print();
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

    utils::sep();
    let res = build(&args);
    utils::sep();
    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(1)
        }
    }
}
