//! 对 `epi-berry::dataset` 的更一层封装. 提供更直接的查找表与掩膜加载器.

use epi_berry::consts::DEFAULT_MASK_FILENAME;
use epi_berry::dataset::{LookupTables, NpzSeedMaps};
use epi_berry::error::EpiResult;
use epi_berry::Volume;
use std::env;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

/// 获取预处理查找表目录.
///
/// 1. 若环境变量 `$EPICENTER_TABLE_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/epicenter`. 无法确定用户主目录时返回 `None`.
pub fn table_dir_from_env_or_home() -> Option<PathBuf> {
    match env::var_os("EPICENTER_TABLE_DIR") {
        Some(d) if !d.is_empty() => Some(PathBuf::from(d)),
        _ => epi_berry::dataset::home_dataset_dir_with(["epicenter"]),
    }
}

/// 获取灰质掩膜路径.
///
/// 1. 若环境变量 `$EPICENTER_MASK` 非空, 则返回其值;
/// 2. 否则, 返回 `{table_dir}/merged_ho_cereb_stn_comb.nii`.
pub fn mask_path_from_env_or<P: AsRef<Path>>(table_dir: P) -> PathBuf {
    match env::var_os("EPICENTER_MASK") {
        Some(m) if !m.is_empty() => PathBuf::from(m),
        _ => table_dir.as_ref().join(DEFAULT_MASK_FILENAME),
    }
}

/// 从目录 `dir` 载入两张查找表.
#[inline]
pub fn lookup_tables<P: AsRef<Path>>(
    dir: P,
    workers: NonZeroUsize,
) -> EpiResult<LookupTables<NpzSeedMaps>> {
    LookupTables::open_dir(dir, workers)
}

/// 载入灰质掩膜.
pub fn load_mask<P: AsRef<Path>>(path: P) -> EpiResult<Volume> {
    let mask = Volume::open(path.as_ref())?;
    log::info!(
        "mask {}: {} voxels",
        path.as_ref().display(),
        mask.count_nonzero()
    );
    Ok(mask)
}
