//! 数据集操作.
//!
//! 包括脑区查找表, 种子图查找表, 以及二者在磁盘上的预处理缓存.

use std::path::{Path, PathBuf};

use crate::data::Grid;
use crate::error::EpiResult;

pub mod generic;
mod npz_database;
pub mod parcel_table;
pub mod seed_maps;

pub use npz_database::NpzArchive;
pub use parcel_table::ParcelTable;
pub use seed_maps::{write_npz_from, NpzSeedMaps, SeedMapSource, SeedMapTable};

/// 获取 `{用户主目录}/dataset` 目录.
pub fn home_dataset_dir() -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    Some(ans)
}

/// 获取 `{用户主目录}/dataset` 目录下给定继续项组成的全路径.
pub fn home_dataset_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(it: I) -> Option<PathBuf> {
    let mut ans = home_dataset_dir()?;
    ans.extend(it);
    Some(ans)
}

/// 一对共享同一脑区编号空间的查找表.
pub struct LookupTables<S> {
    /// 脑区编号 -> 体素集合.
    pub parcels: ParcelTable,
    /// 脑区编号 -> 种子图.
    pub seed_maps: S,
}

impl<S: SeedMapSource> LookupTables<S> {
    /// 组合两张查找表. 两者网格形状不一致时返回 `Err`.
    ///
    /// 编号空间不一致不是错误 (定位时缺失的种子图会单独报告), 但会记录警告.
    pub fn new(parcels: ParcelTable, seed_maps: S) -> EpiResult<Self> {
        parcels.same_grid(&seed_maps)?;

        let ids = seed_maps.parcel_ids()?;
        let missing = parcels
            .parcel_ids()
            .filter(|id| ids.binary_search(id).is_err())
            .count();
        if missing > 0 {
            log::warn!(
                "{missing} of {} parcels have no seed map",
                parcels.len()
            );
        }
        Ok(Self { parcels, seed_maps })
    }
}

#[cfg(feature = "serde")]
impl LookupTables<NpzSeedMaps> {
    /// 从预处理目录 `dir` 载入 `parcels.bin` 与 `seedmaps.npz`.
    ///
    /// 种子图按需读取, `workers` 为并行读取通道数.
    pub fn open_dir<P: AsRef<Path>>(dir: P, workers: std::num::NonZeroUsize) -> EpiResult<Self> {
        use crate::consts::{PARCEL_TABLE_FILENAME, SEED_MAP_ARCHIVE_FILENAME};

        let dir = dir.as_ref();
        let parcels = ParcelTable::load(dir.join(PARCEL_TABLE_FILENAME))?;
        log::info!("{} parcels loaded from {}", parcels.len(), dir.display());
        let seed_maps = NpzSeedMaps::open(
            dir.join(SEED_MAP_ARCHIVE_FILENAME),
            workers,
            parcels.shape(),
        )?;
        Self::new(parcels, seed_maps)
    }
}
