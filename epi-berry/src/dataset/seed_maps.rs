//! 种子图查找表: 脑区编号 -> 以该脑区为种子的组平均功能连接图.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs::File;
use std::num::NonZeroUsize;
use std::path::Path;

use ndarray_npy::NpzWriter;
use once_cell::sync::OnceCell;

use super::npz_database::{entry_name, NpzArchive, MAX_WORKERS};
use crate::data::{Grid, Volume};
use crate::error::{EpiError, EpiResult};
use crate::{Idx3d, ParcelId};

/// 种子图来源. 病灶定位流程只依赖 `get` 与枚举编号两种能力.
///
/// 实现必须是只读的, 以便在工作线程之间无锁共享.
pub trait SeedMapSource: Grid + Sync {
    /// 按升序获取所有脑区编号.
    fn parcel_ids(&self) -> EpiResult<Vec<ParcelId>>;

    /// 获取脑区 `id` 的种子图. 不存在时返回 [`EpiError::MissingKey`].
    fn seed_map(&self, id: ParcelId) -> EpiResult<Cow<'_, Volume>>;
}

/// 常驻内存的种子图表.
#[derive(Clone, Debug)]
pub struct SeedMapTable {
    shape: Idx3d,
    maps: BTreeMap<ParcelId, Volume>,
}

impl Grid for SeedMapTable {
    #[inline]
    fn shape(&self) -> Idx3d {
        self.shape
    }
}

impl SeedMapTable {
    /// 创建网格形状为 `shape` 的空表.
    pub fn new(shape: Idx3d) -> Self {
        Self {
            shape,
            maps: BTreeMap::new(),
        }
    }

    /// 插入脑区 `id` 的种子图. 若 `id` 已存在, 则返回被替换的旧种子图.
    pub fn insert(&mut self, id: ParcelId, map: Volume) -> EpiResult<Option<Volume>> {
        self.same_grid(&map)?;
        Ok(self.maps.insert(id, map))
    }

    /// 由 (脑区编号, 种子图) 序列构建种子图表. 网格形状取自第一个种子图.
    ///
    /// 序列为空时返回 [`EpiError::EmptyInput`].
    pub fn from_volumes<I>(it: I) -> EpiResult<Self>
    where
        I: IntoIterator<Item = (ParcelId, EpiResult<Volume>)>,
    {
        let mut table: Option<Self> = None;
        for (id, map) in it {
            let map = map?;
            let shape = map.shape();
            table
                .get_or_insert_with(|| Self::new(shape))
                .insert(id, map)?;
            log::debug!("seed map {id} loaded");
        }
        table.ok_or(EpiError::EmptyInput)
    }

    /// 获取脑区 `id` 的种子图.
    #[inline]
    pub fn get(&self, id: ParcelId) -> Option<&Volume> {
        self.maps.get(&id)
    }

    /// 种子图个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    /// 是否为空表.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// 将所有种子图写入 npz 归档 `path`, 每个种子图以 `{id}.npy` 为名.
    /// 写出的归档可以由 [`NpzSeedMaps`] 读取. 空表返回 [`EpiError::EmptyInput`].
    pub fn write_npz<P: AsRef<Path>>(&self, path: P) -> EpiResult<()> {
        write_npz_from(
            path,
            self.maps.iter().map(|(id, map)| (*id, Ok(Cow::Borrowed(map)))),
        )?;
        Ok(())
    }
}

/// 逐个写入种子图到 npz 归档 `path`, 返回写入个数. 不在内存中保留已写入的种子图.
///
/// 所有种子图的网格形状必须与第一个一致. 序列为空时返回 [`EpiError::EmptyInput`],
/// 此时 `path` 处可能留下一个空归档.
pub fn write_npz_from<'a, P, I>(path: P, it: I) -> EpiResult<usize>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = (ParcelId, EpiResult<Cow<'a, Volume>>)>,
{
    let mut npz = NpzWriter::new(File::create(path.as_ref())?);
    let mut shape: Option<Idx3d> = None;
    let mut count = 0;
    for (id, map) in it {
        let map = map?;
        match shape {
            Some(s) if s != map.shape() => return Err(EpiError::ShapeMismatch(s, map.shape())),
            Some(_) => {}
            None => shape = Some(map.shape()),
        }
        npz.add_array(entry_name(id), &map.data())?;
        log::debug!("seed map {id} written");
        count += 1;
    }
    npz.finish()?;
    if count == 0 {
        return Err(EpiError::EmptyInput);
    }
    Ok(count)
}

impl SeedMapSource for SeedMapTable {
    fn parcel_ids(&self) -> EpiResult<Vec<ParcelId>> {
        Ok(self.maps.keys().copied().collect())
    }

    fn seed_map(&self, id: ParcelId) -> EpiResult<Cow<'_, Volume>> {
        self.get(id)
            .map(Cow::Borrowed)
            .ok_or(EpiError::MissingKey(id))
    }
}

/// 以 npz 归档为后端、按需读取的种子图来源.
///
/// 每次读取都会解压对应数组, 不做缓存, 因此内存占用与工作线程数成正比,
/// 而不是与脑区个数成正比.
pub struct NpzSeedMaps {
    archive: NpzArchive,
    shape: Idx3d,
    ids: OnceCell<Vec<ParcelId>>,
}

impl Grid for NpzSeedMaps {
    #[inline]
    fn shape(&self) -> Idx3d {
        self.shape
    }
}

impl NpzSeedMaps {
    /// 打开 npz 归档 `path`. `workers` 为并行读取通道数,
    /// `shape` 为期望的网格形状, 读取到的每个种子图都会与之比对.
    ///
    /// 读取通道数最多为 64, 超出部分的工作线程轮流共享已有通道.
    pub fn open<P: AsRef<Path>>(path: P, workers: NonZeroUsize, shape: Idx3d) -> EpiResult<Self> {
        let slots = NonZeroUsize::new(MAX_WORKERS).map_or(workers, |cap| workers.min(cap));
        if slots < workers {
            log::debug!("{workers} workers share {slots} npz readers");
        }
        Ok(Self {
            archive: NpzArchive::new(slots, path)?,
            shape,
            ids: OnceCell::new(),
        })
    }

    /// 底层归档.
    #[inline]
    pub fn archive(&self) -> &NpzArchive {
        &self.archive
    }

    fn ids(&self) -> EpiResult<&[ParcelId]> {
        self.ids
            .get_or_try_init(|| self.archive.ids())
            .map(Vec::as_slice)
    }
}

impl SeedMapSource for NpzSeedMaps {
    fn parcel_ids(&self) -> EpiResult<Vec<ParcelId>> {
        Ok(self.ids()?.to_vec())
    }

    fn seed_map(&self, id: ParcelId) -> EpiResult<Cow<'_, Volume>> {
        if self.ids()?.binary_search(&id).is_err() {
            return Err(EpiError::MissingKey(id));
        }
        let map = Volume::from_array(self.archive.volume_by_id(id)?);
        self.same_grid(&map)?;
        Ok(Cow::Owned(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHAPE: Idx3d = (2, 3, 4);

    fn table() -> SeedMapTable {
        SeedMapTable::from_volumes([
            (3, Volume::from_voxels(SHAPE, [1, 2, 3], 0.5)),
            (1, Volume::from_voxels(SHAPE, [20], -1.5)),
        ])
        .unwrap()
    }

    #[test]
    fn test_in_memory_source() {
        let t = table();
        assert_eq!(t.parcel_ids().unwrap(), vec![1, 3]);
        assert_eq!(t.seed_map(3).unwrap().count_nonzero(), 3);
        assert!(matches!(t.seed_map(2), Err(EpiError::MissingKey(2))));
    }

    #[test]
    fn test_insert_shape_mismatch() {
        let mut t = table();
        let bad = Volume::from_voxels((4, 3, 2), [0], 1.0).unwrap();
        assert!(matches!(t.insert(9, bad), Err(EpiError::ShapeMismatch(..))));
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_npz_source_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seedmaps.npz");
        let t = table();
        t.write_npz(&path).unwrap();

        let npz = NpzSeedMaps::open(&path, NonZeroUsize::new(2).unwrap(), SHAPE).unwrap();
        assert_eq!(npz.archive().worker_len(), 2);
        assert_eq!(npz.archive().len(), 2);
        assert_eq!(npz.parcel_ids().unwrap(), vec![1, 3]);
        for id in [1, 3] {
            let got = npz.seed_map(id).unwrap();
            let want = t.seed_map(id).unwrap();
            assert!(got.values().eq(want.values()));
        }
        assert!(matches!(npz.seed_map(2), Err(EpiError::MissingKey(2))));
    }

    #[test]
    fn test_npz_source_caps_readers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seedmaps.npz");
        table().write_npz(&path).unwrap();

        let npz = NpzSeedMaps::open(&path, NonZeroUsize::new(96).unwrap(), SHAPE).unwrap();
        assert_eq!(npz.archive().worker_len(), MAX_WORKERS);
        assert_eq!(npz.seed_map(3).unwrap().count_nonzero(), 3);

        // 直接构造归档时仍拒绝超出上限的通道数
        assert!(matches!(
            NpzArchive::new(NonZeroUsize::new(96).unwrap(), &path),
            Err(EpiError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_streaming_write_checks_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seedmaps.npz");
        let maps = [
            (1, Volume::from_voxels(SHAPE, [1], 1.0).map(Cow::Owned)),
            (2, Volume::from_voxels((4, 3, 2), [1], 1.0).map(Cow::Owned)),
        ];
        assert!(matches!(
            write_npz_from(&path, maps),
            Err(EpiError::ShapeMismatch(..))
        ));
        assert!(matches!(
            write_npz_from(&path, std::iter::empty()),
            Err(EpiError::EmptyInput)
        ));
    }

    #[test]
    fn test_npz_source_shape_check() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seedmaps.npz");
        table().write_npz(&path).unwrap();

        let npz = NpzSeedMaps::open(&path, NonZeroUsize::new(1).unwrap(), (4, 3, 2)).unwrap();
        assert!(matches!(npz.seed_map(1), Err(EpiError::ShapeMismatch(..))));
    }
}
