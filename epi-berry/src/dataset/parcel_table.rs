//! 脑区查找表: 脑区编号 -> 脑区体素集合.

use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::data::extract::mask_indices;
use crate::data::{Grid, Volume, VoxelSet};
use crate::error::{EpiError, EpiResult};
use crate::{Idx3d, ParcelId};

/// 脑区查找表. 每个脑区拥有唯一一个体素集合 (其空间范围).
///
/// 构建完成后只读, 可在所有被试和所有工作线程之间无锁共享.
/// 迭代顺序为脑区编号升序.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParcelTable {
    shape: Idx3d,
    parcels: BTreeMap<ParcelId, VoxelSet>,
}

impl Grid for ParcelTable {
    #[inline]
    fn shape(&self) -> Idx3d {
        self.shape
    }
}

impl ParcelTable {
    /// 创建网格形状为 `shape` 的空表.
    pub fn new(shape: Idx3d) -> Self {
        Self {
            shape,
            parcels: BTreeMap::new(),
        }
    }

    /// 插入脑区 `id` 的体素集合. 若 `id` 已存在, 则返回被替换的旧集合.
    ///
    /// 集合中存在越出网格的索引时返回 [`EpiError::OutOfGrid`].
    pub fn insert(&mut self, id: ParcelId, voxels: VoxelSet) -> EpiResult<Option<VoxelSet>> {
        voxels.check_within(self.size())?;
        Ok(self.parcels.insert(id, voxels))
    }

    /// 插入脑区 `id`, 其空间范围为 `volume` 的非零体素.
    pub fn insert_volume(&mut self, id: ParcelId, volume: &Volume) -> EpiResult<Option<VoxelSet>> {
        self.same_grid(volume)?;
        self.insert(id, mask_indices(volume))
    }

    /// 由 (脑区编号, 脑区体数据) 序列构建查找表. 网格形状取自第一个体数据.
    ///
    /// 任一体数据读取失败或形状不一致时返回 `Err`.
    /// 序列为空时返回 [`EpiError::EmptyInput`].
    pub fn from_volumes<I>(it: I) -> EpiResult<Self>
    where
        I: IntoIterator<Item = (ParcelId, EpiResult<Volume>)>,
    {
        let mut table: Option<Self> = None;
        for (id, volume) in it {
            let volume = volume?;
            let t = table.get_or_insert_with(|| Self::new(volume.shape()));
            t.insert_volume(id, &volume)?;
            log::debug!("parcel {id}: {} voxels", t.parcels[&id].len());
        }
        table.ok_or(EpiError::EmptyInput)
    }

    /// 获取脑区 `id` 的体素集合.
    #[inline]
    pub fn get(&self, id: ParcelId) -> Option<&VoxelSet> {
        self.parcels.get(&id)
    }

    /// 获取脑区 `id` 的体素集合. 不存在时返回 [`EpiError::MissingKey`].
    #[inline]
    pub fn try_get(&self, id: ParcelId) -> EpiResult<&VoxelSet> {
        self.get(id).ok_or(EpiError::MissingKey(id))
    }

    /// 按升序迭代所有脑区编号.
    #[inline]
    pub fn parcel_ids(&self) -> impl ExactSizeIterator<Item = ParcelId> + '_ {
        self.parcels.keys().copied()
    }

    /// 按编号升序迭代 (脑区编号, 体素集合).
    #[inline]
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (ParcelId, &VoxelSet)> + '_ {
        self.parcels.iter().map(|(id, s)| (*id, s))
    }

    /// 脑区个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.parcels.len()
    }

    /// 是否为空表.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.parcels.is_empty()
    }

    /// 检查所有集合都在网格范围内. 用于从外部缓存载入之后.
    fn validate(&self) -> EpiResult<()> {
        self.parcels
            .values()
            .try_for_each(|s| s.check_within(self.size()))
    }
}

/// 缓存的持久化存储.
#[cfg(feature = "serde")]
impl ParcelTable {
    /// 以 bincode 格式将查找表写入 `path`.
    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> EpiResult<()> {
        use std::io::Write;

        let file = std::fs::File::create(path.as_ref())?;
        let mut w = std::io::BufWriter::new(file);
        bincode::serialize_into(&mut w, self)?;
        w.flush()?;
        Ok(())
    }

    /// 从 `path` 载入 bincode 格式的查找表, 并检查所有索引都在网格范围内.
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> EpiResult<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let table: Self = bincode::deserialize_from(std::io::BufReader::new(file))?;
        table.validate()?;
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ParcelTable {
        let mut t = ParcelTable::new((2, 3, 4));
        t.insert(2, [3, 4].into_iter().collect()).unwrap();
        t.insert(1, [0, 1, 2].into_iter().collect()).unwrap();
        t
    }

    #[test]
    fn test_ids_ascending() {
        let t = table();
        assert_eq!(t.parcel_ids().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(t.get(1).map(VoxelSet::len), Some(3));
        assert!(matches!(t.try_get(9), Err(EpiError::MissingKey(9))));
    }

    #[test]
    fn test_insert_out_of_grid() {
        let mut t = ParcelTable::new((2, 3, 4));
        assert!(matches!(
            t.insert(1, [24].into_iter().collect()),
            Err(EpiError::OutOfGrid(24, 24))
        ));
        assert!(t.is_empty());
    }

    #[test]
    fn test_from_volumes() {
        let shape = (2, 3, 4);
        let t = ParcelTable::from_volumes([
            (1, Volume::from_voxels(shape, [5, 6], 1.0)),
            (2, Volume::from_voxels(shape, [7], 3.0)),
        ])
        .unwrap();
        assert_eq!(t.shape(), shape);
        assert_eq!(t.get(1).unwrap().as_slice(), &[5, 6]);
        assert_eq!(t.get(2).unwrap().as_slice(), &[7]);

        let err = ParcelTable::from_volumes([
            (1, Volume::from_voxels(shape, [5], 1.0)),
            (2, Volume::from_voxels((4, 3, 2), [7], 1.0)),
        ])
        .unwrap_err();
        assert!(matches!(err, EpiError::ShapeMismatch(..)));

        assert!(matches!(
            ParcelTable::from_volumes(std::iter::empty()),
            Err(EpiError::EmptyInput)
        ));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_cache_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parcels.bin");
        let t = table();
        t.save(&path).unwrap();
        assert_eq!(ParcelTable::load(&path).unwrap(), t);
    }
}
