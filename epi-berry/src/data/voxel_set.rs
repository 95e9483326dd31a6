//! 体素索引集合.

use std::borrow::Cow;
use std::collections::{BTreeSet, HashSet};

use itertools::{EitherOrBoth, Itertools};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{EpiError, EpiResult};

/// 体素展平索引集合. 内部按升序、去重存储.
///
/// 使用 `u32` 而非 `usize` 存储以减小查找表体积
/// (MNI 2mm 网格约 90 万体素, 远小于 `u32::MAX`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VoxelSet {
    data: Vec<u32>,
}

impl FromIterator<u32> for VoxelSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        let mut data: Vec<u32> = iter.into_iter().collect();
        data.sort_unstable();
        data.dedup();
        data.shrink_to_fit();
        Self { data }
    }
}

impl VoxelSet {
    /// 空集.
    #[inline]
    pub const fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// 由严格递增的索引序列创建集合. 不进行排序.
    ///
    /// 若序列不是严格递增的, 则程序行为未定义 (debug 模式下 panic).
    pub(crate) fn from_ascending<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        let data: Vec<u32> = iter.into_iter().collect();
        debug_assert!(data.windows(2).all(|w| w[0] < w[1]));
        Self { data }
    }

    /// 元素个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// 是否为空集.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 是否包含 `index`.
    #[inline]
    pub fn contains(&self, index: u32) -> bool {
        self.data.binary_search(&index).is_ok()
    }

    /// 按升序迭代.
    #[inline]
    pub fn iter(&self) -> impl ExactSizeIterator<Item = u32> + '_ {
        self.data.iter().copied()
    }

    /// 升序切片.
    #[inline]
    pub fn as_slice(&self) -> &[u32] {
        &self.data
    }

    /// 最大元素.
    #[inline]
    pub fn max(&self) -> Option<u32> {
        self.data.last().copied()
    }

    /// 交集大小 `|self ∩ other|`. 两个有序序列的归并, 复杂度 `O(m + n)`.
    pub fn intersection_len(&self, other: &VoxelSet) -> usize {
        self.data
            .iter()
            .merge_join_by(other.data.iter(), |a, b| a.cmp(b))
            .filter(|e| matches!(e, EitherOrBoth::Both(..)))
            .count()
    }

    /// 交集.
    pub fn intersection(&self, other: &VoxelSet) -> VoxelSet {
        Self::from_ascending(
            self.data
                .iter()
                .merge_join_by(other.data.iter(), |a, b| a.cmp(b))
                .filter_map(|e| match e {
                    EitherOrBoth::Both(a, _) => Some(*a),
                    _ => None,
                }),
        )
    }

    /// 要求集合中所有索引都小于 `len`, 否则返回 [`EpiError::OutOfGrid`].
    pub fn check_within(&self, len: usize) -> EpiResult<()> {
        match self.max() {
            Some(m) if m as usize >= len => Err(EpiError::OutOfGrid(m, len)),
            _ => Ok(()),
        }
    }
}

/// 可以被视作体素索引集合的值.
///
/// 文本也实现了该 trait, 但总是返回 [`EpiError::TypeMismatch`]:
/// 文本按字符迭代会悄无声息地破坏集合语义, 因此必须立即报错.
pub trait AsVoxelSet {
    /// 转换为 [`VoxelSet`].
    fn voxel_set(&self) -> EpiResult<Cow<'_, VoxelSet>>;
}

impl AsVoxelSet for VoxelSet {
    #[inline]
    fn voxel_set(&self) -> EpiResult<Cow<'_, VoxelSet>> {
        Ok(Cow::Borrowed(self))
    }
}

impl AsVoxelSet for [u32] {
    #[inline]
    fn voxel_set(&self) -> EpiResult<Cow<'_, VoxelSet>> {
        Ok(Cow::Owned(self.iter().copied().collect()))
    }
}

impl<const N: usize> AsVoxelSet for [u32; N] {
    #[inline]
    fn voxel_set(&self) -> EpiResult<Cow<'_, VoxelSet>> {
        self.as_slice().voxel_set()
    }
}

impl AsVoxelSet for Vec<u32> {
    #[inline]
    fn voxel_set(&self) -> EpiResult<Cow<'_, VoxelSet>> {
        self.as_slice().voxel_set()
    }
}

impl AsVoxelSet for BTreeSet<u32> {
    #[inline]
    fn voxel_set(&self) -> EpiResult<Cow<'_, VoxelSet>> {
        Ok(Cow::Owned(VoxelSet::from_ascending(self.iter().copied())))
    }
}

impl<S: std::hash::BuildHasher> AsVoxelSet for HashSet<u32, S> {
    #[inline]
    fn voxel_set(&self) -> EpiResult<Cow<'_, VoxelSet>> {
        Ok(Cow::Owned(self.iter().copied().collect()))
    }
}

impl AsVoxelSet for str {
    #[inline]
    fn voxel_set(&self) -> EpiResult<Cow<'_, VoxelSet>> {
        Err(EpiError::TypeMismatch("text"))
    }
}

impl AsVoxelSet for String {
    #[inline]
    fn voxel_set(&self) -> EpiResult<Cow<'_, VoxelSet>> {
        self.as_str().voxel_set()
    }
}

impl<T: AsVoxelSet + ?Sized> AsVoxelSet for &T {
    #[inline]
    fn voxel_set(&self) -> EpiResult<Cow<'_, VoxelSet>> {
        (**self).voxel_set()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicates_collapse() {
        let s: VoxelSet = [5, 1, 5, 3, 1].into_iter().collect();
        assert_eq!(s.as_slice(), &[1, 3, 5]);
        assert_eq!(s.len(), 3);
        assert!(s.contains(3));
        assert!(!s.contains(4));
    }

    #[test]
    fn test_intersection() {
        let a: VoxelSet = [1, 2, 3, 8, 9].into_iter().collect();
        let b: VoxelSet = [0, 2, 8, 10].into_iter().collect();
        assert_eq!(a.intersection_len(&b), 2);
        assert_eq!(a.intersection(&b).as_slice(), &[2, 8]);
        assert_eq!(a.intersection_len(&VoxelSet::new()), 0);
    }

    #[test]
    fn test_check_within() {
        let a: VoxelSet = [0, 23].into_iter().collect();
        assert!(a.check_within(24).is_ok());
        assert!(matches!(a.check_within(23), Err(EpiError::OutOfGrid(23, 23))));
        assert!(VoxelSet::new().check_within(0).is_ok());
    }

    #[test]
    fn test_text_is_rejected() {
        assert!(matches!("meow".voxel_set(), Err(EpiError::TypeMismatch(_))));
        assert!(matches!(
            String::from("mrow").voxel_set(),
            Err(EpiError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_collections_convert() {
        let v = vec![4u32, 2, 4];
        assert_eq!(v.voxel_set().unwrap().as_slice(), &[2, 4]);
        let b: BTreeSet<u32> = [9, 7].into_iter().collect();
        assert_eq!(b.voxel_set().unwrap().as_slice(), &[7, 9]);
        let h: HashSet<u32> = [3, 1].into_iter().collect();
        assert_eq!(h.voxel_set().unwrap().as_slice(), &[1, 3]);
    }
}
