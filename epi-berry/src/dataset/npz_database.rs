use ndarray::{Array3, Ix3, OwnedRepr};
use ndarray_npy::NpzReader;
use std::fs::{File, OpenOptions};
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::error::{EpiError, EpiResult};
use crate::ParcelId;

/// 最多支持的工作通道个数.
pub(crate) const MAX_WORKERS: usize = 64;

/// Npz 文件归档.
///
/// 该结构用于建模硬盘上已存储的多个三维种子图的压缩文件.
/// 每个种子图以 `{id}.npy` 为名存储.
pub struct NpzArchive {
    entries: Vec<Mutex<NpzReader<File>>>,
    turn: AtomicUsize,
}

impl NpzArchive {
    /// 初始化.
    ///
    /// `workers` 指定了底层工作通道的个数, 最大为 64. 系统会从路径 `p` 打开文件
    /// `workers` 次, 并为每个打开通道指定一个排他入口点 (以期获得更高的并行度).
    pub fn new<P: AsRef<Path>>(workers: NonZeroUsize, p: P) -> EpiResult<Self> {
        let workers = workers.get();
        if workers > MAX_WORKERS {
            return Err(EpiError::InvalidParameter(format!(
                "{workers} npz workers requested, at most {MAX_WORKERS} supported"
            )));
        }
        let mut v = Vec::with_capacity(workers);
        for _ in 0..workers {
            let file = OpenOptions::new().read(true).open(p.as_ref())?;
            v.push(Mutex::new(NpzReader::new(file)?));
        }
        Ok(Self {
            entries: v,
            turn: AtomicUsize::new(0),
        })
    }

    /// 通过 npz 索引文件名 `name` 获取底层三维数组.
    pub fn volume_by_name(&self, name: &str) -> EpiResult<Array3<f32>> {
        let slot = self.next_slot();
        let mut file = self.entries[slot]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(file.by_name::<OwnedRepr<f32>, Ix3>(name)?)
    }

    /// 通过文件名 `{id}.npy` 获取底层三维数组.
    #[inline]
    pub fn volume_by_id(&self, id: ParcelId) -> EpiResult<Array3<f32>> {
        self.volume_by_name(&entry_name(id))
    }

    /// 获取底层 npz 文件包含的所有文件名.
    pub fn names(&self) -> EpiResult<Vec<String>> {
        let slot = self.next_slot();
        let mut file = self.entries[slot]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(file.names()?)
    }

    /// 获取底层 npz 文件中所有形如 `{id}.npy` 的编号, 按升序排列.
    /// 其它文件名会被忽略.
    pub fn ids(&self) -> EpiResult<Vec<ParcelId>> {
        let mut ids: Vec<ParcelId> = self
            .names()?
            .iter()
            .filter_map(|n| parse_entry_name(n))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    /// 工作通道个数.
    #[inline]
    pub fn worker_len(&self) -> usize {
        self.entries.len()
    }

    /// 获取底层 npz 文件的数组个数.
    pub fn len(&self) -> usize {
        let slot = self.next_slot();
        self.entries[slot]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// 底层 npz 文件是否不含任何数组.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn next_slot(&self) -> usize {
        self.turn.fetch_add(1, Ordering::Relaxed) % self.worker_len()
    }
}

/// 脑区 `id` 在归档中的文件名.
#[inline]
pub(crate) fn entry_name(id: ParcelId) -> String {
    format!("{id}.npy")
}

/// `{id}.npy` -> `id`.
#[inline]
fn parse_entry_name(name: &str) -> Option<ParcelId> {
    name.strip_suffix(".npy")?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_name() {
        assert_eq!(entry_name(17), "17.npy");
        assert_eq!(parse_entry_name("17.npy"), Some(17));
        assert_eq!(parse_entry_name("17"), None);
        assert_eq!(parse_entry_name("mask.npy"), None);
    }
}
