//! 通用 nifti 体数据目录加载器.
//!
//! 提供迭代器风格的数据集获取模式, 用于离线构建脑区与种子图查找表.

use crate::data::{NiftiLoader, Volume, VolumeLoader};
use crate::error::EpiResult;
use crate::ParcelId;
use std::path::{Path, PathBuf};

/// 文件名构造器. 接受脑区编号, 获得相对于数据目录的文件名.
pub type FilenameBuilder = fn(ParcelId) -> String;

/// 从指定编号、路径、文件名构造器来创建通用的体数据加载器.
///
/// `ids` 的所有取值 `id` 必须在 `path` 下有形如 `builder(id)` 的 nifti 文件,
/// 否则加载器在迭代时会返回 `Err`.
pub fn volume_loader<I: IntoIterator<Item = ParcelId>, P: AsRef<Path>>(
    ids: I,
    path: P,
    builder: FilenameBuilder,
) -> DirLoader<NiftiLoader> {
    dir_loader_with(ids, path, builder, NiftiLoader)
}

/// 同 [`volume_loader`], 但使用自定义的底层加载器 `loader`.
pub fn dir_loader_with<L, I, P>(
    ids: I,
    path: P,
    builder: FilenameBuilder,
    loader: L,
) -> DirLoader<L>
where
    L: VolumeLoader,
    I: IntoIterator<Item = ParcelId>,
    P: AsRef<Path>,
{
    let mut data: Vec<ParcelId> = ids.into_iter().collect();
    data.reverse();

    DirLoader {
        path: path.as_ref().to_owned(),
        data_rev: data,
        builder,
        loader,
    }
}

/// 目录体数据加载器, 并在内部自动转换文件名.
#[derive(Debug)]
pub struct DirLoader<L> {
    path: PathBuf,
    data_rev: Vec<ParcelId>,
    builder: FilenameBuilder,
    loader: L,
}

impl<L: VolumeLoader> Iterator for DirLoader<L> {
    type Item = (ParcelId, EpiResult<Volume>);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.data_rev.pop()?;

        let path = self.path.join((self.builder)(id));
        let data = self.loader.load(path.as_path());

        Some((id, data))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.data_rev.len(), Some(self.data_rev.len()))
    }
}

impl<L: VolumeLoader> ExactSizeIterator for DirLoader<L> {
    #[inline]
    fn len(&self) -> usize {
        self.data_rev.len()
    }
}
