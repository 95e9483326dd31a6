use std::path::Path;

use ndarray::{Array3, ArrayD, ArrayView, Axis, Ix3};
use nifti::{IntoNdArray, NiftiObject, ReaderOptions};

use crate::error::{EpiError, EpiResult};
use crate::Idx3d;

pub mod extract;
pub mod voxel_set;

pub use extract::{extract, percentile_cutoff, Bound, ThresholdRule, VoxelPredicate};
pub use voxel_set::{AsVoxelSet, VoxelSet};

/// 固定形状三维体素网格的共用属性.
///
/// 所有体素以 NIfTI `(i, j, k)` 顺序的行优先方式展平为一维索引:
/// `flat = (i * nj + j) * nk + k`.
pub trait Grid {
    /// 获取网格形状.
    fn shape(&self) -> Idx3d;

    /// 获取网格体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (i, j, k) = self.shape();
        i * j * k
    }

    /// 检查三维索引是否合法.
    #[inline]
    fn check(&self, (i0, j0, k0): &Idx3d) -> bool {
        let (i, j, k) = self.shape();
        *i0 < i && *j0 < j && *k0 < k
    }

    /// 三维索引 -> 一维展平索引. 越界时返回 `None`.
    #[inline]
    fn flat_index(&self, pos: Idx3d) -> Option<usize> {
        let (_, nj, nk) = self.shape();
        let (i, j, k) = pos;
        self.check(&pos).then_some((i * nj + j) * nk + k)
    }

    /// 一维展平索引 -> 三维索引. 越界时返回 `None`.
    #[inline]
    fn position(&self, flat: usize) -> Option<Idx3d> {
        let (_, nj, nk) = self.shape();
        (flat < self.size()).then(|| (flat / (nj * nk), (flat / nk) % nj, flat % nk))
    }

    /// 要求 `other` 与自身网格形状一致, 否则返回 [`EpiError::ShapeMismatch`].
    #[inline]
    fn same_grid<G: Grid + ?Sized>(&self, other: &G) -> EpiResult<()> {
        match (self.shape(), other.shape()) {
            (a, b) if a == b => Ok(()),
            (a, b) => Err(EpiError::ShapeMismatch(a, b)),
        }
    }
}

/// nii 格式三维体数据 (wmap, 掩膜, 脑区或种子图). 体素值以 `f32` 保存.
///
/// 载入后不可变.
#[derive(Debug, Clone)]
pub struct Volume {
    data: Array3<f32>,
}

impl Grid for Volume {
    #[inline]
    fn shape(&self) -> Idx3d {
        self.data.dim()
    }
}

impl Volume {
    /// 打开 nii (或 nii.gz) 文件格式的三维体数据. `path` 为本地路径.
    ///
    /// 第四维长度为 1 的图像会被压缩为三维. 其它非三维图像返回
    /// [`EpiError::NotVolume`].
    pub fn open<P: AsRef<Path>>(path: P) -> EpiResult<Self> {
        let obj = ReaderOptions::new().read_file(path.as_ref())?;
        let data = obj.into_volume().into_ndarray::<f32>()?;
        let data = squeeze_to_3d(data)?;

        // nifti 按 Fortran 序存储, 转换为标准布局以便按展平索引访问.
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().into_owned()
        };
        debug_assert!(data.is_standard_layout());

        Ok(Self { data })
    }

    /// 直接由数组创建体数据. 数组按 `(i, j, k)` 组织.
    pub fn from_array(data: Array3<f32>) -> Self {
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().into_owned()
        };
        Self { data }
    }

    /// 由形状和行优先展平的体素值创建体数据.
    ///
    /// 若 `values` 长度与 `shape` 不符, 则返回 [`EpiError::InvalidParameter`].
    pub fn from_shape_vec(shape: Idx3d, values: Vec<f32>) -> EpiResult<Self> {
        let len = values.len();
        let data = Array3::from_shape_vec(shape, values).map_err(|_| {
            EpiError::InvalidParameter(format!("{len} values do not fill a {shape:?} grid"))
        })?;
        Ok(Self { data })
    }

    /// 创建形状为 `shape` 的全零体数据, 并将 `voxels` 中的展平索引置为 `value`.
    ///
    /// 越界索引会返回 [`EpiError::OutOfGrid`].
    pub fn from_voxels<I: IntoIterator<Item = u32>>(
        shape: Idx3d,
        voxels: I,
        value: f32,
    ) -> EpiResult<Self> {
        let mut data = Array3::<f32>::zeros(shape);
        let len = data.len();
        let flat = data
            .as_slice_mut()
            .ok_or_else(|| EpiError::InvalidParameter("non-contiguous volume".to_string()))?;
        for v in voxels {
            *flat
                .get_mut(v as usize)
                .ok_or(EpiError::OutOfGrid(v, len))? = value;
        }
        Ok(Self { data })
    }

    /// 按展平索引顺序迭代体素值.
    #[inline]
    pub fn values(&self) -> impl ExactSizeIterator<Item = f32> + '_ {
        self.data.iter().copied()
    }

    /// 按展平索引顺序迭代 (展平索引, 体素值).
    #[inline]
    pub fn indexed_values(&self) -> impl ExactSizeIterator<Item = (usize, f32)> + '_ {
        self.values().enumerate()
    }

    /// 获取展平索引 `flat` 处的体素值. 越界时返回 `None`.
    #[inline]
    pub fn get_flat(&self, flat: usize) -> Option<f32> {
        self.data.get(self.position(flat)?).copied()
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, f32, Ix3> {
        self.data.view()
    }

    /// 消费自我, 获得底层数组.
    #[inline]
    pub fn into_array(self) -> Array3<f32> {
        self.data
    }

    /// 非背景体素 (非零且非 `NaN`) 个数.
    pub fn count_nonzero(&self) -> usize {
        self.values()
            .filter(|v| crate::consts::grid::is_in_mask(*v))
            .count()
    }
}

/// 将动态维度数组转换为三维数组. 仅允许压缩末尾长度为 1 的维度.
fn squeeze_to_3d(mut data: ArrayD<f32>) -> EpiResult<Array3<f32>> {
    while data.ndim() > 3 && data.len_of(Axis(data.ndim() - 1)) == 1 {
        let last = data.ndim() - 1;
        data = data.index_axis_move(Axis(last), 0);
    }
    let ndim = data.ndim();
    data.into_dimensionality::<Ix3>()
        .map_err(|_| EpiError::NotVolume(ndim))
}

/// 体数据加载能力. 病灶定位流程只依赖该 trait, 而不关心具体文件格式.
pub trait VolumeLoader: Sync {
    /// 从 `path` 载入体数据.
    fn load(&self, path: &Path) -> EpiResult<Volume>;
}

impl<T: VolumeLoader + ?Sized> VolumeLoader for &T {
    #[inline]
    fn load(&self, path: &Path) -> EpiResult<Volume> {
        (**self).load(path)
    }
}

/// 基于 `nifti` crate 的加载器.
#[derive(Copy, Clone, Debug, Default)]
pub struct NiftiLoader;

impl VolumeLoader for NiftiLoader {
    #[inline]
    fn load(&self, path: &Path) -> EpiResult<Volume> {
        Volume::open(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::ShapeBuilder;

    #[test]
    fn test_flat_index_roundtrip() {
        let v = Volume::from_array(Array3::zeros((2, 3, 4)));
        assert_eq!(v.size(), 24);
        assert_eq!(v.flat_index((0, 0, 0)), Some(0));
        assert_eq!(v.flat_index((0, 0, 1)), Some(1));
        assert_eq!(v.flat_index((0, 1, 0)), Some(4));
        assert_eq!(v.flat_index((1, 0, 0)), Some(12));
        assert_eq!(v.flat_index((1, 2, 3)), Some(23));
        assert_eq!(v.flat_index((2, 0, 0)), None);
        for flat in 0..24 {
            let pos = v.position(flat).unwrap();
            assert_eq!(v.flat_index(pos), Some(flat));
        }
        assert_eq!(v.position(24), None);
    }

    #[test]
    fn test_values_follow_flat_order_for_fortran_input() {
        let mut f = Array3::<f32>::zeros((2, 3, 4).f());
        for ((i, j, k), x) in f.indexed_iter_mut() {
            *x = ((i * 3 + j) * 4 + k) as f32;
        }
        assert!(!f.is_standard_layout());
        let v = Volume::from_array(f);
        assert!(v.values().eq((0..24).map(|x| x as f32)));
        assert_eq!(v.get_flat(13), Some(13.0));
    }

    #[test]
    fn test_from_shape_vec_len_mismatch() {
        assert!(matches!(
            Volume::from_shape_vec((2, 2, 2), vec![0.0; 7]),
            Err(EpiError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_from_voxels() {
        let v = Volume::from_voxels((2, 2, 2), [1, 6], 3.5).unwrap();
        assert_eq!(v.count_nonzero(), 2);
        assert_eq!(v.get_flat(6), Some(3.5));
        assert!(matches!(
            Volume::from_voxels((2, 2, 2), [8], 1.0),
            Err(EpiError::OutOfGrid(8, 8))
        ));
    }

    #[test]
    fn test_squeeze_trailing_singleton() {
        let d = ArrayD::<f32>::zeros(ndarray::IxDyn(&[2, 3, 4, 1]));
        assert_eq!(squeeze_to_3d(d).unwrap().dim(), (2, 3, 4));

        let d = ArrayD::<f32>::zeros(ndarray::IxDyn(&[2, 3, 4, 2]));
        assert!(matches!(squeeze_to_3d(d), Err(EpiError::NotVolume(4))));

        let d = ArrayD::<f32>::zeros(ndarray::IxDyn(&[2, 3]));
        assert!(matches!(squeeze_to_3d(d), Err(EpiError::NotVolume(2))));
    }

    #[test]
    fn test_same_grid() {
        let a = Volume::from_array(Array3::zeros((2, 3, 4)));
        let b = Volume::from_array(Array3::zeros((2, 3, 5)));
        assert!(a.same_grid(&a).is_ok());
        assert!(matches!(
            a.same_grid(&b),
            Err(EpiError::ShapeMismatch((2, 3, 4), (2, 3, 5)))
        ));
    }
}
