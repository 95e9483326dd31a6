//! 通用常量.

/// 网格相关常量.
pub mod grid {
    use crate::Idx3d;

    /// MNI152 2mm 标准空间的体素网格形状, 按 NIfTI `(i, j, k)` 顺序.
    pub const MNI_2MM_SHAPE: Idx3d = (91, 109, 91);

    /// 体素值是否为背景? `NaN` 同样视为背景.
    #[inline]
    pub fn is_background(v: f32) -> bool {
        v == 0.0 || v.is_nan()
    }

    /// 体素值作为掩膜时是否为真 (非零即真, `NaN` 视为背景).
    #[inline]
    pub fn is_in_mask(v: f32) -> bool {
        !is_background(v)
    }
}

/// 脑区图谱常量.
pub mod atlas {
    /// Brainnetome + SUIT 小脑合并图谱的脑区个数. 脑区编号为 `1..=273`.
    pub const BRAINNETOME_SUIT_LEN: u32 = 273;

    /// 脑区 nifti 文件名, 形如 `vol_{id}.nii`.
    pub fn parcel_filename(id: u32) -> String {
        format!("vol_{id}.nii")
    }

    /// 种子图 nifti 文件名 (组水平 SPM T 图), 形如 `1ST_vol_{id}/spmT_0001.nii`.
    pub fn seed_map_filename(id: u32) -> String {
        format!("1ST_vol_{id}/spmT_0001.nii")
    }
}

/// 默认灰质掩膜文件名.
pub const DEFAULT_MASK_FILENAME: &str = "merged_ho_cereb_stn_comb.nii";

/// 脑区查找表缓存文件名.
pub const PARCEL_TABLE_FILENAME: &str = "parcels.bin";

/// 种子图 npz 归档文件名.
pub const SEED_MAP_ARCHIVE_FILENAME: &str = "seedmaps.npz";

/// 默认 wmap 绝对阈值.
pub const DEFAULT_W_THRESHOLD: f64 = 2.0;

/// 默认最小重叠体素个数.
pub const DEFAULT_MIN_OVERLAP: usize = 10;

/// 默认种子图百分位阈值.
pub const DEFAULT_FC_PERCENTILE: f64 = 90.0;

/// 默认报告的候选脑区个数.
pub const DEFAULT_TOP_K: usize = 10;

/// Dice 系数保留的小数位数.
pub const DICE_DECIMALS: u32 = 3;
