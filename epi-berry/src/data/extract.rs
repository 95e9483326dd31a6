//! 由体数据提取体素索引集合: 阈值, 掩膜, 二者组合, 以及百分位阈值.

use ordered_float::NotNan;

use super::{Grid, Volume, VoxelSet};
use crate::consts::grid::{is_background, is_in_mask};
use crate::error::{EpiError, EpiResult};

/// 阈值比较方式.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Bound {
    /// `value >= cutoff`.
    #[default]
    Inclusive,

    /// `value > cutoff`. 仅用于与旧版结果对齐.
    Exclusive,
}

impl Bound {
    /// 体素值 `value` 是否通过阈值 `cutoff`. `NaN` 永远不通过.
    ///
    /// 体素值以 `f32` 保存, 因此 `cutoff` 先舍入到最近的 `f32` 再比较.
    #[inline]
    pub fn admits(&self, value: f32, cutoff: f64) -> bool {
        let cutoff = cutoff as f32;
        match self {
            Bound::Inclusive => value >= cutoff,
            Bound::Exclusive => value > cutoff,
        }
    }
}

/// 阈值规则.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ThresholdRule {
    /// 绝对阈值 (如 w-score 或 z 值).
    Absolute(f64),

    /// 百分位阈值, 取值范围 `[0, 100]`. 百分位仅在非背景体素上计算.
    Percentile(f64),
}

impl ThresholdRule {
    /// 检查参数合法性.
    pub fn validate(&self) -> EpiResult<()> {
        match *self {
            ThresholdRule::Absolute(t) if t.is_nan() => Err(EpiError::InvalidParameter(
                "absolute threshold is NaN".to_string(),
            )),
            ThresholdRule::Percentile(p) if !(0.0..=100.0).contains(&p) => Err(
                EpiError::InvalidParameter(format!("percentile {p} is outside of [0, 100]")),
            ),
            _ => Ok(()),
        }
    }

    /// 根据候选体素值 `values` 计算实际阈值.
    ///
    /// 绝对阈值直接返回; 百分位阈值见 [`percentile_cutoff`].
    pub fn cutoff<I: IntoIterator<Item = f32>>(&self, values: I) -> EpiResult<f64> {
        self.validate()?;
        match *self {
            ThresholdRule::Absolute(t) => Ok(t),
            ThresholdRule::Percentile(p) => percentile_cutoff(values, p),
        }
    }
}

/// 体素谓词.
#[derive(Copy, Clone, Debug)]
pub enum VoxelPredicate<'a> {
    /// 仅按阈值筛选.
    Threshold {
        /// 阈值规则.
        rule: ThresholdRule,
        /// 比较方式.
        bound: Bound,
    },

    /// 仅按掩膜 (非零即真) 筛选.
    Mask(&'a Volume),

    /// 掩膜与阈值的逻辑与. 百分位仅在掩膜内的非背景体素上计算.
    MaskedThreshold {
        /// 掩膜.
        mask: &'a Volume,
        /// 阈值规则.
        rule: ThresholdRule,
        /// 比较方式.
        bound: Bound,
    },
}

/// 计算非背景体素值的第 `p` 百分位数 (`0 <= p <= 100`).
///
/// 零值与 `NaN` 被视为背景, 不参与计算. 相邻秩之间使用线性插值,
/// 与 numpy 的默认行为一致.
///
/// 若没有任何非背景值, 返回 [`EpiError::EmptyInput`].
pub fn percentile_cutoff<I: IntoIterator<Item = f32>>(values: I, p: f64) -> EpiResult<f64> {
    ThresholdRule::Percentile(p).validate()?;

    let mut pool: Vec<NotNan<f32>> = values
        .into_iter()
        .filter(|v| !is_background(*v))
        .filter_map(|v| NotNan::new(v).ok())
        .collect();
    if pool.is_empty() {
        return Err(EpiError::EmptyInput);
    }

    let rank = p / 100.0 * (pool.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let frac = rank - lo as f64;

    // 只需要第 lo 和第 lo + 1 小的元素, 不必完整排序.
    let (_, lo_v, upper) = pool.select_nth_unstable(lo);
    let a = lo_v.into_inner() as f64;
    if frac == 0.0 {
        return Ok(a);
    }
    let b = upper.iter().min().map_or(a, |v| v.into_inner() as f64);
    Ok(a + (b - a) * frac)
}

/// 按谓词 `pred` 提取 `volume` 的体素索引集合.
///
/// 掩膜与 `volume` 网格形状不一致时返回 [`EpiError::ShapeMismatch`].
pub fn extract(volume: &Volume, pred: &VoxelPredicate<'_>) -> EpiResult<VoxelSet> {
    check_addressable(volume)?;
    match *pred {
        VoxelPredicate::Threshold { rule, bound } => {
            let cutoff = rule.cutoff(volume.values())?;
            Ok(collect_indices(
                volume
                    .indexed_values()
                    .filter(|(_, v)| bound.admits(*v, cutoff)),
            ))
        }
        VoxelPredicate::Mask(mask) => {
            volume.same_grid(mask)?;
            Ok(mask_indices(mask))
        }
        VoxelPredicate::MaskedThreshold { mask, rule, bound } => {
            volume.same_grid(mask)?;
            let in_mask = || {
                volume
                    .indexed_values()
                    .zip(mask.values())
                    .filter(|(_, m)| is_in_mask(*m))
                    .map(|(iv, _)| iv)
            };
            let cutoff = rule.cutoff(in_mask().map(|(_, v)| v))?;
            Ok(collect_indices(
                in_mask().filter(|(_, v)| bound.admits(*v, cutoff)),
            ))
        }
    }
}

/// 提取 `value >= cutoff` 的体素.
#[inline]
pub fn threshold_indices(volume: &Volume, cutoff: f64) -> EpiResult<VoxelSet> {
    extract(
        volume,
        &VoxelPredicate::Threshold {
            rule: ThresholdRule::Absolute(cutoff),
            bound: Bound::Inclusive,
        },
    )
}

/// 提取 `value >=` 第 `p` 百分位数 (仅非背景体素参与计算) 的体素.
#[inline]
pub fn percentile_threshold(volume: &Volume, p: f64) -> EpiResult<VoxelSet> {
    extract(
        volume,
        &VoxelPredicate::Threshold {
            rule: ThresholdRule::Percentile(p),
            bound: Bound::Inclusive,
        },
    )
}

/// 提取掩膜内 (非零) 的体素.
pub fn mask_indices(mask: &Volume) -> VoxelSet {
    collect_indices(mask.indexed_values().filter(|(_, m)| is_in_mask(*m)))
}

/// 要求体素个数能以 `u32` 索引.
#[inline]
fn check_addressable(volume: &Volume) -> EpiResult<()> {
    if volume.size() > u32::MAX as usize {
        return Err(EpiError::InvalidParameter(format!(
            "a grid of {} voxels cannot be indexed by u32",
            volume.size()
        )));
    }
    Ok(())
}

/// 迭代器按展平索引升序产生元素, 因此可以跳过排序.
#[inline]
fn collect_indices<I: Iterator<Item = (usize, f32)>>(it: I) -> VoxelSet {
    VoxelSet::from_ascending(it.map(|(i, _)| i as u32))
}
