//! Dice 相似系数与候选脑区排序.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use binary_heap_plus::BinaryHeap;

use crate::consts::DICE_DECIMALS;
use crate::data::{AsVoxelSet, VoxelSet};
use crate::error::{EpiError, EpiResult};
use crate::ParcelId;

/// 保留 [`DICE_DECIMALS`] 位小数, 尾数恰为一半时取偶.
///
/// # 注意
///
/// 舍入作用于 `x` 的精确二进制值, 而不是其十进制近似.
/// 例如 `0.0625` 舍入为 `0.062`, 而 `0.0005` (二进制值略大于一半) 舍入为 `0.001`.
fn round_dice(x: f64) -> f64 {
    debug_assert!((0.0..=1.0).contains(&x));
    if x == 0.0 {
        return 0.0;
    }
    let scale = 10u64.pow(DICE_DECIMALS);

    // x = mant * 2^-shift, 其中 x <= 1 保证 shift > 0
    let bits = x.to_bits();
    let exp = ((bits >> 52) & 0x7ff) as i64;
    let frac = bits & ((1u64 << 52) - 1);
    let (mant, shift) = match exp {
        0 => (frac, 1074),
        _ => (frac | (1u64 << 52), 1075 - exp),
    };

    // mant * scale < 2^63, 故 shift >= 64 时商为零且余数不足一半
    if shift >= 64 {
        return 0.0;
    }
    let num = mant as u128 * scale as u128;
    let mut q = num >> shift;
    let rem = num & ((1u128 << shift) - 1);
    let half = 1u128 << (shift - 1);
    if rem > half || (rem == half && q & 1 == 1) {
        q += 1;
    }
    q as f64 / scale as f64
}

/// 计算 Dice 系数 `2|a ∩ b| / (|a| + |b|)`, 保留三位小数.
///
/// # 注意
///
/// - 两个集合都为空时, 系数没有定义, 返回 [`EpiError::DegenerateInput`].
/// - 任一操作数为文本时返回 [`EpiError::TypeMismatch`].
pub fn dice<A, B>(a: &A, b: &B) -> EpiResult<f64>
where
    A: AsVoxelSet + ?Sized,
    B: AsVoxelSet + ?Sized,
{
    let a = a.voxel_set()?;
    let b = b.voxel_set()?;
    let total = a.len() + b.len();
    if total == 0 {
        return Err(EpiError::DegenerateInput);
    }
    let common = a.intersection_len(&b);
    Ok(round_dice(2.0 * common as f64 / total as f64))
}

/// 一个候选脑区的得分.
///
/// 排序即报告顺序: 系数高者在前, 系数相同时编号小者在前.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ScoreRecord {
    /// 脑区编号.
    pub id: ParcelId,
    /// Dice 系数.
    pub coef: f64,
}

impl Eq for ScoreRecord {}

impl Ord for ScoreRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .coef
            .total_cmp(&self.coef)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for ScoreRecord {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// 一个被试的排序结果.
#[derive(Clone, Debug, PartialEq)]
pub struct Ranking {
    /// 按报告顺序排列的前 K 个候选.
    pub top: Vec<ScoreRecord>,
    /// 参与排序的候选个数.
    pub candidates: usize,
    /// 所有候选系数的均值.
    pub mean: f64,
    /// 所有候选系数的总体标准差.
    pub std: f64,
}

impl Ranking {
    /// 没有任何候选时的结果.
    pub const EMPTY: Ranking = Ranking {
        top: Vec::new(),
        candidates: 0,
        mean: 0.0,
        std: 0.0,
    };

    /// `record` 的系数相对所有候选的 z 值.
    ///
    /// 没有候选或标准差为零时返回 `None`.
    pub fn z_score(&self, record: &ScoreRecord) -> Option<f64> {
        (self.candidates > 0 && self.std > 0.0).then(|| (record.coef - self.mean) / self.std)
    }

    /// 是否没有任何报告项.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.top.is_empty()
    }
}

/// 计算 `subject` 与每个候选种子集合的 Dice 系数, 并取前 `top_k` 个.
///
/// 候选少于 `top_k` 个时全部返回; `top_k == 0` 时 `top` 为空,
/// 但统计量仍覆盖全部候选.
pub fn rank(
    subject: &VoxelSet,
    candidate_sets: &BTreeMap<ParcelId, VoxelSet>,
    top_k: usize,
) -> EpiResult<Ranking> {
    if candidate_sets.is_empty() {
        return Ok(Ranking::EMPTY);
    }

    // 堆顶为当前保留的最差候选
    let mut heap: BinaryHeap<ScoreRecord, _> =
        BinaryHeap::new_by(|a: &ScoreRecord, b: &ScoreRecord| a.cmp(b));
    heap.reserve(top_k.min(candidate_sets.len()));

    let mut coefs = Vec::with_capacity(candidate_sets.len());
    for (&id, seed) in candidate_sets {
        let record = ScoreRecord {
            id,
            coef: dice(subject, seed)?,
        };
        coefs.push(record.coef);

        if heap.len() < top_k {
            heap.push(record);
        } else if let Some(mut worst) = heap.peek_mut() {
            if record < *worst {
                *worst = record;
            }
        }
    }

    let n = coefs.len() as f64;
    let mean = coefs.iter().sum::<f64>() / n;
    let std = (coefs.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n).sqrt();
    Ok(Ranking {
        top: heap.into_sorted_vec(),
        candidates: candidate_sets.len(),
        mean,
        std,
    })
}
