//! 候选脑区筛选与种子图阈值化.

use std::collections::BTreeMap;

use crate::data::{extract, Bound, ThresholdRule, VoxelPredicate, VoxelSet};
use crate::dataset::{ParcelTable, SeedMapSource};
use crate::error::EpiResult;
use crate::ParcelId;

/// 保留与被试体素集合重叠不少于 `min_overlap` 个体素的脑区.
///
/// 结果按脑区编号升序排列. `min_overlap == 0` 时保留所有脑区.
pub fn filter_candidates(
    subject: &VoxelSet,
    parcels: &ParcelTable,
    min_overlap: usize,
) -> Vec<ParcelId> {
    parcels
        .iter()
        .filter(|(_, voxels)| min_overlap == 0 || subject.intersection_len(voxels) >= min_overlap)
        .map(|(id, _)| id)
        .collect()
}

/// 对每个候选脑区的种子图按 `rule` 阈值化, 得到其功能连接体素集合.
///
/// 百分位阈值在每个种子图自身的非背景体素上单独计算.
///
/// # 注意
///
/// 任一候选在 `seed_maps` 中缺失时返回 [`EpiError::MissingKey`](crate::error::EpiError::MissingKey),
/// 不会静默跳过.
pub fn build_candidate_seed_sets<S: SeedMapSource>(
    candidates: &[ParcelId],
    seed_maps: &S,
    rule: ThresholdRule,
) -> EpiResult<BTreeMap<ParcelId, VoxelSet>> {
    rule.validate()?;
    let pred = VoxelPredicate::Threshold {
        rule,
        bound: Bound::Inclusive,
    };

    let mut ans = BTreeMap::new();
    for &id in candidates {
        let map = seed_maps.seed_map(id)?;
        let voxels = extract(&map, &pred)?;
        log::trace!("seed map {id}: {} voxels kept", voxels.len());
        ans.insert(id, voxels);
    }
    Ok(ans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Volume;
    use crate::dataset::SeedMapTable;
    use crate::error::EpiError;

    const SHAPE: (usize, usize, usize) = (4, 5, 6);

    fn parcels() -> ParcelTable {
        let mut t = ParcelTable::new(SHAPE);
        t.insert(30, [10, 11, 12].into_iter().collect()).unwrap();
        t.insert(4, [99, 100].into_iter().collect()).unwrap();
        t.insert(12, [12, 13, 14, 50].into_iter().collect()).unwrap();
        t
    }

    #[test]
    fn test_filter_by_overlap() {
        let subject: VoxelSet = (10..=14).collect();
        let t = parcels();
        assert_eq!(filter_candidates(&subject, &t, 2), vec![12, 30]);
        assert_eq!(filter_candidates(&subject, &t, 3), vec![12, 30]);
        assert_eq!(filter_candidates(&subject, &t, 4), Vec::<ParcelId>::new());
    }

    #[test]
    fn test_zero_overlap_keeps_everything() {
        let t = parcels();
        assert_eq!(filter_candidates(&VoxelSet::new(), &t, 0), vec![4, 12, 30]);
    }

    #[test]
    fn test_own_percentile_per_seed_map() {
        // 两个种子图数值尺度相差很大, 但各自的第 50 百分位只保留各自上半部分.
        let mut small = vec![0.0f32; 120];
        let mut large = vec![0.0f32; 120];
        for (n, i) in (0..4).enumerate() {
            small[i] = (n + 1) as f32;
            large[i + 10] = ((n + 1) * 100) as f32;
        }
        let maps = SeedMapTable::from_volumes([
            (1, Volume::from_shape_vec(SHAPE, small)),
            (2, Volume::from_shape_vec(SHAPE, large)),
        ])
        .unwrap();

        let sets =
            build_candidate_seed_sets(&[1, 2], &maps, ThresholdRule::Percentile(50.0)).unwrap();
        assert_eq!(sets[&1].as_slice(), &[2, 3]);
        assert_eq!(sets[&2].as_slice(), &[12, 13]);

        let sets = build_candidate_seed_sets(&[2], &maps, ThresholdRule::Absolute(200.0)).unwrap();
        assert_eq!(sets[&2].as_slice(), &[11, 12, 13]);
    }

    #[test]
    fn test_missing_seed_map() {
        let maps = SeedMapTable::from_volumes([(1, Volume::from_voxels(SHAPE, [0], 1.0))]).unwrap();
        assert!(matches!(
            build_candidate_seed_sets(&[1, 7], &maps, ThresholdRule::Percentile(90.0)),
            Err(EpiError::MissingKey(7))
        ));
    }

    #[test]
    fn test_all_zero_seed_map() {
        let empty = Volume::from_voxels(SHAPE, std::iter::empty(), 1.0);
        let maps = SeedMapTable::from_volumes([(1, empty)]).unwrap();
        assert!(matches!(
            build_candidate_seed_sets(&[1], &maps, ThresholdRule::Percentile(90.0)),
            Err(EpiError::EmptyInput)
        ));
    }
}
