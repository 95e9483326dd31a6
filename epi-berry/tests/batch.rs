use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use epi_berry::prelude::*;

const SHAPE: Idx3d = (5, 5, 5);

/// 以路径为键的内存体数据加载器.
struct MemLoader(HashMap<PathBuf, Volume>);

impl VolumeLoader for MemLoader {
    fn load(&self, path: &Path) -> EpiResult<Volume> {
        self.0
            .get(path)
            .cloned()
            .ok_or_else(|| {
                EpiError::InvalidParameter(format!("no such subject {}", path.display()))
            })
    }
}

fn tables() -> (ParcelTable, SeedMapTable) {
    let mut parcels = ParcelTable::new(SHAPE);
    parcels.insert(1, [10, 11, 12].into_iter().collect()).unwrap();
    parcels.insert(2, [99, 100].into_iter().collect()).unwrap();
    parcels.insert(3, [40, 41, 42, 43].into_iter().collect()).unwrap();
    let maps = SeedMapTable::from_volumes([
        (1, Volume::from_voxels(SHAPE, [10, 11, 12, 15], 4.0)),
        (2, Volume::from_voxels(SHAPE, [99, 100], 4.0)),
        (3, Volume::from_voxels(SHAPE, [40, 41, 42, 43], 4.0)),
    ])
    .unwrap();
    (parcels, maps)
}

fn loader(n: usize) -> (MemLoader, Vec<PathBuf>) {
    let mut map = HashMap::new();
    let mut subjects = Vec::new();
    for s in 0..n {
        let path = PathBuf::from(format!("/subjects/sub-{s:02}/wmap.nii"));
        let voxels: Vec<u32> = if s % 2 == 0 {
            (10..=14).collect()
        } else {
            (40..=43).collect()
        };
        map.insert(path.clone(), Volume::from_voxels(SHAPE, voxels, 3.0).unwrap());
        subjects.push(path);
    }
    (MemLoader(map), subjects)
}

#[test]
fn test_concurrent_lines_are_whole() {
    let (parcels, maps) = tables();
    let (loader, mut subjects) = loader(16);
    subjects.push(PathBuf::from("/subjects/missing/wmap.nii"));

    let params = EpicenterParams {
        min_overlap: 2,
        ..Default::default()
    };
    let finder = EpicenterFinder::new(&parcels, &maps, loader, params).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let report = dir.path().join("report.txt");
    let writer = ReportWriter::append_to_file(&report).unwrap();
    let summary = run_all(&finder, &subjects, &writer, NonZeroUsize::new(4).unwrap()).unwrap();
    drop(writer);

    assert_eq!(summary.written, 16);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.total(), subjects.len());
    let (failed, err) = &summary.failures[0];
    assert_eq!(failed, &PathBuf::from("/subjects/missing/wmap.nii"));
    assert_eq!(err.stage(), Some(Stage::Load));

    let text = std::fs::read_to_string(&report).unwrap();
    let mut lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), subjects.len() - summary.failures.len());
    lines.sort_unstable();
    for (s, line) in lines.iter().enumerate() {
        let expected = if s % 2 == 0 {
            format!("/subjects/sub-{s:02}/wmap.nii 1 0.667")
        } else {
            format!("/subjects/sub-{s:02}/wmap.nii 3 1.000")
        };
        assert_eq!(*line, expected);
    }
}

#[test]
fn test_two_subjects_single_worker() {
    let (parcels, maps) = tables();
    let (loader, subjects) = loader(2);
    let params = EpicenterParams {
        min_overlap: 2,
        z_scores: true,
        ..Default::default()
    };
    let finder = EpicenterFinder::new(&parcels, &maps, loader, params).unwrap();

    let writer = ReportWriter::new(Vec::<u8>::new());
    let summary = run_all(&finder, &subjects, &writer, NonZeroUsize::new(1).unwrap()).unwrap();
    assert_eq!(summary.written, 2);
    assert!(summary.failures.is_empty());

    let text = String::from_utf8(writer.into_inner()).unwrap();
    let mut lines: Vec<&str> = text.lines().collect();
    lines.sort_unstable();
    // 只有一个候选时标准差为零, z 值没有定义
    assert_eq!(
        lines,
        vec![
            "/subjects/sub-00/wmap.nii 1 0.667 nan",
            "/subjects/sub-01/wmap.nii 3 1.000 nan",
        ]
    );
}
