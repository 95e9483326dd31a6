//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx3d, ParcelId};

pub use crate::data::{
    extract, AsVoxelSet, Bound, Grid, NiftiLoader, ThresholdRule, Volume, VolumeLoader,
    VoxelPredicate, VoxelSet,
};

pub use crate::consts::grid::MNI_2MM_SHAPE;
pub use crate::consts::{DEFAULT_MASK_FILENAME, PARCEL_TABLE_FILENAME, SEED_MAP_ARCHIVE_FILENAME};

pub use crate::dataset::home_dataset_dir_with;
pub use crate::dataset::{
    self, LookupTables, NpzSeedMaps, ParcelTable, SeedMapSource, SeedMapTable,
};

pub use crate::epicenter::{
    dice, rank, EpicenterFinder, EpicenterParams, Ranking, ReportLine, ScoreRecord,
};

pub use crate::batch::{read_subject_list, run_all, BatchSummary, ReportWriter};

pub use crate::error::{AtStage, EpiError, EpiResult, Stage};
