//! 运行时错误.

use std::fmt;
use std::io::Error as IoError;

use ndarray_npy::{ReadNpzError, WriteNpzError};
use quick_error::quick_error;

use crate::{Idx3d, ParcelId};

/// 病灶定位流程中的阶段. 用于标注错误发生的位置.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Stage {
    /// 读取 wmap 或掩膜.
    Load,

    /// 提取 wmap 体素集合.
    Extract,

    /// 按重叠筛选候选脑区.
    Filter,

    /// 阈值化候选脑区的种子图.
    Threshold,

    /// 计算 Dice 系数并排序.
    Rank,

    /// 写入报告.
    Report,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Extract => "extract",
            Stage::Filter => "filter",
            Stage::Threshold => "threshold",
            Stage::Rank => "rank",
            Stage::Report => "report",
        };
        f.write_str(name)
    }
}

quick_error! {
    /// 该 crate 所有错误类型.
    #[derive(Debug)]
    pub enum EpiError {
        /// 在空集 (或全背景) 上计算百分位数等统计量.
        EmptyInput {
            display("statistic requested over an empty or all-background value set")
        }

        /// 两个操作数都是空集时计算 Dice 系数.
        DegenerateInput {
            display("Dice coefficient is undefined for two empty sets")
        }

        /// 需要体素索引集合的地方传入了文本.
        TypeMismatch(found: &'static str) {
            display("expected a collection of voxel indices, found {}", found)
        }

        /// 候选脑区在查找表中不存在.
        MissingKey(id: ParcelId) {
            display("parcel {} is missing from the lookup table", id)
        }

        /// 体素网格形状不一致.
        ShapeMismatch(expected: Idx3d, found: Idx3d) {
            display("grid shape mismatch: expected {:?}, found {:?}", expected, found)
        }

        /// 图像不是三维体数据.
        NotVolume(ndim: usize) {
            display("expected a 3D volume, found {} dimension(s)", ndim)
        }

        /// 体素索引越出网格范围.
        OutOfGrid(index: u32, len: usize) {
            display("voxel index {} is outside of a grid of {} voxels", index, len)
        }

        /// 参数不合法.
        InvalidParameter(what: String) {
            display("invalid parameter: {}", what)
        }

        /// 底层 I/O 错误.
        Io(err: IoError) {
            from()
            source(err)
            display("I/O error: {}", err)
        }

        /// 读取 nifti 文件错误.
        Nifti(err: nifti::NiftiError) {
            from()
            source(err)
            display("nifti error: {}", err)
        }

        /// 读取 npz 归档错误.
        ReadNpz(err: ReadNpzError) {
            from()
            source(err)
            display("npz read error: {}", err)
        }

        /// 写入 npz 归档错误.
        WriteNpz(err: WriteNpzError) {
            from()
            source(err)
            display("npz write error: {}", err)
        }

        /// 查找表缓存 (bincode) 错误.
        Cache(err: bincode::Error) {
            from()
            source(err)
            display("table cache error: {}", err)
        }

        /// 在流程的某一阶段发生的错误.
        InStage(stage: Stage, err: Box<EpiError>) {
            source(&**err)
            display("{} stage failed: {}", stage, err)
        }
    }
}

impl EpiError {
    /// 获取错误发生的阶段. 未标注时返回 `None`.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            EpiError::InStage(stage, _) => Some(*stage),
            _ => None,
        }
    }

    /// 剥去阶段标注, 获取最内层错误.
    pub fn root(&self) -> &EpiError {
        match self {
            EpiError::InStage(_, inner) => inner.root(),
            other => other,
        }
    }
}

/// 该 crate 结果类型.
pub type EpiResult<T> = Result<T, EpiError>;

/// 为结果标注流程阶段.
pub trait AtStage<T> {
    /// 若为 `Err`, 则包装为 [`EpiError::InStage`]. 已标注的错误保持不变.
    fn at(self, stage: Stage) -> EpiResult<T>;
}

impl<T, E: Into<EpiError>> AtStage<T> for Result<T, E> {
    fn at(self, stage: Stage) -> EpiResult<T> {
        self.map_err(|e| match e.into() {
            tagged @ EpiError::InStage(..) => tagged,
            err => EpiError::InStage(stage, Box::new(err)),
        })
    }
}
