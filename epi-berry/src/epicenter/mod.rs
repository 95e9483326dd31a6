//! 病灶中心定位.
//!
//! 对单个被试依次执行:
//!
//! 1. 读取 wmap, 在灰质掩膜内按阈值提取被试体素集合;
//! 2. 按重叠体素个数筛选候选脑区;
//! 3. 对每个候选脑区的种子图阈值化;
//! 4. 计算 Dice 系数, 排序后取前 K 个.
//!
//! 查找表在进程内只构建一次, 以引用方式注入 [`EpicenterFinder`], 之后只读.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::consts::{
    DEFAULT_FC_PERCENTILE, DEFAULT_MIN_OVERLAP, DEFAULT_TOP_K, DEFAULT_W_THRESHOLD,
};
use crate::data::{extract, Bound, Grid, ThresholdRule, Volume, VolumeLoader, VoxelPredicate};
use crate::dataset::{ParcelTable, SeedMapSource};
use crate::error::{AtStage, EpiResult, Stage};

pub mod candidate;
pub mod dice;

pub use candidate::{build_candidate_seed_sets, filter_candidates};
pub use dice::{dice, rank, Ranking, ScoreRecord};

/// 定位参数.
///
/// `Default` 即标准批处理配置: wmap 绝对阈值 2.0 (含), 最小重叠 10 个体素,
/// 种子图第 90 百分位, 报告前 10 个候选.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EpicenterParams {
    /// wmap 阈值规则.
    pub w_threshold: ThresholdRule,
    /// wmap 阈值比较方式.
    pub bound: Bound,
    /// 候选脑区与被试体素集合的最小重叠体素个数.
    pub min_overlap: usize,
    /// 种子图阈值规则.
    pub seed_threshold: ThresholdRule,
    /// 报告的候选个数.
    pub top_k: usize,
    /// 是否在报告中附加 z 值.
    pub z_scores: bool,
}

impl Default for EpicenterParams {
    fn default() -> Self {
        Self {
            w_threshold: ThresholdRule::Absolute(DEFAULT_W_THRESHOLD),
            bound: Bound::Inclusive,
            min_overlap: DEFAULT_MIN_OVERLAP,
            seed_threshold: ThresholdRule::Percentile(DEFAULT_FC_PERCENTILE),
            top_k: DEFAULT_TOP_K,
            z_scores: false,
        }
    }
}

impl EpicenterParams {
    /// 检查参数合法性.
    pub fn validate(&self) -> EpiResult<()> {
        self.w_threshold.validate()?;
        self.seed_threshold.validate()
    }
}

/// 病灶中心定位器.
///
/// 持有两张查找表与 (可选的) 灰质掩膜的只读引用, 可在多个线程间共享.
pub struct EpicenterFinder<'a, S, L> {
    parcels: &'a ParcelTable,
    seed_maps: &'a S,
    mask: Option<&'a Volume>,
    loader: L,
    params: EpicenterParams,
}

impl<'a, S: SeedMapSource, L: VolumeLoader> EpicenterFinder<'a, S, L> {
    /// 初始化. 两张查找表网格形状不一致或参数不合法时返回 `Err`.
    pub fn new(
        parcels: &'a ParcelTable,
        seed_maps: &'a S,
        loader: L,
        params: EpicenterParams,
    ) -> EpiResult<Self> {
        params.validate()?;
        parcels.same_grid(seed_maps)?;
        Ok(Self {
            parcels,
            seed_maps,
            mask: None,
            loader,
            params,
        })
    }

    /// 限定在掩膜 `mask` 内提取被试体素集合. 掩膜网格形状必须与查找表一致.
    pub fn with_mask(mut self, mask: &'a Volume) -> EpiResult<Self> {
        self.parcels.same_grid(mask)?;
        self.mask = Some(mask);
        Ok(self)
    }

    /// 定位参数.
    #[inline]
    pub fn params(&self) -> &EpicenterParams {
        &self.params
    }

    /// 对已载入的 wmap 执行定位流程.
    ///
    /// 每个阶段的错误都会以 [`Stage`] 标注.
    pub fn find(&self, wmap: &Volume) -> EpiResult<Ranking> {
        let p = &self.params;

        let pred = match self.mask {
            Some(mask) => VoxelPredicate::MaskedThreshold {
                mask,
                rule: p.w_threshold,
                bound: p.bound,
            },
            None => VoxelPredicate::Threshold {
                rule: p.w_threshold,
                bound: p.bound,
            },
        };
        let subject = self
            .parcels
            .same_grid(wmap)
            .and_then(|_| extract(wmap, &pred))
            .at(Stage::Extract)?;
        log::debug!("subject set: {} voxels", subject.len());

        let candidates = filter_candidates(&subject, self.parcels, p.min_overlap);
        log::debug!("{} candidate parcels", candidates.len());

        let seed_sets = build_candidate_seed_sets(&candidates, self.seed_maps, p.seed_threshold)
            .at(Stage::Threshold)?;

        rank(&subject, &seed_sets, p.top_k).at(Stage::Rank)
    }

    /// 读取 `path` 处的 wmap 并执行定位流程, 得到一行报告.
    pub fn run_one<P: AsRef<Path>>(&self, path: P) -> EpiResult<ReportLine> {
        let path = path.as_ref();
        let wmap = self.loader.load(path).at(Stage::Load)?;
        let ranking = self.find(&wmap)?;
        log::info!(
            "{}: {} candidates, best {:?}",
            path.display(),
            ranking.candidates,
            ranking.top.first().map(|r| r.id)
        );
        Ok(ReportLine {
            subject: path.to_owned(),
            ranking,
            z_scores: self.params.z_scores,
        })
    }
}

/// 一个被试的报告行.
///
/// 格式为 `<wmap 路径> <脑区编号...> <Dice 系数...>`, 以空格分隔,
/// 两个列表都按报告顺序排列, 系数保留三位小数.
/// 开启 z 值时, 第三个列表为对应的 z 值 (无定义时为 `nan`).
#[derive(Clone, Debug, PartialEq)]
pub struct ReportLine {
    /// wmap 路径.
    pub subject: PathBuf,
    /// 排序结果.
    pub ranking: Ranking,
    /// 是否附加 z 值.
    pub z_scores: bool,
}

impl fmt::Display for ReportLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.subject.display())?;
        for r in self.ranking.top.iter() {
            write!(f, " {}", r.id)?;
        }
        for r in self.ranking.top.iter() {
            write!(f, " {:.3}", r.coef)?;
        }
        if self.z_scores {
            for r in self.ranking.top.iter() {
                match self.ranking.z_score(r) {
                    Some(z) => write!(f, " {z:.3}")?,
                    None => f.write_str(" nan")?,
                }
            }
        }
        Ok(())
    }
}
