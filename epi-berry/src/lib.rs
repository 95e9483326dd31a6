#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 根据被试的脑损伤图 (wmap) 与健康人群功能连接种子图,
//! 定位最可能作为病灶中心 (epicenter) 的解剖脑区.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 所有体数据都必须位于同一标准空间网格 (默认为 MNI152 2mm, `91 * 109 * 91`).
//!   该 crate 不做任何配准.
//! 2. 在非期望输入下, 程序返回 [`EpiError`], 而不会 panic.
//! 3. 给定相同输入, 输出完全可复现 (与线程数无关, 但报告行之间没有顺序保证).
//!
//! # 开发计划
//!
//! ### 体素集合提取 ✅
//!
//! 阈值 (含/不含), 掩膜, 二者组合, 以及仅在非背景体素上计算的百分位阈值.
//!
//! 实现位于 `epi-berry/src/data`.
//!
//! ### 脑区与种子图查找表 ✅
//!
//! 由 `vol_{id}.nii` 与 `1ST_vol_{id}/spmT_0001.nii` 构建,
//! 分别缓存为 `parcels.bin` (bincode) 与 `seedmaps.npz`.
//!
//! 实现位于 `epi-berry/src/dataset`.
//!
//! ### 候选脑区筛选, 种子图阈值化, Dice 排序 ✅
//!
//! 1. 按重叠体素个数筛选候选; ✅
//! 2. 每个候选的种子图按其自身分布的百分位 (或绝对 z 值) 阈值化; ✅
//! 3. Dice 系数保留三位小数, 系数相同时按脑区编号升序; ✅
//! 4. 报告所有候选系数的 z 值. ✅
//!
//! 实现位于 `epi-berry/src/epicenter`.
//!
//! ### 批处理 ✅
//!
//! 多被试并行, 报告行在互斥锁内追加, 单个被试失败不影响其它被试.
//!
//! 实现位于 `epi-berry/src/batch.rs`.
//!
//! ### 完善代码文档 ✅
//!
//! 给每个 public API 提供文档, 并视情况给 private
//! API 提供文档.

/// 三维索引, 按 NIfTI `(i, j, k)` 顺序.
pub type Idx3d = (usize, usize, usize);

/// 脑区编号.
pub type ParcelId = u32;

/// nii 体数据与体素集合.
pub mod data;

pub use data::{Grid, NiftiLoader, Volume, VolumeLoader, VoxelSet};

pub mod batch;
pub mod consts;
pub mod dataset;
pub mod epicenter;
pub mod error;
pub mod prelude;

pub use error::{EpiError, EpiResult};
