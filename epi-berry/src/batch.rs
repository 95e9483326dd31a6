//! 批处理: 多个被试并行定位, 报告行追加到同一个输出.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::data::VolumeLoader;
use crate::dataset::SeedMapSource;
use crate::epicenter::{EpicenterFinder, ReportLine};
use crate::error::{AtStage, EpiError, EpiResult, Stage};

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
    } else {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::thread;
    }
}

/// 报告输出. 多个线程共享, 每行的格式化、写入与刷新在同一把锁内完成,
/// 因此行与行之间不会交错.
#[derive(Debug)]
pub struct ReportWriter<W> {
    inner: Mutex<W>,
}

impl<W: Write> ReportWriter<W> {
    /// 包装任意 `Write`.
    pub fn new(inner: W) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// 追加一行报告并立即刷新.
    ///
    /// 其它线程在持锁期间 panic 不会影响后续写入.
    pub fn append(&self, line: &ReportLine) -> EpiResult<()> {
        let mut w = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(w, "{line}")?;
        w.flush()?;
        Ok(())
    }

    /// 消费自我, 获得底层输出.
    pub fn into_inner(self) -> W {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ReportWriter<File> {
    /// 以追加模式打开 (必要时创建) 报告文件 `path`.
    pub fn append_to_file<P: AsRef<Path>>(path: P) -> EpiResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self::new(file))
    }
}

/// 批处理结果汇总.
#[derive(Debug, Default)]
pub struct BatchSummary {
    /// 成功写入的报告行数.
    pub written: usize,
    /// 失败的被试及其错误.
    pub failures: Vec<(PathBuf, EpiError)>,
}

impl BatchSummary {
    /// 处理的被试总数.
    #[inline]
    pub fn total(&self) -> usize {
        self.written + self.failures.len()
    }

    fn record(&mut self, subject: &Path, outcome: EpiResult<()>) {
        match outcome {
            Ok(()) => self.written += 1,
            Err(e) => {
                log::warn!("{}: {e}", subject.display());
                self.failures.push((subject.to_owned(), e));
            }
        }
    }
}

/// 读取被试列表文件: 每行一个 wmap 路径, 去除首尾空白, 跳过空行.
pub fn read_subject_list<P: AsRef<Path>>(path: P) -> EpiResult<Vec<PathBuf>> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    let mut ans = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if !line.is_empty() {
            ans.push(PathBuf::from(line));
        }
    }
    Ok(ans)
}

/// 处理单个被试并写入报告.
fn process<S, L, W>(
    finder: &EpicenterFinder<'_, S, L>,
    writer: &ReportWriter<W>,
    subject: &Path,
) -> EpiResult<()>
where
    S: SeedMapSource,
    L: VolumeLoader,
    W: Write,
{
    let line = finder.run_one(subject)?;
    writer.append(&line).at(Stage::Report)
}

/// 借助 `rayon` 线程池并行处理所有被试.
#[cfg(feature = "rayon")]
fn process_all<'s, S, L, W>(
    finder: &EpicenterFinder<'_, S, L>,
    subjects: &'s [PathBuf],
    writer: &ReportWriter<W>,
    workers: NonZeroUsize,
) -> EpiResult<Vec<(&'s Path, EpiResult<()>)>>
where
    S: SeedMapSource,
    L: VolumeLoader,
    W: Write + Send,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.get())
        .build()
        .map_err(|e| EpiError::InvalidParameter(format!("worker pool: {e}")))?;
    Ok(pool.install(|| {
        subjects
            .par_iter()
            .map(|s| (s.as_path(), process(finder, writer, s)))
            .collect()
    }))
}

/// 工作线程从共享游标依次领取被试.
#[cfg(not(feature = "rayon"))]
fn process_all<'s, S, L, W>(
    finder: &EpicenterFinder<'_, S, L>,
    subjects: &'s [PathBuf],
    writer: &ReportWriter<W>,
    workers: NonZeroUsize,
) -> EpiResult<Vec<(&'s Path, EpiResult<()>)>>
where
    S: SeedMapSource,
    L: VolumeLoader,
    W: Write + Send,
{
    let cursor = AtomicUsize::new(0);
    let n = workers.get().min(subjects.len()).max(1);
    Ok(thread::scope(|sc| {
        let handles: Vec<_> = (0..n)
            .map(|_| {
                sc.spawn(|| {
                    let mut done = Vec::new();
                    while let Some(s) = subjects.get(cursor.fetch_add(1, Ordering::Relaxed)) {
                        done.push((s.as_path(), process(finder, writer, s)));
                    }
                    done
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
            .collect()
    }))
}

/// 使用 `workers` 个工作线程处理所有被试.
///
/// 单个被试失败不会中止批处理: 错误被记录到 [`BatchSummary`] 并以 `warn` 级别输出.
/// 报告行之间没有顺序保证.
///
/// 仅当工作线程池无法创建时返回 `Err`.
pub fn run_all<S, L, W>(
    finder: &EpicenterFinder<'_, S, L>,
    subjects: &[PathBuf],
    writer: &ReportWriter<W>,
    workers: NonZeroUsize,
) -> EpiResult<BatchSummary>
where
    S: SeedMapSource,
    L: VolumeLoader,
    W: Write + Send,
{
    log::info!(
        "processing {} subjects with {workers} workers",
        subjects.len()
    );

    let outcomes = process_all(finder, subjects, writer, workers)?;

    let mut summary = BatchSummary::default();
    for (subject, outcome) in outcomes {
        summary.record(subject, outcome);
    }
    log::info!(
        "{} of {} subjects written, {} failed",
        summary.written,
        summary.total(),
        summary.failures.len()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_subject_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subjects.txt");
        std::fs::write(&path, "  /a/wmap.nii \n\n/b/wmap.nii.gz\n   \n").unwrap();
        assert_eq!(
            read_subject_list(&path).unwrap(),
            vec![PathBuf::from("/a/wmap.nii"), PathBuf::from("/b/wmap.nii.gz")]
        );
    }

    #[test]
    fn test_report_writer_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");
        std::fs::write(&path, "existing\n").unwrap();

        let w = ReportWriter::append_to_file(&path).unwrap();
        let line = ReportLine {
            subject: PathBuf::from("s1"),
            ranking: crate::epicenter::Ranking::EMPTY,
            z_scores: false,
        };
        w.append(&line).unwrap();
        drop(w);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "existing\ns1\n");
    }
}
