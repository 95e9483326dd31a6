//! 运行结果.

use epi_berry::batch::BatchSummary;
use epi_berry::epicenter::ReportLine;
use epi_berry::error::EpiError;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

/// 一次运行的最终结果.
pub enum RunResult {
    /// 批处理完成 (可能包含失败的被试).
    Batch(BatchSummary),

    /// 单个被试完成. 若未指定输出文件, 则报告行尚未打印.
    Single {
        /// 报告行.
        line: ReportLine,
        /// 报告行是否已写入文件.
        written: bool,
    },

    /// 参数、查找表或掩膜不可用.
    Setup(EpiError),

    /// 单个被试失败.
    Subject(PathBuf, EpiError),
}

/// 将批处理汇总写进 `w` 中.
fn describe_into<W: Write>(s: &BatchSummary, w: &mut W) -> io::Result<()> {
    const S4: &str = "    ";

    writeln!(w, "Batch summary:")?;
    writeln!(w, "{S4}Subjects: {}", s.total())?;
    writeln!(w, "{S4}Lines written: {}", s.written)?;
    write!(w, "{S4}Failed: {}", s.failures.len())?;
    for (subject, e) in s.failures.iter() {
        write!(w, "\n{S4}{S4}{}: {e}", subject.display())?;
    }
    Ok(())
}

impl RunResult {
    /// 输出运行结果.
    pub fn analyze(&self) {
        match self {
            RunResult::Batch(s) => {
                let mut out = io::stdout().lock();
                let _ = utils::sep_to(&mut out)
                    .and_then(|_| describe_into(s, &mut out))
                    .and_then(|_| writeln!(out))
                    .and_then(|_| utils::sep_to(&mut out));
            }
            RunResult::Single { line, written } => {
                if !*written {
                    println!("{line}");
                }
            }
            RunResult::Setup(e) => eprintln!("error: {e}"),
            RunResult::Subject(subject, e) => eprintln!("{}: {e}", subject.display()),
        }
    }

    /// 进程退出码: 成功 (包括部分被试失败的批处理) 为 0, 准备阶段失败为 1,
    /// 单个被试失败为 2.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            RunResult::Batch(_) | RunResult::Single { .. } => ExitCode::SUCCESS,
            RunResult::Setup(_) => ExitCode::from(1),
            RunResult::Subject(..) => ExitCode::from(2),
        }
    }
}
