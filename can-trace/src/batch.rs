//! Offline batch runner
//!
//! Discovers the input files of a directory and hands each one to a
//! [`FileJob`]. Files are independent, so they may run on the rayon pool.
//! Outputs go through [`AtomicOutput`]: a file is either fully written or
//! left as it was.

use crate::config::BatchConfig;
use crate::types::Result;
use rayon::prelude::*;
use std::fmt;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; files in progress discard their output
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What happened to one input file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Output written; malformed rows were skipped
    Converted { rows: usize, skipped_rows: usize },
    /// File is not an input for this job
    Skipped { reason: String },
    /// File could not be processed; any original is untouched
    Failed { error: String },
    /// Cancelled before completion; partial output discarded
    Cancelled,
}

impl fmt::Display for FileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileOutcome::Converted { rows, skipped_rows: 0 } => write!(f, "converted ({} rows)", rows),
            FileOutcome::Converted { rows, skipped_rows } => {
                write!(f, "converted ({} rows, {} malformed rows skipped)", rows, skipped_rows)
            }
            FileOutcome::Skipped { reason } => write!(f, "skipped: {}", reason),
            FileOutcome::Failed { error } => write!(f, "failed: {}", error),
            FileOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Per-file report line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub path: PathBuf,
    pub outcome: FileOutcome,
}

/// Per-file results of one batch run, in discovery order
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub reports: Vec<FileReport>,
}

impl BatchSummary {
    pub fn converted(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Converted { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Failed { .. }))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Cancelled))
    }

    /// Malformed rows skipped across all converted files
    pub fn skipped_rows(&self) -> usize {
        self.reports
            .iter()
            .map(|r| match r.outcome {
                FileOutcome::Converted { skipped_rows, .. } => skipped_rows,
                _ => 0,
            })
            .sum()
    }

    /// Look up the outcome for a file
    pub fn outcome(&self, path: &Path) -> Option<&FileOutcome> {
        self.reports.iter().find(|r| r.path == path).map(|r| &r.outcome)
    }

    fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
        self.reports.iter().filter(|r| pred(&r.outcome)).count()
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} converted, {} skipped, {} failed",
            self.converted(),
            self.skipped(),
            self.failed()
        )?;
        if self.cancelled() > 0 {
            write!(f, ", {} cancelled", self.cancelled())?;
        }
        Ok(())
    }
}

/// A transformation applied to each discovered file
pub trait FileJob: Sync {
    /// Short name used in log messages
    fn name(&self) -> &'static str;

    /// Process one file
    ///
    /// Errors are reported as [`FileOutcome::Failed`] for that file only.
    fn process(&self, path: &Path, cancel: &CancelToken) -> Result<FileOutcome>;
}

/// List regular files in `dir` with the given extension (case-insensitive), sorted
pub fn discover_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let wanted = extension.trim_start_matches('.').to_ascii_lowercase();
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase() == wanted)
            .unwrap_or(false);
        if matches {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// Run `job` over every matching file of `config.directory`
pub fn run_batch<J: FileJob>(job: &J, config: &BatchConfig, cancel: &CancelToken) -> Result<BatchSummary> {
    let files = discover_files(&config.directory, &config.extension)?;
    log::info!(
        "{}: {} .{} file(s) in {:?}",
        job.name(),
        files.len(),
        config.extension,
        config.directory
    );

    let run = |path: &PathBuf| FileReport {
        path: path.clone(),
        outcome: run_one(job, path, cancel),
    };

    let reports: Vec<FileReport> = if config.parallel {
        files.par_iter().map(run).collect()
    } else {
        files.iter().map(run).collect()
    };

    let summary = BatchSummary { reports };
    log::info!("{}: {}", job.name(), summary);
    Ok(summary)
}

fn run_one<J: FileJob>(job: &J, path: &Path, cancel: &CancelToken) -> FileOutcome {
    if cancel.is_cancelled() {
        return FileOutcome::Cancelled;
    }

    let outcome = job.process(path, cancel).unwrap_or_else(|e| FileOutcome::Failed {
        error: e.to_string(),
    });

    match &outcome {
        FileOutcome::Failed { .. } => log::error!("{}: {:?} {}", job.name(), path, outcome),
        FileOutcome::Skipped { .. } => log::debug!("{}: {:?} {}", job.name(), path, outcome),
        _ => log::info!("{}: {:?} {}", job.name(), path, outcome),
    }
    outcome
}

/// Buffered output that replaces its target only on [`AtomicOutput::commit`]
///
/// Data goes to a temporary file in the target's directory; commit renames it
/// over the target. Dropping without commit deletes the temporary file.
pub struct AtomicOutput {
    target: PathBuf,
    writer: BufWriter<NamedTempFile>,
}

impl AtomicOutput {
    pub fn create(target: &Path) -> Result<Self> {
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let temp = NamedTempFile::new_in(dir)?;
        Ok(Self {
            target: target.to_path_buf(),
            writer: BufWriter::new(temp),
        })
    }

    /// Flush, sync and move the output into place
    pub fn commit(self) -> Result<()> {
        let temp = self.writer.into_inner().map_err(|e| e.into_error())?;
        temp.as_file().sync_all()?;

        // Rewriting in place keeps the original's permissions
        if let Ok(metadata) = fs::metadata(&self.target) {
            fs::set_permissions(temp.path(), metadata.permissions())?;
        }

        temp.persist(&self.target).map_err(|e| e.error)?;
        Ok(())
    }
}

impl Write for AtomicOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
