//! CSV to TRC export
//!
//! Reads a captured CSV table (`Timestamp, ID, Length, D1..D8` columns, any
//! order, extra columns ignored) and writes a sibling `.trc` file:
//!
//! ```text
//! Time ID DLC Data Comment
//! 12.345 256 3 01 02 03
//! ```
//!
//! Every frame line ends with a space before the newline: the Comment column
//! is left empty and trace viewers rely on the column spacing.

use super::TabularRecord;
use crate::batch::{AtomicOutput, CancelToken, FileJob, FileOutcome};
use crate::types::{Result, RowFault, TraceError, MAX_DATA_LEN};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::io::Write;
use std::path::{Path, PathBuf};

/// First line of every TRC file
pub const TRC_HEADER: &str = "Time ID DLC Data Comment";

impl TabularRecord {
    /// Render as a TRC frame line (without the newline)
    pub fn to_trc_line(&self) -> String {
        format!(
            "{} {} {} {} ",
            self.timestamp,
            self.identifier,
            self.length,
            self.data.join(" ").to_uppercase()
        )
    }
}

/// Column positions resolved from the CSV header
#[derive(Debug, Clone, PartialEq, Eq)]
struct TrcColumns {
    timestamp: usize,
    identifier: usize,
    length: usize,
    data: [Option<usize>; MAX_DATA_LEN],
}

impl TrcColumns {
    fn resolve(headers: &StringRecord, path: &Path) -> Result<Self> {
        let find = |name: &str| headers.iter().position(|h| h == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| TraceError::MissingColumn {
                path: path.to_path_buf(),
                column: name.to_string(),
            })
        };

        let mut data = [None; MAX_DATA_LEN];
        for (i, slot) in data.iter_mut().enumerate() {
            *slot = find(format!("D{}", i + 1).as_str());
        }

        Ok(Self {
            timestamp: require("Timestamp")?,
            identifier: require("ID")?,
            length: require("Length")?,
            data,
        })
    }

    /// Extract and trim one row
    fn record(&self, row: &StringRecord) -> std::result::Result<TabularRecord, RowFault> {
        let needed = self.timestamp.max(self.identifier).max(self.length) + 1;
        if row.len() < needed {
            return Err(RowFault::TooFewColumns {
                expected: needed,
                found: row.len(),
            });
        }

        // Data columns count up to the first one the row does not reach
        let data: Vec<&str> = self
            .data
            .iter()
            .map_while(|column| column.and_then(|c| row.get(c)))
            .collect();

        TabularRecord::new(&row[self.timestamp], &row[self.identifier], &row[self.length], &data)
    }

    /// Like [`TrcColumns::record`], reporting faults against the row's source line
    fn row(&self, row: &StringRecord, path: &Path) -> Result<TabularRecord> {
        self.record(row).map_err(|fault| TraceError::MalformedRow {
            path: path.to_path_buf(),
            row: row.position().map_or(0, |p| p.line() as usize),
            fault,
        })
    }
}

/// Converts captured CSV tables into TRC text files
#[derive(Debug, Clone, Copy, Default)]
pub struct TrcExporter;

impl TrcExporter {
    pub fn new() -> Self {
        Self
    }

    /// Output path for an input table
    pub fn output_path(input: &Path) -> PathBuf {
        input.with_extension("trc")
    }

    /// Convert `input` into `output`
    ///
    /// The output appears only once the whole table has been converted.
    pub fn export(&self, input: &Path, output: &Path, cancel: &CancelToken) -> Result<FileOutcome> {
        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .trim(Trim::All)
            .from_path(input)?;
        let columns = TrcColumns::resolve(reader.headers()?, input)?;

        let mut out = AtomicOutput::create(output)?;
        writeln!(out, "{}", TRC_HEADER)?;

        let mut rows = 0;
        let mut skipped_rows = 0;
        let mut record = StringRecord::new();

        loop {
            if cancel.is_cancelled() {
                log::info!("Export of {:?} cancelled, discarding partial output", input);
                return Ok(FileOutcome::Cancelled);
            }

            let fault = match reader.read_record(&mut record) {
                Ok(false) => break,
                Ok(true) => match columns.row(&record, input) {
                    Ok(frame) => {
                        writeln!(out, "{}", frame.to_trc_line())?;
                        rows += 1;
                        continue;
                    }
                    Err(fault) => fault,
                },
                // Undecodable row; the reader resumes at the next record
                Err(e) if !e.is_io_error() => TraceError::from(e),
                Err(e) => return Err(e.into()),
            };

            log::warn!("Skipping row: {}", fault);
            skipped_rows += 1;
        }

        out.commit()?;
        Ok(FileOutcome::Converted { rows, skipped_rows })
    }
}

impl FileJob for TrcExporter {
    fn name(&self) -> &'static str {
        "export-trc"
    }

    fn process(&self, path: &Path, cancel: &CancelToken) -> Result<FileOutcome> {
        let output = Self::output_path(path);
        log::debug!("Converting {:?} to {:?}", path, output);
        self.export(path, &output, cancel)
    }
}
