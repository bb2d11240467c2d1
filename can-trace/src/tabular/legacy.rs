//! Legacy UTF-16 table normalization
//!
//! Older capture tools wrote headerless UTF-16 tables:
//!
//! ```text
//! timestamp,isSPI,identifier,isExtended,isRemote,length,D1,...,D8
//! ```
//!
//! The normalizer rewrites them in place as UTF-8 with the data columns
//! trimmed to `length`. Files that do not decode as UTF-16 are already
//! canonical and are left alone.

use super::{LegacyFlags, TabularRecord};
use crate::batch::{AtomicOutput, CancelToken, FileJob, FileOutcome};
use crate::types::{Result, RowFault, TraceError, MAX_DATA_LEN};
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Columns before the first data column
const LEADING_COLUMNS: usize = 6;

/// Decode a legacy UTF-16 table
///
/// A UTF-16 byte order mark selects the byte order. Without one the bytes
/// are tried as UTF-16LE and accepted only if they decode to plain ASCII,
/// which an ASCII/UTF-8 table never does. Returns `None` for anything else.
pub fn decode_legacy(bytes: &[u8]) -> Option<String> {
    let (encoding, body, has_bom): (&'static Encoding, &[u8], bool) = match Encoding::for_bom(bytes) {
        Some((encoding, bom_len)) if encoding == UTF_16LE || encoding == UTF_16BE => {
            (encoding, &bytes[bom_len..], true)
        }
        Some(_) => return None,
        None if bytes.is_empty() => return None,
        None => (UTF_16LE, bytes, false),
    };

    let text = encoding.decode_without_bom_handling_and_without_replacement(body)?;
    if !has_bom && !text.is_ascii() {
        return None;
    }
    Some(text.into_owned())
}

impl TabularRecord {
    /// Parse one headerless legacy row
    pub fn from_legacy_line(line: &str) -> std::result::Result<Self, RowFault> {
        let fields: Vec<&str> = line.trim().split(',').collect();
        if fields.len() < LEADING_COLUMNS {
            return Err(RowFault::TooFewColumns {
                expected: LEADING_COLUMNS,
                found: fields.len(),
            });
        }

        let data_end = fields.len().min(LEADING_COLUMNS + MAX_DATA_LEN);
        let flags = LegacyFlags {
            is_spi: fields[1].to_string(),
            is_extended: fields[3].to_string(),
            is_remote: fields[4].to_string(),
        };

        Ok(Self::new(fields[0], fields[2], fields[5], &fields[LEADING_COLUMNS..data_end])?.with_flags(flags))
    }

    /// Render in the legacy column order, comma separated
    ///
    /// Rows without flags write empty flag columns.
    pub fn to_legacy_line(&self) -> String {
        let (is_spi, is_extended, is_remote) = match &self.flags {
            Some(flags) => (flags.is_spi.as_str(), flags.is_extended.as_str(), flags.is_remote.as_str()),
            None => ("", "", ""),
        };

        let mut columns = vec![
            self.timestamp.clone(),
            is_spi.to_string(),
            self.identifier.clone(),
            is_extended.to_string(),
            is_remote.to_string(),
            self.length.to_string(),
        ];
        columns.extend(self.data.iter().cloned());
        columns.join(",")
    }
}

/// Rewrites legacy UTF-16 tables as trimmed UTF-8 in place
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodingNormalizer;

impl EncodingNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize one file in place
    ///
    /// The original stays untouched unless the rewrite completes.
    pub fn normalize(&self, path: &Path, cancel: &CancelToken) -> Result<FileOutcome> {
        let bytes = fs::read(path)?;
        let text = match decode_legacy(&bytes) {
            Some(text) => text,
            None => {
                let mismatch = TraceError::EncodingMismatch {
                    path: path.to_path_buf(),
                    expected: "UTF-16",
                };
                log::debug!("{}", mismatch);
                return Ok(FileOutcome::Skipped {
                    reason: "not a UTF-16 file".to_string(),
                });
            }
        };

        log::info!("Normalizing {:?}", path);

        let mut out = AtomicOutput::create(path)?;
        let mut rows = 0;
        let mut skipped_rows = 0;

        for (index, line) in text.lines().enumerate() {
            if cancel.is_cancelled() {
                log::info!("Normalization of {:?} cancelled, original kept", path);
                return Ok(FileOutcome::Cancelled);
            }
            if line.trim().is_empty() {
                continue;
            }

            match TabularRecord::from_legacy_line(line) {
                Ok(record) => {
                    writeln!(out, "{}", record.to_legacy_line())?;
                    rows += 1;
                }
                Err(fault) => {
                    let err = TraceError::MalformedRow {
                        path: path.to_path_buf(),
                        row: index + 1,
                        fault,
                    };
                    log::warn!("Skipping row: {}", err);
                    skipped_rows += 1;
                }
            }
        }

        // A table with no surviving rows still ends in a newline
        if rows == 0 {
            writeln!(out)?;
        }
        out.commit()?;
        Ok(FileOutcome::Converted { rows, skipped_rows })
    }
}

impl FileJob for EncodingNormalizer {
    fn name(&self) -> &'static str {
        "normalize"
    }

    fn process(&self, path: &Path, cancel: &CancelToken) -> Result<FileOutcome> {
        self.normalize(path, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn utf16le(text: &str, bom: bool) -> Vec<u8> {
        let mut bytes = if bom { vec![0xFF, 0xFE] } else { Vec::new() };
        for unit in text.encode_utf16() {
            bytes.extend(unit.to_le_bytes());
        }
        bytes
    }

    fn utf16be(text: &str) -> Vec<u8> {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in text.encode_utf16() {
            bytes.extend(unit.to_be_bytes());
        }
        bytes
    }

    #[test]
    fn test_legacy_row_scenario() {
        let record = TabularRecord::from_legacy_line("1.0,0,100,0,0,2,A,B,C,D,E,F,00,00").unwrap();
        assert_eq!(record.to_legacy_line(), "1.0,0,100,0,0,2,A,B");
        assert_eq!(record.data.len(), 2);
    }

    #[test]
    fn test_legacy_row_edge_cases() {
        let record = TabularRecord::from_legacy_line("5.5,1,7FF,1,0,0,11,22,33,44,55,66,77,88\r").unwrap();
        assert_eq!(record.to_legacy_line(), "5.5,1,7FF,1,0,0");

        // Already trimmed rows pass through unchanged
        let trimmed = "1.0,0,100,0,0,2,A,B";
        assert_eq!(TabularRecord::from_legacy_line(trimmed).unwrap().to_legacy_line(), trimmed);

        assert!(matches!(
            TabularRecord::from_legacy_line("1.0,0,100"),
            Err(RowFault::TooFewColumns { expected: 6, found: 3 })
        ));
        assert!(matches!(
            TabularRecord::from_legacy_line("1.0,0,100,0,0,9,1,2,3,4,5,6,7,8"),
            Err(RowFault::LengthOutOfRange(9))
        ));
        assert!(matches!(
            TabularRecord::from_legacy_line("1.0,0,100,0,0,3,A"),
            Err(RowFault::MissingData { length: 3, found: 1 })
        ));
    }

    #[test]
    fn test_decode_legacy_detection() {
        assert_eq!(decode_legacy(&utf16le("1.0,0\n", true)).as_deref(), Some("1.0,0\n"));
        assert_eq!(decode_legacy(&utf16le("1.0,0\n", false)).as_deref(), Some("1.0,0\n"));
        assert_eq!(decode_legacy(&utf16be("1.0,0\n")).as_deref(), Some("1.0,0\n"));

        // Canonical UTF-8 tables are not legacy
        assert!(decode_legacy(b"1.0,0,100,0,0,2,A,B\n").is_none());
        assert!(decode_legacy(b"\xEF\xBB\xBF1.0,0\n").is_none());
        // Odd byte count cannot be UTF-16
        assert!(decode_legacy(b"abc").is_none());
        assert!(decode_legacy(b"").is_none());
    }

    #[test]
    fn test_normalize_rewrites_in_place() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dump.csv");
        let text = "1.0,0,100,0,0,2,A,B,C,D,E,F,00,00\r\n2.0,0,200,1,0,1,FF,00,00,00,00,00,00,00\r\n";
        fs::write(&path, utf16le(text, true)).unwrap();

        let outcome = EncodingNormalizer.process(&path, &CancelToken::new()).unwrap();
        assert_eq!(outcome, FileOutcome::Converted { rows: 2, skipped_rows: 0 });
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "1.0,0,100,0,0,2,A,B\n2.0,0,200,1,0,1,FF\n"
        );

        // Second pass sees a UTF-8 file and leaves it alone
        let outcome = EncodingNormalizer.process(&path, &CancelToken::new()).unwrap();
        assert!(matches!(outcome, FileOutcome::Skipped { .. }));
    }

    #[test]
    fn test_normalize_skips_malformed_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dump.csv");
        let text = "1.0,0,100,0,0,x,A\n\n3.0,0,300,0,0,1,C,0,0,0,0,0,0,0\n";
        fs::write(&path, utf16le(text, true)).unwrap();

        let outcome = EncodingNormalizer.process(&path, &CancelToken::new()).unwrap();
        assert_eq!(outcome, FileOutcome::Converted { rows: 1, skipped_rows: 1 });
        assert_eq!(fs::read_to_string(&path).unwrap(), "3.0,0,300,0,0,1,C\n");
    }

    #[test]
    fn test_normalize_without_valid_rows_leaves_newline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dump.csv");
        fs::write(&path, utf16le("1.0,0,100,0,0,x,A\n", true)).unwrap();

        let outcome = EncodingNormalizer.process(&path, &CancelToken::new()).unwrap();
        assert_eq!(outcome, FileOutcome::Converted { rows: 0, skipped_rows: 1 });
        assert_eq!(fs::read_to_string(&path).unwrap(), "\n");
    }

    #[test]
    fn test_cancel_keeps_original() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dump.csv");
        let original = utf16le("1.0,0,100,0,0,1,A,0,0,0,0,0,0,0\n", true);
        fs::write(&path, &original).unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();
        let outcome = EncodingNormalizer.normalize(&path, &cancel).unwrap();
        assert_eq!(outcome, FileOutcome::Cancelled);
        assert_eq!(fs::read(&path).unwrap(), original);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
