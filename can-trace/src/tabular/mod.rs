//! Tabular frame records and their transcoders
//!
//! Captured tables store eight data columns per row whatever the frame's
//! length. Both transcoders rebuild each row with exactly `length` data
//! tokens; the shared rule lives in [`trim_data`].

use crate::types::{RowFault, MAX_DATA_LEN};

pub mod legacy;
pub mod trc;

pub use legacy::{decode_legacy, EncodingNormalizer};
pub use trc::{TrcExporter, TRC_HEADER};

/// Parse a declared length (DLC) token
pub fn parse_length(token: &str) -> Result<usize, RowFault> {
    let token = token.trim();
    let length: usize = token
        .parse()
        .map_err(|_| RowFault::UnparsableLength(token.to_string()))?;
    if length > MAX_DATA_LEN {
        return Err(RowFault::LengthOutOfRange(length));
    }
    Ok(length)
}

/// Keep the first `length` data tokens, dropping the unused slots
///
/// Fails if fewer than `length` tokens are present. Trimming an already
/// trimmed row returns it unchanged.
pub fn trim_data<T: AsRef<str>>(tokens: &[T], length: usize) -> Result<Vec<String>, RowFault> {
    if length > MAX_DATA_LEN {
        return Err(RowFault::LengthOutOfRange(length));
    }
    if tokens.len() < length {
        return Err(RowFault::MissingData {
            length,
            found: tokens.len(),
        });
    }
    Ok(tokens[..length].iter().map(|t| t.as_ref().to_string()).collect())
}

/// Auxiliary columns carried by the legacy table format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyFlags {
    pub is_spi: String,
    pub is_extended: String,
    pub is_remote: String,
}

/// One row of a captured trace table, already trimmed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabularRecord {
    /// Passed through unmodified
    pub timestamp: String,
    /// Passed through unmodified
    pub identifier: String,
    /// Declared data length, 0-8
    pub length: usize,
    /// Exactly `length` data tokens
    pub data: Vec<String>,
    /// Present for rows read from the legacy format
    pub flags: Option<LegacyFlags>,
}

impl TabularRecord {
    /// Build a record from raw tokens, trimming the data to the declared length
    pub fn new<T: AsRef<str>>(
        timestamp: impl Into<String>,
        identifier: impl Into<String>,
        length: &str,
        data: &[T],
    ) -> Result<Self, RowFault> {
        let length = parse_length(length)?;
        Ok(Self {
            timestamp: timestamp.into(),
            identifier: identifier.into(),
            length,
            data: trim_data(data, length)?,
            flags: None,
        })
    }

    /// Builder method: attach legacy flag columns
    pub fn with_flags(mut self, flags: LegacyFlags) -> Self {
        self.flags = Some(flags);
        self
    }

    /// Re-apply the trimming rule
    pub fn trimmed(&self) -> Result<Self, RowFault> {
        Ok(Self {
            data: trim_data(&self.data, self.length)?,
            ..self.clone()
        })
    }
}
