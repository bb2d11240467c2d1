//! Core types for the CAN trace library
//!
//! This module defines the frame record produced by the assembler, the field
//! events consumed from an external bit-level decoder, and the error taxonomy
//! shared by the live capture pipeline and the batch transcoders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Largest payload of a classic CAN frame
pub const MAX_DATA_LEN: usize = 8;

/// Result type for trace operations
pub type Result<T> = std::result::Result<T, TraceError>;

/// One reconstructed CAN frame
///
/// Serialized as a single trace line:
/// `{"id": 768, "timestamp": 10.0, "data": ["03", "FF"]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    /// CAN arbitration ID (11-bit or 29-bit, range is not validated)
    #[serde(rename = "id")]
    pub identifier: u32,
    /// Seconds since the decoder's epoch, taken from the identifier field start
    pub timestamp: f64,
    /// Data bytes in arrival order (0-8)
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
}

impl FrameRecord {
    /// Create an empty frame, as opened by an identifier event
    pub fn new(identifier: u32, timestamp: f64) -> Self {
        Self {
            identifier,
            timestamp,
            data: Vec::with_capacity(MAX_DATA_LEN),
        }
    }

    /// Number of data bytes collected so far
    pub fn dlc(&self) -> usize {
        self.data.len()
    }

    /// Data bytes as two-character uppercase hex strings
    pub fn hex_data(&self) -> Vec<String> {
        self.data.iter().map(|b| format!("{:02X}", b)).collect()
    }

    /// Convert the timestamp to an absolute UTC time, if representable
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        if !self.timestamp.is_finite() {
            return None;
        }
        let secs = self.timestamp.floor();
        let nsecs = ((self.timestamp - secs) * 1_000_000_000.0).round() as u32;
        DateTime::from_timestamp(secs as i64, nsecs.min(999_999_999))
    }
}

impl fmt::Display for FrameRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "0x{:03X} @ {:.6} [{}] {}",
            self.identifier,
            self.timestamp,
            self.dlc(),
            self.hex_data().join(" ")
        )
    }
}

/// Serde adapter storing bytes as uppercase hex strings
mod hex_bytes {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(data.iter().map(|b| format!("{:02X}", b)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let tokens = Vec::<String>::deserialize(deserializer)?;
        tokens
            .iter()
            .map(|token| {
                if token.len() != 2 || !token.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err(D::Error::custom(format!("invalid hex byte: {:?}", token)));
                }
                u8::from_str_radix(token, 16).map_err(D::Error::custom)
            })
            .collect()
    }
}

/// A single decoded sub-part of a CAN frame, as reported by a bit-level decoder
///
/// The serde form follows the analyzer's field naming so a recorded stream can
/// be replayed as JSON lines: `{"type": "data_field", "data": 3}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FieldEvent {
    /// Arbitration identifier field, opens a new frame
    #[serde(rename = "identifier_field")]
    Identifier { identifier: u32, start_time: f64 },
    /// One data byte
    #[serde(rename = "data_field")]
    Data { data: u8 },
    /// Acknowledgement slot, closes the frame
    #[serde(rename = "ack_field")]
    Ack,
}

impl FieldEvent {
    /// Get the kind of this event
    pub fn kind(&self) -> EventKind {
        match self {
            FieldEvent::Identifier { .. } => EventKind::Identifier,
            FieldEvent::Data { .. } => EventKind::Data,
            FieldEvent::Ack => EventKind::Ack,
        }
    }
}

/// Field event discriminant, used in error reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Identifier,
    Data,
    Ack,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Identifier => write!(f, "identifier"),
            EventKind::Data => write!(f, "data"),
            EventKind::Ack => write!(f, "ack"),
        }
    }
}

/// Why the assembler rejected an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderFault {
    /// No identifier event opened a frame
    NoFrameOpen,
    /// The open frame already holds eight data bytes
    FrameFull,
}

impl fmt::Display for OrderFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderFault::NoFrameOpen => write!(f, "no frame in progress"),
            OrderFault::FrameFull => write!(f, "frame already holds {} data bytes", MAX_DATA_LEN),
        }
    }
}

/// Why a tabular row could not be transcoded
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowFault {
    #[error("length {0:?} is not an integer")]
    UnparsableLength(String),

    #[error("length {0} exceeds {max} data bytes", max = MAX_DATA_LEN)]
    LengthOutOfRange(usize),

    #[error("length {length} declared but only {found} data fields present")]
    MissingData { length: usize, found: usize },

    #[error("expected at least {expected} columns, found {found}")]
    TooFewColumns { expected: usize, found: usize },
}

/// Errors raised by the capture pipeline and the batch transcoders
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("Protocol order error: {event} event with {fault}")]
    ProtocolOrder { event: EventKind, fault: OrderFault },

    #[error("Malformed row {row} in {path:?}: {fault}")]
    MalformedRow {
        path: PathBuf,
        row: usize,
        #[source]
        fault: RowFault,
    },

    #[error("Encoding mismatch: {path:?} is not {expected}")]
    EncodingMismatch { path: PathBuf, expected: &'static str },

    #[error("Missing column {column:?} in {path:?}")]
    MissingColumn { path: PathBuf, column: String },

    #[error("Invalid start time {start_time} for frame 0x{identifier:03X}")]
    InvalidTimestamp { identifier: u32, start_time: f64 },

    #[error("Invalid trace line: {0}")]
    InvalidTraceLine(String),

    #[error("Capture session aborted by an earlier error")]
    SessionAborted,

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl TraceError {
    /// True for errors that end a live capture session
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(
            self,
            TraceError::ProtocolOrder { .. }
                | TraceError::InvalidTimestamp { .. }
                | TraceError::IoError(_)
                | TraceError::SessionAborted
        )
    }
}
