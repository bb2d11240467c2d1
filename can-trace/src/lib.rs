//! CAN Trace Library
//!
//! Reassembles CAN frames from the field events of an external bit-level
//! decoder and transcodes captured frame tables between trace formats.
//!
//! # Architecture
//!
//! Live capture:
//! - [`FrameAssembler`] turns identifier / data / ack field events into frames
//! - [`TraceAppender`] writes each frame as one JSON line
//! - [`CaptureSession`] wires the two together for one capture
//!
//! Offline batch jobs (see [`batch`]):
//! - [`TrcExporter`] converts CSV tables to the TRC text format
//! - [`EncodingNormalizer`] rewrites legacy UTF-16 tables as UTF-8
//!
//! Both batch jobs trim each row's data columns to its declared length.
//!
//! # Example Usage
//!
//! ```no_run
//! use can_trace::{CaptureConfig, CaptureSession, FieldEvent, OverwritePolicy};
//!
//! let config = CaptureConfig::new("dump.jsonl").with_policy(OverwritePolicy::Append);
//! let mut session = CaptureSession::open(&config).unwrap();
//!
//! session.push(FieldEvent::Identifier { identifier: 768, start_time: 10.0 }).unwrap();
//! session.push(FieldEvent::Data { data: 0x03 }).unwrap();
//! session.push(FieldEvent::Ack).unwrap();
//!
//! let summary = session.finish().unwrap();
//! println!("{} frames written", summary.frames_written);
//! ```

// Public modules
pub mod appender;
pub mod assembler;
pub mod batch;
pub mod config;
pub mod session;
pub mod tabular;
pub mod types;

// Re-export main types for convenience
pub use appender::{format_trace_line, parse_trace_line, read_trace_file, TraceAppender};
pub use assembler::{transition, AssemblerState, FrameAssembler, FrameObserver, LogObserver, NullObserver};
pub use batch::{run_batch, BatchSummary, CancelToken, FileJob, FileOutcome, FileReport};
pub use config::{BatchConfig, CaptureConfig, OverwritePolicy};
pub use session::{CaptureSession, SessionSummary};
pub use tabular::{EncodingNormalizer, TabularRecord, TrcExporter};
pub use types::{EventKind, FieldEvent, FrameRecord, OrderFault, Result, RowFault, TraceError, MAX_DATA_LEN};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
