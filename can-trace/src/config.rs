//! Capture and batch configuration types
//!
//! Plain serde structs with builder methods. The CLI loads them from the
//! `[capture]` and `[batch]` tables of its config file.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What to do with an existing trace file when a session starts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverwritePolicy {
    /// Truncate any existing content
    #[default]
    Overwrite,
    /// Keep existing content and append new frames after it
    Append,
}

/// Configuration for a live capture session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Trace file receiving one JSON line per frame
    #[serde(default = "default_dump_path")]
    pub dump_path: PathBuf,

    /// Overwrite or append to an existing trace file
    #[serde(default)]
    pub policy: OverwritePolicy,

    /// Optional: surface frames with this identifier to the diagnostic observer
    #[serde(default)]
    pub trace_id: Option<u32>,
}

fn default_dump_path() -> PathBuf {
    PathBuf::from("can_dump.jsonl")
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            dump_path: default_dump_path(),
            policy: OverwritePolicy::default(),
            trace_id: None,
        }
    }
}

impl CaptureConfig {
    /// Create a capture configuration writing to `dump_path`
    pub fn new(dump_path: impl Into<PathBuf>) -> Self {
        Self {
            dump_path: dump_path.into(),
            ..Self::default()
        }
    }

    /// Builder method: set the overwrite policy
    pub fn with_policy(mut self, policy: OverwritePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Builder method: set the diagnostic trace identifier
    pub fn with_trace_id(mut self, trace_id: u32) -> Self {
        self.trace_id = Some(trace_id);
        self
    }
}

/// Configuration for the offline batch transcoders
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Directory scanned for input files (not recursive)
    #[serde(default = "default_directory")]
    pub directory: PathBuf,

    /// Input file extension, compared case-insensitively
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Process files on the rayon thread pool
    #[serde(default = "default_true")]
    pub parallel: bool,
}

fn default_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_extension() -> String {
    "csv".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            extension: default_extension(),
            parallel: true,
        }
    }
}

impl BatchConfig {
    /// Create a batch configuration over `directory`
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    /// Builder method: set the input extension (without the dot)
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Builder method: enable or disable parallel processing
    pub fn with_parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }
}
