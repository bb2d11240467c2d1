//! Trace file writer and reader
//!
//! Each completed frame becomes one JSON line:
//!
//! ```text
//! {"id": 768, "timestamp": 10.0, "data": ["03", "FF"]}
//! ```

use crate::config::OverwritePolicy;
use crate::types::{FrameRecord, Result, TraceError, MAX_DATA_LEN};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// JSON formatter with a space after `:` and `,`, matching the analyzer's dump style
struct SpacedFormatter;

impl serde_json::ser::Formatter for SpacedFormatter {
    fn begin_array_value<W: ?Sized + Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }
}

/// Render a frame as a trace line (without the newline)
pub fn format_trace_line(record: &FrameRecord) -> String {
    let mut buf = Vec::with_capacity(64);
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
    // Serializing into a Vec only fails on non-string map keys
    if record.serialize(&mut serializer).is_err() {
        buf.clear();
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Parse one trace line back into a frame
///
/// Hex bytes are accepted in either case.
pub fn parse_trace_line(line: &str) -> Result<FrameRecord> {
    let record: FrameRecord = serde_json::from_str(line.trim())
        .map_err(|e| TraceError::InvalidTraceLine(format!("{}: {:?}", e, line)))?;

    if record.data.len() > MAX_DATA_LEN {
        return Err(TraceError::InvalidTraceLine(format!(
            "{} data bytes exceed {}: {:?}",
            record.data.len(),
            MAX_DATA_LEN,
            line
        )));
    }
    Ok(record)
}

/// Read every frame from a trace file, skipping blank lines
pub fn read_trace_file(path: &Path) -> Result<Vec<FrameRecord>> {
    let reader = BufReader::new(File::open(path)?);
    let mut frames = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        frames.push(parse_trace_line(&line)?);
    }
    Ok(frames)
}

/// Appends completed frames to a trace file, one line each
///
/// Lines go straight to the file, so a failed write leaves nothing pending
/// in memory. The handle lives as long as the appender; dropping it closes
/// the file, [`TraceAppender::close`] also syncs it and reports failures.
pub struct TraceAppender {
    path: PathBuf,
    file: File,
    frames_written: u64,
}

impl TraceAppender {
    /// Open the trace file according to `policy`
    ///
    /// Missing parent directories are created.
    pub fn open(path: &Path, policy: OverwritePolicy) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = match policy {
            OverwritePolicy::Overwrite => File::create(path)?,
            OverwritePolicy::Append => OpenOptions::new().create(true).append(true).open(path)?,
        };

        log::info!("Opened trace file {:?} ({:?})", path, policy);

        Ok(Self {
            path: path.to_path_buf(),
            file,
            frames_written: 0,
        })
    }

    /// Write one frame as a line
    ///
    /// A frame counts as written only once the whole line reached the file.
    pub fn write(&mut self, record: &FrameRecord) -> Result<()> {
        let mut line = format_trace_line(record);
        line.push('\n');
        self.file.write_all(line.as_bytes())?;
        self.frames_written += 1;
        Ok(())
    }

    /// Sync and close the file
    pub fn close(self) -> Result<()> {
        self.file.sync_all()?;
        log::debug!("Closed trace file {:?} after {} frames", self.path, self.frames_written);
        Ok(())
    }

    /// Frames written by this appender
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Target path
    pub fn path(&self) -> &Path {
        &self.path
    }
}
