//! Live capture session
//!
//! Wires one [`FrameAssembler`] to one [`TraceAppender`]. Events are pushed on
//! the caller's thread and every completed frame is written before `push`
//! returns, so the event source is back-pressured by the file write.

use crate::appender::TraceAppender;
use crate::assembler::{FrameAssembler, FrameObserver, NullObserver};
use crate::config::CaptureConfig;
use crate::types::{FieldEvent, FrameRecord, Result, TraceError};

/// Outcome of a finished session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionSummary {
    /// Frames written to the trace file by this session
    pub frames_written: u64,
    /// True if an unfinished frame was dropped at shutdown
    pub discarded_partial: bool,
}

/// A capture session from first event to shutdown
pub struct CaptureSession<O: FrameObserver = NullObserver> {
    assembler: FrameAssembler<O>,
    appender: TraceAppender,
    aborted: bool,
}

impl CaptureSession<NullObserver> {
    /// Open a session without diagnostics
    pub fn open(config: &CaptureConfig) -> Result<Self> {
        Self::open_with_observer(config, NullObserver)
    }
}

impl<O: FrameObserver> CaptureSession<O> {
    /// Open a session reporting `config.trace_id` frames to `observer`
    pub fn open_with_observer(config: &CaptureConfig, observer: O) -> Result<Self> {
        let appender = TraceAppender::open(&config.dump_path, config.policy)?;
        Ok(Self {
            assembler: FrameAssembler::with_observer(config.trace_id, observer),
            appender,
            aborted: false,
        })
    }

    /// Feed one field event, writing the frame it completes
    ///
    /// The written frame is handed back to the caller.
    ///
    /// Any error aborts the session: later events fail with
    /// [`TraceError::SessionAborted`] and nothing more is written.
    pub fn push(&mut self, event: FieldEvent) -> Result<Option<FrameRecord>> {
        if self.aborted {
            return Err(TraceError::SessionAborted);
        }

        match self.try_push(event) {
            Ok(frame) => Ok(frame),
            Err(e) => {
                log::error!("Capture session aborted: {}", e);
                self.aborted = true;
                self.assembler.reset();
                Err(e)
            }
        }
    }

    fn try_push(&mut self, event: FieldEvent) -> Result<Option<FrameRecord>> {
        let emitted = self.assembler.push(event)?;
        if let Some(frame) = &emitted {
            self.appender.write(frame)?;
        }
        Ok(emitted)
    }

    /// True once an error has ended the session
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Frames written so far
    pub fn frames_written(&self) -> u64 {
        self.appender.frames_written()
    }

    /// Shut down: drop any unfinished frame and close the trace file
    pub fn finish(mut self) -> Result<SessionSummary> {
        let discarded = self.assembler.reset();
        if let Some(frame) = &discarded {
            log::warn!("Discarding unfinished frame at shutdown: {}", frame);
        }

        let summary = SessionSummary {
            frames_written: self.appender.frames_written(),
            discarded_partial: discarded.is_some(),
        };
        let path = self.appender.path().to_path_buf();
        self.appender.close()?;

        log::info!(
            "Capture session finished: {} frames written to {:?}",
            summary.frames_written,
            path
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appender::read_trace_file;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> CaptureConfig {
        CaptureConfig::new(dir.path().join("dump.jsonl"))
    }

    #[test]
    fn test_session_writes_frames() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let mut session = CaptureSession::open(&config).unwrap();

        session.push(FieldEvent::Identifier { identifier: 768, start_time: 10.0 }).unwrap();
        session.push(FieldEvent::Data { data: 0x03 }).unwrap();
        session.push(FieldEvent::Data { data: 0xFF }).unwrap();
        let frame = session.push(FieldEvent::Ack).unwrap().unwrap();
        assert_eq!(frame.data, vec![0x03, 0xFF]);

        let summary = session.finish().unwrap();
        assert_eq!(summary.frames_written, 1);
        assert!(!summary.discarded_partial);

        let frames = read_trace_file(&config.dump_path).unwrap();
        assert_eq!(frames, vec![frame]);
    }

    #[test]
    fn test_protocol_error_aborts_session() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let mut session = CaptureSession::open(&config).unwrap();

        let err = session.push(FieldEvent::Data { data: 1 }).unwrap_err();
        assert!(matches!(err, TraceError::ProtocolOrder { .. }));
        assert!(session.is_aborted());

        let err = session
            .push(FieldEvent::Identifier { identifier: 1, start_time: 0.0 })
            .unwrap_err();
        assert!(matches!(err, TraceError::SessionAborted));

        let summary = session.finish().unwrap();
        assert_eq!(summary.frames_written, 0);
        assert!(read_trace_file(&config.dump_path).unwrap().is_empty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_write_failure_aborts_session() {
        let config = CaptureConfig::new("/dev/full");
        let mut session = CaptureSession::open(&config).unwrap();

        session.push(FieldEvent::Identifier { identifier: 0x300, start_time: 10.0 }).unwrap();
        session.push(FieldEvent::Data { data: 0x03 }).unwrap();
        let err = session.push(FieldEvent::Ack).unwrap_err();
        assert!(matches!(err, TraceError::IoError(_)));
        assert!(session.is_aborted());
        assert_eq!(session.frames_written(), 0);

        let err = session.push(FieldEvent::Identifier { identifier: 1, start_time: 11.0 }).unwrap_err();
        assert!(matches!(err, TraceError::SessionAborted));

        // The device may refuse the final sync; the handle is released either way
        if let Err(err) = session.finish() {
            assert!(matches!(err, TraceError::IoError(_)));
        }
    }

    #[test]
    fn test_finish_discards_partial_frame() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let mut session = CaptureSession::open(&config).unwrap();

        session.push(FieldEvent::Identifier { identifier: 1, start_time: 0.0 }).unwrap();
        session.push(FieldEvent::Ack).unwrap();
        session.push(FieldEvent::Identifier { identifier: 2, start_time: 1.0 }).unwrap();
        session.push(FieldEvent::Data { data: 9 }).unwrap();

        let summary = session.finish().unwrap();
        assert_eq!(summary.frames_written, 1);
        assert!(summary.discarded_partial);

        let frames = read_trace_file(&config.dump_path).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].identifier, 1);
    }
}
