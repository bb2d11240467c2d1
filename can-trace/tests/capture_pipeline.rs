// End-to-end capture: replayed field events through a session into a trace file
use can_trace::{
    read_trace_file, CaptureConfig, CaptureSession, FieldEvent, FrameObserver, FrameRecord,
    OverwritePolicy, TraceError,
};
use std::cell::Cell;
use std::fs;
use std::rc::Rc;
use tempfile::TempDir;

fn frame_events(identifier: u32, start_time: f64, data: &[u8]) -> Vec<FieldEvent> {
    let mut events = vec![FieldEvent::Identifier { identifier, start_time }];
    events.extend(data.iter().map(|&b| FieldEvent::Data { data: b }));
    events.push(FieldEvent::Ack);
    events
}

#[test]
fn replays_every_payload_length() {
    let dir = TempDir::new().unwrap();
    let config = CaptureConfig::new(dir.path().join("dump.jsonl"));
    let mut session = CaptureSession::open(&config).unwrap();

    let mut expected = Vec::new();
    for n in 0..=8u8 {
        let data: Vec<u8> = (0..n).map(|i| i.wrapping_mul(37)).collect();
        let start_time = 100.0 + f64::from(n) * 0.001;
        for event in frame_events(0x100 + u32::from(n), start_time, &data) {
            session.push(event).unwrap();
        }
        expected.push(FrameRecord {
            identifier: 0x100 + u32::from(n),
            timestamp: start_time,
            data,
        });
    }

    assert_eq!(session.finish().unwrap().frames_written, 9);
    assert_eq!(read_trace_file(&config.dump_path).unwrap(), expected);
}

#[test]
fn trace_file_matches_dump_format() {
    let dir = TempDir::new().unwrap();
    let config = CaptureConfig::new(dir.path().join("dump.jsonl"));
    let mut session = CaptureSession::open(&config).unwrap();

    for event in frame_events(768, 10.0, &[0x03, 0xFF]) {
        session.push(event).unwrap();
    }
    session.finish().unwrap();

    assert_eq!(
        fs::read_to_string(&config.dump_path).unwrap(),
        "{\"id\": 768, \"timestamp\": 10.0, \"data\": [\"03\", \"FF\"]}\n"
    );
}

#[test]
fn append_policy_keeps_previous_sessions() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dump.jsonl");

    let mut first = CaptureSession::open(&CaptureConfig::new(&path)).unwrap();
    for event in frame_events(1, 1.0, &[0x01]) {
        first.push(event).unwrap();
    }
    first.finish().unwrap();

    let append = CaptureConfig::new(&path).with_policy(OverwritePolicy::Append);
    let mut second = CaptureSession::open(&append).unwrap();
    for event in frame_events(2, 2.0, &[0x02]) {
        second.push(event).unwrap();
    }
    second.finish().unwrap();

    let ids: Vec<u32> = read_trace_file(&path).unwrap().iter().map(|f| f.identifier).collect();
    assert_eq!(ids, vec![1, 2]);

    // A fresh overwrite session starts from an empty file
    let third = CaptureSession::open(&CaptureConfig::new(&path)).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "");
    third.finish().unwrap();
}

#[test]
fn out_of_order_event_ends_session_without_output() {
    let dir = TempDir::new().unwrap();
    let config = CaptureConfig::new(dir.path().join("dump.jsonl"));
    let mut session = CaptureSession::open(&config).unwrap();

    for event in frame_events(1, 1.0, &[0xAA]) {
        session.push(event).unwrap();
    }
    let err = session.push(FieldEvent::Ack).unwrap_err();
    assert!(matches!(err, TraceError::ProtocolOrder { .. }));
    assert!(err.is_fatal_to_session());

    let summary = session.finish().unwrap();
    assert_eq!(summary.frames_written, 1);
    assert_eq!(read_trace_file(&config.dump_path).unwrap().len(), 1);
}

#[derive(Default, Clone)]
struct Counting {
    bytes: Rc<Cell<usize>>,
    frames: Rc<Cell<usize>>,
}

impl FrameObserver for Counting {
    fn on_byte(&mut self, _partial: &FrameRecord) {
        self.bytes.set(self.bytes.get() + 1);
    }

    fn on_frame(&mut self, _frame: &FrameRecord) {
        self.frames.set(self.frames.get() + 1);
    }
}

#[test]
fn observer_is_wired_through_session() {
    let dir = TempDir::new().unwrap();
    let config = CaptureConfig::new(dir.path().join("dump.jsonl")).with_trace_id(768);
    let counting = Counting::default();
    let observer: Box<dyn FrameObserver> = Box::new(counting.clone());
    let mut session = CaptureSession::open_with_observer(&config, observer).unwrap();

    for event in frame_events(768, 1.0, &[1, 2, 3])
        .into_iter()
        .chain(frame_events(769, 2.0, &[4]))
    {
        session.push(event).unwrap();
    }
    assert_eq!(session.finish().unwrap().frames_written, 2);
    assert_eq!(counting.bytes.get(), 3);
    assert_eq!(counting.frames.get(), 1);
}
