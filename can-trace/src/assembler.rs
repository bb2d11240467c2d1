//! Frame reassembly from field events
//!
//! The external decoder reports each CAN frame as a sequence of field events:
//! one identifier, zero to eight data bytes, then the acknowledgement slot.
//! [`transition`] is the pure state machine; [`FrameAssembler`] owns the state
//! for one capture session and feeds an optional diagnostic observer.
//!
//! ```text
//!            identifier              data (< 8 bytes)
//!   Idle ───────────────► Collecting ◄───────┐
//!    ▲                        │  └───────────┘
//!    └──────── ack ───────────┘  (emits the frame)
//! ```

use crate::types::{FieldEvent, FrameRecord, OrderFault, Result, TraceError, MAX_DATA_LEN};

/// Assembler state
#[derive(Debug, Clone, Default, PartialEq)]
pub enum AssemblerState {
    /// No frame in progress
    #[default]
    Idle,
    /// A frame is open and collecting data bytes
    Collecting(FrameRecord),
}

/// Result of one state transition
#[derive(Debug)]
pub struct Step {
    /// State after the event
    pub state: AssemblerState,
    /// The finalized frame on ack, or the reason the event was rejected
    pub outcome: Result<Option<FrameRecord>>,
}

impl Step {
    fn next(state: AssemblerState) -> Self {
        Self { state, outcome: Ok(None) }
    }

    fn emit(frame: FrameRecord) -> Self {
        Self {
            state: AssemblerState::Idle,
            outcome: Ok(Some(frame)),
        }
    }

    fn reject(event: &FieldEvent, fault: OrderFault) -> Self {
        Self {
            state: AssemblerState::Idle,
            outcome: Err(TraceError::ProtocolOrder {
                event: event.kind(),
                fault,
            }),
        }
    }
}

/// Apply one field event to a state
///
/// A rejected event leaves the machine `Idle` with nothing emitted. An
/// identifier event while collecting starts over and drops the open frame.
/// A non-finite start time is rejected: the trace format cannot carry it.
pub fn transition(state: AssemblerState, event: FieldEvent) -> Step {
    match (state, event) {
        (_, FieldEvent::Identifier { identifier, start_time }) if !start_time.is_finite() => Step {
            state: AssemblerState::Idle,
            outcome: Err(TraceError::InvalidTimestamp { identifier, start_time }),
        },
        (_, FieldEvent::Identifier { identifier, start_time }) => {
            Step::next(AssemblerState::Collecting(FrameRecord::new(identifier, start_time)))
        }
        (AssemblerState::Collecting(mut frame), FieldEvent::Data { data }) => {
            if frame.data.len() >= MAX_DATA_LEN {
                return Step::reject(&event, OrderFault::FrameFull);
            }
            frame.data.push(data);
            Step::next(AssemblerState::Collecting(frame))
        }
        (AssemblerState::Collecting(frame), FieldEvent::Ack) => Step::emit(frame),
        (AssemblerState::Idle, event) => Step::reject(&event, OrderFault::NoFrameOpen),
    }
}

/// Diagnostic sink for frames matching the configured trace identifier
pub trait FrameObserver {
    /// Called after each data byte is appended to a traced frame
    fn on_byte(&mut self, _partial: &FrameRecord) {}

    /// Called when a traced frame is finalized
    fn on_frame(&mut self, _frame: &FrameRecord) {}
}

/// Observer that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl FrameObserver for NullObserver {}

/// Observer that renders traced frames to the `log` facade
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl FrameObserver for LogObserver {
    fn on_byte(&mut self, partial: &FrameRecord) {
        log::info!("0x{:03X} partial: {}", partial.identifier, partial.hex_data().join(" "));
    }

    fn on_frame(&mut self, frame: &FrameRecord) {
        log::info!("0x{:03X} frame: {}", frame.identifier, frame);
    }
}

impl<O: FrameObserver + ?Sized> FrameObserver for Box<O> {
    fn on_byte(&mut self, partial: &FrameRecord) {
        (**self).on_byte(partial)
    }

    fn on_frame(&mut self, frame: &FrameRecord) {
        (**self).on_frame(frame)
    }
}

/// Per-session frame assembler
pub struct FrameAssembler<O: FrameObserver = NullObserver> {
    state: AssemblerState,
    trace_id: Option<u32>,
    observer: O,
}

impl FrameAssembler<NullObserver> {
    /// Create an assembler without diagnostics
    pub fn new() -> Self {
        Self::with_observer(None, NullObserver)
    }
}

impl Default for FrameAssembler<NullObserver> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: FrameObserver> FrameAssembler<O> {
    /// Create an assembler reporting frames with `trace_id` to `observer`
    pub fn with_observer(trace_id: Option<u32>, observer: O) -> Self {
        Self {
            state: AssemblerState::Idle,
            trace_id,
            observer,
        }
    }

    /// Consume one field event
    ///
    /// Returns the finalized frame on an ack event.
    pub fn push(&mut self, event: FieldEvent) -> Result<Option<FrameRecord>> {
        log::trace!("Field event: {:?}", event);

        let previous = std::mem::take(&mut self.state);
        if let (AssemblerState::Collecting(open), FieldEvent::Identifier { .. }) = (&previous, &event) {
            log::warn!("Identifier event abandons unfinished frame {}", open);
        }

        let step = transition(previous, event);
        self.state = step.state;

        match &self.state {
            AssemblerState::Collecting(frame) if matches!(event, FieldEvent::Data { .. }) => {
                if self.is_traced(frame.identifier) {
                    self.observer.on_byte(frame);
                }
            }
            _ => {}
        }

        let emitted = step.outcome?;
        if let Some(frame) = &emitted {
            if self.is_traced(frame.identifier) {
                self.observer.on_frame(frame);
            }
        }
        Ok(emitted)
    }

    /// Drop any frame in progress and return to `Idle`
    pub fn reset(&mut self) -> Option<FrameRecord> {
        match std::mem::take(&mut self.state) {
            AssemblerState::Collecting(frame) => Some(frame),
            AssemblerState::Idle => None,
        }
    }

    /// Current state
    pub fn state(&self) -> &AssemblerState {
        &self.state
    }

    /// True while a frame is open
    pub fn is_collecting(&self) -> bool {
        matches!(self.state, AssemblerState::Collecting(_))
    }

    /// Access the diagnostic observer
    pub fn observer(&self) -> &O {
        &self.observer
    }

    fn is_traced(&self, identifier: u32) -> bool {
        self.trace_id == Some(identifier)
    }
}
