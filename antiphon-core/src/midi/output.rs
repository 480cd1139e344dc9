//! Output sinks: a semantic-level abstraction over "send this note somewhere".
//!
//! The engine only ever talks to `MidiSink`; `MidiOutPort` turns that into
//! bytes on a midir connection, `TestSink` records it for assertions.

use std::fmt;
use std::sync::{Arc, Mutex};

use antiphon_types::{NoteMessage, Range};
use midir::MidiOutputConnection;

/// Result type for sink operations.
pub type SinkResult<T = ()> = Result<T, SinkError>;

/// Error from a sink operation.
#[derive(Debug, Clone)]
pub struct SinkError(pub String);

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for SinkError {}

impl From<String> for SinkError {
    fn from(s: String) -> Self {
        SinkError(s)
    }
}

/// Destination for outgoing note messages.
///
/// Sinks are shared between the scheduler and detached playback threads,
/// so implementations must be `Send + Sync`.
pub trait MidiSink: Send + Sync {
    fn send(&self, message: NoteMessage) -> SinkResult;

    /// Human-readable name for log messages.
    fn name(&self) -> &str;
}

/// A connected hardware or virtual MIDI output port.
pub struct MidiOutPort {
    name: String,
    connection: Mutex<MidiOutputConnection>,
}

impl MidiOutPort {
    pub fn new(name: impl Into<String>, connection: MidiOutputConnection) -> Self {
        Self {
            name: name.into(),
            connection: Mutex::new(connection),
        }
    }
}

impl MidiSink for MidiOutPort {
    fn send(&self, message: NoteMessage) -> SinkResult {
        let mut conn = self
            .connection
            .lock()
            .map_err(|_| SinkError(format!("{}: connection lock poisoned", self.name)))?;
        conn.send(&message.to_bytes())
            .map_err(|e| SinkError(format!("{}: {}", self.name, e)))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Sink for outputs that were not configured. Drops everything.
pub struct NullSink {
    name: String,
}

impl NullSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl MidiSink for NullSink {
    fn send(&self, _message: NoteMessage) -> SinkResult {
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A sink that records every message for assertion in tests.
/// Uses `Mutex` for interior mutability so it can be shared across threads.
pub struct TestSink {
    name: String,
    sent: Mutex<Vec<NoteMessage>>,
    fail: bool,
}

impl TestSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sent: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    /// A sink whose every send fails.
    pub fn failing(name: impl Into<String>) -> Self {
        Self {
            fail: true,
            ..Self::new(name)
        }
    }

    /// Return all recorded messages.
    pub fn messages(&self) -> Vec<NoteMessage> {
        self.sent.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.sent.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.clear();
        }
    }
}

impl MidiSink for TestSink {
    fn send(&self, message: NoteMessage) -> SinkResult {
        if self.fail {
            return Err(SinkError(format!("{}: send refused", self.name)));
        }
        self.sent
            .lock()
            .map_err(|_| SinkError(format!("{}: lock poisoned", self.name)))?
            .push(message);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// The five output channels the engine writes to.
#[derive(Clone)]
pub struct Outputs {
    pub metronome: Arc<dyn MidiSink>,
    pub high_passthrough: Arc<dyn MidiSink>,
    pub low_passthrough: Arc<dyn MidiSink>,
    pub high_playback: Arc<dyn MidiSink>,
    pub low_playback: Arc<dyn MidiSink>,
}

impl Outputs {
    /// All five channels discarding their input.
    pub fn null() -> Self {
        Self {
            metronome: Arc::new(NullSink::new("metronome")),
            high_passthrough: Arc::new(NullSink::new("high-reference")),
            low_passthrough: Arc::new(NullSink::new("low-reference")),
            high_playback: Arc::new(NullSink::new("high-generation")),
            low_playback: Arc::new(NullSink::new("low-generation")),
        }
    }

    pub fn passthrough(&self, range: Range) -> &Arc<dyn MidiSink> {
        match range {
            Range::High => &self.high_passthrough,
            Range::Low => &self.low_passthrough,
        }
    }

    pub fn playback(&self, range: Range) -> &Arc<dyn MidiSink> {
        match range {
            Range::High => &self.high_playback,
            Range::Low => &self.low_playback,
        }
    }
}

/// Fire-and-forget send: log and carry on if the sink refuses the message.
pub(crate) fn send_logged(sink: &dyn MidiSink, message: NoteMessage) {
    if let Err(e) = sink.send(message) {
        log::warn!(target: "midi", "message dropped on {}: {}", sink.name(), e);
    }
}
