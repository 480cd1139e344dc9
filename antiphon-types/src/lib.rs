//! # antiphon-types
//!
//! Shared type definitions for the antiphon call-and-response engine.
//! Plain data only: MIDI events as they arrive, the step grid they are
//! quantized into, and the note sequences the generative model hands back.

mod event;
mod grid;
mod sequence;

pub use event::{MidiEvent, MidiEventKind, NoteEvent, NoteMessage, NoteMessageKind};
pub use grid::{Cell, StepGrid};
pub use sequence::{Note, NoteSequence};

/// One of the two pitch-based voices the input is split into.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum Range {
    High,
    Low,
}

impl Range {
    pub const ALL: [Range; 2] = [Range::High, Range::Low];

    pub fn name(self) -> &'static str {
        match self {
            Range::High => "high",
            Range::Low => "low",
        }
    }
}

impl std::fmt::Display for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Metronome accent level for a beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Accent {
    /// Last beat of the sequence window (the click that announces the wrap).
    SequenceFirst,
    /// Beat that opens a measure.
    MeasureFirst,
    Regular,
}
