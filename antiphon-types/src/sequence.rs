/// A decoded note. `start` and `end` are in beats.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Note {
    pub pitch: u8,
    pub velocity: u8,
    pub start: f64,
    pub end: f64,
}

impl Note {
    /// Length in beats, never negative.
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// An ordered note list returned by the generative model.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NoteSequence {
    pub notes: Vec<Note>,
    /// Total length in beats.
    pub total_time: f64,
}

impl NoteSequence {
    pub fn new(notes: Vec<Note>, total_time: f64) -> Self {
        Self { notes, total_time }
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Multiply every note boundary and the total length by `factor`.
    pub fn scale_timing(&mut self, factor: f64) {
        for note in &mut self.notes {
            note.start *= factor;
            note.end *= factor;
        }
        self.total_time *= factor;
    }
}
