//! Metronome clicks on beat boundaries.
//!
//! Fired by the scheduler on the last step of each beat, so the click lands
//! as the next beat opens. Clicks are one-shot note-ons; no note-off is sent.

use antiphon_types::{Accent, NoteMessage};

use crate::config::MetronomeSettings;
use crate::midi::{send_logged, MidiSink};

/// Accent for the beat ending at `step`.
///
/// The sequence rule wins over the measure rule. A measure of one step has
/// no separate measure accent.
pub fn classify(step: usize, steps_per_sequence: usize, steps_per_measure: usize) -> Accent {
    if step + 1 == steps_per_sequence {
        Accent::SequenceFirst
    } else if step.checked_rem(steps_per_measure.saturating_sub(1)) == Some(0) {
        Accent::MeasureFirst
    } else {
        Accent::Regular
    }
}

#[derive(Debug, Clone)]
pub struct Metronome {
    settings: MetronomeSettings,
    steps_per_sequence: usize,
    steps_per_measure: usize,
}

impl Metronome {
    pub fn new(
        settings: MetronomeSettings,
        steps_per_sequence: usize,
        steps_per_measure: usize,
    ) -> Self {
        Self {
            settings,
            steps_per_sequence,
            steps_per_measure,
        }
    }

    pub fn note_for(&self, accent: Accent) -> u8 {
        match accent {
            Accent::SequenceFirst => self.settings.sequence_note,
            Accent::MeasureFirst => self.settings.measure_note,
            Accent::Regular => self.settings.regular_note,
        }
    }

    /// Send the click for `step` and return its accent.
    pub fn click(&self, step: usize, sink: &dyn MidiSink) -> Accent {
        let accent = classify(step, self.steps_per_sequence, self.steps_per_measure);
        send_logged(sink, NoteMessage::on(self.note_for(accent), self.settings.velocity));
        accent
    }
}
