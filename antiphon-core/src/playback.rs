//! Streams generated continuations to a playback output in musical time.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use antiphon_types::{NoteMessage, NoteSequence, Range};

use crate::midi::{MidiSink, SinkResult};
use crate::queue::GeneratedQueue;
use crate::tasks::TaskTracker;

/// Beats to wall time. Lengths that are not finite are treated as zero.
fn seconds(beats: f64, seconds_per_beat: f64) -> Duration {
    let secs = (beats * seconds_per_beat).max(0.0);
    Duration::try_from_secs_f64(secs).unwrap_or_else(|e| {
        log::warn!(target: "playback", "unplayable length of {} beats: {}", beats, e);
        Duration::ZERO
    })
}

/// Play `sequence` note by note: wait out the lead-in before the first note,
/// then note-on, hold, note-off for each note in turn.
///
/// `sleep` is called for every wait so tests can run without real time
/// passing. Stops at the first send failure and returns it; an empty
/// sequence sends nothing.
pub fn play_sequence(
    sequence: &NoteSequence,
    seconds_per_beat: f64,
    sink: &dyn MidiSink,
    mut sleep: impl FnMut(Duration),
) -> SinkResult {
    let Some(first) = sequence.notes.first() else {
        return Ok(());
    };
    sleep(seconds(first.start, seconds_per_beat));

    for note in &sequence.notes {
        sink.send(NoteMessage::on(note.pitch, note.velocity))?;
        sleep(seconds(note.duration(), seconds_per_beat));
        sink.send(NoteMessage::off(note.pitch))?;
    }
    Ok(())
}

/// Starts playback threads at sequence boundaries.
#[derive(Debug, Clone)]
pub struct PlaybackDispatcher {
    bpm: f64,
}

impl PlaybackDispatcher {
    pub fn new(bpm: f64) -> Self {
        Self { bpm }
    }

    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Pop the oldest continuation for `range` and play it on `sink`.
    /// Returns whether playback was started.
    pub fn dispatch(
        &self,
        range: Range,
        queue: &GeneratedQueue,
        sink: Arc<dyn MidiSink>,
        tasks: &mut TaskTracker,
    ) -> bool {
        let Some(sequence) = queue.pop_oldest() else {
            return false;
        };
        if sequence.is_empty() {
            log::debug!(target: "playback", "{} range: empty continuation, skipping", range);
            return false;
        }

        log::debug!(
            target: "playback",
            "{} range: playing {} notes on {}",
            range,
            sequence.notes.len(),
            sink.name()
        );
        let seconds_per_beat = self.seconds_per_beat();
        tasks.spawn(format!("play-{}", range), move || {
            let played = play_sequence(&sequence, seconds_per_beat, sink.as_ref(), thread::sleep);
            if let Err(e) = played {
                log::warn!(target: "playback", "{} range playback cut short: {}", range, e);
            }
        })
    }
}
