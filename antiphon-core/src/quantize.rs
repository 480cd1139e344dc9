//! Step quantization: turns one note event plus the scheduler's clock state
//! into writes on a step grid.
//!
//! Step `k` is current from the moment the scheduler advanced to it until
//! `next_step_deadline`. An event in the first half of that window belongs to
//! step `k`, an event in the second half to step `k + 1`.

use antiphon_types::{Cell, NoteEvent, StepGrid};

/// What processing one event did to the grid. Mostly useful for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantizeOutcome {
    /// A note was written at `step` (and a sustain reserved after it).
    Attack { step: usize },
    /// Attack quieter than what the current step already holds.
    Quieter,
    /// A release was written at `step`.
    Release { step: usize },
    /// A release for a note that started before this window opened: a
    /// silent placeholder note was written at step 0 first.
    BackfilledRelease { step: usize },
    /// Event with no effect: a release with no matching open note, or a
    /// write whose target step falls outside the window.
    Dropped,
}

#[derive(Debug, Clone)]
pub struct StepQuantizer {
    half_step_duration: f64,
    pitch_adjustment: u8,
}

impl StepQuantizer {
    pub fn new(step_duration: f64, pitch_adjustment: u8) -> Self {
        Self {
            half_step_duration: 0.5 * step_duration,
            pitch_adjustment,
        }
    }

    /// Raw MIDI pitch to the pitch stored in the grid.
    pub fn adjust_pitch(&self, pitch: u8) -> i16 {
        i16::from(pitch) - i16::from(self.pitch_adjustment)
    }

    /// Quantize `event` into `grid`.
    ///
    /// `step` is the scheduler's current step and `next_step_deadline` the
    /// time at which it will advance; `now` is in the same time base.
    pub fn process(
        &self,
        event: &NoteEvent,
        now: f64,
        grid: &mut StepGrid,
        step: usize,
        next_step_deadline: f64,
    ) -> QuantizeOutcome {
        if event.is_attack() {
            self.process_note_on(event, now, grid, step, next_step_deadline)
        } else {
            self.process_note_off(event, now, grid, step, next_step_deadline)
        }
    }

    fn process_note_on(
        &self,
        event: &NoteEvent,
        now: f64,
        grid: &mut StepGrid,
        step: usize,
        next_step_deadline: f64,
    ) -> QuantizeOutcome {
        // Loudest attack within the current step window wins.
        if event.velocity <= grid.velocity_at(step) {
            return QuantizeOutcome::Quieter;
        }
        let nearest = self.nearest_step(step, now, next_step_deadline);
        let pitch = self.adjust_pitch(event.pitch);
        if store_note_with_placeholder(grid, nearest, pitch, event.velocity) {
            QuantizeOutcome::Attack { step: nearest }
        } else {
            QuantizeOutcome::Dropped
        }
    }

    fn process_note_off(
        &self,
        event: &NoteEvent,
        now: f64,
        grid: &mut StepGrid,
        step: usize,
        next_step_deadline: f64,
    ) -> QuantizeOutcome {
        let pitch = self.adjust_pitch(event.pitch);
        let nearest = self.nearest_step(step, now, next_step_deadline);

        match grid.get(step) {
            Some(Cell::Sustain) if step != 0 => {
                if grid.is_idle() {
                    // The note was held across the window boundary.
                    store_note_with_placeholder(grid, 0, pitch, 0);
                    match store_release(grid, nearest, 0) {
                        Some(at) => QuantizeOutcome::BackfilledRelease { step: at },
                        None => QuantizeOutcome::Dropped,
                    }
                } else {
                    match find_open_note(grid, step, pitch) {
                        Some(onset) => release_outcome(store_release(grid, nearest, onset)),
                        None => QuantizeOutcome::Dropped,
                    }
                }
            }
            Some(Cell::Note { pitch: held, .. }) if step != grid.last_step() && held == pitch => {
                release_outcome(store_release(grid, nearest, step))
            }
            _ => QuantizeOutcome::Dropped,
        }
    }

    /// `step` if `now` is in the first half of the current step window,
    /// otherwise `step + 1`.
    pub fn nearest_step(&self, step: usize, now: f64, next_step_deadline: f64) -> usize {
        if now <= next_step_deadline - self.half_step_duration {
            step
        } else {
            step + 1
        }
    }
}

fn release_outcome(stored: Option<usize>) -> QuantizeOutcome {
    match stored {
        Some(step) => QuantizeOutcome::Release { step },
        None => QuantizeOutcome::Dropped,
    }
}

/// Write a note at `step` and reserve `step + 1` as a sustain. Either write
/// is skipped when it falls outside the grid; returns whether the note landed.
fn store_note_with_placeholder(grid: &mut StepGrid, step: usize, pitch: i16, velocity: u8) -> bool {
    let stored = grid.set(step, Cell::Note { pitch, velocity });
    grid.set(step + 1, Cell::Sustain);
    stored
}

/// Write a release at `nearest`, but never onto the onset it closes: a note
/// lasts at least one step. Returns the step written, or `None` when it falls
/// outside the grid.
fn store_release(grid: &mut StepGrid, nearest: usize, onset: usize) -> Option<usize> {
    let at = nearest.max(onset + 1);
    grid.set(at, Cell::Release).then_some(at)
}

/// Scan backward from `step` for the onset of a still-open note at `pitch`.
/// Only sustains may separate the onset from `step`; anything else ends the
/// search.
fn find_open_note(grid: &StepGrid, step: usize, pitch: i16) -> Option<usize> {
    for idx in (0..step).rev() {
        match grid.get(idx)? {
            Cell::Note { pitch: held, .. } if held == pitch => return Some(idx),
            Cell::Sustain => continue,
            _ => return None,
        }
    }
    None
}
