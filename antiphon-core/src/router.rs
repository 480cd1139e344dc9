//! Range routing: splits incoming notes into a high and a low voice around an
//! adaptive pitch threshold.

use antiphon_types::Range;

/// Pitch boundary between the two ranges, smoothed by an exponential moving
/// average over every routed note. Lives for the whole process; sequence
/// boundaries do not reset it.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitThreshold {
    value: i32,
    alpha: f64,
}

impl SplitThreshold {
    pub fn new(initial: i32, alpha: f64) -> Self {
        Self { value: initial, alpha }
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Move the threshold toward `pitch`. Halves round to even.
    pub fn update(&mut self, pitch: u8) {
        let blended = self.alpha * f64::from(pitch) + (1.0 - self.alpha) * f64::from(self.value);
        self.value = blended.round_ties_even() as i32;
    }

    pub fn classify(&self, pitch: u8) -> Range {
        if i32::from(pitch) >= self.value {
            Range::High
        } else {
            Range::Low
        }
    }
}

#[derive(Debug, Clone)]
pub struct RangeRouter {
    threshold: SplitThreshold,
}

impl RangeRouter {
    pub fn new(threshold: SplitThreshold) -> Self {
        Self { threshold }
    }

    /// Classify `pitch` against the current threshold, then let the threshold
    /// drift toward it. Called for note-ons and note-offs alike.
    pub fn route(&mut self, pitch: u8) -> Range {
        let range = self.threshold.classify(pitch);
        self.threshold.update(pitch);
        log::trace!(
            target: "router",
            "pitch {} -> {} (threshold now {})",
            pitch,
            range,
            self.threshold.value()
        );
        range
    }

    pub fn threshold(&self) -> &SplitThreshold {
        &self.threshold
    }
}
