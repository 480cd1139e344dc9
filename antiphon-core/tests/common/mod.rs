#![allow(dead_code)]
//! Test harness utilities for antiphon-core integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use antiphon_core::config::{EngineSettings, MetronomeSettings};
use antiphon_core::midi::{ChannelSource, Outputs, TestSink};
use antiphon_core::model::{Latent, LatentModel, ModelError, OneHot};
use antiphon_core::scheduler::TimingScheduler;
use antiphon_types::{MidiEvent, MidiEventKind, NoteSequence};
use crossbeam_channel::Sender;

/// Model that ignores its input and always decodes to the same sequence.
/// Counts encode calls so tests can tell which ranges were generated.
pub struct ScriptedModel {
    sequence: NoteSequence,
    encodes: AtomicUsize,
}

impl ScriptedModel {
    pub fn new(sequence: NoteSequence) -> Self {
        Self {
            sequence,
            encodes: AtomicUsize::new(0),
        }
    }

    pub fn encode_calls(&self) -> usize {
        self.encodes.load(Ordering::SeqCst)
    }
}

impl LatentModel for ScriptedModel {
    fn encode(&self, _input: &OneHot, length: usize) -> Result<Latent, ModelError> {
        self.encodes.fetch_add(1, Ordering::SeqCst);
        Ok(Latent {
            mu: vec![0.0; length],
            sigma: vec![1.0; length],
        })
    }

    fn decode(
        &self,
        _z: &[f64],
        _length: usize,
        _temperature: f64,
    ) -> Result<NoteSequence, ModelError> {
        Ok(self.sequence.clone())
    }
}

/// Recording sinks for all five outputs.
pub struct Sinks {
    pub metronome: Arc<TestSink>,
    pub high_ref: Arc<TestSink>,
    pub low_ref: Arc<TestSink>,
    pub high_gen: Arc<TestSink>,
    pub low_gen: Arc<TestSink>,
}

impl Sinks {
    pub fn new() -> Self {
        Self {
            metronome: Arc::new(TestSink::new("metronome")),
            high_ref: Arc::new(TestSink::new("high-reference")),
            low_ref: Arc::new(TestSink::new("low-reference")),
            high_gen: Arc::new(TestSink::new("high-generation")),
            low_gen: Arc::new(TestSink::new("low-generation")),
        }
    }

    pub fn outputs(&self) -> Outputs {
        Outputs {
            metronome: self.metronome.clone(),
            high_passthrough: self.high_ref.clone(),
            low_passthrough: self.low_ref.clone(),
            high_playback: self.high_gen.clone(),
            low_playback: self.low_gen.clone(),
        }
    }
}

pub struct Rig {
    pub scheduler: TimingScheduler<ChannelSource>,
    pub input: Sender<MidiEvent>,
    pub sinks: Sinks,
    pub step_duration: f64,
}

/// Build a scheduler fed by a channel and writing to recording sinks.
pub fn rig(settings: EngineSettings, model: Arc<dyn LatentModel>) -> Rig {
    let sinks = Sinks::new();
    let (input, source) = ChannelSource::channel();
    let step_duration = settings.step_duration();
    let scheduler = TimingScheduler::new(
        &settings,
        MetronomeSettings::default(),
        sinks.outputs(),
        model,
        source,
    );
    Rig {
        scheduler,
        input,
        sinks,
        step_duration,
    }
}

impl Rig {
    /// Tick on successive deadlines until `step` is current.
    pub fn run_to_step(&mut self, step: usize) {
        while self.scheduler.step() != step {
            let deadline = self.scheduler.clock().next_step_deadline;
            self.scheduler.tick(deadline);
        }
    }

    /// Tick until the current window closes and the next one opens.
    pub fn finish_window(&mut self) {
        let count = self.scheduler.sequence_count();
        while self.scheduler.sequence_count() == count {
            let deadline = self.scheduler.clock().next_step_deadline;
            self.scheduler.tick(deadline);
        }
    }

    /// Deliver `event` during the current step, `fraction` of the way
    /// through its window (0.0 = start, 1.0 = deadline).
    pub fn play_at(&mut self, event: MidiEvent, fraction: f64) {
        let deadline = self.scheduler.clock().next_step_deadline;
        let now = deadline - (1.0 - fraction) * self.step_duration;
        self.input.send(event).expect("scheduler input closed");
        self.scheduler.tick(now);
    }
}

pub fn note_on(pitch: u8, velocity: u8) -> MidiEvent {
    MidiEvent::new(0, MidiEventKind::NoteOn { channel: 0, note: pitch, velocity })
}

pub fn note_off(pitch: u8) -> MidiEvent {
    MidiEvent::new(0, MidiEventKind::NoteOff { channel: 0, note: pitch, velocity: 0 })
}

/// Poll `cond` until it holds, or panic after `timeout`.
pub fn wait_until(timeout: Duration, what: &str, mut cond: impl FnMut() -> bool) {
    let start = Instant::now();
    while !cond() {
        if start.elapsed() > timeout {
            panic!("Timed out waiting for {}", what);
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}
