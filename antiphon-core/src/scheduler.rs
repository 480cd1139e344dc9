//! The real-time loop: owns the clock and both grids, polls input, advances
//! steps, clicks the metronome, and hands finished windows to generation
//! and playback.
//!
//! Time is `f64` seconds since the loop epoch. `run` reads it from a
//! monotonic clock; tests call `tick` with synthetic times instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use antiphon_types::{MidiEvent, Range, StepGrid};

use crate::config::{EngineSettings, MetronomeSettings};
use crate::generation::GenerationDispatcher;
use crate::metronome::Metronome;
use crate::midi::{send_logged, EventSource, Outputs};
use crate::model::LatentModel;
use crate::playback::PlaybackDispatcher;
use crate::quantize::StepQuantizer;
use crate::queue::GeneratedQueue;
use crate::router::{RangeRouter, SplitThreshold};
use crate::tasks::TaskTracker;

/// Upper bound on input events handled per poll, so a flood of input
/// cannot hold off step advancement.
pub const MAX_EVENTS_PER_POLL: usize = 64;

/// Longest the loop parks between iterations.
const MAX_PARK: Duration = Duration::from_millis(1);

/// Clock state of the current sequence window.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleClock {
    pub start_time: f64,
    pub next_step_deadline: f64,
    pub next_beat_deadline: f64,
    pub step: usize,
}

impl ScheduleClock {
    fn new(start_time: f64) -> Self {
        Self {
            start_time,
            next_step_deadline: start_time,
            next_beat_deadline: start_time,
            step: 0,
        }
    }
}

struct RangeState {
    grid: StepGrid,
    queue: GeneratedQueue,
}

impl RangeState {
    fn new(len: usize) -> Self {
        Self {
            grid: StepGrid::new(len),
            queue: GeneratedQueue::new(),
        }
    }
}

pub struct TimingScheduler<S: EventSource> {
    source: S,
    outputs: Outputs,
    clock: ScheduleClock,
    step_duration: f64,
    beat_duration: f64,
    steps_per_beat: usize,
    sequence_length: usize,
    router: RangeRouter,
    quantizer: StepQuantizer,
    metronome: Metronome,
    high: RangeState,
    low: RangeState,
    generation: GenerationDispatcher,
    playback: PlaybackDispatcher,
    tasks: TaskTracker,
    sequence_count: u64,
}

impl<S: EventSource> TimingScheduler<S> {
    pub fn new(
        settings: &EngineSettings,
        metronome: MetronomeSettings,
        outputs: Outputs,
        model: Arc<dyn LatentModel>,
        source: S,
    ) -> Self {
        let settings = settings.clone().validated();
        let sequence_length = settings.sequence_length;
        Self {
            source,
            outputs,
            clock: ScheduleClock::new(0.0),
            step_duration: settings.step_duration(),
            beat_duration: settings.beat_duration(),
            steps_per_beat: settings.steps_per_beat,
            sequence_length,
            router: RangeRouter::new(SplitThreshold::new(
                settings.split_pitch_threshold,
                settings.threshold_alpha,
            )),
            quantizer: StepQuantizer::new(settings.step_duration(), settings.midi_pitch_adjustment),
            metronome: Metronome::new(metronome, sequence_length, settings.steps_per_measure()),
            high: RangeState::new(sequence_length),
            low: RangeState::new(sequence_length),
            generation: GenerationDispatcher::new(model, settings.temperature, sequence_length),
            playback: PlaybackDispatcher::new(settings.bpm),
            tasks: TaskTracker::new(),
            sequence_count: 0,
        }
    }

    pub fn clock(&self) -> &ScheduleClock {
        &self.clock
    }

    pub fn step(&self) -> usize {
        self.clock.step
    }

    pub fn grid(&self, range: Range) -> &StepGrid {
        &self.range_state(range).grid
    }

    pub fn queue(&self, range: Range) -> &GeneratedQueue {
        &self.range_state(range).queue
    }

    pub fn threshold(&self) -> i32 {
        self.router.threshold().value()
    }

    /// Completed sequence windows since start.
    pub fn sequence_count(&self) -> u64 {
        self.sequence_count
    }

    /// Generation and playback threads not yet reaped.
    pub fn background_tasks(&self) -> usize {
        self.tasks.len()
    }

    fn range_state(&self, range: Range) -> &RangeState {
        match range {
            Range::High => &self.high,
            Range::Low => &self.low,
        }
    }

    /// One loop iteration at time `now`.
    pub fn tick(&mut self, now: f64) {
        self.poll(now);
        self.advance(now);
    }

    /// Handle pending input, up to `MAX_EVENTS_PER_POLL` events.
    pub fn poll(&mut self, now: f64) {
        for _ in 0..MAX_EVENTS_PER_POLL {
            let Some(event) = self.source.try_next() else {
                break;
            };
            self.handle_event(event, now);
        }
    }

    fn handle_event(&mut self, event: MidiEvent, now: f64) {
        let Some(note) = event.note_event() else {
            log::trace!(target: "scheduler", "discarding {:?}", event.kind);
            return;
        };

        let range = self.router.route(note.pitch);
        send_logged(self.outputs.passthrough(range).as_ref(), note.to_message());

        let state = match range {
            Range::High => &mut self.high,
            Range::Low => &mut self.low,
        };
        let outcome = self.quantizer.process(
            &note,
            now,
            &mut state.grid,
            self.clock.step,
            self.clock.next_step_deadline,
        );
        log::trace!(
            target: "scheduler",
            "step {} {} pitch {}: {:?}",
            self.clock.step,
            range,
            note.pitch,
            outcome
        );
    }

    /// Move to the next step once its deadline has passed. At most one step
    /// per call.
    pub fn advance(&mut self, now: f64) {
        if now < self.clock.next_step_deadline {
            return;
        }

        let step = self.clock.step;
        if step % self.steps_per_beat == self.steps_per_beat - 1 {
            self.metronome.click(step, self.outputs.metronome.as_ref());
            self.clock.next_beat_deadline += self.beat_duration;
        }

        if step + 1 >= self.sequence_length {
            self.sequence_boundary(now);
        } else {
            self.clock.step += 1;
        }
        self.clock.next_step_deadline += self.step_duration;
    }

    /// Start any queued playback, hand both grids to generation, then open a
    /// fresh window.
    ///
    /// Playback pops before generation is launched, so a window's own
    /// continuation is never played at the boundary that produced it.
    fn sequence_boundary(&mut self, now: f64) {
        self.sequence_count += 1;
        self.tasks.reap();
        log::info!(
            target: "scheduler",
            "sequence {} complete (threshold {})",
            self.sequence_count,
            self.threshold()
        );

        for range in Range::ALL {
            let state = match range {
                Range::High => &self.high,
                Range::Low => &self.low,
            };
            self.playback.dispatch(
                range,
                &state.queue,
                Arc::clone(self.outputs.playback(range)),
                &mut self.tasks,
            );
            self.generation
                .dispatch(range, &state.grid, state.queue.clone(), &mut self.tasks);
        }

        self.high.grid = StepGrid::new(self.sequence_length);
        self.low.grid = StepGrid::new(self.sequence_length);
        self.clock.step = 0;
        self.clock.start_time = now;
    }

    /// Run until `stop` is set. Between iterations the loop parks on the
    /// input source until the next step deadline, never longer than 1 ms.
    pub fn run(&mut self, stop: &AtomicBool) {
        let epoch = Instant::now();
        self.clock = ScheduleClock::new(0.0);
        log::info!(
            target: "scheduler",
            "running: {} steps per window, {:.3}s per step",
            self.sequence_length,
            self.step_duration
        );

        while !stop.load(Ordering::Relaxed) {
            self.tick(epoch.elapsed().as_secs_f64());

            let remaining = self.clock.next_step_deadline - epoch.elapsed().as_secs_f64();
            if remaining > 0.0 {
                let park = Duration::from_secs_f64(remaining).min(MAX_PARK);
                self.source.wait_for_event(park);
            }
        }

        log::info!(
            target: "scheduler",
            "stopped after {} sequence(s)",
            self.sequence_count
        );
        self.tasks.detach_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::{ChannelSource, TestSink};
    use crate::model::{EchoModel, Latent, ModelError, OneHot};
    use antiphon_types::{Cell, MidiEventKind, NoteMessage, NoteSequence};
    use crossbeam_channel::Sender;

    struct SilentModel;

    impl LatentModel for SilentModel {
        fn encode(&self, _input: &OneHot, length: usize) -> Result<Latent, ModelError> {
            Ok(Latent { mu: vec![0.0; length], sigma: vec![0.0; length] })
        }

        fn decode(&self, _z: &[f64], _length: usize, _t: f64) -> Result<NoteSequence, ModelError> {
            Ok(NoteSequence::default())
        }
    }

    struct Harness {
        scheduler: TimingScheduler<ChannelSource>,
        input: Sender<MidiEvent>,
        metronome: Arc<TestSink>,
        high_ref: Arc<TestSink>,
        low_ref: Arc<TestSink>,
    }

    fn harness(model: Arc<dyn LatentModel>) -> Harness {
        let metronome = Arc::new(TestSink::new("metronome"));
        let high_ref = Arc::new(TestSink::new("high-reference"));
        let low_ref = Arc::new(TestSink::new("low-reference"));
        let outputs = Outputs {
            metronome: metronome.clone(),
            high_passthrough: high_ref.clone(),
            low_passthrough: low_ref.clone(),
            ..Outputs::null()
        };
        let (input, source) = ChannelSource::channel();
        let scheduler = TimingScheduler::new(
            &EngineSettings::default(),
            MetronomeSettings::default(),
            outputs,
            model,
            source,
        );
        Harness { scheduler, input, metronome, high_ref, low_ref }
    }

    fn note_on(pitch: u8, velocity: u8) -> MidiEvent {
        MidiEvent::new(0, MidiEventKind::NoteOn { channel: 0, note: pitch, velocity })
    }

    /// Tick exactly on the current deadline until `step` is current.
    fn run_to_step(s: &mut TimingScheduler<ChannelSource>, step: usize) {
        while s.step() != step {
            let deadline = s.clock().next_step_deadline;
            s.tick(deadline);
        }
    }

    #[test]
    fn initial_tick_advances_off_step_zero() {
        let mut h = harness(Arc::new(SilentModel));
        assert_eq!(h.scheduler.step(), 0);
        h.scheduler.tick(0.0);
        assert_eq!(h.scheduler.step(), 1);
        let step = EngineSettings::default().step_duration();
        assert!((h.scheduler.clock().next_step_deadline - step).abs() < 1e-12);
    }

    #[test]
    fn no_advance_before_deadline() {
        let mut h = harness(Arc::new(SilentModel));
        h.scheduler.tick(0.0);
        let deadline = h.scheduler.clock().next_step_deadline;
        h.scheduler.tick(deadline - 1e-6);
        assert_eq!(h.scheduler.step(), 1);
        h.scheduler.tick(deadline);
        assert_eq!(h.scheduler.step(), 2);
    }

    #[test]
    fn metronome_clicks_on_last_step_of_each_beat() {
        let mut h = harness(Arc::new(SilentModel));
        run_to_step(&mut h.scheduler, 31);
        let deadline = h.scheduler.clock().next_step_deadline;
        h.scheduler.tick(deadline);
        // beats end on steps 3, 7, ..., 31
        let clicks = h.metronome.messages();
        assert_eq!(clicks.len(), 8);
        assert_eq!(clicks[0], NoteMessage::on(60, 100));
        assert_eq!(clicks[3], NoteMessage::on(62, 100)); // step 15
        assert_eq!(clicks[7], NoteMessage::on(64, 100)); // step 31

        let beat = EngineSettings::default().beat_duration();
        assert!((h.scheduler.clock().next_beat_deadline - 8.0 * beat).abs() < 1e-9);
    }

    #[test]
    fn one_reset_per_window() {
        let mut h = harness(Arc::new(SilentModel));
        for _ in 0..(32 * 3) {
            let deadline = h.scheduler.clock().next_step_deadline;
            h.scheduler.tick(deadline);
        }
        assert_eq!(h.scheduler.sequence_count(), 3);
        assert_eq!(h.scheduler.step(), 0);
    }

    #[test]
    fn events_route_to_passthrough_and_grid() {
        let mut h = harness(Arc::new(SilentModel));
        run_to_step(&mut h.scheduler, 4);
        let deadline = h.scheduler.clock().next_step_deadline;

        h.input.send(note_on(72, 100)).unwrap();
        h.input.send(note_on(40, 90)).unwrap();
        h.scheduler.tick(deadline - 0.9 * EngineSettings::default().step_duration());

        assert_eq!(h.high_ref.messages(), vec![NoteMessage::on(72, 100)]);
        assert_eq!(h.low_ref.messages(), vec![NoteMessage::on(40, 90)]);
        assert_eq!(
            h.scheduler.grid(Range::High).get(4),
            Some(Cell::Note { pitch: 53, velocity: 100 })
        );
        assert_eq!(
            h.scheduler.grid(Range::Low).get(4),
            Some(Cell::Note { pitch: 21, velocity: 90 })
        );
    }

    #[test]
    fn clock_and_control_change_are_discarded() {
        let mut h = harness(Arc::new(SilentModel));
        h.input.send(MidiEvent::new(0, MidiEventKind::Clock)).unwrap();
        let pedal = MidiEventKind::ControlChange { channel: 0, controller: 64, value: 127 };
        h.input.send(MidiEvent::new(0, pedal)).unwrap();
        h.scheduler.poll(0.0);
        assert!(h.high_ref.is_empty());
        assert!(h.low_ref.is_empty());
        assert_eq!(h.scheduler.threshold(), 60);
    }

    #[test]
    fn poll_drains_a_bounded_burst() {
        let mut h = harness(Arc::new(SilentModel));
        for _ in 0..(MAX_EVENTS_PER_POLL + 10) {
            h.input.send(note_on(72, 10)).unwrap();
        }
        h.scheduler.poll(0.0);
        assert_eq!(h.high_ref.len(), MAX_EVENTS_PER_POLL);
        h.scheduler.poll(0.0);
        assert_eq!(h.high_ref.len(), MAX_EVENTS_PER_POLL + 10);
    }

    #[test]
    fn boundary_clears_grids_but_keeps_threshold() {
        let mut h = harness(Arc::new(EchoModel::new(90, 4, 19, 0.0)));
        run_to_step(&mut h.scheduler, 2);
        let deadline = h.scheduler.clock().next_step_deadline;
        for _ in 0..10 {
            h.input.send(note_on(90, 100)).unwrap();
        }
        h.scheduler.tick(deadline - 0.9 * EngineSettings::default().step_duration());
        let drifted = h.scheduler.threshold();
        assert!(drifted > 60);

        run_to_step(&mut h.scheduler, 31);
        let deadline = h.scheduler.clock().next_step_deadline;
        h.scheduler.tick(deadline);

        assert_eq!(h.scheduler.step(), 0);
        assert!(h.scheduler.grid(Range::High).is_idle());
        assert!(h.scheduler.grid(Range::Low).is_idle());
        assert_eq!(h.scheduler.threshold(), drifted);
        assert!((h.scheduler.clock().start_time - deadline).abs() < 1e-12);
    }
}
