//! # antiphon-core
//!
//! Engine library for antiphon, a call-and-response MIDI companion. Live input
//! is split into a high and a low voice, quantized onto a step grid, and at the
//! end of every sequence window each voice's grid is handed to a generative
//! model whose continuation is played back in time with the metronome.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::atomic::AtomicBool;
//! use std::sync::Arc;
//! use antiphon_core::config::Config;
//! use antiphon_core::generation::PITCH_VOCABULARY_SIZE;
//! use antiphon_core::midi::{MidiInputManager, Outputs};
//! use antiphon_core::model::EchoModel;
//! use antiphon_core::scheduler::TimingScheduler;
//!
//! let config = Config::load();
//! let settings = config.settings();
//! let model = EchoModel::new(
//!     PITCH_VOCABULARY_SIZE,
//!     settings.steps_per_beat,
//!     settings.midi_pitch_adjustment,
//!     settings.echo_spread,
//! );
//!
//! let mut input = MidiInputManager::new();
//! input.connect(0)?;
//!
//! let mut scheduler = TimingScheduler::new(
//!     &settings,
//!     config.metronome(),
//!     Outputs::null(),
//!     Arc::new(model),
//!     input,
//! );
//! let stop = AtomicBool::new(false);
//! scheduler.run(&stop);
//! ```
//!
//! ## Module Overview
//!
//! - [`config`]: Embedded defaults plus user overrides from TOML
//! - [`midi`]: midir input/output, the `EventSource` and `MidiSink` seams
//! - [`quantize`]: Note events to grid cells (nearest step, sustain/release bookkeeping)
//! - [`router`]: Adaptive high/low split
//! - [`metronome`]: Beat accents and clicks
//! - [`model`]: Latent model trait and the bundled echo model
//! - [`generation`] / [`playback`]: Detached work launched at sequence boundaries
//! - [`queue`]: Per-range FIFO of generated continuations
//! - [`tasks`]: Registry of detached threads
//! - [`scheduler`]: The real-time loop tying it together

pub mod config;
pub mod generation;
pub mod metronome;
pub mod midi;
pub mod model;
pub mod playback;
pub mod quantize;
pub mod queue;
pub mod router;
pub mod scheduler;
pub mod tasks;

// Re-export the shared types crate so callers need only one dependency.
pub use antiphon_types as types;
