use std::path::{Path, PathBuf};

use serde::Deserialize;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    timing: TimingConfig,
    #[serde(default)]
    routing: RoutingConfig,
    #[serde(default)]
    model: ModelConfig,
    #[serde(default)]
    metronome: MetronomeConfig,
    #[serde(default)]
    ports: PortsConfig,
}

#[derive(Deserialize, Default)]
struct TimingConfig {
    bpm: Option<u16>,
    steps_per_beat: Option<usize>,
    sequence_length: Option<usize>,
    beats_per_measure: Option<usize>,
}

#[derive(Deserialize, Default)]
struct RoutingConfig {
    split_pitch_threshold: Option<i32>,
    threshold_alpha: Option<f64>,
    midi_pitch_adjustment: Option<u8>,
}

#[derive(Deserialize, Default)]
struct ModelConfig {
    temperature: Option<f64>,
    echo_spread: Option<f64>,
}

#[derive(Deserialize, Default)]
struct MetronomeConfig {
    sequence_note: Option<u8>,
    measure_note: Option<u8>,
    regular_note: Option<u8>,
    velocity: Option<u8>,
}

#[derive(Deserialize, Default)]
struct PortsConfig {
    input: Option<String>,
    metronome: Option<String>,
    high_reference: Option<String>,
    low_reference: Option<String>,
    high_generation: Option<String>,
    low_generation: Option<String>,
}

/// Timing, routing and model parameters consumed when the engine is built.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub bpm: f64,
    pub steps_per_beat: usize,
    pub sequence_length: usize,
    pub beats_per_measure: usize,
    /// Initial split between the low and high range (MIDI pitch).
    pub split_pitch_threshold: i32,
    /// Smoothing factor of the split threshold's moving average.
    pub threshold_alpha: f64,
    /// Offset subtracted from raw MIDI pitch before it is stored in a grid.
    pub midi_pitch_adjustment: u8,
    pub temperature: f64,
    /// Latent noise scale of the bundled echo model, in vocabulary tokens.
    pub echo_spread: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            bpm: 80.0,
            steps_per_beat: 4,
            sequence_length: 32,
            beats_per_measure: 4,
            split_pitch_threshold: 60,
            threshold_alpha: 0.1,
            midi_pitch_adjustment: 19,
            temperature: 1.0,
            echo_spread: 0.6,
        }
    }
}

impl EngineSettings {
    /// Seconds per beat.
    pub fn beat_duration(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Seconds per grid step.
    pub fn step_duration(&self) -> f64 {
        self.beat_duration() / self.steps_per_beat as f64
    }

    pub fn steps_per_measure(&self) -> usize {
        self.steps_per_beat * self.beats_per_measure
    }

    /// Clamp every field into the range the engine can work with.
    pub fn validated(mut self) -> Self {
        self.bpm = self.bpm.clamp(1.0, 400.0);
        self.steps_per_beat = self.steps_per_beat.clamp(1, 32);
        self.sequence_length = self.sequence_length.clamp(2, 512);
        self.beats_per_measure = self.beats_per_measure.clamp(1, 32);
        self.split_pitch_threshold = self.split_pitch_threshold.clamp(0, 127);
        self.threshold_alpha = self.threshold_alpha.clamp(0.0, 1.0);
        self.temperature = self.temperature.max(0.0);
        self.echo_spread = self.echo_spread.max(0.0);
        self
    }
}

/// Pitches and velocity of the metronome clicks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetronomeSettings {
    pub sequence_note: u8,
    pub measure_note: u8,
    pub regular_note: u8,
    pub velocity: u8,
}

impl Default for MetronomeSettings {
    fn default() -> Self {
        Self {
            sequence_note: 64,
            measure_note: 62,
            regular_note: 60,
            velocity: 100,
        }
    }
}

/// Port selectors: a numeric index or a case-insensitive part of the port name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortSelection {
    pub input: Option<String>,
    pub metronome: Option<String>,
    pub high_reference: Option<String>,
    pub low_reference: Option<String>,
    pub high_generation: Option<String>,
    pub low_generation: Option<String>,
}

pub struct Config {
    file: ConfigFile,
}

impl Config {
    /// Embedded defaults, overridden by the user config file if present.
    pub fn load() -> Self {
        Self::load_with_override(user_config_path().as_deref())
    }

    /// Embedded defaults, overridden by the given file.
    pub fn load_from(path: &Path) -> Self {
        Self::load_with_override(Some(path))
    }

    fn load_with_override(path: Option<&Path>) -> Self {
        let mut base: ConfigFile = toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|e| {
            log::error!(target: "config", "embedded config.toml is invalid: {}", e);
            ConfigFile::default()
        });

        if let Some(path) = path {
            if path.exists() {
                match std::fs::read_to_string(path) {
                    Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                        Ok(user) => merge(&mut base, user),
                        Err(e) => log::warn!(
                            target: "config",
                            "ignoring malformed config {}: {}",
                            path.display(),
                            e
                        ),
                    },
                    Err(e) => log::warn!(
                        target: "config",
                        "could not read config {}: {}",
                        path.display(),
                        e
                    ),
                }
            }
        }

        Config { file: base }
    }

    pub fn settings(&self) -> EngineSettings {
        let fallback = EngineSettings::default();
        let timing = &self.file.timing;
        let routing = &self.file.routing;
        let model = &self.file.model;
        EngineSettings {
            bpm: timing.bpm.map(f64::from).unwrap_or(fallback.bpm),
            steps_per_beat: timing.steps_per_beat.unwrap_or(fallback.steps_per_beat),
            sequence_length: timing.sequence_length.unwrap_or(fallback.sequence_length),
            beats_per_measure: timing.beats_per_measure.unwrap_or(fallback.beats_per_measure),
            split_pitch_threshold: routing
                .split_pitch_threshold
                .unwrap_or(fallback.split_pitch_threshold),
            threshold_alpha: routing.threshold_alpha.unwrap_or(fallback.threshold_alpha),
            midi_pitch_adjustment: routing
                .midi_pitch_adjustment
                .unwrap_or(fallback.midi_pitch_adjustment),
            temperature: model.temperature.unwrap_or(fallback.temperature),
            echo_spread: model.echo_spread.unwrap_or(fallback.echo_spread),
        }
        .validated()
    }

    pub fn metronome(&self) -> MetronomeSettings {
        let fallback = MetronomeSettings::default();
        let m = &self.file.metronome;
        MetronomeSettings {
            sequence_note: m.sequence_note.unwrap_or(fallback.sequence_note).min(127),
            measure_note: m.measure_note.unwrap_or(fallback.measure_note).min(127),
            regular_note: m.regular_note.unwrap_or(fallback.regular_note).min(127),
            velocity: m.velocity.unwrap_or(fallback.velocity).min(127),
        }
    }

    pub fn ports(&self) -> PortSelection {
        let p = &self.file.ports;
        PortSelection {
            input: p.input.clone(),
            metronome: p.metronome.clone(),
            high_reference: p.high_reference.clone(),
            low_reference: p.low_reference.clone(),
            high_generation: p.high_generation.clone(),
            low_generation: p.low_generation.clone(),
        }
    }
}

pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("antiphon").join("config.toml"))
}

fn merge(base: &mut ConfigFile, user: ConfigFile) {
    merge_timing(&mut base.timing, user.timing);
    merge_routing(&mut base.routing, user.routing);
    merge_model(&mut base.model, user.model);
    merge_metronome(&mut base.metronome, user.metronome);
    merge_ports(&mut base.ports, user.ports);
}

fn merge_timing(base: &mut TimingConfig, user: TimingConfig) {
    if user.bpm.is_some() {
        base.bpm = user.bpm;
    }
    if user.steps_per_beat.is_some() {
        base.steps_per_beat = user.steps_per_beat;
    }
    if user.sequence_length.is_some() {
        base.sequence_length = user.sequence_length;
    }
    if user.beats_per_measure.is_some() {
        base.beats_per_measure = user.beats_per_measure;
    }
}

fn merge_routing(base: &mut RoutingConfig, user: RoutingConfig) {
    if user.split_pitch_threshold.is_some() {
        base.split_pitch_threshold = user.split_pitch_threshold;
    }
    if user.threshold_alpha.is_some() {
        base.threshold_alpha = user.threshold_alpha;
    }
    if user.midi_pitch_adjustment.is_some() {
        base.midi_pitch_adjustment = user.midi_pitch_adjustment;
    }
}

fn merge_model(base: &mut ModelConfig, user: ModelConfig) {
    if user.temperature.is_some() {
        base.temperature = user.temperature;
    }
    if user.echo_spread.is_some() {
        base.echo_spread = user.echo_spread;
    }
}

fn merge_metronome(base: &mut MetronomeConfig, user: MetronomeConfig) {
    if user.sequence_note.is_some() {
        base.sequence_note = user.sequence_note;
    }
    if user.measure_note.is_some() {
        base.measure_note = user.measure_note;
    }
    if user.regular_note.is_some() {
        base.regular_note = user.regular_note;
    }
    if user.velocity.is_some() {
        base.velocity = user.velocity;
    }
}

fn merge_ports(base: &mut PortsConfig, user: PortsConfig) {
    if user.input.is_some() {
        base.input = user.input;
    }
    if user.metronome.is_some() {
        base.metronome = user.metronome;
    }
    if user.high_reference.is_some() {
        base.high_reference = user.high_reference;
    }
    if user.low_reference.is_some() {
        base.low_reference = user.low_reference;
    }
    if user.high_generation.is_some() {
        base.high_generation = user.high_generation;
    }
    if user.low_generation.is_some() {
        base.low_generation = user.low_generation;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn embedded() -> Config {
        Config::load_with_override(None)
    }

    #[test]
    fn test_load_embedded_config() {
        let config = embedded();
        let settings = config.settings();
        assert_eq!(settings, EngineSettings::default());
        assert_eq!(config.metronome(), MetronomeSettings::default());
        assert_eq!(config.ports(), PortSelection::default());
    }

    #[test]
    fn test_derived_durations() {
        let settings = EngineSettings { bpm: 120.0, ..Default::default() };
        assert!((settings.beat_duration() - 0.5).abs() < 1e-12);
        assert!((settings.step_duration() - 0.125).abs() < 1e-12);
        assert_eq!(settings.steps_per_measure(), 16);
    }

    #[test]
    fn test_user_file_overrides_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[timing]\nbpm = 100\n\n[routing]\nthreshold_alpha = 0.25\n\n\
             [ports]\ninput = \"Keystation\""
        )
        .unwrap();

        let config = Config::load_from(file.path());
        let settings = config.settings();
        assert_eq!(settings.bpm, 100.0);
        assert_eq!(settings.threshold_alpha, 0.25);
        // untouched keys keep their embedded defaults
        assert_eq!(settings.steps_per_beat, 4);
        assert_eq!(settings.sequence_length, 32);
        assert_eq!(config.ports().input.as_deref(), Some("Keystation"));
    }

    #[test]
    fn test_malformed_user_file_is_ignored() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[timing\nbpm = ").unwrap();
        let config = Config::load_from(file.path());
        assert_eq!(config.settings(), EngineSettings::default());
    }

    #[test]
    fn test_missing_user_file_is_ignored() {
        let config = Config::load_from(Path::new("/nonexistent/antiphon/config.toml"));
        assert_eq!(config.settings().bpm, 80.0);
    }

    #[test]
    fn test_validated_clamps() {
        let settings = EngineSettings {
            bpm: 0.0,
            steps_per_beat: 0,
            sequence_length: 1,
            threshold_alpha: 3.0,
            split_pitch_threshold: 200,
            ..Default::default()
        }
        .validated();
        assert_eq!(settings.bpm, 1.0);
        assert_eq!(settings.steps_per_beat, 1);
        assert_eq!(settings.sequence_length, 2);
        assert_eq!(settings.threshold_alpha, 1.0);
        assert_eq!(settings.split_pitch_threshold, 127);
    }
}
