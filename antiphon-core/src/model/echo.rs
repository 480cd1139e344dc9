use antiphon_types::{Note, NoteSequence};

use super::{Latent, LatentModel, ModelError, OneHot};

const ECHO_VELOCITY: u8 = 100;

/// A model with one latent dimension per step, holding that step's token.
///
/// Encoding places the mean on the played token and adds a fixed spread, so
/// sampling perturbs the melody a little. Decoding rounds back to tokens and
/// reads them as a monophonic melody at twice the grid resolution.
#[derive(Debug, Clone)]
pub struct EchoModel {
    vocabulary: usize,
    steps_per_beat: usize,
    pitch_adjustment: u8,
    spread: f64,
}

impl EchoModel {
    pub fn new(
        vocabulary: usize,
        steps_per_beat: usize,
        pitch_adjustment: u8,
        spread: f64,
    ) -> Self {
        Self {
            vocabulary: vocabulary.max(2),
            steps_per_beat: steps_per_beat.max(1),
            pitch_adjustment,
            spread: spread.max(0.0),
        }
    }

    /// Length of one decoded step, in beats.
    fn native_step(&self) -> f64 {
        1.0 / (self.steps_per_beat * 2) as f64
    }

    fn token_for(&self, value: f64) -> usize {
        let max = (self.vocabulary - 1) as f64;
        (value * self.vocabulary as f64).round().clamp(0.0, max) as usize
    }
}

impl LatentModel for EchoModel {
    fn encode(&self, input: &OneHot, length: usize) -> Result<Latent, ModelError> {
        if input.width() != self.vocabulary {
            return Err(ModelError::Encode(format!(
                "expected {} columns, got {}",
                self.vocabulary,
                input.width()
            )));
        }
        if input.rows() < length {
            return Err(ModelError::Encode(format!(
                "asked for {} steps, input has {}",
                length,
                input.rows()
            )));
        }

        let scale = self.vocabulary as f64;
        let mu = (0..length)
            .map(|row| input.hot_index(row).unwrap_or(0) as f64 / scale)
            .collect();
        let sigma = vec![self.spread / scale; length];
        Ok(Latent { mu, sigma })
    }

    fn decode(
        &self,
        z: &[f64],
        length: usize,
        _temperature: f64,
    ) -> Result<NoteSequence, ModelError> {
        if z.len() < length {
            return Err(ModelError::Decode(format!(
                "latent has {} dims, need {}",
                z.len(),
                length
            )));
        }

        let step = self.native_step();
        let mut notes = Vec::new();
        let mut open: Option<(u8, usize)> = None;

        for (i, &value) in z.iter().take(length).enumerate() {
            match self.token_for(value) {
                0 => {}
                1 => {
                    if let Some((pitch, start)) = open.take() {
                        notes.push(note(pitch, start, i, step));
                    }
                }
                token => {
                    if let Some((pitch, start)) = open.take() {
                        notes.push(note(pitch, start, i, step));
                    }
                    let pitch = (token + usize::from(self.pitch_adjustment)).min(127) as u8;
                    open = Some((pitch, i));
                }
            }
        }
        if let Some((pitch, start)) = open {
            notes.push(note(pitch, start, length, step));
        }

        Ok(NoteSequence::new(notes, length as f64 * step))
    }
}

fn note(pitch: u8, start: usize, end: usize, step: f64) -> Note {
    Note {
        pitch,
        velocity: ECHO_VELOCITY,
        start: start as f64 * step,
        end: end as f64 * step,
    }
}
