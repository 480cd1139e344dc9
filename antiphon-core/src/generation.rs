//! Continuation generation: grid in, rescaled note sequence out.

use std::sync::Arc;

use antiphon_types::{NoteSequence, Range, StepGrid};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::model::{LatentModel, ModelError, OneHot};
use crate::queue::GeneratedQueue;
use crate::tasks::TaskTracker;

/// Token vocabulary of the melody model: sustain, release, and 88 pitches.
pub const PITCH_VOCABULARY_SIZE: usize = 90;

/// The model decodes at twice the grid resolution; stretching by this factor
/// puts its output back on the target tempo.
pub const GENERATION_TIME_SCALE: f64 = 2.0;

/// Encode `input`, draw one sample from the latent distribution, decode it
/// and rescale the result.
pub fn generate_continuation<R: Rng>(
    model: &dyn LatentModel,
    input: &OneHot,
    length: usize,
    temperature: f64,
    rng: &mut R,
) -> Result<NoteSequence, ModelError> {
    let latent = model.encode(input, length)?;
    if latent.mu.len() != latent.sigma.len() {
        return Err(ModelError::Shape {
            mu: latent.mu.len(),
            sigma: latent.sigma.len(),
        });
    }

    let z: Vec<f64> = latent
        .mu
        .iter()
        .zip(&latent.sigma)
        .map(|(mu, sigma)| {
            let epsilon: f64 = rng.sample(StandardNormal);
            mu + sigma * epsilon
        })
        .collect();

    let mut sequence = model.decode(&z, length, temperature)?;
    sequence.scale_timing(GENERATION_TIME_SCALE);
    Ok(sequence)
}

/// Launches generation threads at sequence boundaries.
#[derive(Clone)]
pub struct GenerationDispatcher {
    model: Arc<dyn LatentModel>,
    temperature: f64,
    length: usize,
}

impl GenerationDispatcher {
    pub fn new(model: Arc<dyn LatentModel>, temperature: f64, length: usize) -> Self {
        Self {
            model,
            temperature,
            length,
        }
    }

    /// Start generating a continuation of `grid` into `queue`. Grids with no
    /// events are skipped. Returns whether a task was started.
    pub fn dispatch(
        &self,
        range: Range,
        grid: &StepGrid,
        queue: GeneratedQueue,
        tasks: &mut TaskTracker,
    ) -> bool {
        if !grid.has_events() {
            log::trace!(target: "generation", "{} range idle, nothing to generate", range);
            return false;
        }

        let input = OneHot::from_grid(grid, PITCH_VOCABULARY_SIZE);
        let model = Arc::clone(&self.model);
        let (length, temperature) = (self.length, self.temperature);
        log::debug!(target: "generation", "generating {} range continuation", range);

        tasks.spawn(format!("generate-{}", range), move || {
            let mut rng = rand::thread_rng();
            match generate_continuation(model.as_ref(), &input, length, temperature, &mut rng) {
                Ok(sequence) => {
                    log::debug!(
                        target: "generation",
                        "{} range: queued {} notes over {:.2} beats",
                        range,
                        sequence.notes.len(),
                        sequence.total_time
                    );
                    queue.push(sequence);
                }
                Err(e) => log::warn!(target: "generation", "{} range: {}", range, e),
            }
        })
    }
}
