//! The generative model seam.
//!
//! The engine only needs a variational model's two halves: an encoder that
//! maps a one-hot melody to the parameters of a latent distribution, and a
//! decoder that maps a latent point back to notes. `EchoModel` is the
//! bundled implementation; anything else plugs in through `LatentModel`.

mod echo;

pub use echo::EchoModel;

use std::fmt;

use antiphon_types::{NoteSequence, StepGrid};

/// Error from an encode or decode call.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    Encode(String),
    Decode(String),
    /// The encoder returned mean and spread vectors of different lengths.
    Shape { mu: usize, sigma: usize },
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Encode(msg) => write!(f, "encode failed: {}", msg),
            ModelError::Decode(msg) => write!(f, "decode failed: {}", msg),
            ModelError::Shape { mu, sigma } => write!(
                f,
                "latent shape mismatch: mu has {} dims, sigma has {}",
                mu, sigma
            ),
        }
    }
}

impl std::error::Error for ModelError {}

/// Parameters of a diagonal Gaussian over the latent space.
#[derive(Debug, Clone, PartialEq)]
pub struct Latent {
    pub mu: Vec<f64>,
    pub sigma: Vec<f64>,
}

/// One-hot melody tensor: one row per step, `width` columns per row.
///
/// Row `i` has a single 1.0 at the token of grid cell `i`. Cells without a
/// token inside the vocabulary (negative or too-high adjusted pitches) leave
/// their row all zero.
#[derive(Debug, Clone, PartialEq)]
pub struct OneHot {
    width: usize,
    data: Vec<f64>,
}

impl OneHot {
    pub fn from_grid(grid: &StepGrid, width: usize) -> Self {
        let mut data = vec![0.0; grid.len() * width];
        for (row, cell) in grid.iter().enumerate() {
            if let Some(token) = cell.token().filter(|&t| t < width) {
                data[row * width + token] = 1.0;
            }
        }
        Self { width, data }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn rows(&self) -> usize {
        if self.width == 0 {
            0
        } else {
            self.data.len() / self.width
        }
    }

    pub fn row(&self, row: usize) -> &[f64] {
        let start = (row * self.width).min(self.data.len());
        let end = (start + self.width).min(self.data.len());
        &self.data[start..end]
    }

    /// Column holding the 1.0 in `row`, if any.
    pub fn hot_index(&self, row: usize) -> Option<usize> {
        self.row(row).iter().position(|&v| v > 0.5)
    }

    /// Flat row-major view.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}

pub trait LatentModel: Send + Sync {
    /// Encode the first `length` steps of `input`.
    fn encode(&self, input: &OneHot, length: usize) -> Result<Latent, ModelError>;

    /// Decode latent point `z` into a sequence of `length` steps. Note times
    /// are in beats at the model's own step resolution.
    fn decode(
        &self,
        z: &[f64],
        length: usize,
        temperature: f64,
    ) -> Result<NoteSequence, ModelError>;
}
