/// One step of a captured sequence window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum Cell {
    /// No new event: whatever was sounding keeps sounding (or silence continues).
    #[default]
    Sustain,
    /// A note ends at this step.
    Release,
    /// A note starts at this step. `pitch` is the adjusted pitch
    /// (raw MIDI pitch minus the configured offset).
    Note { pitch: i16, velocity: u8 },
}

impl Cell {
    /// Token index in the model's melody vocabulary: 0 = sustain, 1 = release,
    /// otherwise the adjusted pitch. Negative pitches have no token.
    pub fn token(&self) -> Option<usize> {
        match *self {
            Cell::Sustain => Some(0),
            Cell::Release => Some(1),
            Cell::Note { pitch, .. } => usize::try_from(pitch).ok(),
        }
    }

    pub fn velocity(&self) -> u8 {
        match *self {
            Cell::Note { velocity, .. } => velocity,
            Cell::Sustain | Cell::Release => 0,
        }
    }

    pub fn pitch(&self) -> Option<i16> {
        match *self {
            Cell::Note { pitch, .. } => Some(pitch),
            Cell::Sustain | Cell::Release => None,
        }
    }

    pub fn is_sustain(&self) -> bool {
        matches!(self, Cell::Sustain)
    }
}

/// Fixed-length grid of cells for one range and one sequence window.
///
/// Writes past the last index are ignored, so callers may address
/// `step + 1` without bounds checks of their own.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StepGrid {
    cells: Vec<Cell>,
}

impl StepGrid {
    pub fn new(len: usize) -> Self {
        Self { cells: vec![Cell::Sustain; len] }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn last_step(&self) -> usize {
        self.cells.len().saturating_sub(1)
    }

    pub fn get(&self, step: usize) -> Option<Cell> {
        self.cells.get(step).copied()
    }

    /// Overwrite the cell at `step`. Returns `false` (and writes nothing)
    /// when `step` is out of bounds.
    pub fn set(&mut self, step: usize, cell: Cell) -> bool {
        match self.cells.get_mut(step) {
            Some(slot) => {
                *slot = cell;
                true
            }
            None => false,
        }
    }

    /// Velocity stored at `step`, 0 for anything but a note or out of bounds.
    pub fn velocity_at(&self, step: usize) -> u8 {
        self.get(step).map(|c| c.velocity()).unwrap_or(0)
    }

    /// True when every cell is still `Sustain`: nothing was captured yet.
    pub fn is_idle(&self) -> bool {
        self.cells.iter().all(Cell::is_sustain)
    }

    /// True when at least one cell holds a note or a release.
    pub fn has_events(&self) -> bool {
        !self.is_idle()
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter()
    }
}
