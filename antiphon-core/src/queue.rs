//! FIFO of generated continuations for one range.
//!
//! Generation threads append, the scheduler pops at sequence boundaries.
//! Both sides hold a clone; the channel carries the synchronization.

use antiphon_types::NoteSequence;
use crossbeam_channel::{Receiver, Sender};

#[derive(Clone)]
pub struct GeneratedQueue {
    tx: Sender<NoteSequence>,
    rx: Receiver<NoteSequence>,
}

impl GeneratedQueue {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }

    pub fn push(&self, sequence: NoteSequence) {
        // Both ends live in `self`, so the channel cannot be disconnected.
        let _ = self.tx.send(sequence);
    }

    /// Take the oldest sequence without blocking.
    pub fn pop_oldest(&self) -> Option<NoteSequence> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for GeneratedQueue {
    fn default() -> Self {
        Self::new()
    }
}
