//! Registry for the detached generation and playback threads.
//!
//! Tasks are never cancelled. The tracker only keeps enough of a handle to
//! notice when one panicked, and to report what was still running at exit.

use std::thread::{self, JoinHandle};

struct Task {
    name: String,
    handle: JoinHandle<()>,
}

#[derive(Default)]
pub struct TaskTracker {
    tasks: Vec<Task>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` on a new named thread. Returns false if the OS refused to
    /// create it; the failure is logged and the work is skipped.
    pub fn spawn<F>(&mut self, name: impl Into<String>, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let name = name.into();
        match thread::Builder::new().name(name.clone()).spawn(f) {
            Ok(handle) => {
                self.tasks.push(Task { name, handle });
                true
            }
            Err(e) => {
                log::warn!(target: "tasks", "failed to spawn {}: {}", name, e);
                false
            }
        }
    }

    /// Join every finished task, logging the ones that panicked.
    /// Returns how many were reaped.
    pub fn reap(&mut self) -> usize {
        let (finished, running): (Vec<Task>, Vec<Task>) = std::mem::take(&mut self.tasks)
            .into_iter()
            .partition(|task| task.handle.is_finished());
        self.tasks = running;

        for task in &finished {
            log::trace!(target: "tasks", "{} finished", task.name);
        }
        let count = finished.len();
        for task in finished {
            if task.handle.join().is_err() {
                log::error!(target: "tasks", "{} panicked", task.name);
            }
        }
        count
    }

    /// Number of tasks not yet reaped.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Give up on every outstanding task. Their threads keep running until
    /// the process exits.
    pub fn detach_all(&mut self) -> usize {
        self.reap();
        let remaining = self.tasks.len();
        if remaining > 0 {
            log::info!(target: "tasks", "leaving {} background task(s) running", remaining);
        }
        self.tasks.clear();
        remaining
    }
}

impl Drop for TaskTracker {
    fn drop(&mut self) {
        self.detach_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn wait_until_finished(tracker: &TaskTracker) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while tracker.tasks.iter().any(|t| !t.handle.is_finished()) {
            assert!(Instant::now() < deadline, "tasks did not finish");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn spawned_tasks_run_and_get_reaped() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut tracker = TaskTracker::new();
        for _ in 0..3 {
            let counter = Arc::clone(&counter);
            assert!(tracker.spawn("worker", move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        wait_until_finished(&tracker);
        assert_eq!(tracker.reap(), 3);
        assert!(tracker.is_empty());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn panicking_task_is_reaped_without_propagating() {
        let mut tracker = TaskTracker::new();
        tracker.spawn("doomed", || panic!("boom"));
        wait_until_finished(&tracker);
        assert_eq!(tracker.reap(), 1);
    }

    #[test]
    fn running_tasks_survive_reap_and_detach() {
        let (tx, rx) = crossbeam_channel::bounded::<()>(0);
        let mut tracker = TaskTracker::new();
        tracker.spawn("blocked", move || {
            let _ = rx.recv();
        });
        assert_eq!(tracker.reap(), 0);
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.detach_all(), 1);
        assert!(tracker.is_empty());
        drop(tx);
    }
}
