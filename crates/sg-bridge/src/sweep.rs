//! Explicit cancelable handle for a spawned periodic task.
//!
//! Teardown cancellation is structural: dropping or stopping the handle
//! aborts the task, so no sweep or repeat timer can fire against state that
//! no longer exists.

use tokio::task::JoinHandle;

pub struct SweepHandle {
    handle: JoinHandle<()>,
}

impl SweepHandle {
    pub fn new(handle: JoinHandle<()>) -> Self {
        Self { handle }
    }

    /// Stop the task. No further ticks fire after this returns.
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
