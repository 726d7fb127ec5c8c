//! Removal sequence of a block: animation raced against a safety timer.
//!
//! Both paths live in one task and meet in a `select!`, so exactly one of
//! them proceeds and the `FnOnce` completion is consumed once.

use crate::models::block::VisualHandle;
use crate::system::visuals::BlockVisuals;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Which side of the race finished the removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalPath {
    /// The animation reported back before the safety timer.
    Animated,
    /// The safety timer fired first.
    TimedOut,
}

#[derive(Clone)]
pub struct RemovalCoordinator {
    visuals: Arc<dyn BlockVisuals>,
    timeout: Duration,
}

impl RemovalCoordinator {
    pub fn new(visuals: Arc<dyn BlockVisuals>, timeout: Duration) -> Self {
        Self { visuals, timeout }
    }

    /// Plays the removal of `handle` on `runtime` and detaches it, then calls
    /// `on_complete` with the winning path.
    pub fn remove<F>(&self, runtime: &Handle, handle: VisualHandle, on_complete: F) -> JoinHandle<()>
    where
        F: FnOnce(RemovalPath) + Send + 'static,
    {
        let visuals = self.visuals.clone();
        let timeout = self.timeout;

        runtime.spawn(async move {
            let animation = visuals.play_removal(handle);

            // A dropped sender disables the first branch and leaves the timer.
            let path = tokio::select! {
                Ok(()) = animation => RemovalPath::Animated,
                _ = tokio::time::sleep(timeout) => RemovalPath::TimedOut,
            };

            match path {
                RemovalPath::Animated => visuals.detach(handle),
                RemovalPath::TimedOut => {
                    if visuals.is_attached(handle) {
                        log::warn!(
                            "REMOVAL: Animation of {:?} did not finish in {:?}, forcing detach",
                            handle,
                            timeout
                        );
                        visuals.detach(handle);
                    }
                }
            }

            on_complete(path);
        })
    }
}
