use super::{FetchProgress, FetchState};
#[cfg(doc)]
use fetchbridge_api::remote_fetch::FailureReason;
use tokio::sync::watch;

/// The caller's view of a started fetch.
///
/// Dropping the handle does not cancel the fetch.
#[derive(Debug, Clone)]
pub struct FetchHandle {
    cancel: watch::Sender<bool>,
    progress: watch::Receiver<FetchProgress>,
}

impl FetchHandle {
    pub(super) fn new(
        cancel: watch::Sender<bool>,
        progress: watch::Receiver<FetchProgress>,
    ) -> Self {
        Self { cancel, progress }
    }

    /// Ask the fetch to stop. The consumer is told
    /// [FailureReason::Cancelled] unless an outcome was already delivered.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Whether [FetchHandle::cancel] was called.
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// The latest progress of the fetch.
    pub fn progress(&self) -> FetchProgress {
        self.progress.borrow().clone()
    }

    /// Wait until the bridge is released, returning its final progress.
    pub async fn wait(&self) -> FetchProgress {
        let mut progress = self.progress.clone();
        let released = progress
            .wait_for(|p| p.state == FetchState::Released)
            .await
            .map(|p| p.clone());
        // The bridge only goes away after publishing Released.
        released.unwrap_or_else(|_| progress.borrow().clone())
    }
}
