//! A fetch callback that records outcomes, for testing remote fetchers.

use fetchbridge_api::remote_fetch::*;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// A [FetchCallback] recording every outcome it is given.
#[derive(Debug)]
pub struct RecordingCallback {
    outcomes: Mutex<Vec<Outcome>>,
    count: watch::Sender<usize>,
}

impl RecordingCallback {
    /// Construct a new callback.
    pub fn new() -> Arc<Self> {
        let (count, _) = watch::channel(0);
        Arc::new(Self {
            outcomes: Mutex::new(Vec::new()),
            count,
        })
    }

    /// Every outcome reported so far.
    pub fn outcomes(&self) -> Vec<Outcome> {
        self.outcomes.lock().unwrap().clone()
    }

    /// Wait for the first outcome and return it.
    ///
    /// Panics if none arrives within [crate::WAIT_TIMEOUT].
    pub async fn wait_outcome(&self) -> Outcome {
        let mut count = self.count.subscribe();
        let waited = tokio::time::timeout(
            crate::WAIT_TIMEOUT,
            count.wait_for(|count| *count > 0),
        )
        .await;
        match waited {
            Ok(Ok(_)) => (),
            _ => panic!("no outcome within {:?}", crate::WAIT_TIMEOUT),
        }
        self.outcomes().remove(0)
    }

    fn push(&self, outcome: Outcome) {
        self.outcomes.lock().unwrap().push(outcome);
        self.count.send_modify(|count| *count += 1);
    }
}

impl FetchCallback for RecordingCallback {
    fn on_success(&self, headers: ResponseHeaders, body: bytes::Bytes) {
        self.push(Outcome::Success { headers, body });
    }

    fn on_failure(&self, reason: String) {
        self.push(Outcome::Failure(FailureReason::Transport(reason)));
    }
}
