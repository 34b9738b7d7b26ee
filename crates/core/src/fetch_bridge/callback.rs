use fetchbridge_api::{message::*, remote_fetch::*};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// The completion callback handed to a remote fetcher.
///
/// It only holds the sending side of the outcome channel. The first
/// outcome is forwarded to the waiting fetch routine, later ones are
/// reported as diagnostics and dropped. Dropping every reference without
/// reporting closes the channel, which the fetch routine observes.
#[derive(Debug)]
pub struct BridgeCallback {
    target_url: String,
    message_handler: DynMessageHandler,
    send: Mutex<Option<oneshot::Sender<Outcome>>>,
}

impl BridgeCallback {
    /// Construct a callback, returning it with the receiving side of its
    /// outcome channel.
    pub fn create(
        target_url: String,
        message_handler: DynMessageHandler,
    ) -> (DynFetchCallback, oneshot::Receiver<Outcome>) {
        let (send, recv) = oneshot::channel();
        let out: DynFetchCallback = Arc::new(Self {
            target_url,
            message_handler,
            send: Mutex::new(Some(send)),
        });
        (out, recv)
    }

    fn report(&self, outcome: Outcome) {
        let Some(send) = self.send.lock().unwrap().take() else {
            self.message_handler.message(
                MessageType::Error,
                &format!(
                    "ignoring second outcome for {}: {outcome}",
                    self.target_url
                ),
            );
            return;
        };

        if send.send(outcome).is_err() {
            tracing::debug!(
                url = %self.target_url,
                "outcome arrived after the fetch was over",
            );
        }
    }
}

impl FetchCallback for BridgeCallback {
    fn on_success(&self, headers: ResponseHeaders, body: bytes::Bytes) {
        self.report(Outcome::Success { headers, body });
    }

    fn on_failure(&self, reason: String) {
        self.report(Outcome::Failure(FailureReason::Transport(reason)));
    }
}
