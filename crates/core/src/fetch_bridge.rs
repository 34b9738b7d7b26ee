//! The fetch bridge runs one http fetch from start to delivery.
//!
//! A [FetchBridge] is created by whoever wants the resource, together
//! with the [FetchConsumer] that should receive it, and then started.
//!
//! ### Lifecycle
//!
//! `Created → Started → Fetching → Succeeded | Failed → Released`
//!
//! - [FetchBridge::start] moves the bridge into a task posted onto the
//!   dispatcher of the cluster manager and runs the dispatcher without
//!   blocking. The caller only keeps a [FetchHandle].
//! - On the dispatcher thread, the fetch routine checks for cancellation,
//!   calls [FetchBridge::initialize], builds a fresh [TargetDescriptor]
//!   and a [BridgeCallback], constructs one remote fetcher and issues the
//!   fetch.
//! - The routine then waits without blocking the dispatcher for the one
//!   outcome, for cancellation, or for the outcome timeout. Whichever
//!   comes first is passed to [FetchBridge::on_outcome].
//! - When the routine ends the bridge is dropped, which publishes
//!   `Released`.
//!
//! ### Delivery
//!
//! The consumer gets the headers, then the body in chunks, then exactly
//! one terminal signal. A failure only produces the terminal signal. If a
//! bridge is dropped without having delivered a terminal signal (it was
//! never started, the dispatcher went away, ...) it delivers
//! [FailureReason::Abandoned] from its `Drop`.

use fetchbridge_api::{
    cluster::DynClusterManager,
    consumer::DynFetchConsumer,
    dispatcher::RunType,
    message::{DynMessageHandler, MessageType},
    remote_fetch::*,
    *,
};
use futures::FutureExt;
use std::time::Duration;
use tokio::sync::watch;

mod callback;
pub use callback::BridgeCallback;

mod handle;
pub use handle::FetchHandle;

/// CoreFetchBridge configuration types.
pub mod config {
    use fetchbridge_api::config::ModConfig;

    /// Configuration parameters for
    /// [FetchBridge](super::FetchBridge).
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    pub struct CoreFetchBridgeConfig {
        /// Cluster used when a fetch doesn't name one. Default: "default".
        pub default_cluster: String,
        /// Product token added to the `User-Agent` request header. An
        /// empty string leaves the header alone.
        /// Default: "fetchbridge/<crate version>".
        pub user_agent: String,
        /// How long to wait for the remote fetcher to report an outcome.
        /// Default: 60 s.
        pub outcome_timeout_ms: u32,
        /// Largest chunk handed to a single consumer write.
        /// Default: 64 KiB.
        pub body_chunk_size: u32,
    }

    impl Default for CoreFetchBridgeConfig {
        fn default() -> Self {
            Self {
                default_cluster: "default".into(),
                user_agent: concat!(
                    "fetchbridge/",
                    env!("CARGO_PKG_VERSION")
                )
                .into(),
                outcome_timeout_ms: 60_000,
                body_chunk_size: 64 * 1024,
            }
        }
    }

    /// Module-level configuration for CoreFetchBridge.
    #[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    pub struct CoreFetchBridgeModConfig {
        /// CoreFetchBridge configuration.
        pub core_fetch_bridge: CoreFetchBridgeConfig,
    }

    impl ModConfig for CoreFetchBridgeModConfig {}
}

use config::*;

/// Where a [FetchBridge] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchState {
    /// Constructed, not started.
    #[default]
    Created,

    /// Posted onto the dispatcher.
    Started,

    /// The request was issued, waiting for the outcome.
    Fetching,

    /// The response was delivered to the consumer.
    Succeeded,

    /// The consumer was told the fetch failed.
    Failed,

    /// The bridge is gone. Nothing happens afterwards.
    Released,
}

/// A snapshot of the progress of one fetch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchProgress {
    /// The lifecycle state.
    pub state: FetchState,

    /// The body length declared by the response headers, if definite.
    pub content_length: Option<u64>,

    /// Body bytes accepted by the consumer so far.
    pub bytes_written: u64,

    /// The terminal signal given to the consumer, once it was given.
    pub result: Option<Result<(), FailureReason>>,
}

/// One single-use fetch of a url, delivered to a [FetchConsumer].
///
/// [FetchConsumer]: fetchbridge_api::consumer::FetchConsumer
#[derive(Debug)]
pub struct FetchBridge {
    target_url: String,
    cluster: Option<String>,
    content_identity: Option<String>,
    request_headers: http::HeaderMap,
    request_url: Option<Url>,
    init_failure: Option<String>,
    consumer: DynFetchConsumer,
    cluster_manager: DynClusterManager,
    message_handler: DynMessageHandler,
    config: CoreFetchBridgeConfig,
    state: FetchState,
    accepted: bool,
    signalled: bool,
    content_length: Option<u64>,
    progress: watch::Sender<FetchProgress>,
    cancel: Option<watch::Receiver<bool>>,
}

impl FetchBridge {
    /// Construct a bridge fetching `target_url` for `consumer`.
    ///
    /// The bridge uses the default [CoreFetchBridgeConfig] and the message
    /// handler of the cluster manager until told otherwise.
    pub fn new(
        cluster_manager: DynClusterManager,
        target_url: impl Into<String>,
        consumer: DynFetchConsumer,
    ) -> Self {
        let message_handler = cluster_manager.message_handler();
        let (progress, _) = watch::channel(FetchProgress::default());
        Self {
            target_url: target_url.into(),
            cluster: None,
            content_identity: None,
            request_headers: http::HeaderMap::new(),
            request_url: None,
            init_failure: None,
            consumer,
            cluster_manager,
            message_handler,
            config: CoreFetchBridgeConfig::default(),
            state: FetchState::Created,
            accepted: false,
            signalled: false,
            content_length: None,
            progress,
            cancel: None,
        }
    }

    /// Send the request to this cluster instead of the configured
    /// default cluster.
    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = Some(cluster.into());
        self
    }

    /// Use this content identity token instead of one derived from the
    /// url.
    pub fn with_content_identity(mut self, token: impl Into<String>) -> Self {
        self.content_identity = Some(token.into());
        self
    }

    /// Send these request headers.
    pub fn with_request_headers(mut self, headers: http::HeaderMap) -> Self {
        self.request_headers = headers;
        self
    }

    /// Use this configuration.
    pub fn with_config(mut self, config: CoreFetchBridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Report diagnostics to this message handler.
    pub fn with_message_handler(
        mut self,
        message_handler: DynMessageHandler,
    ) -> Self {
        self.message_handler = message_handler;
        self
    }

    /// The url this bridge fetches.
    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    /// The diagnostic sink of this bridge.
    pub fn message_handler(&self) -> &DynMessageHandler {
        &self.message_handler
    }

    /// Where this bridge is in its lifecycle.
    pub fn state(&self) -> FetchState {
        self.state
    }

    /// Whether the terminal signal was given to the consumer.
    pub fn is_done(&self) -> bool {
        self.signalled
    }

    /// The body length declared by the response headers.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Whether the response headers declared a definite body length.
    pub fn content_length_known(&self) -> bool {
        self.content_length.is_some()
    }

    /// Post the fetch onto the dispatcher and return right away.
    ///
    /// Consuming the bridge makes a second start impossible. From here on
    /// the consumer will receive exactly one terminal signal. If the
    /// dispatcher refuses the task, that signal is
    /// [FailureReason::Abandoned] and the error is also returned.
    pub fn start(mut self) -> BridgeResult<FetchHandle> {
        let (cancel_send, cancel) = watch::channel(false);
        self.cancel = Some(cancel);
        self.set_state(FetchState::Started);
        let handle = FetchHandle::new(cancel_send, self.progress.subscribe());

        tracing::debug!(url = %self.target_url, "starting fetch");

        let dispatcher = self.cluster_manager.dispatcher();
        dispatcher.post(Box::pin(self.fetch_routine()))?;

        // A non-blocking run is ready right away.
        let run = dispatcher.run(RunType::NonBlock).now_or_never();
        if let Some(Err(err)) = run {
            handle.cancel();
            return Err(err);
        }

        Ok(handle)
    }

    /// Prepare the request: validate the url and fix up the request
    /// headers. Returns false if the request cannot be made, in which
    /// case no fetch will be issued.
    ///
    /// The fetch routine calls this before issuing the fetch. Calling it
    /// earlier is allowed, the result is kept.
    pub fn initialize(&mut self) -> bool {
        if self.request_url.is_some() {
            return true;
        }
        if self.init_failure.is_some() {
            return false;
        }

        match self.prepare_request() {
            Ok(url) => {
                self.request_url = Some(url);
                true
            }
            Err(reason) => {
                self.diagnostic(
                    MessageType::Error,
                    &format!(
                        "cannot prepare fetch of {}: {reason}",
                        self.target_url
                    ),
                );
                self.init_failure = Some(reason);
                false
            }
        }
    }

    /// Hand the terminal outcome of the fetch to the consumer.
    ///
    /// Only the first call has any effect. Later calls are reported as
    /// diagnostics and return false.
    pub fn on_outcome(&mut self, outcome: Outcome) -> bool {
        if self.accepted {
            self.diagnostic(
                MessageType::Error,
                &format!(
                    "rejecting second outcome for {}: {outcome}",
                    self.target_url
                ),
            );
            return false;
        }
        self.accepted = true;

        let result = match outcome {
            Outcome::Success { headers, body } => {
                self.deliver_response(headers, body)
            }
            Outcome::Failure(reason) => Err(reason),
        };

        self.signal(result);
        true
    }

    /// Give the consumer its terminal signal.
    fn signal(&mut self, result: Result<(), FailureReason>) {
        match &result {
            Ok(()) => {
                tracing::debug!(url = %self.target_url, "fetch succeeded");
                self.set_state(FetchState::Succeeded);
            }
            Err(reason) => {
                tracing::debug!(
                    url = %self.target_url,
                    %reason,
                    "fetch failed",
                );
                self.set_state(FetchState::Failed);
            }
        }
        self.signalled = true;
        self.progress
            .send_modify(|p| p.result = Some(result.clone()));
        self.consumer.done(result);
    }

    fn deliver_response(
        &mut self,
        headers: ResponseHeaders,
        body: bytes::Bytes,
    ) -> Result<(), FailureReason> {
        self.content_length = headers.content_length();
        let content_length = self.content_length;
        self.progress
            .send_modify(|p| p.content_length = content_length);

        if let Some(declared) = content_length {
            if declared != body.len() as u64 {
                self.diagnostic(
                    MessageType::Warning,
                    &format!(
                        "{} declared {declared} bytes but delivered {}",
                        self.target_url,
                        body.len()
                    ),
                );
            }
        }

        self.consumer.headers(&headers);

        let chunk_size = (self.config.body_chunk_size as usize).max(1);
        let mut offset = 0;
        while offset < body.len() {
            let end = body.len().min(offset + chunk_size);
            if let Err(err) = self.consumer.write(body.slice(offset..end)) {
                self.diagnostic(
                    MessageType::Warning,
                    &format!(
                        "consumer of {} rejected body: {err}",
                        self.target_url
                    ),
                );
                return Err(FailureReason::ConsumerRejected(err.to_string()));
            }
            let written = (end - offset) as u64;
            self.progress.send_modify(|p| p.bytes_written += written);
            offset = end;
        }

        Ok(())
    }

    async fn fetch_routine(mut self) {
        let outcome = self.fetch().await;
        self.on_outcome(outcome);
    }

    async fn fetch(&mut self) -> Outcome {
        if self.is_cancelled() {
            return Outcome::Failure(FailureReason::Cancelled);
        }

        if !self.initialize() {
            let reason = self.init_failure.clone().unwrap_or_default();
            return Outcome::Failure(FailureReason::Initialization(reason));
        }
        let Some(uri) = self.request_url.clone() else {
            return Outcome::Failure(FailureReason::Initialization(
                "request url was not prepared".into(),
            ));
        };

        let target = TargetDescriptor::new(
            uri.clone(),
            self.cluster
                .clone()
                .unwrap_or_else(|| self.config.default_cluster.clone()),
            self.content_identity
                .clone()
                .unwrap_or_else(|| content_identity(&uri)),
        )
        .with_request_headers(self.request_headers.clone());

        let (callback, outcome_recv) = BridgeCallback::create(
            self.target_url.clone(),
            self.message_handler.clone(),
        );

        let pool = self.cluster_manager.connection_pool();
        let fetcher = match pool.remote_fetcher() {
            Ok(fetcher) => fetcher,
            Err(err) => {
                self.diagnostic(
                    MessageType::Error,
                    &format!(
                        "cannot construct remote fetcher for {}: {err}",
                        self.target_url
                    ),
                );
                return Outcome::Failure(FailureReason::Initialization(
                    err.to_string(),
                ));
            }
        };

        tracing::debug!(
            url = %self.target_url,
            cluster = %target.cluster(),
            "issuing fetch",
        );
        fetcher.fetch(target, callback);
        self.set_state(FetchState::Fetching);

        let timeout =
            Duration::from_millis(self.config.outcome_timeout_ms as u64);
        let cancelled = wait_cancelled(self.cancel.clone());

        let outcome = tokio::select! {
            biased;
            outcome = outcome_recv => {
                // The sender is gone without sending: every reference to
                // the callback was dropped without an outcome.
                outcome.unwrap_or(Outcome::Failure(FailureReason::Abandoned))
            }
            _ = cancelled => Outcome::Failure(FailureReason::Cancelled),
            _ = tokio::time::sleep(timeout) => {
                Outcome::Failure(FailureReason::TimedOut(timeout))
            }
        };

        match &outcome {
            Outcome::Failure(FailureReason::Abandoned) => self.diagnostic(
                MessageType::Error,
                &format!(
                    "remote fetcher for {} released its callback \
                    without an outcome",
                    self.target_url
                ),
            ),
            Outcome::Failure(FailureReason::TimedOut(timeout)) => self
                .diagnostic(
                    MessageType::Error,
                    &format!(
                        "remote fetcher for {} reported no outcome \
                        within {timeout:?}",
                        self.target_url
                    ),
                ),
            _ => (),
        }

        outcome
    }

    fn prepare_request(&mut self) -> Result<Url, String> {
        let url = Url::parse(&self.target_url)
            .map_err(|e| format!("invalid url: {e}"))?;
        match url.scheme() {
            "http" | "https" => (),
            scheme => return Err(format!("unsupported scheme {scheme:?}")),
        }
        self.fix_user_agent()?;
        Ok(url)
    }

    /// Make sure the configured product token is part of the user agent.
    fn fix_user_agent(&mut self) -> Result<(), String> {
        let product = &self.config.user_agent;
        if product.is_empty() {
            return Ok(());
        }

        let user_agent = match self
            .request_headers
            .get(http::header::USER_AGENT)
            .map(|v| v.to_str())
        {
            None => product.clone(),
            Some(Ok(existing)) if existing.contains(product.as_str()) => {
                return Ok(())
            }
            Some(Ok(existing)) => format!("{existing} {product}"),
            Some(Err(_)) => {
                return Err("user agent header is not visible ascii".into())
            }
        };

        let user_agent = http::HeaderValue::from_str(&user_agent)
            .map_err(|e| format!("invalid user agent: {e}"))?;
        self.request_headers
            .insert(http::header::USER_AGENT, user_agent);
        Ok(())
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| *c.borrow())
    }

    fn set_state(&mut self, state: FetchState) {
        self.state = state;
        self.progress.send_modify(|p| p.state = state);
    }

    fn diagnostic(&self, message_type: MessageType, message: &str) {
        self.message_handler.message(message_type, message);
    }
}

impl Drop for FetchBridge {
    fn drop(&mut self) {
        // Also reached when delivery was cut short by a panicking consumer.
        if !self.signalled {
            self.diagnostic(
                MessageType::Error,
                &format!(
                    "fetch of {} released without an outcome",
                    self.target_url
                ),
            );
            self.accepted = true;
            self.signal(Err(FailureReason::Abandoned));
        }
        self.set_state(FetchState::Released);
    }
}

/// Resolves once the fetch is cancelled. Never resolves if the handle
/// was dropped without cancelling.
async fn wait_cancelled(cancel: Option<watch::Receiver<bool>>) {
    if let Some(mut cancel) = cancel {
        if cancel.wait_for(|cancelled| *cancelled).await.is_ok() {
            return;
        }
    }
    std::future::pending::<()>().await
}

/// The default content identity token: sha256 of the url, base64url.
fn content_identity(uri: &Url) -> String {
    use base64::Engine;
    use sha2::{Digest, Sha256};

    base64::prelude::BASE64_URL_SAFE_NO_PAD
        .encode(Sha256::digest(uri.as_str().as_bytes()))
}
