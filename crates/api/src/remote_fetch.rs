//! Remote fetch types.
//!
//! A [ConnectionPool] constructs [RemoteFetcher]s. Each remote fetcher
//! issues exactly one request for a [TargetDescriptor] and reports the
//! outcome through a [FetchCallback].

use crate::*;
#[cfg(any(test, feature = "mockall"))]
use mockall::automock;
use std::{sync::Arc, time::Duration};

/// Identifies what one fetch should retrieve, and from which upstream.
///
/// A descriptor is built fresh for every fetch and never changes after
/// construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    uri: Url,
    cluster: String,
    content_identity: String,
    request_headers: http::HeaderMap,
}

impl TargetDescriptor {
    /// Construct a new descriptor with no request headers.
    pub fn new(
        uri: Url,
        cluster: impl Into<String>,
        content_identity: impl Into<String>,
    ) -> Self {
        Self {
            uri,
            cluster: cluster.into(),
            content_identity: content_identity.into(),
            request_headers: http::HeaderMap::new(),
        }
    }

    /// Attach the request headers to send.
    pub fn with_request_headers(mut self, headers: http::HeaderMap) -> Self {
        self.request_headers = headers;
        self
    }

    /// The resource to retrieve.
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    /// The name of the upstream cluster to send the request to.
    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    /// Opaque token a transport may use to key caches or deduplicate
    /// requests. Fetch bridges don't interpret it.
    pub fn content_identity(&self) -> &str {
        &self.content_identity
    }

    /// The headers to send with the request.
    pub fn request_headers(&self) -> &http::HeaderMap {
        &self.request_headers
    }
}

/// The status line and headers of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHeaders {
    status: http::StatusCode,
    headers: http::HeaderMap,
}

impl Default for ResponseHeaders {
    fn default() -> Self {
        Self::new(http::StatusCode::OK, http::HeaderMap::new())
    }
}

impl ResponseHeaders {
    /// Construct response headers.
    pub fn new(status: http::StatusCode, headers: http::HeaderMap) -> Self {
        Self { status, headers }
    }

    /// The response status.
    pub fn status(&self) -> http::StatusCode {
        self.status
    }

    /// The response header fields.
    pub fn headers(&self) -> &http::HeaderMap {
        &self.headers
    }

    /// The body length declared by the headers, if it is definite.
    ///
    /// This is `None` if there is no `Content-Length`, if any of its
    /// values is not a plain decimal number, if several values disagree,
    /// or if a `Transfer-Encoding` is present (which overrides any
    /// declared length).
    pub fn content_length(&self) -> Option<u64> {
        if self.headers.contains_key(http::header::TRANSFER_ENCODING) {
            return None;
        }

        let mut out = None;
        for value in self.headers.get_all(http::header::CONTENT_LENGTH) {
            let value = value.to_str().ok()?.trim();
            if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit())
            {
                return None;
            }
            let len = value.parse::<u64>().ok()?;
            match out {
                Some(prev) if prev != len => return None,
                _ => out = Some(len),
            }
        }
        out
    }
}

/// Why a fetch did not complete successfully.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureReason {
    /// The remote fetcher reported a failure. The reason is passed on
    /// verbatim.
    #[error("{0}")]
    Transport(String),

    /// The request could not be prepared, no fetch was issued.
    #[error("initialization failed: {0}")]
    Initialization(String),

    /// The fetch was cancelled before an outcome arrived.
    #[error("fetch cancelled")]
    Cancelled,

    /// No outcome arrived within the configured time.
    #[error("no outcome within {0:?}")]
    TimedOut(Duration),

    /// The fetch was released without ever receiving an outcome.
    #[error("fetch abandoned before an outcome was delivered")]
    Abandoned,

    /// The consumer refused a body write.
    #[error("consumer rejected body: {0}")]
    ConsumerRejected(String),
}

/// The terminal result of one remote fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A complete response was received.
    Success {
        /// The response headers.
        headers: ResponseHeaders,

        /// The complete response body.
        body: bytes::Bytes,
    },

    /// No response could be obtained.
    Failure(FailureReason),
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success { headers, body } => write!(
                f,
                "response {} with {} body bytes",
                headers.status(),
                body.len()
            ),
            Self::Failure(reason) => write!(f, "failure: {reason}"),
        }
    }
}

/// Receives the terminal outcome of a [RemoteFetcher].
///
/// Exactly one of the two functions is called per issued fetch. The call
/// may happen on any thread.
pub trait FetchCallback: 'static + Send + Sync + std::fmt::Debug {
    /// A complete response was received.
    fn on_success(&self, headers: ResponseHeaders, body: bytes::Bytes);

    /// The request failed.
    fn on_failure(&self, reason: String);
}

/// Trait-object [FetchCallback].
pub type DynFetchCallback = Arc<dyn FetchCallback>;

/// Issues a single request.
///
/// Implementations must call exactly one of [FetchCallback::on_success]
/// or [FetchCallback::on_failure], exactly once. `fetch` consumes the
/// fetcher, so no fetcher can issue a second request.
pub trait RemoteFetcher: 'static + Send + std::fmt::Debug {
    /// Issue the request. This must not block; the outcome is reported
    /// asynchronously through the callback.
    fn fetch(
        self: Box<Self>,
        target: TargetDescriptor,
        callback: DynFetchCallback,
    );
}

/// Trait-object [RemoteFetcher].
pub type BoxRemoteFetcher = Box<dyn RemoteFetcher>;

/// Constructs remote fetchers that share connections to upstream
/// clusters.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait ConnectionPool: 'static + Send + Sync + std::fmt::Debug {
    /// Construct a remote fetcher for one request.
    fn remote_fetcher(&self) -> BridgeResult<BoxRemoteFetcher>;
}

/// Trait-object [ConnectionPool].
pub type DynConnectionPool = Arc<dyn ConnectionPool>;

/// A factory for constructing ConnectionPool instances.
pub trait ConnectionPoolFactory: 'static + Send + Sync + std::fmt::Debug {
    /// Help the builder construct a default config from the chosen
    /// module factories.
    fn default_config(&self, config: &config::Config) -> BridgeResult<()>;

    /// Construct a connection pool instance.
    fn create(
        &self,
        builder: Arc<builder::Builder>,
    ) -> BoxFut<'static, BridgeResult<DynConnectionPool>>;
}

/// Trait-object [ConnectionPoolFactory].
pub type DynConnectionPoolFactory = Arc<dyn ConnectionPoolFactory>;
