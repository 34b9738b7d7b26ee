//! The in-memory connection pool provided by fetchbridge.

use fetchbridge_api::{config::Config, remote_fetch::*, *};
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

/// How the [MemConnectionPool] answers a request for one uri.
#[derive(Debug, Clone)]
pub enum MemReply {
    /// Report a response after an optional delay.
    Respond {
        /// The response headers.
        headers: ResponseHeaders,
        /// The response body.
        body: bytes::Bytes,
        /// How long to wait before calling back.
        delay: Duration,
    },

    /// Report a transport failure with this reason.
    Fail(String),

    /// Drop the callback without reporting anything.
    DropCallback,

    /// Keep the callback forever without reporting anything.
    Hang,

    /// Report a response, then a failure. This violates the remote
    /// fetcher contract and is used to test its enforcement.
    RespondTwice {
        /// The response headers.
        headers: ResponseHeaders,
        /// The response body.
        body: bytes::Bytes,
    },
}

impl MemReply {
    /// A `200 OK` response with a matching `Content-Length`.
    pub fn ok(body: impl Into<bytes::Bytes>) -> Self {
        let body = body.into();
        let mut headers = http::HeaderMap::new();
        headers.insert(http::header::CONTENT_LENGTH, body.len().into());
        Self::Respond {
            headers: ResponseHeaders::new(http::StatusCode::OK, headers),
            body,
            delay: Duration::ZERO,
        }
    }

    /// Delay a [MemReply::Respond]. Other replies are left unchanged.
    pub fn with_delay(self, delay: Duration) -> Self {
        match self {
            Self::Respond { headers, body, .. } => Self::Respond {
                headers,
                body,
                delay,
            },
            other => other,
        }
    }
}

#[derive(Debug, Default)]
struct MemState {
    replies: Mutex<HashMap<String, MemReply>>,
    requests: Mutex<Vec<TargetDescriptor>>,
    hung: Mutex<Vec<DynFetchCallback>>,
    fetchers_created: AtomicUsize,
}

/// An in-process connection pool answering from a table of scripted
/// replies. This is NOT a production module. It is for testing only.
///
/// Requests for a uri without a reply fail with "no route to <uri>".
/// Clones share the same table and request log.
#[derive(Debug, Clone, Default)]
pub struct MemConnectionPool(Arc<MemState>);

impl MemConnectionPool {
    /// Construct a new, empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set how requests for `uri` are answered.
    pub fn set_reply(&self, uri: &str, reply: MemReply) {
        let key = match Url::parse(uri) {
            Ok(url) => url.to_string(),
            Err(_) => uri.to_string(),
        };
        self.0.replies.lock().unwrap().insert(key, reply);
    }

    /// Every target this pool was asked to fetch, in order.
    pub fn requests(&self) -> Vec<TargetDescriptor> {
        self.0.requests.lock().unwrap().clone()
    }

    /// How many remote fetchers were constructed.
    pub fn fetchers_created(&self) -> usize {
        self.0.fetchers_created.load(Ordering::SeqCst)
    }
}

impl ConnectionPool for MemConnectionPool {
    fn remote_fetcher(&self) -> BridgeResult<BoxRemoteFetcher> {
        self.0.fetchers_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemRemoteFetcher(self.0.clone())))
    }
}

#[derive(Debug)]
struct MemRemoteFetcher(Arc<MemState>);

impl RemoteFetcher for MemRemoteFetcher {
    fn fetch(
        self: Box<Self>,
        target: TargetDescriptor,
        callback: DynFetchCallback,
    ) {
        let reply = self
            .0
            .replies
            .lock()
            .unwrap()
            .get(target.uri().as_str())
            .cloned()
            .unwrap_or_else(|| {
                MemReply::Fail(format!("no route to {}", target.uri()))
            });
        self.0.requests.lock().unwrap().push(target);

        match reply {
            MemReply::Respond {
                headers,
                body,
                delay,
            } => reply_later(delay, move || callback.on_success(headers, body)),
            MemReply::Fail(reason) => {
                reply_later(Duration::ZERO, move || callback.on_failure(reason))
            }
            MemReply::DropCallback => drop(callback),
            MemReply::Hang => self.0.hung.lock().unwrap().push(callback),
            MemReply::RespondTwice { headers, body } => {
                reply_later(Duration::ZERO, move || {
                    callback.on_success(headers, body);
                    callback.on_failure("second outcome".into());
                })
            }
        }
    }
}

/// Report asynchronously on the current runtime. Without a runtime the
/// reply is made right away, ignoring the delay.
fn reply_later<F>(delay: Duration, reply: F)
where
    F: FnOnce() + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                reply();
            });
        }
        Err(_) => reply(),
    }
}

/// A connection pool factory handing out one shared [MemConnectionPool].
#[derive(Debug)]
pub struct MemConnectionPoolFactory {
    pool: MemConnectionPool,
}

impl MemConnectionPoolFactory {
    /// Construct a factory with a fresh, empty pool.
    pub fn create() -> DynConnectionPoolFactory {
        Self::with_pool(MemConnectionPool::new())
    }

    /// Construct a factory handing out the given pool, so that tests can
    /// script replies and inspect requests.
    pub fn with_pool(pool: MemConnectionPool) -> DynConnectionPoolFactory {
        let out: DynConnectionPoolFactory =
            Arc::new(MemConnectionPoolFactory { pool });
        out
    }
}

impl ConnectionPoolFactory for MemConnectionPoolFactory {
    fn default_config(&self, _config: &Config) -> BridgeResult<()> {
        Ok(())
    }

    fn create(
        &self,
        _builder: Arc<builder::Builder>,
    ) -> BoxFut<'static, BridgeResult<DynConnectionPool>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let out: DynConnectionPool = Arc::new(pool);
            Ok(out)
        })
    }
}

#[cfg(test)]
mod test;
