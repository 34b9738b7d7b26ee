//! The http connection pool provided by fetchbridge.
//!
//! All remote fetchers of one pool share a single `ureq` agent, and with
//! it the idle connections to each upstream. Requests are blocking, so
//! each one runs on the blocking thread pool of the runtime that issued
//! the fetch; the callback is made from that blocking thread.
//!
//! Redirects are not followed, a `3xx` is a complete response like any
//! other status. Only failing to obtain a response at all is reported
//! through [FetchCallback::on_failure].
//!
//! ### Clusters
//!
//! The cluster named by a [TargetDescriptor] selects where the request is
//! sent. A cluster with an `endpoint` replaces scheme, host and port of
//! the uri with those of the endpoint and sends the original authority in
//! the `Host` header. A cluster without one sends the request to the uri
//! as is. Clusters that are not configured are treated like the latter,
//! unless `allowUnlistedClusters` is false.

use fetchbridge_api::{config::Config, remote_fetch::*, *};
use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

/// HttpConnectionPool configuration types.
pub mod config {
    use fetchbridge_api::config::ModConfig;
    use std::collections::BTreeMap;

    /// Where requests for one named cluster are sent.
    #[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    pub struct ClusterConfig {
        /// Base url (scheme, host and port) of the upstream, e.g.
        /// `http://127.0.0.1:8080`. Default: none, use the request uri.
        pub endpoint: Option<String>,
    }

    /// Configuration parameters for
    /// [HttpConnectionPoolFactory](super::HttpConnectionPoolFactory).
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    pub struct HttpConnectionPoolConfig {
        /// Timeout for establishing a connection. Default: 10 s.
        pub connect_timeout_ms: u32,
        /// Timeout for a whole request, including reading the body.
        /// Default: 60 s.
        pub request_timeout_ms: u32,
        /// How many idle connections to keep per upstream host.
        /// Default: 8.
        pub max_idle_connections_per_host: u32,
        /// Responses with a larger body are reported as failures.
        /// Default: 32 MiB.
        pub max_body_bytes: u64,
        /// Whether a cluster missing from `clusters` may be used.
        /// Default: true.
        pub allow_unlisted_clusters: bool,
        /// Named upstream clusters. Default: empty.
        pub clusters: BTreeMap<String, ClusterConfig>,
    }

    impl Default for HttpConnectionPoolConfig {
        fn default() -> Self {
            Self {
                connect_timeout_ms: 10_000,
                request_timeout_ms: 60_000,
                max_idle_connections_per_host: 8,
                max_body_bytes: 32 * 1024 * 1024,
                allow_unlisted_clusters: true,
                clusters: BTreeMap::new(),
            }
        }
    }

    /// Module-level configuration for HttpConnectionPool.
    #[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    pub struct HttpConnectionPoolModConfig {
        /// HttpConnectionPool configuration.
        pub http_connection_pool: HttpConnectionPoolConfig,
    }

    impl ModConfig for HttpConnectionPoolModConfig {}
}

use config::*;

/// The production connection pool module.
#[derive(Debug)]
pub struct HttpConnectionPoolFactory {}

impl HttpConnectionPoolFactory {
    /// Construct a new HttpConnectionPoolFactory.
    pub fn create() -> DynConnectionPoolFactory {
        Arc::new(Self {})
    }
}

impl ConnectionPoolFactory for HttpConnectionPoolFactory {
    fn default_config(&self, config: &Config) -> BridgeResult<()> {
        config.set_module_config(&HttpConnectionPoolModConfig::default())
    }

    fn create(
        &self,
        builder: Arc<builder::Builder>,
    ) -> BoxFut<'static, BridgeResult<DynConnectionPool>> {
        Box::pin(async move {
            let config: HttpConnectionPoolModConfig =
                builder.config.get_module_config()?;
            let out: DynConnectionPool =
                Arc::new(HttpConnectionPool::new(config.http_connection_pool));
            Ok(out)
        })
    }
}

/// A connection pool issuing requests with a shared `ureq` agent.
#[derive(Debug, Clone)]
pub struct HttpConnectionPool {
    agent: ureq::Agent,
    config: Arc<HttpConnectionPoolConfig>,
}

impl HttpConnectionPool {
    /// Construct a new pool.
    pub fn new(config: HttpConnectionPoolConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_millis(
                config.connect_timeout_ms as u64,
            ))
            .timeout(Duration::from_millis(config.request_timeout_ms as u64))
            .max_idle_connections_per_host(
                config.max_idle_connections_per_host as usize,
            )
            .redirects(0)
            .build();
        Self {
            agent,
            config: Arc::new(config),
        }
    }
}

impl ConnectionPool for HttpConnectionPool {
    fn remote_fetcher(&self) -> BridgeResult<BoxRemoteFetcher> {
        Ok(Box::new(HttpRemoteFetcher(self.clone())))
    }
}

#[derive(Debug)]
struct HttpRemoteFetcher(HttpConnectionPool);

impl RemoteFetcher for HttpRemoteFetcher {
    fn fetch(
        self: Box<Self>,
        target: TargetDescriptor,
        callback: DynFetchCallback,
    ) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(err) => {
                callback.on_failure(format!(
                    "no runtime to run the request on: {err}"
                ));
                return;
            }
        };

        handle.spawn_blocking(move || {
            let pool = self.0;
            match blocking_fetch(&pool, &target) {
                Ok((headers, body)) => {
                    tracing::debug!(
                        uri = %target.uri(),
                        status = %headers.status(),
                        len = body.len(),
                        "response received",
                    );
                    callback.on_success(headers, body);
                }
                Err(reason) => {
                    tracing::debug!(
                        uri = %target.uri(),
                        %reason,
                        "request failed",
                    );
                    callback.on_failure(reason);
                }
            }
        });
    }
}

/// Where to connect, and the `Host` to send if it differs.
fn resolve(
    clusters: &BTreeMap<String, ClusterConfig>,
    allow_unlisted_clusters: bool,
    target: &TargetDescriptor,
) -> Result<(Url, Option<String>), String> {
    let endpoint = match clusters.get(target.cluster()) {
        Some(cluster) => cluster.endpoint.as_deref(),
        None if allow_unlisted_clusters => None,
        None => return Err(format!("unknown cluster {:?}", target.cluster())),
    };
    let Some(endpoint) = endpoint else {
        return Ok((target.uri().clone(), None));
    };

    let endpoint = Url::parse(endpoint).map_err(|e| {
        format!("invalid endpoint for cluster {:?}: {e}", target.cluster())
    })?;
    let uri = target.uri();
    let host = match (uri.host_str(), uri.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => return Err(format!("uri has no host: {uri}")),
    };

    let mut url = uri.clone();
    if url.set_scheme(endpoint.scheme()).is_err()
        || url.set_host(endpoint.host_str()).is_err()
        || url.set_port(endpoint.port()).is_err()
    {
        return Err(format!(
            "cannot send {uri} to endpoint {endpoint} of cluster {:?}",
            target.cluster()
        ));
    }
    Ok((url, Some(host)))
}

fn blocking_fetch(
    pool: &HttpConnectionPool,
    target: &TargetDescriptor,
) -> Result<(ResponseHeaders, bytes::Bytes), String> {
    let (url, host) = resolve(
        &pool.config.clusters,
        pool.config.allow_unlisted_clusters,
        target,
    )?;

    let mut request = pool.agent.request_url("GET", &url);
    let headers = target.request_headers();
    for name in headers.keys() {
        let mut values = Vec::new();
        for value in headers.get_all(name) {
            match value.to_str() {
                Ok(value) => values.push(value),
                Err(_) => tracing::warn!(
                    header = %name,
                    "skipping non-ascii request header value",
                ),
            }
        }
        // ureq keeps only the last value set for a name.
        if !values.is_empty() {
            request = request.set(name.as_str(), &values.join(", "));
        }
    }
    if let Some(host) = host {
        request = request.set("Host", &host);
    }

    let response = match request.call() {
        Ok(response) => response,
        // An error status is still a complete response.
        Err(ureq::Error::Status(_, response)) => response,
        Err(ureq::Error::Transport(err)) => return Err(err.to_string()),
    };

    read_response(response, pool.config.max_body_bytes)
}

fn read_response(
    response: ureq::Response,
    max_body_bytes: u64,
) -> Result<(ResponseHeaders, bytes::Bytes), String> {
    let status = http::StatusCode::from_u16(response.status())
        .map_err(|e| format!("invalid response status: {e}"))?;

    let mut headers = http::HeaderMap::new();
    for name in response.headers_names() {
        let Ok(header_name) = http::HeaderName::from_bytes(name.as_bytes())
        else {
            tracing::debug!(header = %name, "skipping invalid response header");
            continue;
        };
        for value in response.all(&name) {
            if let Ok(value) = http::HeaderValue::from_str(value) {
                headers.append(header_name.clone(), value);
            }
        }
    }

    let mut body = Vec::new();
    response
        .into_reader()
        .take(max_body_bytes.saturating_add(1))
        .read_to_end(&mut body)
        .map_err(|e| format!("could not read response body: {e}"))?;
    if body.len() as u64 > max_body_bytes {
        return Err(format!("response body exceeds {max_body_bytes} bytes"));
    }

    Ok((ResponseHeaders::new(status, headers), body.into()))
}

#[cfg(test)]
mod test;
