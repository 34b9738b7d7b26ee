#![deny(missing_docs)]
//! Fetchbridge: issue one http fetch on a single-threaded dispatcher and
//! hand the response to a pull-style consumer.
//!
//! Construct a [builder::Builder] with [default_builder], build it into a
//! cluster manager, then start fetches with [CoreUrlFetcher] or by
//! constructing a [fetch_bridge::FetchBridge] directly.
//!
//! ```no_run
//! # async fn example(
//! #     consumer: fetchbridge_api::consumer::DynFetchConsumer,
//! # ) -> fetchbridge_api::BridgeResult<()> {
//! let cluster_manager = fetchbridge_core::default_builder()
//!     .with_default_config()?
//!     .build()
//!     .await?;
//! let fetcher = fetchbridge_core::CoreUrlFetcher::new(cluster_manager)?;
//! let handle = fetcher.fetch("http://localhost/index.html", consumer)?;
//! let progress = handle.wait().await;
//! # let _ = progress;
//! # Ok(())
//! # }
//! ```

use fetchbridge_api::{builder::Builder, config::Config, message::*};
use std::sync::Arc;

pub use fetchbridge_api::builder;

/// The default [MessageHandler], forwarding every message to `tracing`.
#[derive(Debug)]
pub struct TracingMessageHandler;

impl MessageHandler for TracingMessageHandler {
    fn message(&self, message_type: MessageType, message: &str) {
        match message_type {
            MessageType::Info => tracing::info!("{message}"),
            MessageType::Warning => tracing::warn!("{message}"),
            MessageType::Error => tracing::error!("{message}"),
        }
    }
}

/// Construct a production-ready default builder.
///
/// - `message_handler` - The default message handler is
///   [TracingMessageHandler].
/// - `dispatcher` - The default dispatcher is
///   [factories::CoreDispatcherFactory].
/// - `connection_pool` - The default connection pool is
///   [factories::HttpConnectionPoolFactory].
/// - `cluster_manager` - The default cluster manager is
///   [factories::CoreClusterManagerFactory].
pub fn default_builder() -> Builder {
    Builder {
        config: Config::default(),
        message_handler: Arc::new(TracingMessageHandler),
        dispatcher: factories::CoreDispatcherFactory::create(),
        connection_pool: factories::HttpConnectionPoolFactory::create(),
        cluster_manager: factories::CoreClusterManagerFactory::create(),
    }
}

/// Construct a default builder for use in tests.
///
/// - `connection_pool` - The default connection pool is
///   [factories::MemConnectionPoolFactory], with a fresh, empty pool.
///
/// All other modules are the same as in [default_builder].
pub fn default_test_builder() -> Builder {
    Builder {
        connection_pool: factories::MemConnectionPoolFactory::create(),
        ..default_builder()
    }
}

pub mod factories;

pub mod fetch_bridge;

mod url_fetcher;
pub use url_fetcher::*;
