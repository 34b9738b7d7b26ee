//! The core cluster manager implementation provided by fetchbridge.

use crate::fetch_bridge::config::CoreFetchBridgeModConfig;
use fetchbridge_api::{
    cluster::*, config::Config, dispatcher::DynDispatcher,
    remote_fetch::DynConnectionPool, *,
};
use std::sync::Arc;

/// The core cluster manager implementation provided by fetchbridge.
/// It hands out the dispatcher and connection pool it was built with.
///
/// Fetch bridges read their configuration from the builder, so this
/// factory also contributes the fetch bridge defaults.
#[derive(Debug)]
pub struct CoreClusterManagerFactory {}

impl CoreClusterManagerFactory {
    /// Construct a new CoreClusterManagerFactory.
    pub fn create() -> DynClusterManagerFactory {
        let out: DynClusterManagerFactory =
            Arc::new(CoreClusterManagerFactory {});
        out
    }
}

impl ClusterManagerFactory for CoreClusterManagerFactory {
    fn default_config(&self, config: &Config) -> BridgeResult<()> {
        config.set_module_config(&CoreFetchBridgeModConfig::default())
    }

    fn create(
        &self,
        builder: Arc<builder::Builder>,
        dispatcher: DynDispatcher,
        connection_pool: DynConnectionPool,
    ) -> BoxFut<'static, BridgeResult<DynClusterManager>> {
        Box::pin(async move {
            let out: DynClusterManager = Arc::new(CoreClusterManager::new(
                builder,
                dispatcher,
                connection_pool,
            ));
            Ok(out)
        })
    }
}

/// Hands out a fixed dispatcher and connection pool.
#[derive(Debug)]
pub struct CoreClusterManager {
    builder: Arc<builder::Builder>,
    dispatcher: DynDispatcher,
    connection_pool: DynConnectionPool,
}

impl CoreClusterManager {
    /// Construct a cluster manager from already created modules.
    pub fn new(
        builder: Arc<builder::Builder>,
        dispatcher: DynDispatcher,
        connection_pool: DynConnectionPool,
    ) -> Self {
        Self {
            builder,
            dispatcher,
            connection_pool,
        }
    }
}

impl ClusterManager for CoreClusterManager {
    fn builder(&self) -> &Arc<builder::Builder> {
        &self.builder
    }

    fn dispatcher(&self) -> DynDispatcher {
        self.dispatcher.clone()
    }

    fn connection_pool(&self) -> DynConnectionPool {
        self.connection_pool.clone()
    }
}
