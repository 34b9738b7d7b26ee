//! Cluster manager types.
//!
//! The cluster manager is the facade through which a fetch bridge reaches
//! its collaborators: the dispatcher it runs on and the connection pool
//! that constructs remote fetchers. Bridges only borrow it.

use crate::{
    dispatcher::DynDispatcher, message::DynMessageHandler,
    remote_fetch::DynConnectionPool, *,
};
use std::sync::Arc;

/// Facade over the dispatcher and connection pool of one fetch setup.
pub trait ClusterManager: 'static + Send + Sync + std::fmt::Debug {
    /// The builder this cluster manager was created from. Gives access
    /// to the module configuration.
    fn builder(&self) -> &Arc<builder::Builder>;

    /// The dispatcher that runs fetch routines and callbacks.
    fn dispatcher(&self) -> DynDispatcher;

    /// The connection pool used to construct remote fetchers.
    fn connection_pool(&self) -> DynConnectionPool;

    /// The diagnostic sink for fetches run through this cluster manager.
    fn message_handler(&self) -> DynMessageHandler {
        self.builder().message_handler.clone()
    }
}

/// Trait-object [ClusterManager].
pub type DynClusterManager = Arc<dyn ClusterManager>;

/// A factory for constructing ClusterManager instances.
pub trait ClusterManagerFactory: 'static + Send + Sync + std::fmt::Debug {
    /// Help the builder construct a default config from the chosen
    /// module factories.
    fn default_config(&self, config: &config::Config) -> BridgeResult<()>;

    /// Construct a cluster manager instance.
    fn create(
        &self,
        builder: Arc<builder::Builder>,
        dispatcher: DynDispatcher,
        connection_pool: DynConnectionPool,
    ) -> BoxFut<'static, BridgeResult<DynClusterManager>>;
}

/// Trait-object [ClusterManagerFactory].
pub type DynClusterManagerFactory = Arc<dyn ClusterManagerFactory>;
