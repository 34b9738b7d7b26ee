//! Builder-related types.

use crate::*;
use std::sync::Arc;

/// The general fetchbridge builder.
/// This contains both configuration and factory instances,
/// allowing construction of runtime module instances.
#[derive(Debug)]
pub struct Builder {
    /// The module configuration to be used when building modules.
    /// This can be loaded from disk or modified before building.
    pub config: config::Config,

    /// The [message::MessageHandler] receiving fetch diagnostics.
    pub message_handler: message::DynMessageHandler,

    /// The [dispatcher::DispatcherFactory] to be used for creating
    /// the [dispatcher::Dispatcher] instance.
    pub dispatcher: dispatcher::DynDispatcherFactory,

    /// The [remote_fetch::ConnectionPoolFactory] to be used for creating
    /// the [remote_fetch::ConnectionPool] instance.
    pub connection_pool: remote_fetch::DynConnectionPoolFactory,

    /// The [cluster::ClusterManagerFactory] to be used for creating
    /// the [cluster::ClusterManager] instance.
    pub cluster_manager: cluster::DynClusterManagerFactory,
}

impl Builder {
    /// Construct a default config given the configured module factories.
    /// Values already present in the config are overwritten, so call this
    /// before applying custom configuration.
    pub fn set_default_config(&mut self) -> BridgeResult<()> {
        let Self {
            config,
            message_handler: _,
            dispatcher,
            connection_pool,
            cluster_manager,
        } = self;

        dispatcher.default_config(config)?;
        connection_pool.default_config(config)?;
        cluster_manager.default_config(config)?;

        Ok(())
    }

    /// Chainable version of [Builder::set_default_config].
    pub fn with_default_config(mut self) -> BridgeResult<Self> {
        self.set_default_config()?;
        Ok(self)
    }

    /// Generate the runtime modules and return the cluster manager
    /// that gives access to them.
    pub fn build(
        self,
    ) -> BoxFut<'static, BridgeResult<cluster::DynClusterManager>> {
        let builder = Arc::new(self);
        Box::pin(async move {
            let dispatcher = builder.dispatcher.create(builder.clone()).await?;
            let connection_pool =
                builder.connection_pool.create(builder.clone()).await?;
            builder
                .cluster_manager
                .create(builder.clone(), dispatcher, connection_pool)
                .await
        })
    }
}
