use crate::fetch_bridge::{config::*, FetchBridge, FetchHandle};
use fetchbridge_api::{cluster::DynClusterManager, consumer::*, *};

/// Starts [FetchBridge]s for urls using the configuration of the cluster
/// manager's builder.
#[derive(Debug, Clone)]
pub struct CoreUrlFetcher {
    cluster_manager: DynClusterManager,
    config: CoreFetchBridgeConfig,
}

impl CoreUrlFetcher {
    /// Construct a fetcher, reading the `coreFetchBridge` module config.
    pub fn new(cluster_manager: DynClusterManager) -> BridgeResult<Self> {
        let config: CoreFetchBridgeModConfig =
            cluster_manager.builder().config.get_module_config()?;
        Ok(Self {
            cluster_manager,
            config: config.core_fetch_bridge,
        })
    }

    /// The fetch bridge configuration in use.
    pub fn config(&self) -> &CoreFetchBridgeConfig {
        &self.config
    }

    /// Fetch `url` and deliver the response to `consumer`.
    pub fn fetch(
        &self,
        url: &str,
        consumer: DynFetchConsumer,
    ) -> BridgeResult<FetchHandle> {
        self.fetch_with_headers(url, http::HeaderMap::new(), consumer)
    }

    /// Fetch `url` sending `headers`, and deliver the response to
    /// `consumer`.
    pub fn fetch_with_headers(
        &self,
        url: &str,
        headers: http::HeaderMap,
        consumer: DynFetchConsumer,
    ) -> BridgeResult<FetchHandle> {
        FetchBridge::new(self.cluster_manager.clone(), url, consumer)
            .with_config(self.config.clone())
            .with_request_headers(headers)
            .start()
    }
}
