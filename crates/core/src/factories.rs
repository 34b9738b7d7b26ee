//! Factories for generating instances of fetchbridge modules.

pub mod core_dispatcher;
pub use core_dispatcher::{CoreDispatcher, CoreDispatcherFactory};

mod core_cluster_manager;
pub use core_cluster_manager::*;

pub mod http_connection_pool;
pub use http_connection_pool::HttpConnectionPoolFactory;

mod mem_connection_pool;
pub use mem_connection_pool::*;
