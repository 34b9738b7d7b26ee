//! Fetchbridge dispatcher types.
//!
//! A dispatcher is a cooperative, single-threaded event loop. Work is
//! handed to it with [Dispatcher::post] and started with
//! [Dispatcher::run]. Every posted task executes on the dispatcher's own
//! thread, so tasks posted to the same dispatcher never run in parallel.

use crate::*;
use std::sync::Arc;

/// How a [Dispatcher::run] call waits for posted work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunType {
    /// Wait until no posted task is outstanding any more.
    Block,

    /// Start whatever is ready and return immediately.
    NonBlock,
}

/// A unit of work posted onto a [Dispatcher]. The task is owned by the
/// dispatcher once posted and dropped when it completes.
pub type DispatchTask = BoxFut<'static, ()>;

/// A single-threaded event dispatcher.
pub trait Dispatcher: 'static + Send + Sync + std::fmt::Debug {
    /// Enqueue a task for execution on the dispatcher thread.
    ///
    /// - Tasks are started in the order they were posted.
    /// - A posted task is held until the next call to [Dispatcher::run].
    /// - This may be called from any thread.
    ///
    /// If the dispatcher has shut down, an error is returned and the task
    /// is dropped without being polled.
    fn post(&self, task: DispatchTask) -> BridgeResult<()>;

    /// Start all queued tasks.
    ///
    /// Queued tasks are handed to the dispatcher thread when this function
    /// is called, not when the returned future is polled. With
    /// [RunType::NonBlock] the returned future is immediately ready. With
    /// [RunType::Block] it resolves once no posted task is outstanding,
    /// including tasks that were posted while waiting.
    ///
    /// A [RunType::Block] run requested from the dispatcher thread itself
    /// could never complete, and resolves to an error instead.
    fn run(&self, run_type: RunType) -> BoxFut<'static, BridgeResult<()>>;
}

/// Trait-object [Dispatcher].
pub type DynDispatcher = Arc<dyn Dispatcher>;

/// A factory for constructing Dispatcher instances.
pub trait DispatcherFactory: 'static + Send + Sync + std::fmt::Debug {
    /// Help the builder construct a default config from the chosen
    /// module factories.
    fn default_config(&self, config: &config::Config) -> BridgeResult<()>;

    /// Construct a dispatcher instance.
    fn create(
        &self,
        builder: Arc<builder::Builder>,
    ) -> BoxFut<'static, BridgeResult<DynDispatcher>>;
}

/// Trait-object [DispatcherFactory].
pub type DynDispatcherFactory = Arc<dyn DispatcherFactory>;
