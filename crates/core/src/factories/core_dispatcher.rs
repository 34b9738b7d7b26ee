//! The core dispatcher implementation provided by fetchbridge.
//!
//! A [CoreDispatcher] owns one OS thread running a tokio current-thread
//! runtime. Posted tasks are kept in a queue until [Dispatcher::run] kicks
//! the thread, which then spawns every queued task, in order, onto its
//! runtime. Spawned tasks interleave at their await points but never run
//! in parallel.
//!
//! Outstanding work is counted from `post` until the task completes (or
//! panics, or is dropped). A [RunType::Block] run waits for that count to
//! reach zero.

use fetchbridge_api::{config::Config, dispatcher::*, *};
use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, OnceLock,
};
use tokio::sync::{watch, Notify};

/// CoreDispatcher configuration types.
pub mod config {
    use fetchbridge_api::config::ModConfig;

    /// Configuration parameters for
    /// [CoreDispatcherFactory](super::CoreDispatcherFactory).
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    pub struct CoreDispatcherConfig {
        /// Name of the dispatcher thread. Default: "fetch-dispatcher".
        pub thread_name: String,
    }

    impl Default for CoreDispatcherConfig {
        fn default() -> Self {
            Self {
                thread_name: "fetch-dispatcher".into(),
            }
        }
    }

    /// Module-level configuration for CoreDispatcher.
    #[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    pub struct CoreDispatcherModConfig {
        /// CoreDispatcher configuration.
        pub core_dispatcher: CoreDispatcherConfig,
    }

    impl ModConfig for CoreDispatcherModConfig {}
}

use config::*;

/// The production dispatcher module.
#[derive(Debug)]
pub struct CoreDispatcherFactory {}

impl CoreDispatcherFactory {
    /// Construct a new CoreDispatcherFactory.
    pub fn create() -> DynDispatcherFactory {
        Arc::new(Self {})
    }
}

impl DispatcherFactory for CoreDispatcherFactory {
    fn default_config(&self, config: &Config) -> BridgeResult<()> {
        config.set_module_config(&CoreDispatcherModConfig::default())
    }

    fn create(
        &self,
        builder: Arc<builder::Builder>,
    ) -> BoxFut<'static, BridgeResult<DynDispatcher>> {
        Box::pin(async move {
            let config: CoreDispatcherModConfig =
                builder.config.get_module_config()?;
            let out: DynDispatcher =
                Arc::new(CoreDispatcher::create(config.core_dispatcher)?);
            Ok(out)
        })
    }
}

struct Shared {
    queue: Mutex<VecDeque<DispatchTask>>,
    kick: Notify,
    outstanding: watch::Sender<usize>,
    shutdown: AtomicBool,
    thread_id: OnceLock<std::thread::ThreadId>,
}

impl Shared {
    fn is_dispatcher_thread(&self) -> bool {
        self.thread_id.get() == Some(&std::thread::current().id())
    }
}

/// Marks one posted task as finished when dropped.
struct OutstandingGuard(Arc<Shared>);

impl Drop for OutstandingGuard {
    fn drop(&mut self) {
        self.0
            .outstanding
            .send_modify(|count| *count = count.saturating_sub(1));
    }
}

/// A dispatcher running its tasks on a dedicated thread.
pub struct CoreDispatcher {
    shared: Arc<Shared>,
    thread_name: String,
}

impl std::fmt::Debug for CoreDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreDispatcher")
            .field("thread_name", &self.thread_name)
            .field("outstanding", &*self.shared.outstanding.borrow())
            .finish()
    }
}

impl Drop for CoreDispatcher {
    fn drop(&mut self) {
        tracing::debug!(thread_name = %self.thread_name, "dispatcher shutdown");
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.kick.notify_one();
    }
}

impl CoreDispatcher {
    /// Start the dispatcher thread.
    pub fn create(config: CoreDispatcherConfig) -> BridgeResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                BridgeError::other_src("build dispatcher runtime", e)
            })?;

        let (outstanding, _) = watch::channel(0);
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            kick: Notify::new(),
            outstanding,
            shutdown: AtomicBool::new(false),
            thread_id: OnceLock::new(),
        });

        let loop_shared = shared.clone();
        let thread = std::thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || runtime.block_on(dispatch_loop(loop_shared)))
            .map_err(|e| {
                BridgeError::other_src("spawn dispatcher thread", e)
            })?;

        // No task can run before the first `run`, which needs `Self`.
        let _ = shared.thread_id.set(thread.thread().id());

        tracing::debug!(thread_name = %config.thread_name, "dispatcher started");

        Ok(Self {
            shared,
            thread_name: config.thread_name,
        })
    }

    /// The number of posted tasks that have not completed yet.
    pub fn outstanding(&self) -> usize {
        *self.shared.outstanding.borrow()
    }
}

impl Dispatcher for CoreDispatcher {
    fn post(&self, task: DispatchTask) -> BridgeResult<()> {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return Err(BridgeError::other("dispatcher has shut down"));
        }
        self.shared.outstanding.send_modify(|count| *count += 1);
        self.shared.queue.lock().unwrap().push_back(task);
        Ok(())
    }

    fn run(&self, run_type: RunType) -> BoxFut<'static, BridgeResult<()>> {
        self.shared.kick.notify_one();

        match run_type {
            RunType::NonBlock => Box::pin(async { Ok(()) }),
            RunType::Block => {
                if self.shared.is_dispatcher_thread() {
                    return Box::pin(async {
                        Err(BridgeError::other(
                            "blocking run requested from the dispatcher thread",
                        ))
                    });
                }
                let mut outstanding = self.shared.outstanding.subscribe();
                Box::pin(async move {
                    if outstanding.wait_for(|count| *count == 0).await.is_err()
                    {
                        return Err(BridgeError::other(
                            "dispatcher shut down during a blocking run",
                        ));
                    }
                    Ok(())
                })
            }
        }
    }
}

async fn dispatch_loop(shared: Arc<Shared>) {
    loop {
        shared.kick.notified().await;

        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }

        let tasks = std::mem::take(&mut *shared.queue.lock().unwrap());
        for task in tasks {
            let guard = OutstandingGuard(shared.clone());
            tokio::task::spawn(async move {
                let _guard = guard;
                task.await;
            });
        }
    }

    // Tasks still queued never started, drop them here. Spawned tasks are
    // dropped along with the runtime once this loop returns.
    let dropped = std::mem::take(&mut *shared.queue.lock().unwrap());
    if !dropped.is_empty() {
        tracing::warn!(count = dropped.len(), "dropping tasks never run");
        shared
            .outstanding
            .send_modify(|count| *count = count.saturating_sub(dropped.len()));
    }
}
