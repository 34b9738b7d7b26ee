//! A fetch consumer that records what it is told.

use fetchbridge_api::{consumer::*, remote_fetch::*, *};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use tokio::sync::watch;

/// One call made on a [RecordingConsumer].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerEvent {
    /// [FetchConsumer::headers] was called.
    Headers(ResponseHeaders),

    /// [FetchConsumer::write] was called.
    Write(bytes::Bytes),

    /// [FetchConsumer::done] was called.
    Done(Result<(), FailureReason>),
}

/// A [FetchConsumer] recording every call in order.
#[derive(Debug)]
pub struct RecordingConsumer {
    events: Mutex<Vec<ConsumerEvent>>,
    done_count: watch::Sender<usize>,
    reject_writes: AtomicBool,
}

impl RecordingConsumer {
    /// Construct a consumer accepting all writes.
    pub fn new() -> Arc<Self> {
        let (done_count, _) = watch::channel(0);
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            done_count,
            reject_writes: AtomicBool::new(false),
        })
    }

    /// Construct a consumer returning an error from every write.
    pub fn rejecting_writes() -> Arc<Self> {
        let out = Self::new();
        out.reject_writes.store(true, Ordering::SeqCst);
        out
    }

    /// All recorded calls, in order.
    pub fn events(&self) -> Vec<ConsumerEvent> {
        self.events.lock().unwrap().clone()
    }

    /// The headers, if they were delivered.
    pub fn headers(&self) -> Option<ResponseHeaders> {
        self.events().into_iter().find_map(|e| match e {
            ConsumerEvent::Headers(h) => Some(h),
            _ => None,
        })
    }

    /// The number of accepted writes.
    pub fn write_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, ConsumerEvent::Write(_)))
            .count()
    }

    /// All accepted writes, concatenated.
    pub fn body(&self) -> bytes::Bytes {
        let mut out = Vec::new();
        for e in self.events() {
            if let ConsumerEvent::Write(data) = e {
                out.extend_from_slice(&data);
            }
        }
        out.into()
    }

    /// Every terminal signal received. A well behaved fetch produces
    /// exactly one.
    pub fn done_results(&self) -> Vec<Result<(), FailureReason>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ConsumerEvent::Done(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    /// Wait for the first terminal signal and return it.
    ///
    /// Panics if none arrives within [crate::WAIT_TIMEOUT].
    pub async fn wait_done(&self) -> Result<(), FailureReason> {
        let mut done_count = self.done_count.subscribe();
        let waited = tokio::time::timeout(
            crate::WAIT_TIMEOUT,
            done_count.wait_for(|count| *count > 0),
        )
        .await;
        match waited {
            Ok(Ok(_)) => (),
            _ => panic!("no terminal signal within {:?}", crate::WAIT_TIMEOUT),
        }
        self.done_results().remove(0)
    }
}

impl FetchConsumer for RecordingConsumer {
    fn headers(&self, headers: &ResponseHeaders) {
        self.events
            .lock()
            .unwrap()
            .push(ConsumerEvent::Headers(headers.clone()));
    }

    fn write(&self, data: bytes::Bytes) -> BridgeResult<()> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(BridgeError::other("writes rejected"));
        }
        self.events.lock().unwrap().push(ConsumerEvent::Write(data));
        Ok(())
    }

    fn done(&self, result: Result<(), FailureReason>) {
        self.events.lock().unwrap().push(ConsumerEvent::Done(result));
        self.done_count.send_modify(|count| *count += 1);
    }
}
