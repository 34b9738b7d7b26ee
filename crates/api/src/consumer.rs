//! Fetch consumer types.

use crate::{remote_fetch::*, *};
#[cfg(any(test, feature = "mockall"))]
use mockall::automock;
use std::sync::Arc;

/// The sink that receives the result of one fetch.
///
/// For each fetch the calls arrive in this order:
/// - [FetchConsumer::headers] at most once, only for a response,
/// - [FetchConsumer::write] zero or more times,
/// - [FetchConsumer::done] exactly once, also when the fetch failed.
///
/// The calls are made from the dispatcher thread.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait FetchConsumer: 'static + Send + Sync + std::fmt::Debug {
    /// The response headers. Delivered before any body bytes.
    fn headers(&self, headers: &ResponseHeaders);

    /// A chunk of the response body. Returning an error stops the
    /// delivery, the fetch then finishes with
    /// [FailureReason::ConsumerRejected].
    fn write(&self, data: bytes::Bytes) -> BridgeResult<()>;

    /// The terminal signal of the fetch.
    fn done(&self, result: Result<(), FailureReason>);
}

/// Trait-object [FetchConsumer].
pub type DynFetchConsumer = Arc<dyn FetchConsumer>;
