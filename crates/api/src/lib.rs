#![deny(missing_docs)]
//! Fetchbridge API contains the module traits and the basic types required
//! to define the api of those traits.
//!
//! A fetch is carried by a [FetchBridge] value that is posted onto a
//! single-threaded [dispatcher::Dispatcher], issues one request through a
//! [remote_fetch::RemoteFetcher] and reports the result to a
//! [consumer::FetchConsumer].
//!
//! If you want a working implementation of these modules, please see the
//! fetchbridge_core crate.
//!
//! [FetchBridge]: https://docs.rs/fetchbridge_core

/// Boxed future type.
pub type BoxFut<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

pub mod builder;
pub mod cluster;
pub mod config;
pub mod consumer;
pub mod dispatcher;
pub mod message;
pub mod remote_fetch;

mod error;
pub use error::*;

pub use url::Url;
