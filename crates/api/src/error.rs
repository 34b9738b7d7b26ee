//! Fetchbridge error types.

use std::sync::Arc;

/// A clonable trait-object inner error.
#[derive(Clone, Default)]
pub struct DynInnerError(
    pub Option<Arc<dyn std::error::Error + 'static + Send + Sync>>,
);

impl std::fmt::Debug for DynInnerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for DynInnerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.as_ref() {
            None => f.write_str("None"),
            Some(s) => s.fmt(f),
        }
    }
}

impl std::error::Error for DynInnerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.as_ref().map(|s| {
            let out: &(dyn std::error::Error + 'static) = &**s;
            out
        })
    }
}

impl DynInnerError {
    /// Construct a new DynInnerError from a source error.
    pub fn new<E: std::error::Error + 'static + Send + Sync>(e: E) -> Self {
        Self(Some(Arc::new(e)))
    }
}

/// The core fetchbridge error type. Module apis (dispatching, building
/// modules, constructing remote fetchers, consumer writes) return this.
///
/// Failures of a single fetch that the consumer is told about are
/// expressed with [crate::remote_fetch::FailureReason] instead.
///
/// This type is `Clone` so that results can be kept in shared progress
/// state and handed to several observers.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BridgeError {
    /// Generic fetchbridge internal error.
    #[error("{ctx} (src: {src})")]
    Other {
        /// Any context associated with this error.
        ctx: Arc<str>,

        /// The inner error (if any).
        #[source]
        src: DynInnerError,
    },
}

impl BridgeError {
    /// Construct an "other" error with an inner source error.
    pub fn other_src<
        C: std::fmt::Display,
        S: std::error::Error + 'static + Send + Sync,
    >(
        ctx: C,
        src: S,
    ) -> Self {
        Self::Other {
            ctx: ctx.to_string().into_boxed_str().into(),
            src: DynInnerError::new(src),
        }
    }

    /// Construct an "other" error.
    pub fn other<C: std::fmt::Display>(ctx: C) -> Self {
        Self::Other {
            ctx: ctx.to_string().into_boxed_str().into(),
            src: DynInnerError::default(),
        }
    }
}

/// The core fetchbridge result type.
pub type BridgeResult<T> = Result<T, BridgeError>;
