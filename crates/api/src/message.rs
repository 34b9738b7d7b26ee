//! Diagnostic message sink types.

use std::sync::Arc;

/// Severity of a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Informational.
    Info,

    /// Something unexpected that did not stop the operation.
    Warning,

    /// A failed operation or a misbehaving collaborator.
    Error,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

/// Receives the diagnostics of fetch bridges and the modules they
/// talk to.
pub trait MessageHandler: 'static + Send + Sync + std::fmt::Debug {
    /// Report a diagnostic message.
    fn message(&self, message_type: MessageType, message: &str);
}

/// Trait-object [MessageHandler].
pub type DynMessageHandler = Arc<dyn MessageHandler>;
