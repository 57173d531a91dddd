//! Error taxonomy of the bridge.
//!
//! Every failure is delivered through the caller's callback as the `Err`
//! side of a reply; nothing here is ever raised past the dispatcher.

use codec::DecodeError;
use registry::InvocationKind;
use transport::TransportError;

/// Result alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors reported to bridge callers.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The text payload was not valid base64.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The method is not registered in the table for its invocation kind.
    #[error("method not found: {method}")]
    MethodNotFound {
        /// Table that was searched.
        kind: InvocationKind,
        /// The requested name, verbatim.
        method: String,
    },

    /// A single-flight subscription for this key is already active.
    ///
    /// The dispatcher does not report this to the caller; the second call is
    /// dropped silently. The variant exists for [`SessionManager`] users.
    ///
    /// [`SessionManager`]: crate::SessionManager
    #[error("stream {method} already active in namespace {namespace}")]
    DuplicateStream {
        /// Namespace of the active subscription.
        namespace: String,
        /// Method of the active subscription.
        method: String,
    },

    /// No open bidirectional stream exists for this method.
    #[error("no open stream for method: {method}")]
    HandleNotFound {
        /// The requested name, verbatim.
        method: String,
    },

    /// Failure raised by the node itself, forwarded unchanged.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl BridgeError {
    pub(crate) fn method_not_found(kind: InvocationKind, method: &str) -> Self {
        BridgeError::MethodNotFound { kind, method: method.to_string() }
    }

    pub(crate) fn handle_not_found(method: &str) -> Self {
        BridgeError::HandleNotFound { method: method.to_string() }
    }
}
