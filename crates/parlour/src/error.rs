//! Error types for the server core.

use parlour_protocol::ProtocolError;
use parlour_session::SessionError;

/// Why a dispatched message failed.
///
/// Every variant is recoverable at the connection level: the read loop
/// reports it in an `error` envelope and keeps going. A session only
/// dies when delivering that report fails — which surfaces as
/// [`SessionError::SendFailed`] under the `Session` variant.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No handler is registered for the message's `msgt`. The display
    /// string is the exact reply text clients key on; the field carries
    /// the offending value for logs and callers.
    #[error("unrecognized msgt field")]
    Unrecognized(String),

    /// The message was structurally unusable for the handler.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session operation refused or the write under it failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A handler's own logic rejected the message.
    #[error("{0}")]
    Failed(String),

    /// A handler panicked. Dispatch contains the unwind; the panic text
    /// goes to the log, and the wire only learns which handler failed.
    #[error("{0} handler failed")]
    Panicked(String),
}

/// Top-level error for building and running a server.
///
/// Per-connection faults never show up here. Protocol and session
/// failures are answered on the offending connection and logged, so the
/// only thing the server surface itself can report is its listener.
#[derive(Debug, thiserror::Error)]
pub enum ParlourError {
    /// Binding or inspecting the listener failed.
    #[error("listener error: {0}")]
    Io(#[from] std::io::Error),
}
