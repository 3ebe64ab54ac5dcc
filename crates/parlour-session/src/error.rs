//! Error types for the session layer.

/// Errors raised while operating on a live session.
///
/// Only [`SendFailed`](SessionError::SendFailed) means the connection is
/// gone; everything else is answerable with an `error` envelope on a
/// connection that keeps living.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The operation needs an identity and the handshake has not
    /// happened yet.
    #[error("not identified")]
    NotIdentified,

    /// A second handshake arrived; identity is fixed once set.
    #[error("already identified as {0}")]
    AlreadyIdentified(String),

    /// Building the outbound line failed.
    #[error(transparent)]
    Encode(#[from] parlour_protocol::ProtocolError),

    /// The socket write failed.
    #[error("send failed: {0}")]
    SendFailed(std::io::Error),
}
