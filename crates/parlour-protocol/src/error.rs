//! Error types for the protocol layer.
//!
//! Everything here is recoverable at the connection level: the server
//! answers with an `error` envelope and keeps reading. The one fatal
//! framing condition has its own type,
//! [`FloodError`](crate::FloodError), so it cannot be confused with
//! these.

/// Errors raised while parsing, inspecting, or encoding envelopes.
///
/// The display strings double as the `error` field of the reply sent to
/// the client, so they are part of the wire contract.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed while building an outbound envelope.
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The frame is not valid UTF-8.
    #[error("frame is not valid utf-8: {0}")]
    InvalidUtf8(std::str::Utf8Error),

    /// The frame is not parseable JSON.
    #[error("could not parse message: {0}")]
    MalformedPayload(serde_json::Error),

    /// The frame is JSON, but not an object.
    #[error("message is not a JSON object")]
    NotAnObject,

    /// The object has no `msgt` field to route on.
    #[error("missing msgt field")]
    MissingDiscriminator,

    /// A handler needed a field the message does not carry.
    #[error("missing {0} field")]
    MissingField(&'static str),

    /// A field is present but has the wrong shape.
    #[error("invalid {name} field: {reason}")]
    InvalidField {
        name: &'static str,
        reason: String,
    },
}
