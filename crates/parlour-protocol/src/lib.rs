//! Wire protocol for Parlour lobby servers.
//!
//! Everything on the wire is a newline-delimited JSON object carrying a
//! `msgt` field that names the message type. This crate owns the pieces
//! both ends need to speak that format:
//!
//! - [`Framer`] — splits the inbound byte stream into frames and enforces
//!   the flood limit.
//! - [`Envelope`] — the parsed form of one frame, with typed field
//!   accessors for handlers.
//! - [`Identity`] / [`PeerAddr`] — the handshake payloads.
//!
//! Message type and field names live in [`wire`] so the server core and
//! collaborator handlers agree on spelling.
//!
//! # Architecture
//!
//! The protocol layer sits between the socket (raw bytes) and the session
//! (who is connected). It knows nothing about connections or dispatch —
//! only how bytes become envelopes and back.
//!
//! ```text
//! socket (bytes) → Framer (frames) → Envelope (messages) → dispatch
//! ```

mod envelope;
mod error;
mod framing;
pub mod wire;

pub use envelope::{Envelope, Identity, PeerAddr};
pub use error::ProtocolError;
pub use framing::{FloodError, Framer, MAX_BUFFERED};
