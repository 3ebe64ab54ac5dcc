//! Live-connection state for Parlour servers.
//!
//! A [`Session`] is one connected peer: its id, the identity declared by
//! its handshake, the locked write half of its socket, and the flag its
//! read loop polls to keep going. The [`Registry`] tracks every live
//! session so handlers can look peers up and shutdown can reach them all.
//!
//! # How it fits in the stack
//!
//! ```text
//! parlour (above)          ← drives the read loop, dispatches messages
//!     ↕
//! parlour-session (this)   ← who is connected, how to write to them
//!     ↕
//! parlour-protocol (below) ← envelopes, framing, identity types
//! ```

mod error;
mod registry;
mod session;

pub use error::SessionError;
pub use registry::Registry;
pub use session::{Session, SessionId};
