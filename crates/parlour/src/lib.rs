//! # Parlour
//!
//! A connection-oriented lobby server: newline-delimited JSON envelopes
//! over TCP, an identity handshake, a registry of live sessions, and a
//! dispatch table that deployments extend with their own message
//! handlers.
//!
//! The core speaks exactly one message itself — `hello`, which fixes a
//! session's identity and answers `hello_ack`. Everything else a server
//! does is a handler registered through the builder; the read loop
//! routes by the `msgt` field and answers anything it cannot route with
//! a single `error` envelope.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use parlour::prelude::*;
//!
//! async fn ping(session: Arc<Session>, _envelope: Envelope) -> Result<(), DispatchError> {
//!     session.send(&Envelope::new("pong")).await?;
//!     Ok(())
//! }
//!
//! # async fn run() -> Result<(), ParlourError> {
//! let server = ParlourServer::builder()
//!     .bind("127.0.0.1:3904")
//!     .handler("ping", ping)
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod conn;
mod dispatch;
mod error;
mod handlers;
mod server;

pub use dispatch::{BoxedHandler, DispatchTable};
pub use error::{DispatchError, ParlourError};
pub use server::{
    ParlourServer, ParlourServerBuilder, ServerConfig, ServerHandle,
};

pub mod prelude {
    //! One import for embedding a server.

    pub use parlour_protocol::wire::{self, field, msgt};
    pub use parlour_protocol::{Envelope, Identity, PeerAddr, ProtocolError};
    pub use parlour_session::{Registry, Session, SessionError, SessionId};

    pub use crate::{
        DispatchError, DispatchTable, ParlourError, ParlourServer,
        ParlourServerBuilder, ServerConfig, ServerHandle,
    };
}
