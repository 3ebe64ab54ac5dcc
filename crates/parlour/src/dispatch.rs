//! Message routing: a table of async handlers keyed by `msgt`.
//!
//! This is the extension point of the whole server. The core registers
//! exactly one handler (`hello`); everything a deployment actually does
//! — user lists, game offers, whatever — is registered on top through
//! the same API, and the read loop cannot tell the difference.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use parlour_protocol::Envelope;
use parlour_protocol::wire::msgt;
use parlour_session::Session;

use crate::error::DispatchError;

/// The shape every handler is stored as.
///
/// Registration boxes the caller's future, so the table can hold
/// handlers of different concrete types under one map.
pub type BoxedHandler = Box<
    dyn Fn(Arc<Session>, Envelope) -> BoxFuture<'static, Result<(), DispatchError>>
        + Send
        + Sync,
>;

/// Routes envelopes to handlers by their `msgt` value.
pub struct DispatchTable {
    handlers: HashMap<String, BoxedHandler>,
}

impl DispatchTable {
    /// An empty table. Most callers want [`baseline`](Self::baseline).
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// A table with the baseline protocol pre-registered: just `hello`.
    pub fn baseline() -> Self {
        let mut table = Self::new();
        table.register(msgt::HELLO, crate::handlers::hello);
        table
    }

    /// Registers `handler` for messages whose `msgt` equals `msgt`.
    ///
    /// Any `async fn(Arc<Session>, Envelope) -> Result<(), DispatchError>`
    /// fits, as does a closure returning such a future. Registering the
    /// same `msgt` twice replaces the earlier handler.
    pub fn register<F, Fut>(&mut self, msgt: impl Into<String>, handler: F)
    where
        F: Fn(Arc<Session>, Envelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), DispatchError>> + Send + 'static,
    {
        let msgt = msgt.into();
        let boxed: BoxedHandler =
            Box::new(move |session, envelope| handler(session, envelope).boxed());
        if self.handlers.insert(msgt.clone(), boxed).is_some() {
            tracing::debug!(%msgt, "handler replaced");
        }
    }

    /// Whether a handler is registered for `msgt`.
    pub fn contains(&self, msgt: &str) -> bool {
        self.handlers.contains_key(msgt)
    }

    /// Routes one envelope to its handler.
    ///
    /// Handlers run inline on the calling task, so a session's messages
    /// are processed strictly in arrival order and a slow handler stalls
    /// only its own connection.
    ///
    /// A panicking handler is contained here instead of unwinding the
    /// caller: the panic text is logged and the failure comes back as an
    /// ordinary [`DispatchError`], so a read loop built on this keeps
    /// its connection alive.
    ///
    /// # Errors
    /// [`DispatchError::Unrecognized`] when no handler matches,
    /// [`DispatchError::Panicked`] when the handler panics, otherwise
    /// whatever the handler returns.
    pub async fn dispatch(
        &self,
        session: Arc<Session>,
        envelope: Envelope,
    ) -> Result<(), DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.msgt) else {
            return Err(DispatchError::Unrecognized(envelope.msgt));
        };
        let id = session.id();
        let msgt = envelope.msgt.clone();
        tracing::debug!(%id, %msgt, "dispatching");

        match AssertUnwindSafe(handler(session, envelope))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(payload) => {
                tracing::error!(
                    %id,
                    %msgt,
                    reason = %panic_text(&*payload),
                    "handler panicked"
                );
                Err(DispatchError::Panicked(msgt))
            }
        }
    }
}

/// Best-effort text from a panic payload. A `panic!` with a literal
/// carries `&'static str`, a formatted one carries `String`; anything
/// else is reported as opaque.
fn panic_text(payload: &(dyn Any + Send)) -> &str {
    match payload.downcast_ref::<&'static str>() {
        Some(s) => s,
        None => match payload.downcast_ref::<String>() {
            Some(s) => s.as_str(),
            None => "opaque panic payload",
        },
    }
}

impl Default for DispatchTable {
    fn default() -> Self {
        Self::baseline()
    }
}

// =========================================================================
// Tests
// =========================================================================
