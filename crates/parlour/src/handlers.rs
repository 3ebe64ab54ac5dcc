//! Baseline protocol handlers.

use std::sync::Arc;

use parlour_protocol::Envelope;
use parlour_protocol::wire::{field, msgt};
use parlour_session::Session;

use crate::error::DispatchError;

/// `hello`: fixes the session's identity and acknowledges it.
///
/// The handle is whatever the peer declared; the address is the observed
/// remote endpoint, never anything the peer claims. The ack carries the
/// full identity back so the client learns how the server sees it.
pub(crate) async fn hello(
    session: Arc<Session>,
    envelope: Envelope,
) -> Result<(), DispatchError> {
    let handle = envelope.str_field(field::HANDLE)?;
    let identity = session.identify(handle)?;
    tracing::info!(id = %session.id(), %identity, "peer identified");

    let ack = Envelope::new(msgt::HELLO_ACK).with(field::ID, identity)?;
    session.send(&ack).await?;
    Ok(())
}

// =========================================================================
// Tests
// =========================================================================
