//! The per-connection read loop.
//!
//! One task runs [`drive_connection`] per accepted socket. It owns the
//! read half; everything any other task may touch lives in the
//! [`Session`]. A drop guard owns the close-and-deregister step, so it
//! runs exactly once however the task ends, clean return or unwind.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::time::timeout;

use parlour_protocol::{Envelope, Framer};
use parlour_session::{Session, SessionError};

use crate::dispatch::DispatchTable;

/// Bytes requested per socket read.
const READ_CHUNK: usize = 4096;

/// Why a connection's loop ended. Logged once on exit.
#[derive(Debug)]
enum CloseReason {
    /// The peer closed its side; read returned 0 bytes.
    PeerClosed,
    /// The flood guard tripped.
    Flooded,
    /// [`Session::stop`] was called, usually by server shutdown.
    Stopped,
    /// Reading from the socket failed.
    Read(std::io::Error),
    /// Writing a reply failed; the peer is unreachable.
    Write(SessionError),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerClosed => write!(f, "peer closed"),
            Self::Flooded => write!(f, "flood guard tripped"),
            Self::Stopped => write!(f, "stopped"),
            Self::Read(e) => write!(f, "read failed: {e}"),
            Self::Write(e) => write!(f, "write failed: {e}"),
        }
    }
}

/// Drop guard that closes the socket and deregisters the session when
/// its task ends.
///
/// Cleanup rides on `Drop` so it also runs if the task unwinds. `Drop`
/// is synchronous, so the async half is spawned fire-and-forget.
struct CloseGuard {
    session: Arc<Session>,
}

impl Drop for CloseGuard {
    fn drop(&mut self) {
        let session = Arc::clone(&self.session);
        tokio::spawn(async move {
            session.close().await;
            session.registry().remove(session.id()).await;
        });
    }
}

/// Drives one connection from registration to teardown.
pub(crate) async fn drive_connection(
    session: Arc<Session>,
    mut reader: OwnedReadHalf,
    table: Arc<DispatchTable>,
    read_timeout: Duration,
    max_buffered: usize,
) {
    let _guard = CloseGuard {
        session: Arc::clone(&session),
    };

    let reason =
        read_loop(&session, &mut reader, &table, read_timeout, max_buffered).await;

    tracing::info!(
        id = %session.id(),
        peer = %session.peer(),
        %reason,
        "session closed"
    );
    // _guard drops here; close and deregister fire.
}

async fn read_loop(
    session: &Arc<Session>,
    reader: &mut OwnedReadHalf,
    table: &DispatchTable,
    read_timeout: Duration,
    max_buffered: usize,
) -> CloseReason {
    let mut framer = Framer::with_limit(max_buffered);
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        if !session.is_running() {
            return CloseReason::Stopped;
        }

        let n = match timeout(read_timeout, reader.read(&mut chunk)).await {
            // Timeouts are routine. Re-check the running flag and wait
            // again; this bounds how long a stop request can go unseen.
            Err(_) => continue,
            Ok(Ok(0)) => return CloseReason::PeerClosed,
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return CloseReason::Read(e),
        };

        let frames = match framer.extend(&chunk[..n]) {
            Ok(frames) => frames,
            Err(e) => {
                tracing::warn!(id = %session.id(), error = %e, "dropping flooding peer");
                return CloseReason::Flooded;
            }
        };

        for frame in frames {
            if let Err(e) = handle_frame(session, table, &frame).await {
                return CloseReason::Write(e);
            }
        }
    }
}

/// Parses and dispatches one frame.
///
/// Every processing failure is answered with exactly one `error`
/// envelope on a connection that keeps living. The returned error is
/// only the transport failing underneath us while we tried to answer.
async fn handle_frame(
    session: &Arc<Session>,
    table: &DispatchTable,
    frame: &[u8],
) -> Result<(), SessionError> {
    let envelope = match Envelope::parse(frame) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(
                id = %session.id(),
                raw = %String::from_utf8_lossy(frame),
                error = %e,
                "unparseable frame"
            );
            return session.send_error(e).await;
        }
    };

    let msgt = envelope.msgt.clone();
    if let Err(e) = table.dispatch(session.clone(), envelope).await {
        tracing::warn!(id = %session.id(), %msgt, error = %e, "message failed");
        return session.send_error(e).await;
    }
    Ok(())
}
