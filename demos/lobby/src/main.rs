//! A small lobby server: peers say hello, browse a game catalog, see who
//! else is around, and offer each other games. Everything beyond the
//! handshake is wired up through the public handler registration API.

use std::sync::Arc;

use parlour::prelude::*;
use rand::Rng;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Game catalog
// ---------------------------------------------------------------------------

/// One entry in the lobby's catalog.
#[derive(Clone, Serialize)]
struct GameInfo {
    name: &'static str,
    min_seats: u32,
    max_seats: u32,
}

/// The games this lobby fronts. A real deployment would load these from
/// configuration.
fn catalog() -> Vec<GameInfo> {
    vec![
        GameInfo { name: "chess", min_seats: 2, max_seats: 2 },
        GameInfo { name: "go", min_seats: 2, max_seats: 2 },
        GameInfo { name: "hearts", min_seats: 3, max_seats: 4 },
    ]
}

fn catalog_has(name: &str) -> bool {
    catalog().iter().any(|g| g.name == name)
}

/// A random 32-character hex token. Both sides of an offer quote it, so
/// later offer traffic can name the exchange it belongs to.
fn offer_token() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `list_users`: the handles of everyone who has said hello.
async fn list_users(
    session: Arc<Session>,
    _envelope: Envelope,
) -> Result<(), DispatchError> {
    session.require_identity()?;
    let mut users: Vec<String> = session
        .registry()
        .snapshot()
        .await
        .iter()
        .filter_map(|peer| peer.identity().map(|id| id.handle.clone()))
        .collect();
    users.sort();
    let reply = Envelope::new(msgt::USERS).with("users", users)?;
    session.send(&reply).await?;
    Ok(())
}

/// `list_games`: the catalog. Open to anonymous peers; browsing needs no
/// handshake.
async fn list_games(
    session: Arc<Session>,
    _envelope: Envelope,
) -> Result<(), DispatchError> {
    let reply = Envelope::new(msgt::GAMES).with("games", catalog())?;
    session.send(&reply).await?;
    Ok(())
}

/// `offer_game`: forward a game offer to another identified peer.
///
/// Pushes `offer_status` to the target, then acks the offerer. Both
/// messages carry the same freshly minted token.
async fn offer_game(
    session: Arc<Session>,
    envelope: Envelope,
) -> Result<(), DispatchError> {
    let from = session.require_identity()?.handle.clone();
    let game = envelope.str_field("game")?.to_string();
    let to = envelope.str_field("to")?;

    if !catalog_has(&game) {
        return Err(DispatchError::Failed(format!("unknown game {game}")));
    }
    if to == from {
        return Err(DispatchError::Failed(
            "cannot offer a game to yourself".into(),
        ));
    }
    let Some(target) = session.registry().find_by_handle(to).await else {
        return Err(DispatchError::Failed(format!("no such user {to}")));
    };

    let token = offer_token();
    let push = Envelope::new(msgt::OFFER_STATUS)
        .with("game", &game)?
        .with("from", &from)?
        .with("token", &token)?;
    if let Err(e) = target.send(&push).await {
        // The target's own loop cleans up its connection; the offerer
        // only hears that the offer could not be delivered.
        tracing::warn!(id = %target.id(), error = %e, "offer push failed");
        return Err(DispatchError::Failed(format!("could not reach {to}")));
    }
    tracing::info!(%from, %to, %game, %token, "offer forwarded");

    let ack = Envelope::new(msgt::OFFER_ACK)
        .with("game", &game)?
        .with("to", to)?
        .with("token", &token)?;
    session.send(&ack).await?;
    Ok(())
}

/// `offer_ack` from a client: the target saw the status push. Logged;
/// the accept/decline flow belongs to a real matchmaker.
async fn offer_ack(
    session: Arc<Session>,
    envelope: Envelope,
) -> Result<(), DispatchError> {
    let token = envelope.str_field("token").unwrap_or("-");
    tracing::info!(id = %session.id(), %token, "offer acknowledged");
    Ok(())
}

/// `goodbye`: ack, then ask the session's loop to wind down.
async fn goodbye(
    session: Arc<Session>,
    _envelope: Envelope,
) -> Result<(), DispatchError> {
    session.send(&Envelope::new(msgt::GOODBYE_ACK)).await?;
    session.stop();
    Ok(())
}

// ---------------------------------------------------------------------------
// Server bootstrap
// ---------------------------------------------------------------------------

/// Every lobby message type on one builder; `main` and the tests share it.
fn lobby_server() -> ParlourServerBuilder {
    ParlourServer::builder()
        .handler(msgt::LIST_USERS, list_users)
        .handler(msgt::LIST_GAMES, list_games)
        .handler(msgt::OFFER_GAME, offer_game)
        .handler(msgt::OFFER_ACK, offer_ack)
        .handler(msgt::GOODBYE, goodbye)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let bind = std::env::args()
        .nth(1)
        .unwrap_or_else(|| format!("127.0.0.1:{}", wire::DEFAULT_PORT));

    let server = lobby_server().bind(&bind).build().await?;
    let handle = server.handle();
    let running = tokio::spawn(server.run());

    tokio::signal::ctrl_c().await?;
    tracing::info!("interrupt received, shutting down");
    handle.shutdown();
    running.await??;
    Ok(())
}

// =========================================================================
// Tests
// =========================================================================
