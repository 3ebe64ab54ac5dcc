//! Names shared by both ends of the wire.
//!
//! Handlers and clients should spell message types and field names through
//! these constants rather than repeating string literals.

/// Protocol revision spoken by this crate.
pub const PROTOCOL_VERSION: u32 = 1;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 3904;

/// Message type discriminators (the `msgt` values).
pub mod msgt {
    /// Client → server handshake, declares a handle.
    pub const HELLO: &str = "hello";
    /// Server → client handshake acknowledgement, carries the identity.
    pub const HELLO_ACK: &str = "hello_ack";
    /// Server → client report of a failed message.
    pub const ERROR: &str = "error";

    // Lobby surface. The core dispatches these like any other message;
    // handlers for them are registered by the embedding server.
    pub const LIST_USERS: &str = "list_users";
    pub const USERS: &str = "users";
    pub const LIST_GAMES: &str = "list_games";
    pub const GAMES: &str = "games";
    pub const OFFER_GAME: &str = "offer_game";
    pub const OFFER_ACK: &str = "offer_ack";
    pub const OFFER_STATUS: &str = "offer_status";
    pub const GOODBYE: &str = "goodbye";
    pub const GOODBYE_ACK: &str = "goodbye_ack";
}

/// Field names used by the baseline messages.
pub mod field {
    /// The discriminator itself.
    pub const MSGT: &str = "msgt";
    /// Declared handle in `hello`.
    pub const HANDLE: &str = "handle";
    /// Identity object in `hello_ack`.
    pub const ID: &str = "id";
    /// Failure description in `error`.
    pub const ERROR: &str = "error";
}
