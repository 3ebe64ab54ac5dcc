//! Message envelopes and handshake identity.
//!
//! This module defines everything that travels on the wire, and the wire
//! format is deliberately small: one frame is one JSON object on one
//! line, and every object carries a `msgt` field naming its message
//! type. That one rule is the entire language client and server speak.
//!
//! [`Envelope`] is the parsed form of a frame. The `msgt` discriminator
//! is pulled out for routing; every other field stays as raw JSON, so a
//! deployment can add message types without touching this crate. The
//! crate never needs to know a `list_games` from an `offer_game`; it
//! only carries the object.

use std::fmt;
use std::net::SocketAddr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtocolError;
use crate::wire::{field, msgt};

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A single wire message: a `msgt` discriminator plus free-form fields.
///
/// On the wire the two parts are one flat object:
///
/// ```text
/// {"msgt": "hello", "handle": "ana"}
///    │                └── lands in `fields` as {"handle": "ana"}
///    └── lands in `msgt`
/// ```
///
/// `#[serde(flatten)]` on `fields` is what produces that shape: instead
/// of nesting the map under a `"fields"` key, serde splices its entries
/// into the top-level object next to `msgt`. Parsing reverses it, so on
/// both sides the discriminator and the payload live in one object.
///
/// Envelopes are transient — built for one send or parsed from one frame,
/// never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type discriminator. Routing keys off this field.
    pub msgt: String,

    /// Every other field of the message. Never contains `msgt` itself;
    /// [`parse`](Self::parse) removes the discriminator as it extracts
    /// it, so the two can never disagree.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Envelope {
    /// Creates an envelope with no fields beyond the discriminator.
    pub fn new(msgt: impl Into<String>) -> Self {
        Self {
            msgt: msgt.into(),
            fields: Map::new(),
        }
    }

    /// Adds a field, consuming and returning the envelope so calls chain.
    ///
    /// Anything `Serialize` works as the value: strings, numbers, maps,
    /// or a derived type like [`Identity`].
    ///
    /// ```
    /// use parlour_protocol::Envelope;
    ///
    /// let env = Envelope::new("offer_game")
    ///     .with("game", "chess")?
    ///     .with("to", "bo")?;
    /// assert_eq!(env.str_field("game")?, "chess");
    /// # Ok::<(), parlour_protocol::ProtocolError>(())
    /// ```
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if the value cannot be
    /// represented as JSON.
    pub fn with(
        mut self,
        name: impl Into<String>,
        value: impl Serialize,
    ) -> Result<Self, ProtocolError> {
        let value = serde_json::to_value(value).map_err(ProtocolError::Encode)?;
        self.fields.insert(name.into(), value);
        Ok(self)
    }

    /// Builds the standard error report sent for a failed message:
    ///
    /// ```text
    /// {"msgt": "error", "error": "missing handle field"}
    /// ```
    ///
    /// Takes any `Display`, so error enums pass straight in; the display
    /// string becomes the reply text clients key on. Infallible by
    /// construction: the only field is a string.
    pub fn error_reply(reason: impl fmt::Display) -> Self {
        let mut fields = Map::new();
        fields.insert(field::ERROR.to_string(), Value::String(reason.to_string()));
        Self {
            msgt: msgt::ERROR.to_string(),
            fields,
        }
    }

    /// Parses one frame (delimiter already stripped) into an envelope.
    ///
    /// The stages are deliberate so each failure mode reports distinctly:
    /// UTF-8 decode, whitespace trim, JSON parse, object check, `msgt`
    /// extraction. The trim step is what tolerates clients that end
    /// lines with `\r\n`. All failures here are per-message, not fatal
    /// to the connection.
    ///
    /// # Errors
    /// - [`ProtocolError::InvalidUtf8`] if the frame is not UTF-8.
    /// - [`ProtocolError::MalformedPayload`] if it is not JSON.
    /// - [`ProtocolError::NotAnObject`] if it is JSON but not an object.
    /// - [`ProtocolError::MissingDiscriminator`] if `msgt` is absent.
    /// - [`ProtocolError::InvalidField`] if `msgt` is not a string.
    pub fn parse(raw: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(raw).map_err(ProtocolError::InvalidUtf8)?;
        let value: Value =
            serde_json::from_str(text.trim()).map_err(ProtocolError::MalformedPayload)?;
        let Value::Object(mut fields) = value else {
            return Err(ProtocolError::NotAnObject);
        };
        let msgt = match fields.remove(field::MSGT) {
            Some(Value::String(s)) => s,
            Some(other) => {
                return Err(ProtocolError::InvalidField {
                    name: field::MSGT,
                    reason: format!("expected a string, got {other}"),
                });
            }
            None => return Err(ProtocolError::MissingDiscriminator),
        };
        Ok(Self { msgt, fields })
    }

    /// Serializes the envelope to one newline-terminated line.
    ///
    /// serde_json escapes control characters inside strings, so the
    /// trailing byte is the only raw `\n` in the output and the framing
    /// delimiter can never appear inside a payload.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut line = serde_json::to_vec(self).map_err(ProtocolError::Encode)?;
        line.push(b'\n');
        Ok(line)
    }

    /// Returns the named field as a string.
    ///
    /// Most protocol fields are short strings (handles, game names,
    /// tokens), so this borrows from the envelope instead of copying.
    /// For anything more structured, use [`field`](Self::field).
    ///
    /// # Errors
    /// [`ProtocolError::MissingField`] if absent,
    /// [`ProtocolError::InvalidField`] if present but not a string.
    pub fn str_field(&self, name: &'static str) -> Result<&str, ProtocolError> {
        self.fields
            .get(name)
            .ok_or(ProtocolError::MissingField(name))?
            .as_str()
            .ok_or(ProtocolError::InvalidField {
                name,
                reason: "expected a string".to_string(),
            })
    }

    /// Returns the named field deserialized into `T`.
    ///
    /// `T` is anything `Deserialize`: a number, a `Vec<String>`, or a
    /// struct mirroring a nested object. The field's JSON value is
    /// cloned before deserializing because envelopes are small and
    /// transient; there is no zero-copy path worth the lifetimes.
    ///
    /// # Errors
    /// [`ProtocolError::MissingField`] if absent,
    /// [`ProtocolError::InvalidField`] if it does not match `T`.
    pub fn field<T: DeserializeOwned>(&self, name: &'static str) -> Result<T, ProtocolError> {
        let value = self
            .fields
            .get(name)
            .ok_or(ProtocolError::MissingField(name))?;
        serde_json::from_value(value.clone()).map_err(|e| ProtocolError::InvalidField {
            name,
            reason: e.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A remote endpoint in its wire form: `["127.0.0.1", 51515]`.
///
/// Serde serializes a two-field tuple struct as a two-element JSON
/// array, which is exactly the `[host, port]` pair clients expect
/// inside `hello_ack`. A struct with named fields would produce
/// `{"host": .., "port": ..}` instead and break the contract, so the
/// tuple shape here is part of the protocol, not a style choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerAddr(pub String, pub u16);

impl From<SocketAddr> for PeerAddr {
    fn from(addr: SocketAddr) -> Self {
        Self(addr.ip().to_string(), addr.port())
    }
}

/// Formats as `host:port` for logs.
impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.0, self.1)
    }
}

/// Who a connection claims to be.
///
/// Built once from the `hello` handshake and immutable afterwards. The
/// handle is whatever the client declared; nothing verifies it. The
/// address is the endpoint the server actually observed. On the wire
/// the pair reads as "claimed name, real address":
///
/// ```text
/// {"handle": "ana", "addr": ["127.0.0.1", 51515]}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub handle: String,
    pub addr: PeerAddr,
}

impl Identity {
    /// Pairs a declared handle with the observed remote address.
    pub fn new(handle: impl Into<String>, addr: impl Into<PeerAddr>) -> Self {
        Self {
            handle: handle.into(),
            addr: addr.into(),
        }
    }
}

/// Formats as `handle@host:port`, the form the session logs use.
impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.handle, self.addr)
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The wire format is the contract with every client, so these tests
    //! pin exact JSON shapes, not just round trips.

    use super::*;

    fn parse_str(text: &str) -> Result<Envelope, ProtocolError> {
        Envelope::parse(text.as_bytes())
    }

    // =====================================================================
    // Construction and encoding
    // =====================================================================

    #[test]
    fn test_new_carries_only_the_discriminator() {
        let env = Envelope::new(msgt::HELLO);
        assert_eq!(env.msgt, "hello");
        assert!(env.fields.is_empty());
    }

    #[test]
    fn test_with_adds_field_to_wire_object() {
        let env = Envelope::new(msgt::HELLO)
            .with(field::HANDLE, "ana")
            .unwrap();
        let json: Value = serde_json::from_slice(&env.encode().unwrap()).unwrap();
        assert_eq!(json["msgt"], "hello");
        assert_eq!(json["handle"], "ana");
    }

    #[test]
    fn test_encode_ends_with_single_newline() {
        let line = Envelope::new("ping").encode().unwrap();
        assert_eq!(line.last(), Some(&b'\n'));
        assert_eq!(line.iter().filter(|&&b| b == b'\n').count(), 1);
    }

    #[test]
    fn test_encode_escapes_newlines_inside_strings() {
        // A handle containing a raw newline must not break framing.
        let line = Envelope::new(msgt::HELLO)
            .with(field::HANDLE, "two\nlines")
            .unwrap()
            .encode()
            .unwrap();
        assert_eq!(line.iter().filter(|&&b| b == b'\n').count(), 1);
        assert_eq!(line.last(), Some(&b'\n'));
    }

    #[test]
    fn test_error_reply_shape() {
        let json = serde_json::to_value(Envelope::error_reply("missing msgt field")).unwrap();
        assert_eq!(json["msgt"], "error");
        assert_eq!(json["error"], "missing msgt field");
    }

    #[test]
    fn test_encode_then_parse_round_trip() {
        let env = Envelope::new(msgt::OFFER_GAME)
            .with("game", "chess")
            .unwrap()
            .with("to", "bo")
            .unwrap();
        let mut line = env.encode().unwrap();
        line.pop();
        assert_eq!(Envelope::parse(&line).unwrap(), env);
    }

    // =====================================================================
    // Parsing
    // =====================================================================

    #[test]
    fn test_parse_extracts_discriminator_and_fields() {
        let env = parse_str(r#"{"msgt": "hello", "handle": "ana"}"#).unwrap();
        assert_eq!(env.msgt, "hello");
        assert_eq!(env.fields["handle"], "ana");
        assert!(!env.fields.contains_key("msgt"));
    }

    #[test]
    fn test_parse_trims_surrounding_whitespace() {
        // CRLF clients leave a \r on every frame.
        let env = parse_str("  {\"msgt\": \"hello\"}\r").unwrap();
        assert_eq!(env.msgt, "hello");
    }

    #[test]
    fn test_parse_garbage_is_malformed_payload() {
        let err = parse_str("this is not json").unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedPayload(_)));
    }

    #[test]
    fn test_parse_invalid_utf8() {
        let err = Envelope::parse(&[0xff, 0xfe, 0x01]).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidUtf8(_)));
    }

    #[test]
    fn test_parse_non_object_json() {
        let err = parse_str(r#"["msgt", "hello"]"#).unwrap_err();
        assert!(matches!(err, ProtocolError::NotAnObject));
    }

    #[test]
    fn test_parse_missing_msgt_field() {
        let err = parse_str(r#"{"handle": "ana"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingDiscriminator));
        assert_eq!(err.to_string(), "missing msgt field");
    }

    #[test]
    fn test_parse_non_string_msgt_is_invalid_field() {
        let err = parse_str(r#"{"msgt": 7}"#).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InvalidField { name: "msgt", .. }
        ));
    }

    // =====================================================================
    // Field accessors
    // =====================================================================

    #[test]
    fn test_str_field_returns_value() {
        let env = parse_str(r#"{"msgt": "hello", "handle": "ana"}"#).unwrap();
        assert_eq!(env.str_field(field::HANDLE).unwrap(), "ana");
    }

    #[test]
    fn test_str_field_missing_names_the_field() {
        let env = parse_str(r#"{"msgt": "hello"}"#).unwrap();
        let err = env.str_field(field::HANDLE).unwrap_err();
        assert_eq!(err.to_string(), "missing handle field");
    }

    #[test]
    fn test_str_field_wrong_type_is_invalid_field() {
        let env = parse_str(r#"{"msgt": "hello", "handle": 12}"#).unwrap();
        let err = env.str_field(field::HANDLE).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidField { .. }));
    }

    #[test]
    fn test_field_deserializes_typed_value() {
        let env = parse_str(r#"{"msgt": "hello", "version": 1}"#).unwrap();
        assert_eq!(env.field::<u32>("version").unwrap(), 1);
    }

    // =====================================================================
    // Identity
    // =====================================================================

    #[test]
    fn test_peer_addr_serializes_as_array() {
        let json = serde_json::to_string(&PeerAddr("127.0.0.1".into(), 3904)).unwrap();
        assert_eq!(json, r#"["127.0.0.1",3904]"#);
    }

    #[test]
    fn test_peer_addr_from_socket_addr() {
        let sock: SocketAddr = "10.0.0.9:51515".parse().unwrap();
        assert_eq!(PeerAddr::from(sock), PeerAddr("10.0.0.9".into(), 51515));
    }

    #[test]
    fn test_identity_json_shape() {
        let id = Identity::new("ana", PeerAddr("127.0.0.1".into(), 4000));
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(json["handle"], "ana");
        assert_eq!(json["addr"], serde_json::json!(["127.0.0.1", 4000]));
    }

    #[test]
    fn test_identity_display() {
        let id = Identity::new("bo", PeerAddr("10.1.1.1".into(), 9));
        assert_eq!(id.to_string(), "bo@10.1.1.1:9");
    }

    #[test]
    fn test_identity_round_trip() {
        let id = Identity::new("cy", PeerAddr("::1".into(), 65535));
        let bytes = serde_json::to_vec(&id).unwrap();
        let decoded: Identity = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(id, decoded);
    }
}
