use std::fmt;

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Utf8Bytes;

/// Display name used when a client joins without one
pub const DEFAULT_DISPLAY_NAME: &str = "Anonymous";

/// Hub errors
#[derive(Debug, Error, PartialEq)]
pub enum HubError {
    #[error("not in a room")]
    NotInRoom,

    #[error("already joined room {0}")]
    AlreadyJoined(RoomId),

    #[error("room mismatch: joined {expected}, addressed {actual}")]
    RoomMismatch { expected: RoomId, actual: RoomId },

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

const CONNECTION_ID_PREFIX: &[u8] = b"conn_";
const CONNECTION_ID_LEN: usize = 21;
const HEX_CHARS: &[u8] = b"0123456789abcdef";

/// Connection ID: 21-byte fixed array ("conn_" + 16 hex)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    bytes: [u8; CONNECTION_ID_LEN],
    len: u8,
}

impl ConnectionId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; CONNECTION_ID_LEN];
        let prefix_len = CONNECTION_ID_PREFIX.len();
        bytes[..prefix_len].copy_from_slice(CONNECTION_ID_PREFIX);

        let value: u64 = rand::rng().random();
        for i in 0..16 {
            let nibble = ((value >> (60 - i * 4)) & 0xF) as usize;
            bytes[prefix_len + i] = HEX_CHARS[nibble];
        }
        Self {
            bytes,
            len: CONNECTION_ID_LEN as u8,
        }
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("")
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a connection id as issued by [`ConnectionId::generate`].
///
/// Anything else is rejected rather than coerced, so a malformed address can
/// never match a live connection.
impl TryFrom<&str> for ConnectionId {
    type Error = HubError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let src = s.as_bytes();
        let prefix_len = CONNECTION_ID_PREFIX.len();
        let well_formed = src.len() == CONNECTION_ID_LEN
            && src.starts_with(CONNECTION_ID_PREFIX)
            && src[prefix_len..].iter().all(|b| HEX_CHARS.contains(b));
        if !well_formed {
            return Err(HubError::InvalidMessage(format!(
                "invalid connection id: {s:?}"
            )));
        }

        let mut bytes = [0u8; CONNECTION_ID_LEN];
        bytes.copy_from_slice(src);
        Ok(Self {
            bytes,
            len: CONNECTION_ID_LEN as u8,
        })
    }
}

impl Serialize for ConnectionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ConnectionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ConnectionId::try_from(s.as_str()).map_err(serde::de::Error::custom)
    }
}

/// Room identifier, chosen by the clients
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RoomId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Wrapper for outbound WebSocket messages using tungstenite's Utf8Bytes.
#[derive(Debug, Clone)]
pub struct OutboundMessage(Utf8Bytes);

impl OutboundMessage {
    pub fn new(s: impl Into<Utf8Bytes>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Get the inner Utf8Bytes for tungstenite Message::Text
    pub fn into_inner(self) -> Utf8Bytes {
        self.0
    }
}

impl From<String> for OutboundMessage {
    fn from(s: String) -> Self {
        Self(Utf8Bytes::from(s))
    }
}

/// A live client session as seen by the hub.
///
/// `room_id` and `display_name` start empty and are written once, when the
/// connection joins a room.
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub(crate) room_id: Option<RoomId>,
    pub(crate) display_name: Option<String>,
    /// Channel for outbound messages to this connection.
    /// Uses OutboundMessage (Utf8Bytes) for O(1) broadcast cloning.
    pub(crate) tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl Connection {
    pub fn new(id: ConnectionId, tx: mpsc::UnboundedSender<OutboundMessage>) -> Self {
        Self {
            id,
            room_id: None,
            display_name: None,
            tx,
        }
    }

    pub fn room_id(&self) -> Option<&RoomId> {
        self.room_id.as_ref()
    }

    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(DEFAULT_DISPLAY_NAME)
    }

    /// Queue a message for this connection. Closed channels are ignored.
    pub(crate) fn send(&self, msg: OutboundMessage) {
        let _ = self.tx.send(msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_generate_has_correct_format() {
        let id = ConnectionId::generate();
        assert!(id.as_str().starts_with("conn_"));
        assert_eq!(id.as_str().len(), 21);
        assert!(id.as_str()[5..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn connection_ids_differ() {
        let a = ConnectionId::generate();
        let b = ConnectionId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn connection_id_parses_generated_form() {
        let id = ConnectionId::generate();
        assert_eq!(ConnectionId::try_from(id.as_str()), Ok(id));
    }

    #[test]
    fn connection_id_rejects_extra_characters() {
        let live = ConnectionId::generate();
        let addressed = format!("{}-not-a-real-connection", live);
        assert!(ConnectionId::try_from(addressed.as_str()).is_err());
    }

    #[test]
    fn connection_id_rejects_malformed() {
        for s in [
            "",
            "conn_",
            "conn_0123456789abcde",
            "peer_0123456789abcdef",
            "conn_0123456789ABCDEF",
            "conn_0123456789abcdeé",
        ] {
            assert!(ConnectionId::try_from(s).is_err(), "accepted {s:?}");
        }
    }

    #[test]
    fn connection_id_deserialization_is_strict() {
        let json = "\"conn_00000000000000aa_extra\"";
        assert!(serde_json::from_str::<ConnectionId>(json).is_err());
    }

    #[test]
    fn connection_id_serialization() {
        let id = ConnectionId::try_from("conn_00000000000000aa").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"conn_00000000000000aa\"");

        let back: ConnectionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn room_id_is_transparent() {
        let room = RoomId::from("movie night");
        assert_eq!(serde_json::to_string(&room).unwrap(), "\"movie night\"");
        assert_eq!(format!("{}", room), "movie night");
    }

    #[test]
    fn display_name_defaults_to_placeholder() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut conn = Connection::new(ConnectionId::generate(), tx);
        assert_eq!(conn.display_name(), DEFAULT_DISPLAY_NAME);

        conn.display_name = Some("alice".to_string());
        assert_eq!(conn.display_name(), "alice");
    }

    #[test]
    fn send_to_closed_channel_is_ignored() {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Connection::new(ConnectionId::generate(), tx);
        drop(rx);
        conn.send(OutboundMessage::from("hello".to_string()));
    }
}
