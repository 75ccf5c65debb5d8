use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{ConnectionId, OutboundMessage, RoomId};

/// Events sent from client to hub.
///
/// On the wire: `{"event": "<kind>", "data": {...}}`. Opaque fields
/// (`data`, `payload`, `state`) are relayed untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Enter a room and learn who is already there
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        room_id: RoomId,
        #[serde(default)]
        display_name: Option<String>,
    },

    /// Point-to-point negotiation payload for one peer
    Signal {
        to: ConnectionId,
        #[serde(default)]
        data: Value,
    },

    #[serde(rename_all = "camelCase")]
    ChatMessage {
        room_id: RoomId,
        name: String,
        message: String,
    },

    /// Playback sync event
    #[serde(rename_all = "camelCase")]
    YtEvent {
        room_id: RoomId,
        event: String,
        #[serde(default)]
        payload: Value,
    },

    /// Ask the other members for the current shared state
    #[serde(rename_all = "camelCase")]
    RequestHostState { room_id: RoomId },

    /// Authoritative shared state, broadcast to everyone
    #[serde(rename_all = "camelCase")]
    HostState {
        room_id: RoomId,
        #[serde(default)]
        state: Value,
    },
}

impl ClientEvent {
    /// Room named in the payload, for room-scoped events
    pub fn room_id(&self) -> Option<&RoomId> {
        match self {
            ClientEvent::JoinRoom { room_id, .. }
            | ClientEvent::ChatMessage { room_id, .. }
            | ClientEvent::YtEvent { room_id, .. }
            | ClientEvent::RequestHostState { room_id }
            | ClientEvent::HostState { room_id, .. } => Some(room_id),
            ClientEvent::Signal { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::JoinRoom { .. } => "join-room",
            ClientEvent::Signal { .. } => "signal",
            ClientEvent::ChatMessage { .. } => "chat-message",
            ClientEvent::YtEvent { .. } => "yt-event",
            ClientEvent::RequestHostState { .. } => "request-host-state",
            ClientEvent::HostState { .. } => "host-state",
        }
    }
}

/// Events sent from hub to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Identity assigned by the hub when the socket opens
    Connected { id: ConnectionId },

    #[serde(rename_all = "camelCase")]
    PeerJoined {
        id: ConnectionId,
        display_name: String,
    },

    /// Members already in the room, sent to the newcomer only
    RoomPeers { peers: Vec<ConnectionId> },

    Signal { from: ConnectionId, data: Value },

    ChatMessage {
        id: ConnectionId,
        name: String,
        message: String,
        /// Milliseconds since the Unix epoch
        ts: i64,
    },

    YtEvent {
        from: ConnectionId,
        event: String,
        payload: Value,
    },

    RequestHostState { requester: ConnectionId },

    HostState { state: Value },

    #[serde(rename_all = "camelCase")]
    PeerLeft {
        id: ConnectionId,
        display_name: String,
    },

    Error { message: String },
}

impl ServerEvent {
    pub fn encode(&self) -> OutboundMessage {
        // every field is a string, number or Value, and Value maps have string keys
        let json =
            serde_json::to_string(self).expect("ServerEvent serialization should never fail");
        OutboundMessage::from(json)
    }
}
