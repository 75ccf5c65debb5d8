use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::messages::{ClientEvent, ServerEvent};
use super::registry::Registry;
use super::types::{Connection, ConnectionId, HubError, OutboundMessage, RoomId};

/// Who receives a relayed event
#[derive(Debug, Clone, Copy, PartialEq)]
enum Audience {
    /// Every member of the room, sender included
    Room,
    /// Every member of the room except the sender
    Others,
}

/// Routes inbound client events to their audience.
///
/// Owns the live connections and the room [`Registry`]. All methods take
/// `&mut self`, so whoever owns the router serializes every membership change.
#[derive(Debug, Default)]
pub struct Router {
    registry: Registry,
    connections: HashMap<ConnectionId, Connection>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new transport connection and tell it its id.
    pub fn connect(&mut self, tx: mpsc::UnboundedSender<OutboundMessage>) -> ConnectionId {
        let mut id = ConnectionId::generate();
        while self.connections.contains_key(&id) {
            id = ConnectionId::generate();
        }

        let conn = Connection::new(id, tx);
        conn.send(ServerEvent::Connected { id }.encode());
        self.connections.insert(id, conn);

        info!("Connection {} opened", id);
        id
    }

    /// Handle one event, reporting a rejection back to the sender.
    pub fn dispatch(&mut self, from: ConnectionId, event: ClientEvent) {
        let kind = event.kind();
        if let Err(e) = self.handle(from, event) {
            warn!("Rejected {} from {}: {}", kind, from, e);
            self.send_to(
                &from,
                ServerEvent::Error {
                    message: e.to_string(),
                }
                .encode(),
            );
        }
    }

    pub fn handle(&mut self, from: ConnectionId, event: ClientEvent) -> Result<(), HubError> {
        match event {
            ClientEvent::JoinRoom {
                room_id,
                display_name,
            } => self.join_room(from, room_id, display_name),

            ClientEvent::Signal { to, data } => {
                if !self.connections.contains_key(&to) {
                    debug!("Dropping signal from {} to unknown {}", from, to);
                    return Ok(());
                }
                self.send_to(&to, ServerEvent::Signal { from, data }.encode());
                Ok(())
            }

            ClientEvent::ChatMessage {
                room_id,
                name,
                message,
            } => {
                let room_id = self.joined_room(&from, &room_id)?;
                let event = ServerEvent::ChatMessage {
                    id: from,
                    name,
                    message,
                    ts: chrono::Utc::now().timestamp_millis(),
                };
                self.broadcast(&room_id, &from, Audience::Room, event);
                Ok(())
            }

            ClientEvent::YtEvent {
                room_id,
                event,
                payload,
            } => {
                let room_id = self.joined_room(&from, &room_id)?;
                let event = ServerEvent::YtEvent {
                    from,
                    event,
                    payload,
                };
                self.broadcast(&room_id, &from, Audience::Others, event);
                Ok(())
            }

            ClientEvent::RequestHostState { room_id } => {
                let room_id = self.joined_room(&from, &room_id)?;
                let event = ServerEvent::RequestHostState { requester: from };
                self.broadcast(&room_id, &from, Audience::Others, event);
                Ok(())
            }

            ClientEvent::HostState { room_id, state } => {
                let room_id = self.joined_room(&from, &room_id)?;
                self.broadcast(&room_id, &from, Audience::Room, ServerEvent::HostState { state });
                Ok(())
            }
        }
    }

    /// Tear down a connection: leave its room and tell the remaining members.
    ///
    /// Unknown ids are ignored, so cleanup runs at most once per connection.
    pub fn disconnect(&mut self, id: ConnectionId) {
        let Some(conn) = self.connections.remove(&id) else {
            return;
        };

        if let Some(room_id) = self.registry.leave(&conn) {
            let event = ServerEvent::PeerLeft {
                id,
                display_name: conn.display_name().to_string(),
            };
            self.broadcast(&room_id, &id, Audience::Others, event);
            info!("{} left {}", conn.display_name(), room_id);
        }
        info!("Connection {} closed", id);
    }

    pub fn members_of(&self, room_id: &RoomId) -> Vec<ConnectionId> {
        self.registry.members_of(room_id)
    }

    pub fn room_count(&self) -> usize {
        self.registry.room_count()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn join_room(
        &mut self,
        from: ConnectionId,
        room_id: RoomId,
        display_name: Option<String>,
    ) -> Result<(), HubError> {
        let conn = self
            .connections
            .get_mut(&from)
            .ok_or_else(|| HubError::Internal(format!("unknown connection {}", from)))?;

        let peers = self.registry.join(room_id.clone(), conn)?;
        conn.display_name = display_name.filter(|name| !name.is_empty());
        let display_name = conn.display_name().to_string();

        let joined = ServerEvent::PeerJoined {
            id: from,
            display_name: display_name.clone(),
        }
        .encode();
        for peer in &peers {
            self.send_to(peer, joined.clone());
        }
        self.send_to(&from, ServerEvent::RoomPeers { peers }.encode());

        info!("{} joined {}", display_name, room_id);
        Ok(())
    }

    /// The sender's room, provided it matches the room the payload names.
    fn joined_room(&self, from: &ConnectionId, addressed: &RoomId) -> Result<RoomId, HubError> {
        let current = self
            .connections
            .get(from)
            .and_then(|conn| conn.room_id())
            .ok_or(HubError::NotInRoom)?;

        if current != addressed {
            return Err(HubError::RoomMismatch {
                expected: current.clone(),
                actual: addressed.clone(),
            });
        }
        Ok(current.clone())
    }

    fn broadcast(
        &self,
        room_id: &RoomId,
        sender: &ConnectionId,
        audience: Audience,
        event: ServerEvent,
    ) {
        let msg = event.encode();
        for member in self.registry.members_of(room_id) {
            if audience == Audience::Others && member == *sender {
                continue;
            }
            self.send_to(&member, msg.clone());
        }
    }

    fn send_to(&self, id: &ConnectionId, msg: OutboundMessage) {
        if let Some(conn) = self.connections.get(id) {
            conn.send(msg);
        }
    }
}
