use std::collections::HashMap;

use tracing::debug;

use super::types::{Connection, ConnectionId, HubError, RoomId};

/// Members of one room, in join order
#[derive(Debug, Default)]
struct Room {
    members: Vec<ConnectionId>,
}

/// Room membership table.
///
/// A room exists exactly while it has at least one member: it is created by
/// the first [`Registry::join`] and dropped by the [`Registry::leave`] that
/// empties it. Every connection is in at most one room, tracked through the
/// connection's own `room_id`.
#[derive(Debug, Default)]
pub struct Registry {
    rooms: HashMap<RoomId, Room>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `conn` to `room_id` and return the members that were already there.
    pub fn join(
        &mut self,
        room_id: RoomId,
        conn: &mut Connection,
    ) -> Result<Vec<ConnectionId>, HubError> {
        if let Some(current) = conn.room_id() {
            return Err(HubError::AlreadyJoined(current.clone()));
        }

        let room = self.rooms.entry(room_id.clone()).or_default();
        let peers = room.members.clone();
        room.members.push(conn.id);
        conn.room_id = Some(room_id);

        Ok(peers)
    }

    /// Remove `conn` from its room, dropping the room once empty.
    ///
    /// Returns the room the connection was in, or `None` if it never joined
    /// one. Safe to call more than once.
    pub fn leave(&mut self, conn: &Connection) -> Option<RoomId> {
        let room_id = conn.room_id()?;
        let room = self.rooms.get_mut(room_id)?;

        let before = room.members.len();
        room.members.retain(|id| *id != conn.id);
        if room.members.len() == before {
            return None;
        }

        if room.members.is_empty() {
            self.rooms.remove(room_id);
            debug!("Room {} removed (empty)", room_id);
        }
        Some(room_id.clone())
    }

    /// Snapshot of the members of `room_id`; empty for unknown rooms.
    pub fn members_of(&self, room_id: &RoomId) -> Vec<ConnectionId> {
        self.rooms
            .get(room_id)
            .map(|room| room.members.clone())
            .unwrap_or_default()
    }

    pub fn contains_room(&self, room_id: &RoomId) -> bool {
        self.rooms.contains_key(room_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
