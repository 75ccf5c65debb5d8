use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::messages::ClientEvent;
use super::router::Router;
use super::types::{ConnectionId, HubError, OutboundMessage, RoomId};

/// Commands sent to the hub actor
pub(crate) enum HubCommand {
    Connect {
        tx: mpsc::UnboundedSender<OutboundMessage>,
        reply: oneshot::Sender<ConnectionId>,
    },
    Event {
        from: ConnectionId,
        event: ClientEvent,
    },
    Disconnect {
        id: ConnectionId,
    },
    MembersOf {
        room_id: RoomId,
        reply: oneshot::Sender<Vec<ConnectionId>>,
    },
}

/// Owns the router; every membership change goes through this one task.
pub(crate) async fn hub_actor(mut rx: mpsc::Receiver<HubCommand>) {
    let mut router = Router::new();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            HubCommand::Connect { tx, reply } => {
                let id = router.connect(tx);
                if reply.send(id).is_err() {
                    // the connection task went away before hearing back
                    router.disconnect(id);
                }
            }

            HubCommand::Event { from, event } => router.dispatch(from, event),

            HubCommand::Disconnect { id } => router.disconnect(id),

            HubCommand::MembersOf { room_id, reply } => {
                let _ = reply.send(router.members_of(&room_id));
            }
        }
    }

    debug!(
        "Hub actor stopped with {} connections in {} rooms",
        router.connection_count(),
        router.room_count()
    );
}

/// Handle to communicate with the hub actor
#[derive(Clone)]
pub struct HubHandle {
    pub(crate) tx: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    /// Spawn a hub actor on the current runtime and return its handle
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel::<HubCommand>(1024);
        tokio::spawn(hub_actor(rx));
        Self { tx }
    }

    /// Register a connection; outbound events arrive on `tx`
    pub async fn connect(
        &self,
        tx: mpsc::UnboundedSender<OutboundMessage>,
    ) -> Result<ConnectionId, HubError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self
            .tx
            .send(HubCommand::Connect {
                tx,
                reply: reply_tx,
            })
            .await;
        reply_rx
            .await
            .map_err(|_| HubError::Internal("actor channel closed".to_string()))
    }

    /// Forward an inbound event from `from`
    pub async fn dispatch(&self, from: ConnectionId, event: ClientEvent) -> Result<(), HubError> {
        self.tx
            .send(HubCommand::Event { from, event })
            .await
            .map_err(|_| HubError::Internal("actor channel closed".to_string()))
    }

    /// Run disconnect cleanup for `id`
    pub async fn disconnect(&self, id: ConnectionId) {
        let _ = self.tx.send(HubCommand::Disconnect { id }).await;
    }

    /// Current members of `room_id`, in join order
    pub async fn members_of(&self, room_id: RoomId) -> Result<Vec<ConnectionId>, HubError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self
            .tx
            .send(HubCommand::MembersOf {
                room_id,
                reply: reply_tx,
            })
            .await;
        reply_rx
            .await
            .map_err(|_| HubError::Internal("actor channel closed".to_string()))
    }
}
