//! Room membership and message relay over WebSocket

mod actor;
mod messages;
mod registry;
mod router;
mod server;
mod types;

pub use actor::HubHandle;
pub use messages::{ClientEvent, ServerEvent};
pub use registry::Registry;
pub use router::Router;
pub use server::{DEFAULT_PORT, HubServer};
pub use types::{
    Connection, ConnectionId, DEFAULT_DISPLAY_NAME, HubError, OutboundMessage, RoomId,
};
