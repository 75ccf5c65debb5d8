use std::future::Future;
use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tracing::{debug, error, info, warn};

use super::actor::HubHandle;
use super::messages::{ClientEvent, ServerEvent};
use super::types::{ConnectionId, HubError, OutboundMessage};
use crate::config::ServerConfig;

pub const DEFAULT_PORT: u16 = 3000;

/// WebSocket front end for the hub
pub struct HubServer {
    listener: TcpListener,
    handle: HubHandle,
    config: ServerConfig,
}

impl HubServer {
    /// Bind the listener and start the hub actor
    pub async fn bind<A: ToSocketAddrs>(addr: A, config: ServerConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Relay hub listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            handle: HubHandle::spawn(),
            config,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle to the hub actor serving this listener
    pub fn handle(&self) -> HubHandle {
        self.handle.clone()
    }

    pub async fn run(self) -> std::io::Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Accept connections until `shutdown` resolves
    pub async fn run_until<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Relay hub shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };
                    let handle = self.handle.clone();
                    let config = self.config.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, handle, config).await {
                            error!("Connection error from {}: {}", addr, e);
                        }
                    });
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    handle: HubHandle,
    config: ServerConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundMessage>();
    let (ctrl_tx, mut ctrl_rx) = mpsc::unbounded_channel::<Message>();

    let id = handle.connect(tx.clone()).await?;
    info!("WebSocket connection {} from {}", id, addr);

    let mut ping_interval = tokio::time::interval(config.ping_interval);
    let mut waiting_for_pong = false;
    let mut pong_deadline: Option<tokio::time::Instant> = None;

    let send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(msg) = rx.recv() => {
                    let ws_msg = Message::Text(msg.into_inner());
                    if ws_tx.send(ws_msg).await.is_err() {
                        break;
                    }
                }
                Some(ctrl_msg) = ctrl_rx.recv() => {
                    if ws_tx.send(ctrl_msg).await.is_err() {
                        break;
                    }
                }
                else => break,
            }
        }
    });

    loop {
        let pong_timeout = async {
            match pong_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = ping_interval.tick() => {
                if waiting_for_pong {
                    warn!("No Pong received, disconnecting {}", id);
                    break;
                }
                if ctrl_tx.send(Message::Ping(Bytes::new())).is_err() {
                    break;
                }
                waiting_for_pong = true;
                pong_deadline = Some(tokio::time::Instant::now() + config.pong_timeout);
                debug!("Ping sent to {}", id);
            }

            _ = pong_timeout => {
                warn!("Pong timeout, disconnecting {}", id);
                break;
            }

            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        warn!("WebSocket error on {}: {}", id, e);
                        break;
                    }
                    None => break,
                };

                match msg {
                    Message::Text(text) => {
                        if let Err(e) = handle_text_message(&text, &tx, &handle, id).await {
                            error!("Hub unavailable for {}: {}", id, e);
                            break;
                        }
                    }
                    Message::Pong(_) => {
                        waiting_for_pong = false;
                        pong_deadline = None;
                        debug!("Pong received from {}", id);
                    }
                    Message::Close(_) => {
                        info!("Close received from {}", id);
                        break;
                    }
                    Message::Binary(_) => debug!("Ignoring binary frame from {}", id),
                    _ => {}
                }
            }
        }
    }

    handle.disconnect(id).await;
    send_task.abort();
    info!("WebSocket disconnected: {}", id);

    Ok(())
}

async fn handle_text_message(
    text: &str,
    tx: &mpsc::UnboundedSender<OutboundMessage>,
    handle: &HubHandle,
    id: ConnectionId,
) -> Result<(), HubError> {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(e) => e,
        Err(e) => {
            debug!("Invalid message from {}: {}", id, e);
            let err = ServerEvent::Error {
                message: HubError::InvalidMessage(e.to_string()).to_string(),
            };
            let _ = tx.send(err.encode());
            return Ok(());
        }
    };

    handle.dispatch(id, event).await
}
