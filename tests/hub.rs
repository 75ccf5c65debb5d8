use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use relayhub::config::ServerConfig;
use relayhub::hub::{ClientEvent, ConnectionId, HubHandle, HubServer, RoomId, ServerEvent};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestClient {
    id: ConnectionId,
    socket: Socket,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let (socket, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        let mut client = Self {
            id: ConnectionId::generate(),
            socket,
        };
        match client.next_event().await {
            ServerEvent::Connected { id } => client.id = id,
            other => panic!("expected connected, got {other:?}"),
        }
        client
    }

    async fn send(&mut self, event: ClientEvent) {
        self.send_raw(&serde_json::to_string(&event).unwrap()).await;
    }

    async fn send_raw(&mut self, text: &str) {
        self.socket
            .send(Message::Text(text.to_string().into()))
            .await
            .unwrap();
    }

    async fn join(&mut self, room: &str, name: &str) -> Vec<ConnectionId> {
        self.send(ClientEvent::JoinRoom {
            room_id: RoomId::from(room),
            display_name: Some(name.to_string()),
        })
        .await;
        match self.next_event().await {
            ServerEvent::RoomPeers { peers } => peers,
            other => panic!("expected room-peers, got {other:?}"),
        }
    }

    async fn next_event(&mut self) -> ServerEvent {
        loop {
            let msg = timeout(Duration::from_secs(2), self.socket.next())
                .await
                .expect("timed out waiting for event")
                .expect("socket closed")
                .unwrap();
            if let Message::Text(text) = msg {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    async fn expect_silence(&mut self) {
        let res = timeout(Duration::from_millis(200), self.socket.next()).await;
        if let Ok(Some(Ok(Message::Text(text)))) = res {
            panic!("unexpected event: {}", text.as_str());
        }
    }
}

async fn start_with(config: ServerConfig) -> (SocketAddr, HubHandle) {
    let server = HubServer::bind("127.0.0.1:0", config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let handle = server.handle();
    tokio::spawn(server.run());
    (addr, handle)
}

async fn start() -> (SocketAddr, HubHandle) {
    start_with(ServerConfig::default()).await
}

/// Poll the hub until the room reaches `expected` or give up.
async fn wait_for_members(handle: &HubHandle, room: &str, expected: Vec<ConnectionId>) {
    for _ in 0..50 {
        if handle.members_of(RoomId::from(room)).await.unwrap() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("room {room} never reached {expected:?}");
}

#[tokio::test]
async fn join_chat_and_leave() {
    let (addr, handle) = start().await;
    let mut a = TestClient::connect(addr).await;
    let mut b = TestClient::connect(addr).await;

    assert!(a.join("r1", "alice").await.is_empty());
    assert_eq!(b.join("r1", "bob").await, vec![a.id]);
    assert_eq!(
        a.next_event().await,
        ServerEvent::PeerJoined {
            id: b.id,
            display_name: "bob".to_string(),
        }
    );

    a.send(ClientEvent::ChatMessage {
        room_id: RoomId::from("r1"),
        name: "alice".to_string(),
        message: "hello".to_string(),
    })
    .await;
    for client in [&mut a, &mut b] {
        match client.next_event().await {
            ServerEvent::ChatMessage {
                name, message, ts, ..
            } => {
                assert_eq!(name, "alice");
                assert_eq!(message, "hello");
                assert!(ts > 0);
            }
            other => panic!("expected chat-message, got {other:?}"),
        }
    }

    let b_id = b.id;
    b.socket.close(None).await.unwrap();
    assert_eq!(
        a.next_event().await,
        ServerEvent::PeerLeft {
            id: b_id,
            display_name: "bob".to_string(),
        }
    );
    wait_for_members(&handle, "r1", vec![a.id]).await;

    a.socket.close(None).await.unwrap();
    wait_for_members(&handle, "r1", vec![]).await;
}

#[tokio::test]
async fn signal_is_point_to_point() {
    let (addr, _handle) = start().await;
    let mut a = TestClient::connect(addr).await;
    let mut b = TestClient::connect(addr).await;
    let mut c = TestClient::connect(addr).await;
    a.join("r1", "a").await;
    b.join("r1", "b").await;
    c.join("r1", "c").await;
    a.next_event().await;
    a.next_event().await;
    b.next_event().await;

    let offer = json!({"type": "offer", "sdp": "v=0"});
    a.send(ClientEvent::Signal {
        to: c.id,
        data: offer.clone(),
    })
    .await;

    assert_eq!(
        c.next_event().await,
        ServerEvent::Signal {
            from: a.id,
            data: offer,
        }
    );
    a.expect_silence().await;
    b.expect_silence().await;
}

#[tokio::test]
async fn signal_to_overlong_id_is_rejected() {
    let (addr, _handle) = start().await;
    let mut a = TestClient::connect(addr).await;
    let mut b = TestClient::connect(addr).await;

    let frame = json!({
        "event": "signal",
        "data": {"to": format!("{}-not-a-real-connection", b.id), "data": "x"},
    });
    a.send_raw(&frame.to_string()).await;

    match a.next_event().await {
        ServerEvent::Error { message } => assert!(message.contains("invalid connection id")),
        other => panic!("expected error, got {other:?}"),
    }
    b.expect_silence().await;
}

#[tokio::test]
async fn playback_events_skip_sender() {
    let (addr, _handle) = start().await;
    let mut host = TestClient::connect(addr).await;
    let mut guest = TestClient::connect(addr).await;
    host.join("party", "host").await;
    guest.join("party", "guest").await;
    host.next_event().await;

    guest
        .send(ClientEvent::RequestHostState {
            room_id: RoomId::from("party"),
        })
        .await;
    assert_eq!(
        host.next_event().await,
        ServerEvent::RequestHostState {
            requester: guest.id
        }
    );

    let state = json!({"videoId": "dQw4w9WgXcQ", "time": 10.0, "playing": true});
    host.send(ClientEvent::HostState {
        room_id: RoomId::from("party"),
        state: state.clone(),
    })
    .await;
    for client in [&mut host, &mut guest] {
        assert_eq!(
            client.next_event().await,
            ServerEvent::HostState {
                state: state.clone()
            }
        );
    }

    host.send(ClientEvent::YtEvent {
        room_id: RoomId::from("party"),
        event: "pause".to_string(),
        payload: json!({"time": 12.5}),
    })
    .await;
    assert_eq!(
        guest.next_event().await,
        ServerEvent::YtEvent {
            from: host.id,
            event: "pause".to_string(),
            payload: json!({"time": 12.5}),
        }
    );
    host.expect_silence().await;
}

#[tokio::test]
async fn malformed_and_premature_events_get_errors() {
    let (addr, _handle) = start().await;
    let mut a = TestClient::connect(addr).await;

    a.send_raw("not json").await;
    assert!(matches!(a.next_event().await, ServerEvent::Error { .. }));

    a.send(ClientEvent::YtEvent {
        room_id: RoomId::from("r1"),
        event: "play".to_string(),
        payload: json!(null),
    })
    .await;
    assert_eq!(
        a.next_event().await,
        ServerEvent::Error {
            message: "not in a room".to_string(),
        }
    );

    // the connection stays usable
    assert!(a.join("r1", "a").await.is_empty());
}

#[tokio::test]
async fn unresponsive_client_is_dropped() {
    let config = ServerConfig {
        ping_interval: Duration::from_millis(200),
        pong_timeout: Duration::from_millis(300),
    };
    let (addr, handle) = start_with(config).await;
    let mut watcher = TestClient::connect(addr).await;
    let mut silent = TestClient::connect(addr).await;
    watcher.join("r1", "watcher").await;
    silent.join("r1", "silent").await;
    watcher.next_event().await;

    // `silent` stops polling its socket, so it never answers pings
    let silent_id = silent.id;
    let left = timeout(Duration::from_secs(2), watcher.next_event())
        .await
        .unwrap();

    assert_eq!(
        left,
        ServerEvent::PeerLeft {
            id: silent_id,
            display_name: "silent".to_string(),
        }
    );
    wait_for_members(&handle, "r1", vec![watcher.id]).await;
    drop(silent);
}
