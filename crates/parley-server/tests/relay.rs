//! End-to-end tests over real websocket connections.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use parley_server::{serve_on, AppState, ServerConfig};
use parley_shared::{OutboundEvent, UserId};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

async fn start() -> (SocketAddr, AppState) {
    let state = AppState::new(ServerConfig::default());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve_on(state.clone(), listener));
    (addr, state)
}

/// Connect and wait for the online snapshot, which arrives once the session
/// is registered.
async fn connect(addr: SocketAddr, user: &str) -> Client {
    let (mut client, _) = connect_async(format!("ws://{addr}/ws?userId={user}"))
        .await
        .unwrap();

    loop {
        if let OutboundEvent::OnlineUsers(_) = next_event(&mut client).await {
            return client;
        }
    }
}

async fn next_event(client: &mut Client) -> OutboundEvent {
    loop {
        let frame = tokio::time::timeout(WAIT, client.next())
            .await
            .expect("timed out waiting for event")
            .expect("connection closed")
            .unwrap();

        if let Message::Text(text) = frame {
            return OutboundEvent::decode(&text).unwrap();
        }
    }
}

/// Next event that is not a presence update.
async fn next_routed(client: &mut Client) -> OutboundEvent {
    loop {
        match next_event(client).await {
            OutboundEvent::Online(_) | OutboundEvent::Offline(_) | OutboundEvent::OnlineUsers(_) => {}
            other => return other,
        }
    }
}

async fn send(client: &mut Client, envelope: serde_json::Value) {
    client.send(Message::Text(envelope.to_string())).await.unwrap();
}

async fn send_chats(client: &mut Client, from: &str, to: &str, count: usize) {
    for i in 0..count {
        send(
            client,
            json!({"event": "chat", "data": {"from": from, "to": to, "message": format!("{from}{i}")}}),
        )
        .await;
    }
}

fn uid(s: &str) -> UserId {
    UserId::from(s)
}

#[tokio::test]
async fn chat_read_and_history_round() {
    let (addr, state) = start().await;
    let mut alice = connect(addr, "alice").await;
    let mut bob = connect(addr, "bob").await;

    send(
        &mut alice,
        json!({"event": "chat", "data": {"from": "alice", "to": "bob", "message": "hi"}}),
    )
    .await;

    let OutboundEvent::Chat(msg) = next_routed(&mut bob).await else {
        panic!("expected chat");
    };
    assert_eq!(msg.id, 1);
    assert_eq!(msg.text, "hi");
    assert!(!msg.read);

    send(&mut bob, json!({"event": "read", "data": {"from": "alice", "to": "bob"}})).await;

    match next_routed(&mut alice).await {
        OutboundEvent::Read(receipt) => {
            assert_eq!(receipt.from, uid("alice"));
            assert_eq!(receipt.to, uid("bob"));
        }
        other => panic!("unexpected event: {other:?}"),
    }

    send(&mut bob, json!({"event": "getNotif", "data": {}})).await;
    assert_eq!(next_routed(&mut bob).await, OutboundEvent::GetNotif(Vec::new()));

    send(&mut bob, json!({"event": "getChats", "data": {"user1": "alice", "user2": "bob"}})).await;
    match next_routed(&mut bob).await {
        OutboundEvent::GetChats(history) => {
            assert_eq!(history.len(), 1);
            assert_eq!(history[0].id, 1);
            assert!(history[0].read);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    assert_eq!(state.store.len().await, 1);
}

#[tokio::test]
async fn missing_user_id_is_rejected() {
    let (addr, state) = start().await;

    for url in [format!("ws://{addr}/ws"), format!("ws://{addr}/ws?userId=")] {
        match connect_async(url).await {
            Err(tungstenite::Error::Http(response)) => {
                assert_eq!(response.status().as_u16(), 400);
            }
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("handshake should fail"),
        }
    }

    assert!(state.registry.is_empty().await);
}

#[tokio::test]
async fn presence_is_broadcast_on_connect_and_disconnect() {
    let (addr, state) = start().await;
    let mut alice = connect(addr, "alice").await;
    let bob = connect(addr, "bob").await;

    assert_eq!(next_event(&mut alice).await, OutboundEvent::online(uid("bob")));

    drop(bob);

    assert_eq!(next_event(&mut alice).await, OutboundEvent::offline(uid("bob")));
    assert!(!state.registry.is_online(&uid("bob")).await);
    assert!(state.registry.is_online(&uid("alice")).await);
}

#[tokio::test]
async fn client_close_is_answered_with_close() {
    let (addr, state) = start().await;
    let mut alice = connect(addr, "alice").await;

    alice.send(Message::Close(None)).await.unwrap();

    // Anything queued before the close is flushed first; the handshake must
    // complete rather than end in a reset.
    loop {
        let frame = tokio::time::timeout(WAIT, alice.next())
            .await
            .expect("timed out waiting for close")
            .expect("stream ended without a close frame")
            .unwrap();
        if let Message::Close(_) = frame {
            break;
        }
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!state.registry.is_online(&uid("alice")).await);
}

#[tokio::test]
async fn malformed_frames_do_not_end_the_session() {
    let (addr, state) = start().await;
    let mut alice = connect(addr, "alice").await;
    state.store.append(uid("x"), uid("alice"), "waiting".into()).await;

    alice.send(Message::Text("definitely not json".into())).await.unwrap();
    send(&mut alice, json!({"event": "chat", "data": {"from": "alice"}})).await;
    send(&mut alice, json!({"event": "teleport", "data": {}})).await;
    alice.send(Message::Binary(vec![0xff, 0xfe])).await.unwrap();

    send(&mut alice, json!({"event": "getNotif"})).await;
    match next_routed(&mut alice).await {
        OutboundEvent::GetNotif(unread) => {
            assert_eq!(unread.len(), 1);
            assert_eq!(unread[0].text, "waiting");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(state.store.len().await, 1);
}

#[tokio::test]
async fn typing_to_offline_user_is_silent() {
    let (addr, state) = start().await;
    let mut alice = connect(addr, "alice").await;

    send(&mut alice, json!({"event": "typing", "data": {"from": "alice", "to": "nobody"}})).await;
    send(&mut alice, json!({"event": "onlineUsers"})).await;

    // The only reply is the one explicitly asked for.
    assert_eq!(
        next_event(&mut alice).await,
        OutboundEvent::OnlineUsers(vec![uid("alice")])
    );
    assert!(state.store.is_empty().await);
}

#[tokio::test]
async fn reconnect_replaces_and_survives_old_disconnect() {
    let (addr, state) = start().await;
    let mut watcher = connect(addr, "watcher").await;

    let old = connect(addr, "u").await;
    let mut new = connect(addr, "u").await;
    assert_eq!(next_event(&mut watcher).await, OutboundEvent::online(uid("u")));
    assert_eq!(next_event(&mut watcher).await, OutboundEvent::online(uid("u")));

    drop(old);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(state.registry.is_online(&uid("u")).await);

    send(
        &mut watcher,
        json!({"event": "chat", "data": {"from": "watcher", "to": "u", "message": "still there?"}}),
    )
    .await;

    match next_event(&mut new).await {
        OutboundEvent::Chat(msg) => assert_eq!(msg.text, "still there?"),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_senders_get_distinct_ids() {
    let (addr, state) = start().await;
    let mut rx = connect(addr, "rx").await;
    let mut a = connect(addr, "a").await;
    let mut b = connect(addr, "b").await;

    let per_sender = 10;
    tokio::join!(
        send_chats(&mut a, "a", "rx", per_sender),
        send_chats(&mut b, "b", "rx", per_sender),
    );

    let mut received = Vec::new();
    while received.len() < 2 * per_sender {
        if let OutboundEvent::Chat(msg) = next_routed(&mut rx).await {
            received.push(msg);
        }
    }

    let mut ids: Vec<u64> = received.iter().map(|m| m.id).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 2 * per_sender);

    for from in ["a", "b"] {
        let history = state.store.history(&uid(from), &uid("rx")).await;
        assert_eq!(history.len(), per_sender);
        assert!(history.windows(2).all(|w| w[0].id < w[1].id));

        // Per-sender order is preserved.
        let texts: Vec<String> = history.iter().map(|m| m.text.clone()).collect();
        let expected: Vec<String> = (0..per_sender).map(|i| format!("{from}{i}")).collect();
        assert_eq!(texts, expected);
    }
}
