//! End-to-end tests using real WebSocket clients.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use roomcast_hub::RoomIndex;
use roomcast_server::{start, ServerConfig, ServerHandle};
use roomcast_telemetry::MetricsRecorder;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Boot a test server on a random port.
async fn boot_server(config: ServerConfig) -> (String, Arc<RoomIndex>, ServerHandle) {
    let rooms = Arc::new(RoomIndex::new());
    let metrics = Arc::new(MetricsRecorder::new());
    let handle = start(config, Arc::clone(&rooms), metrics).await.unwrap();
    (format!("127.0.0.1:{}", handle.port), rooms, handle)
}

async fn connect(addr: &str, path: &str) -> WsStream {
    let (ws, _) = timeout(TIMEOUT, connect_async(format!("ws://{addr}{path}")))
        .await
        .expect("connect timed out")
        .expect("connect failed");
    ws
}

async fn next_text(ws: &mut WsStream) -> String {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("receive timed out")
            .expect("stream ended")
            .expect("websocket error");
        match msg {
            Message::Text(t) => return t.to_string(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Registration happens after the handshake completes; poll until the room
/// has the expected membership.
async fn wait_for_members(rooms: &RoomIndex, room: &str, n: usize) {
    timeout(TIMEOUT, async {
        loop {
            let count = rooms.get(room).map(|r| r.len()).unwrap_or(0);
            if count == n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("membership never converged");
}

#[tokio::test]
async fn broadcast_reaches_the_whole_room_including_sender() {
    let (addr, rooms, _handle) = boot_server(ServerConfig::default()).await;

    let mut a = connect(&addr, "/ws?roomId=lobby").await;
    let mut b = connect(&addr, "/ws?roomId=lobby").await;
    wait_for_members(&rooms, "lobby", 2).await;

    a.send(Message::Text("hi".into())).await.unwrap();

    assert_eq!(next_text(&mut b).await, "hi");
    // The sender is a member too and receives its own message
    assert_eq!(next_text(&mut a).await, "hi");
}

#[tokio::test]
async fn rooms_are_isolated() {
    let (addr, rooms, _handle) = boot_server(ServerConfig::default()).await;

    let mut a = connect(&addr, "/ws?roomId=r1").await;
    let mut b = connect(&addr, "/ws?roomId=r2").await;
    wait_for_members(&rooms, "r1", 1).await;
    wait_for_members(&rooms, "r2", 1).await;

    a.send(Message::Text("secret".into())).await.unwrap();

    // a hears itself, proving the broadcast ran
    assert_eq!(next_text(&mut a).await, "secret");

    // b must hear nothing
    let leaked = timeout(Duration::from_millis(300), b.next()).await;
    assert!(leaked.is_err(), "message leaked across rooms: {leaked:?}");
}

#[tokio::test]
async fn binary_payloads_are_relayed_verbatim() {
    let (addr, rooms, _handle) = boot_server(ServerConfig::default()).await;

    let mut a = connect(&addr, "/ws?roomId=bin").await;
    let mut b = connect(&addr, "/ws?roomId=bin").await;
    wait_for_members(&rooms, "bin", 2).await;

    let payload = vec![0u8, 159, 146, 150];
    a.send(Message::Binary(payload.clone().into())).await.unwrap();

    let msg = timeout(TIMEOUT, b.next()).await.unwrap().unwrap().unwrap();
    match msg {
        Message::Binary(received) => assert_eq!(received.as_ref(), payload.as_slice()),
        other => panic!("expected binary frame, got {other:?}"),
    }
}

#[tokio::test]
async fn orderly_disconnect_prunes_membership() {
    let (addr, rooms, _handle) = boot_server(ServerConfig::default()).await;

    let mut a = connect(&addr, "/ws?roomId=lobby").await;
    let mut b = connect(&addr, "/ws?roomId=lobby").await;
    wait_for_members(&rooms, "lobby", 2).await;

    a.close(None).await.unwrap();
    wait_for_members(&rooms, "lobby", 1).await;

    // A subsequent broadcast still works and no longer includes a
    b.send(Message::Text("still here".into())).await.unwrap();
    assert_eq!(next_text(&mut b).await, "still here");
    assert_eq!(rooms.get("lobby").unwrap().len(), 1);
}

#[tokio::test]
async fn sequential_messages_arrive_in_order() {
    let (addr, rooms, _handle) = boot_server(ServerConfig::default()).await;

    let mut a = connect(&addr, "/ws?roomId=ordered").await;
    let mut b = connect(&addr, "/ws?roomId=ordered").await;
    wait_for_members(&rooms, "ordered", 2).await;

    for i in 0..10 {
        a.send(Message::Text(format!("m{i}").into())).await.unwrap();
    }
    for i in 0..10 {
        assert_eq!(next_text(&mut b).await, format!("m{i}"));
    }
}

#[tokio::test]
async fn subscription_payloads_increase_monotonically() {
    let config = ServerConfig {
        publish_interval_ms: 25,
        ..Default::default()
    };
    let (addr, rooms, _handle) = boot_server(config).await;

    let mut s = connect(&addr, "/subscription?roomId=feed").await;

    let mut last = 0i64;
    for _ in 0..3 {
        let line = next_text(&mut s).await;
        let ts: i64 = line
            .strip_prefix("subscription data -> ")
            .unwrap_or_else(|| panic!("bad payload: {line:?}"))
            .trim_end()
            .parse()
            .unwrap();
        assert!(ts > last, "timestamps not increasing: {ts} after {last}");
        last = ts;
    }

    // The room was created for the id but the publisher never joined it
    assert_eq!(rooms.get("feed").unwrap().len(), 0);
}

#[tokio::test]
async fn empty_room_id_is_rejected() {
    let (addr, rooms, _handle) = boot_server(ServerConfig::default()).await;

    let mut ws = connect(&addr, "/ws?roomId=").await;
    assert_eq!(next_text(&mut ws).await, "Room ID is required");

    // The server closes right after the rejection payload
    let end = timeout(TIMEOUT, ws.next()).await.expect("close timed out");
    assert!(
        matches!(end, None | Some(Ok(Message::Close(_)))),
        "expected close, got {end:?}"
    );

    // No room was ever created for the empty id
    assert!(rooms.get("").is_none());
    assert_eq!(rooms.room_count(), 0);
}

#[tokio::test]
async fn missing_room_param_is_rejected_too() {
    let (addr, rooms, _handle) = boot_server(ServerConfig::default()).await;

    let mut ws = connect(&addr, "/ws").await;
    assert_eq!(next_text(&mut ws).await, "Room ID is required");
    assert_eq!(rooms.room_count(), 0);
}

#[tokio::test]
async fn health_endpoint_reports_rooms_and_connections() {
    let (addr, rooms, _handle) = boot_server(ServerConfig::default()).await;

    let mut _a = connect(&addr, "/ws?roomId=lobby").await;
    wait_for_members(&rooms, "lobby", 1).await;

    let body: serde_json::Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["rooms"], 1);
    assert_eq!(body["connections"], 1);
}

#[tokio::test]
async fn shutdown_stops_accepting_connections() {
    let (addr, _rooms, handle) = boot_server(ServerConfig::default()).await;
    handle.shutdown();

    // Give the accept loop a moment to wind down
    tokio::time::sleep(Duration::from_millis(100)).await;

    let result = connect_async(format!("ws://{addr}/ws?roomId=lobby")).await;
    assert!(result.is_err(), "server still accepting after shutdown");
}
