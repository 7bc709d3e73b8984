//! Per-connection chat session: registration, read pump, writer task,
//! and teardown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use roomcast_core::{ConnectionId, Frame, RelayError};
use roomcast_hub::{RoomConnection, RoomRegistry};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::server::AppState;

/// Written to a chat upgrade that arrives without a room id, right before
/// the connection is closed.
pub(crate) const EMPTY_ROOM_REJECTION: &str = "Room ID is required";

/// Run a chat session for a connected client.
///
/// 1. Rejects the connection if no room id was supplied
/// 2. Resolves the room and registers the connection
/// 3. Spawns the writer task (queue drain + periodic Ping frames)
/// 4. Pumps inbound frames into the room broadcast
/// 5. Cleans up exactly once on exit, however the session ended
pub(crate) async fn run_chat_session(mut socket: WebSocket, room_id: String, state: AppState) {
    if room_id.is_empty() {
        warn!("chat upgrade rejected: missing room id");
        state.metrics.counter_inc("ws.rejected.total", &[], 1);
        let _ = socket.send(Message::Text(EMPTY_ROOM_REJECTION.into())).await;
        let _ = socket.send(Message::Close(None)).await;
        return;
    }

    let registry = state.rooms.get_or_create(&room_id);
    let conn_id = ConnectionId::new();
    let (tx, rx) = mpsc::channel::<Frame>(state.config.max_send_queue);
    let conn = Arc::new(RoomConnection::new(conn_id.clone(), tx));

    info!(conn_id = %conn_id, room = %room_id, "client joined room");
    state.metrics.counter_inc("ws.connections.total", &[], 1);
    state.metrics.gauge_inc("ws.connections.active", &[], 1.0);
    let connected_at = Instant::now();

    registry.add(Arc::clone(&conn)).await;

    let (ws_tx, ws_rx) = socket.split();
    let writer = tokio::spawn(run_writer(
        ws_tx,
        rx,
        Arc::clone(&conn),
        Duration::from_secs(state.config.heartbeat_interval_secs),
        Duration::from_secs(state.config.heartbeat_timeout_secs),
    ));

    read_pump(ws_rx, &registry, &conn, &state).await;

    // Terminal cleanup, reached exactly once per session. Idempotent
    // against a broadcast-triggered removal racing us.
    registry.remove(&conn_id).await;
    conn.close();
    writer.abort();

    info!(conn_id = %conn_id, room = %room_id, "client disconnected");
    state.metrics.counter_inc("ws.disconnections.total", &[], 1);
    state.metrics.gauge_inc("ws.connections.active", &[], -1.0);
    state.metrics.histogram_observe(
        "ws.connection.duration_secs",
        &[],
        connected_at.elapsed().as_secs_f64(),
    );
}

/// Drain the member queue into the socket and interleave Ping frames.
///
/// This task is the per-member serialization point: frames leave in queue
/// order, so sequential broadcasts reach the peer in order.
async fn run_writer(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Frame>,
    conn: Arc<RoomConnection>,
    ping_interval: Duration,
    pong_timeout: Duration,
) {
    let mut ping = tokio::time::interval(ping_interval);
    ping.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            () = conn.wait_closed() => break,
            frame = rx.recv() => {
                match frame {
                    Some(frame) => {
                        if ws_tx.send(frame_to_message(frame)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = ping.tick() => {
                if conn.last_pong_elapsed() > pong_timeout {
                    warn!(conn_id = %conn.id, "client unresponsive, dropping connection");
                    break;
                }
                if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                    break;
                }
            }
        }
    }

    // Ends the read pump too; dropping ws_tx closes the outbound half.
    conn.close();
}

/// Forward inbound frames to the room broadcast until the connection ends.
///
/// Orderly end-of-stream (exhausted stream or Close frame) exits the loop.
/// Transient read errors are retried with a fixed backoff up to
/// `max_read_errors` consecutive failures, then treated as fatal.
async fn read_pump(
    mut ws_rx: SplitStream<WebSocket>,
    registry: &Arc<RoomRegistry>,
    conn: &Arc<RoomConnection>,
    state: &AppState,
) {
    let max_read_errors = state.config.max_read_errors.max(1);
    let backoff = Duration::from_millis(state.config.read_retry_backoff_ms);
    let mut consecutive_errors: u32 = 0;

    loop {
        tokio::select! {
            () = conn.wait_closed() => break,
            next = ws_rx.next() => match next {
                // Stream exhausted: orderly remote close
                None => break,
                Some(Ok(msg)) => {
                    consecutive_errors = 0;
                    let frame = match msg {
                        Message::Text(t) => Frame::Text(t.to_string()),
                        Message::Binary(b) => Frame::Binary(b),
                        Message::Ping(_) | Message::Pong(_) => {
                            conn.mark_alive();
                            continue;
                        }
                        Message::Close(_) => {
                            debug!(conn_id = %conn.id, "client sent close frame");
                            break;
                        }
                    };

                    let outcome = registry.broadcast(&frame).await;
                    state.metrics.counter_inc(
                        "ws.broadcasts.total",
                        &[("room", registry.room())],
                        1,
                    );
                    state.metrics.counter_inc(
                        "ws.frames.delivered.total",
                        &[],
                        outcome.delivered as u64,
                    );
                    if outcome.pruned > 0 {
                        state.metrics.counter_inc(
                            "ws.members.pruned.total",
                            &[],
                            outcome.pruned as u64,
                        );
                    }
                }
                Some(Err(e)) => {
                    let err = RelayError::Transport(e.to_string());
                    consecutive_errors += 1;
                    if consecutive_errors >= max_read_errors {
                        warn!(
                            conn_id = %conn.id,
                            kind = err.error_kind(),
                            errors = consecutive_errors,
                            "read failed repeatedly, closing connection"
                        );
                        break;
                    }
                    warn!(conn_id = %conn.id, kind = err.error_kind(), "read error, retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

fn frame_to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(s) => Message::Text(s.into()),
        Frame::Binary(b) => Message::Binary(b),
    }
}
