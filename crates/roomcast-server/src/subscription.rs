//! Per-connection periodic publisher, independent of room membership.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use tracing::{debug, info};

use crate::server::AppState;

/// Build one subscription payload line.
pub fn subscription_payload(timestamp_nanos: i64) -> String {
    format!("subscription data -> {timestamp_nanos}\n")
}

/// Run the subscription publisher on one connection.
///
/// Writes a timestamped payload, sleeps the configured interval, repeats.
/// The first write failure ends the loop; the publisher never retries,
/// never joins the room, and does not close the transport on exit.
pub(crate) async fn run_subscription(mut socket: WebSocket, room_id: String, state: AppState) {
    // Source behavior: the room is resolved (and created) for the given id
    // even though the publisher never joins it.
    let _registry = state.rooms.get_or_create(&room_id);

    let interval = Duration::from_millis(state.config.publish_interval_ms);
    info!(room = %room_id, interval_ms = state.config.publish_interval_ms, "subscription publisher started");
    state.metrics.gauge_inc("ws.subscriptions.active", &[], 1.0);

    loop {
        let now = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let payload = subscription_payload(now);
        if socket.send(Message::Text(payload.into())).await.is_err() {
            debug!(room = %room_id, "subscription write failed, publisher stopping");
            break;
        }
        state.metrics.counter_inc("ws.subscription.payloads.total", &[], 1);
        tokio::time::sleep(interval).await;
    }

    state.metrics.gauge_inc("ws.subscriptions.active", &[], -1.0);
}
