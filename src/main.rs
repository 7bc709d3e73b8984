use std::sync::Arc;

use clap::Parser;
use roomcast_hub::RoomIndex;
use roomcast_server::ServerConfig;
use roomcast_telemetry::{init_telemetry, TelemetryConfig};

/// Room-partitioned WebSocket fan-out broadcaster.
#[derive(Debug, Parser)]
#[command(name = "roomcast", version)]
struct Args {
    /// Host to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind (0 picks a free port).
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,

    /// Periodically drop rooms with no members.
    #[arg(long)]
    sweep_idle_rooms: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let telemetry = init_telemetry(&TelemetryConfig {
        json_output: args.json_logs,
        ..Default::default()
    });

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        sweep_idle_rooms: args.sweep_idle_rooms,
        ..Default::default()
    };

    let rooms = Arc::new(RoomIndex::new());
    let handle = roomcast_server::start(config, rooms, telemetry.metrics()).await?;

    tracing::info!(port = handle.port, "roomcast ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    handle.shutdown();

    Ok(())
}
