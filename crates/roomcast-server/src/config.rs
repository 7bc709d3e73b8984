//! Server configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the roomcast server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Per-connection outbound queue capacity.
    pub max_send_queue: usize,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Interval between server-initiated Ping frames, in seconds.
    pub heartbeat_interval_secs: u64,
    /// Drop a connection after this long without a liveness signal.
    pub heartbeat_timeout_secs: u64,
    /// Subscription publisher interval in milliseconds.
    pub publish_interval_ms: u64,
    /// Consecutive transient read errors tolerated before the connection
    /// is treated as dead.
    pub max_read_errors: u32,
    /// Sleep between read retries, in milliseconds.
    pub read_retry_backoff_ms: u64,
    /// Periodically drop rooms with no members. Off by default: rooms
    /// otherwise live for the life of the process.
    pub sweep_idle_rooms: bool,
    /// Idle-room sweep interval in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_send_queue: 256,
            max_message_size: 64 * 1024,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            publish_interval_ms: 2_000,
            max_read_errors: 3,
            read_retry_backoff_ms: 100,
            sweep_idle_rooms: false,
            sweep_interval_secs: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.max_send_queue, 256);
        assert_eq!(cfg.max_message_size, 64 * 1024);
        assert_eq!(cfg.heartbeat_interval_secs, 30);
        assert_eq!(cfg.heartbeat_timeout_secs, 90);
        assert_eq!(cfg.publish_interval_ms, 2_000);
        assert_eq!(cfg.max_read_errors, 3);
        assert_eq!(cfg.read_retry_backoff_ms, 100);
        assert!(!cfg.sweep_idle_rooms);
        assert_eq!(cfg.sweep_interval_secs, 60);
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ServerConfig {
            port: 8000,
            sweep_idle_rooms: true,
            ..Default::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.port, 8000);
        assert!(back.sweep_idle_rooms);
        assert_eq!(back.max_send_queue, cfg.max_send_queue);
    }

    #[test]
    fn deserialize_from_json_string() {
        let json = r#"{
            "host": "0.0.0.0",
            "port": 9000,
            "max_send_queue": 16,
            "max_message_size": 1024,
            "heartbeat_interval_secs": 10,
            "heartbeat_timeout_secs": 30,
            "publish_interval_ms": 500,
            "max_read_errors": 1,
            "read_retry_backoff_ms": 10,
            "sweep_idle_rooms": true,
            "sweep_interval_secs": 5
        }"#;
        let cfg: ServerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.publish_interval_ms, 500);
        assert_eq!(cfg.max_read_errors, 1);
    }
}
