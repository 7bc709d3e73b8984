/// Typed error hierarchy for connection-level relay operations.
/// Classifies failures as terminal (drop the connection), retryable,
/// or operational (frame-level, connection survives).
#[derive(Clone, Debug, thiserror::Error)]
pub enum RelayError {
    // Terminal — the connection is done
    #[error("connection closed by peer")]
    Closed,
    #[error("send queue closed")]
    QueueClosed,
    #[error("protocol violation: {0}")]
    Protocol(String),

    // Retryable
    #[error("transport error: {0}")]
    Transport(String),

    // Operational — the frame is lost, the connection survives
    #[error("send queue full")]
    QueueFull,
}

impl RelayError {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::QueueClosed | Self::Protocol(_))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::QueueClosed => "queue_closed",
            Self::Protocol(_) => "protocol",
            Self::Transport(_) => "transport",
            Self::QueueFull => "queue_full",
        }
    }
}
