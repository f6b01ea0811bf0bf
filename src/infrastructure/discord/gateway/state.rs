#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShardStatus {
    #[default]
    Connecting,
    Identifying,
    /// Resume variant of `Identifying`: a RESUME was sent instead of IDENTIFY.
    Resuming,
    Ready,
    Reconnecting,
    Closed,
}

impl ShardStatus {
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }

    #[cfg(test)]
    pub(crate) const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl std::fmt::Display for ShardStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Identifying => write!(f, "Identifying"),
            Self::Resuming => write!(f, "Resuming"),
            Self::Ready => write!(f, "Ready"),
            Self::Reconnecting => write!(f, "Reconnecting"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// Per-connection session record. Replaced wholesale on every new
/// connection; only the last sequence survives into a resume attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    status: ShardStatus,
    last_sequence: Option<u64>,
    heartbeat_interval_ms: Option<u64>,
    last_heartbeat_ack_received: bool,
}

impl SessionState {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            status: ShardStatus::Connecting,
            last_sequence: None,
            heartbeat_interval_ms: None,
            last_heartbeat_ack_received: false,
        }
    }

    /// Fresh state for a resume attempt, carrying the replay point forward.
    #[must_use]
    pub const fn resuming_from(last_sequence: Option<u64>) -> Self {
        let mut state = Self::new();
        state.last_sequence = last_sequence;
        state
    }

    #[must_use]
    pub const fn status(&self) -> ShardStatus {
        self.status
    }

    pub(super) const fn set_status(&mut self, status: ShardStatus) {
        self.status = status;
    }

    #[must_use]
    pub const fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    /// Records a sequence number, ignoring values older than the current one.
    pub(super) fn observe_sequence(&mut self, sequence: u64) {
        if self.last_sequence.is_none_or(|last| sequence >= last) {
            self.last_sequence = Some(sequence);
        }
    }

    #[must_use]
    pub const fn heartbeat_interval_ms(&self) -> Option<u64> {
        self.heartbeat_interval_ms
    }

    pub(super) const fn set_heartbeat_interval(&mut self, interval_ms: u64) {
        self.heartbeat_interval_ms = Some(interval_ms);
    }

    #[must_use]
    pub const fn last_heartbeat_ack_received(&self) -> bool {
        self.last_heartbeat_ack_received
    }

    pub(super) const fn set_heartbeat_ack_received(&mut self, received: bool) {
        self.last_heartbeat_ack_received = received;
    }
}
