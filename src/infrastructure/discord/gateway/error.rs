use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("connection closed with code {code}: {reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("websocket error: {message}")]
    WebSocket { message: String },

    #[error("malformed frame: {message}")]
    MalformedFrame { message: String },

    #[error("protocol violation: {message}")]
    ProtocolViolation { message: String },

    #[error("heartbeat timeout: no acknowledgment received")]
    HeartbeatTimeout,

    #[error("authentication rejected: {message}")]
    AuthRejected { message: String },

    #[error("session invalidated, resumable: {resumable}")]
    SessionInvalidated { resumable: bool },

    #[error("gateway requested reconnect")]
    ReconnectRequested,

    #[error("compression error: {message}")]
    Compression { message: String },

    #[error("timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("reconnection limit exceeded after {attempts} attempts")]
    ReconnectionLimitExceeded { attempts: u32 },

    #[error("no shard {index} in a group of {total}")]
    InvalidShard { index: u32, total: u32 },

    #[error("not connected to gateway")]
    NotConnected,

    #[error("shard task failed: {message}")]
    TaskFailed { message: String },
}

impl GatewayError {
    #[must_use]
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn websocket(message: impl Into<String>) -> Self {
        Self::WebSocket {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedFrame {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn protocol_violation(message: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn auth_rejected(message: impl Into<String>) -> Self {
        Self::AuthRejected {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn compression(message: impl Into<String>) -> Self {
        Self::Compression {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Maps a close frame received from the gateway onto the error taxonomy.
    #[must_use]
    pub fn from_close(code: u16, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        match GatewayCloseCode::from_u16(code) {
            Some(GatewayCloseCode::AuthenticationFailed) => Self::auth_rejected(reason),
            _ => Self::ConnectionClosed { code, reason },
        }
    }

    /// Errors that end the shard for good. Retrying would only repeat them.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::AuthRejected { .. }
            | Self::ReconnectionLimitExceeded { .. }
            | Self::InvalidShard { .. }
            | Self::TaskFailed { .. } => true,
            Self::ConnectionClosed { code, .. } => {
                GatewayCloseCode::from_u16(*code).is_some_and(GatewayCloseCode::is_fatal)
            }
            _ => false,
        }
    }

    /// Whether the session held before this error may still be resumed.
    ///
    /// Only the server discards a session: an invalid-session op, or a close
    /// code that does not allow resuming. Transport failures keep it.
    #[must_use]
    pub fn can_resume(&self) -> bool {
        match self {
            Self::SessionInvalidated { resumable } => *resumable,
            Self::ConnectionClosed { code, .. } => match GatewayCloseCode::from_u16(*code) {
                Some(close_code) => close_code.is_resumable(),
                None => *code != super::constants::CLOSE_NORMAL,
            },
            Self::ConnectionFailed { .. }
            | Self::WebSocket { .. }
            | Self::MalformedFrame { .. }
            | Self::ProtocolViolation { .. }
            | Self::HeartbeatTimeout
            | Self::ReconnectRequested
            | Self::Compression { .. }
            | Self::Timeout { .. }
            | Self::NotConnected => true,
            Self::AuthRejected { .. }
            | Self::ReconnectionLimitExceeded { .. }
            | Self::InvalidShard { .. }
            | Self::TaskFailed { .. } => false,
        }
    }

    #[must_use]
    pub const fn close_code(&self) -> Option<u16> {
        if let Self::ConnectionClosed { code, .. } = self {
            Some(*code)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayCloseCode {
    UnknownError = 4000,
    UnknownOpcode = 4001,
    DecodeError = 4002,
    NotAuthenticated = 4003,
    AuthenticationFailed = 4004,
    AlreadyAuthenticated = 4005,
    InvalidSequence = 4007,
    RateLimited = 4008,
    SessionTimedOut = 4009,
    InvalidShard = 4010,
    ShardingRequired = 4011,
    InvalidApiVersion = 4012,
    InvalidIntents = 4013,
    DisallowedIntents = 4014,
}

impl GatewayCloseCode {
    #[must_use]
    pub const fn from_u16(code: u16) -> Option<Self> {
        match code {
            4000 => Some(Self::UnknownError),
            4001 => Some(Self::UnknownOpcode),
            4002 => Some(Self::DecodeError),
            4003 => Some(Self::NotAuthenticated),
            4004 => Some(Self::AuthenticationFailed),
            4005 => Some(Self::AlreadyAuthenticated),
            4007 => Some(Self::InvalidSequence),
            4008 => Some(Self::RateLimited),
            4009 => Some(Self::SessionTimedOut),
            4010 => Some(Self::InvalidShard),
            4011 => Some(Self::ShardingRequired),
            4012 => Some(Self::InvalidApiVersion),
            4013 => Some(Self::InvalidIntents),
            4014 => Some(Self::DisallowedIntents),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_resumable(self) -> bool {
        matches!(
            self,
            Self::UnknownError
                | Self::UnknownOpcode
                | Self::DecodeError
                | Self::NotAuthenticated
                | Self::AlreadyAuthenticated
                | Self::RateLimited
        )
    }

    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed
                | Self::InvalidShard
                | Self::ShardingRequired
                | Self::InvalidApiVersion
                | Self::InvalidIntents
                | Self::DisallowedIntents
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_error_classification() {
        assert!(!GatewayError::HeartbeatTimeout.is_fatal());
        assert!(GatewayError::HeartbeatTimeout.can_resume());
        assert!(!GatewayError::malformed("truncated").is_fatal());
        assert!(GatewayError::auth_rejected("bad token").is_fatal());
        assert!(!GatewayError::auth_rejected("bad token").can_resume());
        assert!(GatewayError::ReconnectionLimitExceeded { attempts: 3 }.is_fatal());
    }

    #[test_case(GatewayError::connection_failed("refused") ; "unreachable endpoint")]
    #[test_case(GatewayError::timeout("Hello") ; "hello never arrived")]
    #[test_case(GatewayError::websocket("reset by peer") ; "socket error")]
    #[test_case(GatewayError::compression("corrupt stream") ; "broken inflater")]
    fn test_transport_failures_keep_session(error: GatewayError) {
        assert!(!error.is_fatal());
        assert!(error.can_resume());
    }

    #[test_case(4004, true, false ; "authentication failed")]
    #[test_case(4010, true, false ; "invalid shard")]
    #[test_case(4014, true, false ; "disallowed intents")]
    #[test_case(4000, false, true ; "unknown error resumes")]
    #[test_case(4009, false, false ; "session timed out identifies fresh")]
    #[test_case(1000, false, false ; "normal closure")]
    #[test_case(1006, false, true ; "abnormal closure")]
    fn test_close_code_policy(code: u16, fatal: bool, resumable: bool) {
        let error = GatewayError::from_close(code, "closed");
        assert_eq!(error.is_fatal(), fatal);
        assert_eq!(error.can_resume(), resumable);
    }

    #[test]
    fn test_auth_close_maps_to_auth_rejected() {
        let error = GatewayError::from_close(4004, "Authentication failed.");
        assert!(matches!(error, GatewayError::AuthRejected { .. }));
        assert_eq!(error.close_code(), None);
    }

    #[test]
    fn test_invalid_session_resumability() {
        assert!(GatewayError::SessionInvalidated { resumable: true }.can_resume());
        assert!(!GatewayError::SessionInvalidated { resumable: false }.can_resume());
    }
}
