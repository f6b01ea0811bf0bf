use serde_json::Value;

use super::payloads::RequestGuildMembers;
use super::state::ShardStatus;
use crate::domain::{GuildId, ShardId};

/// Decoded inbound operation: the envelope sequence plus the typed kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub sequence: Option<u64>,
    pub kind: OperationKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OperationKind {
    Hello { heartbeat_interval_ms: u64 },
    Dispatch(DispatchEvent),
    /// Server asks for an immediate heartbeat.
    Heartbeat,
    HeartbeatAck,
    Reconnect,
    InvalidSession { resumable: bool },
    Unknown { opcode: u8 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent {
    Ready {
        session_id: String,
        resume_gateway_url: Option<String>,
        user_id: String,
        shard: Option<[u32; 2]>,
        unavailable_guilds: Vec<GuildId>,
    },
    Resumed,
    GuildCreate {
        guild_id: GuildId,
        unavailable: bool,
    },
    GuildDelete {
        guild_id: GuildId,
        unavailable: bool,
    },
    /// Any event the engine does not interpret, forwarded untouched.
    Other {
        name: String,
        data: Value,
    },
}

impl DispatchEvent {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Ready { .. } => "READY",
            Self::Resumed => "RESUMED",
            Self::GuildCreate { .. } => "GUILD_CREATE",
            Self::GuildDelete { .. } => "GUILD_DELETE",
            Self::Other { name, .. } => name,
        }
    }
}

/// Requests delivered to a running shard.
#[derive(Debug, Clone)]
pub enum ShardCommand {
    RequestGuildMembers(RequestGuildMembers),
}

/// Notifications a shard publishes about itself.
#[derive(Debug, Clone)]
pub enum ShardEvent {
    StatusChanged {
        shard: ShardId,
        status: ShardStatus,
    },
    Ready {
        shard: ShardId,
        session_id: String,
        user_id: String,
    },
    Resumed {
        shard: ShardId,
    },
    GuildAvailable {
        shard: ShardId,
        guild_id: GuildId,
    },
    GuildRemoved {
        shard: ShardId,
        guild_id: GuildId,
    },
    Dispatch {
        shard: ShardId,
        name: String,
        sequence: Option<u64>,
        data: Value,
    },
    HeartbeatAck {
        shard: ShardId,
        latency_ms: u64,
    },
    Reconnecting {
        shard: ShardId,
        attempt: u32,
    },
    Fatal {
        shard: ShardId,
        message: String,
    },
}

impl ShardEvent {
    #[must_use]
    pub const fn shard(&self) -> ShardId {
        match self {
            Self::StatusChanged { shard, .. }
            | Self::Ready { shard, .. }
            | Self::Resumed { shard }
            | Self::GuildAvailable { shard, .. }
            | Self::GuildRemoved { shard, .. }
            | Self::Dispatch { shard, .. }
            | Self::HeartbeatAck { shard, .. }
            | Self::Reconnecting { shard, .. }
            | Self::Fatal { shard, .. } => *shard,
        }
    }
}
