use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::constants::{
    CLIENT_PROPERTIES_BROWSER, CLIENT_PROPERTIES_DEVICE, GatewayIntents, GatewayOpcode,
    LARGE_THRESHOLD,
};
use crate::domain::{AuthToken, GuildId, ShardId};

/// Outbound operation. Built only through the constructors below.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayPayload {
    pub op: u8,
    pub d: Value,
}

impl GatewayPayload {
    #[must_use]
    pub fn heartbeat(sequence: Option<u64>) -> Self {
        Self {
            op: GatewayOpcode::Heartbeat.as_u8(),
            d: sequence.map_or(Value::Null, |s| Value::Number(s.into())),
        }
    }

    #[must_use]
    pub fn identify(identify: &IdentifyData) -> Self {
        Self {
            op: GatewayOpcode::Identify.as_u8(),
            d: json!({
                "token": identify.token.as_str(),
                "intents": identify.intents.as_u32(),
                "shard": identify.shard.as_pair(),
                "properties": {
                    "os": identify.properties.os,
                    "browser": identify.properties.browser,
                    "device": identify.properties.device,
                },
                "compress": false,
                "large_threshold": identify.large_threshold,
            }),
        }
    }

    #[must_use]
    pub fn resume(token: &AuthToken, session_id: &str, sequence: u64) -> Self {
        Self {
            op: GatewayOpcode::Resume.as_u8(),
            d: json!({
                "token": token.as_str(),
                "session_id": session_id,
                "seq": sequence,
            }),
        }
    }

    #[must_use]
    pub fn request_guild_members(request: &RequestGuildMembers) -> Self {
        Self {
            op: GatewayOpcode::RequestGuildMembers.as_u8(),
            d: json!({
                "guild_id": request.guild_id,
                "limit": request.limit,
                "query": request.query,
                "presences": request.presences,
                "nonce": request.nonce,
            }),
        }
    }
}

/// Everything an identify operation carries. Constructed once per shard and
/// never mutated afterwards.
#[derive(Debug, Clone)]
pub struct IdentifyData {
    token: Arc<AuthToken>,
    intents: GatewayIntents,
    shard: ShardId,
    properties: IdentifyProperties,
    large_threshold: u16,
}

impl IdentifyData {
    #[must_use]
    pub fn new(token: Arc<AuthToken>, intents: GatewayIntents, shard: ShardId) -> Self {
        Self::with_large_threshold(token, intents, shard, LARGE_THRESHOLD)
    }

    #[must_use]
    pub fn with_large_threshold(
        token: Arc<AuthToken>,
        intents: GatewayIntents,
        shard: ShardId,
        large_threshold: u16,
    ) -> Self {
        Self {
            token,
            intents,
            shard,
            properties: IdentifyProperties::default(),
            large_threshold,
        }
    }

    #[must_use]
    pub fn token(&self) -> &AuthToken {
        &self.token
    }

    #[must_use]
    pub const fn shard(&self) -> ShardId {
        self.shard
    }
}

#[derive(Debug, Clone)]
struct IdentifyProperties {
    os: String,
    browser: String,
    device: String,
}

impl Default for IdentifyProperties {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: CLIENT_PROPERTIES_BROWSER.to_string(),
            device: CLIENT_PROPERTIES_DEVICE.to_string(),
        }
    }
}

/// Op 8 request for a guild's member list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestGuildMembers {
    pub guild_id: GuildId,
    pub query: String,
    pub limit: u32,
    pub presences: bool,
    pub nonce: String,
}

impl RequestGuildMembers {
    /// Requests every member of the guild, tagged with a fresh nonce.
    #[must_use]
    pub fn all(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            query: String::new(),
            limit: 0,
            presences: false,
            nonce: uuid::Uuid::new_v4().simple().to_string(),
        }
    }

    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>, limit: u32) -> Self {
        self.query = query.into();
        self.limit = limit;
        self
    }

    #[must_use]
    pub const fn with_presences(mut self, presences: bool) -> Self {
        self.presences = presences;
        self
    }
}

/// Raw inbound envelope `{op, d, s, t}`.
#[derive(Debug, Deserialize)]
pub struct GatewayMessage {
    pub op: u8,
    #[serde(default)]
    pub d: Option<Value>,
    #[serde(default)]
    pub s: Option<u64>,
    #[serde(default)]
    pub t: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HelloPayload {
    pub heartbeat_interval: u64,
}

#[derive(Debug, Deserialize)]
pub struct ReadyPayload {
    pub session_id: String,
    pub resume_gateway_url: Option<String>,
    pub user: ReadyUser,
    #[serde(default)]
    pub guilds: Vec<ReadyGuild>,
    #[serde(default)]
    pub shard: Option<[u32; 2]>,
}

#[derive(Debug, Deserialize)]
pub struct ReadyUser {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct ReadyGuild {
    pub id: GuildId,
}

#[derive(Debug, Deserialize)]
pub struct GuildCreatePayload {
    pub id: GuildId,
    #[serde(default)]
    pub unavailable: bool,
}

#[derive(Debug, Deserialize)]
pub struct GuildDeletePayload {
    pub id: GuildId,
    #[serde(default)]
    pub unavailable: bool,
}
