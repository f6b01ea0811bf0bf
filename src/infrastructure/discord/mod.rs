//! Discord gateway engine and REST collaborator.

mod client;
mod dto;
pub mod gateway;
mod metrics;

pub use client::{DEFAULT_USER_CACHE_SIZE, DiscordClient};
pub use gateway::{
    GatewayError, GatewayIntents, Shard, ShardConfig, ShardEvent, ShardGroup, ShardGroupConfig,
    ShardStatus,
};
pub use metrics::LatencyMetrics;
