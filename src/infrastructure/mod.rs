//! Infrastructure layer: gateway engine, REST collaborator and configuration.

/// Shard process configuration.
pub mod config;
/// Discord gateway and REST adapters.
pub mod discord;

pub use config::{AppConfig, CliArgs, GatewayConfig, LogLevel, StorageManager};
pub use discord::{
    DiscordClient, GatewayError, GatewayIntents, LatencyMetrics, Shard, ShardConfig, ShardEvent,
    ShardGroup, ShardGroupConfig, ShardStatus,
};
