use super::app_config::LogLevel;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "oxishard",
    version,
    about = "Runs one Discord gateway shard",
    long_about = None
)]
pub struct CliArgs {
    /// Index of this shard, starting at zero.
    pub shard_index: u32,

    /// Number of shards in the group.
    pub shard_count: u32,

    /// Bot token.
    pub token: String,

    /// Gateway intents bitfield.
    pub intents: u32,

    /// Configuration file path.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log file path. Logs go to stderr when unset.
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,
}
