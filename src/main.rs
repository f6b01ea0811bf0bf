use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, eyre};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use oxishard::domain::{AuthToken, ShardId};
use oxishard::infrastructure::discord::gateway::{IdentifyData, WebSocketTransport};
use oxishard::infrastructure::{
    AppConfig, CliArgs, GatewayIntents, Shard, ShardEvent, StorageManager,
};

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = &config.log_path {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let storage =
        StorageManager::new().unwrap_or_else(|_| StorageManager::with_dir(PathBuf::from(".")));
    let mut config = storage.load_config(args.config.as_deref())?;
    config.merge_with_args(args);
    Ok(config)
}

async fn log_events(mut events: mpsc::UnboundedReceiver<ShardEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            ShardEvent::Dispatch {
                shard,
                name,
                sequence,
                ..
            } => debug!(%shard, event = %name, ?sequence, "Dispatch"),
            ShardEvent::HeartbeatAck { shard, latency_ms } => {
                debug!(%shard, latency_ms, "Heartbeat latency");
            }
            ShardEvent::Fatal { shard, message } => error!(%shard, %message, "Shard failed"),
            other => info!(shard = %other.shard(), event = ?other, "Shard event"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let config = load_config(&args)?;

    init_logging(&config)?;

    info!(version = oxishard::VERSION, "Starting {}", oxishard::NAME);

    let shard = ShardId::new(args.shard_index, args.shard_count).ok_or_else(|| {
        eyre!(
            "shard index {} is out of range for {} shards",
            args.shard_index,
            args.shard_count
        )
    })?;
    let token = AuthToken::new(args.token.as_str()).ok_or_else(|| eyre!("malformed bot token"))?;

    let identify = IdentifyData::with_large_threshold(
        Arc::new(token),
        GatewayIntents::from(args.intents),
        shard,
        config.gateway.large_threshold,
    );
    let shard_config = config
        .gateway
        .shard_config()
        .with_startup_delay(config.gateway.spawn_delay().saturating_mul(shard.index()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (runner, handle) = Shard::new(
        identify,
        shard_config,
        WebSocketTransport::factory(config.gateway.compress),
        shutdown_rx,
    );

    let mut task = tokio::spawn(runner.with_events(events_tx).run());
    let logger = tokio::spawn(log_events(events_rx));

    let report = tokio::select! {
        result = &mut task => result?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!(%shard, "Shutdown requested");
            shutdown_tx.send_replace(true);
            task.await?
        }
    };
    logger.await?;

    info!(
        %shard,
        status = %handle.status(),
        guilds = report.guilds.len(),
        sequence = ?report.last_sequence,
        "Shard closed"
    );

    Ok(report.result?)
}
