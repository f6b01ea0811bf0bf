use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::constants::{GatewayIntents, LARGE_THRESHOLD, MIN_SHARD_SPAWN_DELAY};
use super::error::{GatewayError, GatewayResult};
use super::events::{ShardCommand, ShardEvent};
use super::guilds::GuildSet;
use super::payloads::IdentifyData;
use super::shard::{Shard, ShardConfig, ShardHandle, ShardReport};
use super::state::ShardStatus;
use super::transport::{TransportFactory, WebSocketTransport};
use crate::domain::{AuthToken, GuildId, ShardId};

#[derive(Debug, Clone)]
pub struct ShardGroupConfig {
    pub total_shards: u32,
    pub token: Arc<AuthToken>,
    pub intents: GatewayIntents,
    pub large_threshold: u16,
    /// Template for every shard; its startup delay is overwritten per shard.
    pub shard: ShardConfig,
    /// Gap between consecutive shard starts. Never shorter than
    /// `MIN_SHARD_SPAWN_DELAY`.
    pub spawn_delay: Duration,
}

impl ShardGroupConfig {
    #[must_use]
    pub fn new(total_shards: u32, token: AuthToken, intents: GatewayIntents) -> Self {
        Self {
            total_shards,
            token: Arc::new(token),
            intents,
            large_threshold: LARGE_THRESHOLD,
            shard: ShardConfig::default(),
            spawn_delay: MIN_SHARD_SPAWN_DELAY,
        }
    }

    #[must_use]
    pub fn with_shard_config(mut self, shard: ShardConfig) -> Self {
        self.shard = shard;
        self
    }

    #[must_use]
    pub const fn with_spawn_delay(mut self, delay: Duration) -> Self {
        self.spawn_delay = delay;
        self
    }

    #[must_use]
    pub const fn with_large_threshold(mut self, threshold: u16) -> Self {
        self.large_threshold = threshold;
        self
    }

    fn effective_spawn_delay(&self) -> Duration {
        self.spawn_delay.max(MIN_SHARD_SPAWN_DELAY)
    }
}

struct RunningShard {
    handle: ShardHandle,
    task: JoinHandle<ShardReport>,
}

/// Runs `total_shards` shards side by side, one task each.
///
/// Shard `i` waits `i * spawn_delay` before connecting. Shards share nothing
/// but the token, so one failing never stops the others. Dropping the group
/// without calling [`ShardGroup::stop`] also shuts every shard down.
pub struct ShardGroup {
    shards: Vec<RunningShard>,
    shutdown: watch::Sender<bool>,
}

impl ShardGroup {
    /// Starts a group over real WebSocket connections.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::InvalidShard` when `total_shards` is zero.
    pub fn start(
        total_shards: u32,
        token: AuthToken,
        intents: GatewayIntents,
    ) -> GatewayResult<(Self, mpsc::UnboundedReceiver<ShardEvent>)> {
        let config = ShardGroupConfig::new(total_shards, token, intents);
        let factory = WebSocketTransport::factory(config.shard.compress);
        Self::start_with(config, factory)
    }

    /// # Errors
    ///
    /// Returns `GatewayError::InvalidShard` when `total_shards` is zero.
    pub fn start_with(
        config: ShardGroupConfig,
        transport_factory: TransportFactory,
    ) -> GatewayResult<(Self, mpsc::UnboundedReceiver<ShardEvent>)> {
        let total = config.total_shards;
        if total == 0 {
            return Err(GatewayError::InvalidShard { index: 0, total });
        }

        let spawn_delay = config.effective_spawn_delay();
        let (shutdown, _) = watch::channel(false);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut shards = Vec::with_capacity(total as usize);

        for index in 0..total {
            let shard_id =
                ShardId::new(index, total).ok_or(GatewayError::InvalidShard { index, total })?;
            let identify = IdentifyData::with_large_threshold(
                config.token.clone(),
                config.intents,
                shard_id,
                config.large_threshold,
            );
            let shard_config = config
                .shard
                .clone()
                .with_startup_delay(spawn_delay.saturating_mul(index));

            let (shard, handle) = Shard::new(
                identify,
                shard_config,
                transport_factory.clone(),
                shutdown.subscribe(),
            );
            let task = tokio::spawn(supervise(shard.with_events(events_tx.clone())));

            shards.push(RunningShard { handle, task });
        }

        info!(
            total,
            spawn_delay_ms = u64::try_from(spawn_delay.as_millis()).unwrap_or(u64::MAX),
            "Shard group started"
        );

        Ok((Self { shards, shutdown }, events_rx))
    }

    #[must_use]
    pub fn total_shards(&self) -> u32 {
        u32::try_from(self.shards.len()).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub fn handle(&self, index: u32) -> Option<&ShardHandle> {
        self.shards.get(index as usize).map(|running| &running.handle)
    }

    #[must_use]
    pub fn status(&self) -> Vec<(ShardId, ShardStatus)> {
        self.shards
            .iter()
            .map(|running| (running.handle.shard(), running.handle.status()))
            .collect()
    }

    #[must_use]
    pub fn all_ready(&self) -> bool {
        self.shards
            .iter()
            .all(|running| running.handle.status().is_ready())
    }

    /// The shard responsible for `guild_id` in this group.
    #[must_use]
    pub fn shard_for(&self, guild_id: GuildId) -> Option<ShardId> {
        let index = guild_id.shard_index(self.total_shards());
        self.handle(index).map(ShardHandle::shard)
    }

    /// Routes a command to the shard owning its guild.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::NotConnected` when the owning shard has stopped.
    pub fn send(&self, command: ShardCommand) -> GatewayResult<()> {
        let guild_id = match &command {
            ShardCommand::RequestGuildMembers(request) => request.guild_id,
        };
        let index = guild_id.shard_index(self.total_shards());
        let handle = self.handle(index).ok_or(GatewayError::NotConnected)?;

        handle.send(command)
    }

    /// Requests shutdown of every shard and waits until all of them have
    /// closed. Reports come back in shard order.
    pub async fn stop(self) -> Vec<ShardReport> {
        info!(shards = self.shards.len(), "Stopping shard group");
        self.shutdown.send_replace(true);

        let mut reports = Vec::with_capacity(self.shards.len());
        for RunningShard { handle, task } in self.shards {
            let report = match task.await {
                Ok(report) => report,
                Err(e) => {
                    error!(shard = %handle.shard(), error = %e, "Shard task failed");
                    failed_report(handle.shard(), e.to_string())
                }
            };
            reports.push(report);
        }

        info!("Shard group stopped");
        reports
    }
}

async fn supervise(shard: Shard) -> ShardReport {
    let id = shard.shard();

    match AssertUnwindSafe(shard.run()).catch_unwind().await {
        Ok(report) => report,
        Err(panic_info) => {
            let message = if let Some(s) = panic_info.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = panic_info.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };

            error!(shard = %id, panic = %message, "Shard task panicked");
            failed_report(id, message)
        }
    }
}

fn failed_report(shard: ShardId, message: String) -> ShardReport {
    ShardReport {
        shard,
        status: ShardStatus::Closed,
        last_sequence: None,
        guilds: GuildSet::new(shard),
        result: Err(GatewayError::TaskFailed { message }),
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use serde_json::{Value, json};
    use tokio::time::Instant;

    use super::*;
    use crate::infrastructure::discord::gateway::payloads::RequestGuildMembers;
    use crate::infrastructure::discord::gateway::transport::{GatewayTransport, mock};

    fn config(total: u32) -> ShardGroupConfig {
        ShardGroupConfig::new(
            total,
            AuthToken::new_unchecked("test_token"),
            GatewayIntents::default_bot(),
        )
    }

    fn hello() -> Value {
        json!({"op": 10, "d": {"heartbeat_interval": 41250}})
    }

    fn ready(index: u32, total: u32) -> Value {
        json!({
            "op": 0, "t": "READY", "s": 1,
            "d": {"session_id": format!("session-{index}"), "user": {"id": "1"}, "guilds": [], "shard": [index, total]}
        })
    }

    fn guild_create(id: u64, sequence: u64) -> Value {
        json!({"op": 0, "t": "GUILD_CREATE", "s": sequence, "d": {"id": id.to_string()}})
    }

    async fn wait_until(
        events: &mut mpsc::UnboundedReceiver<ShardEvent>,
        mut pending: impl FnMut(&ShardEvent) -> bool,
    ) {
        while let Some(event) = events.recv().await {
            if !pending(&event) {
                return;
            }
        }
        panic!("event stream ended early");
    }

    #[tokio::test]
    async fn test_empty_group_is_rejected() {
        let (factory, _) = mock::factory(Vec::new());
        let result = ShardGroup::start_with(config(0), factory);
        assert!(matches!(result, Err(GatewayError::InvalidShard { total: 0, .. })));
    }

    #[test]
    fn test_spawn_delay_has_a_floor() {
        assert_eq!(
            config(2).with_spawn_delay(Duration::from_secs(1)).effective_spawn_delay(),
            MIN_SHARD_SPAWN_DELAY
        );
        assert_eq!(
            config(2).with_spawn_delay(Duration::from_secs(8)).effective_spawn_delay(),
            Duration::from_secs(8)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shards_start_staggered() {
        let opened = Arc::new(Mutex::new(Vec::new()));
        let log = opened.clone();
        let factory: TransportFactory = Arc::new(move || {
            log.lock().push(Instant::now());
            Box::new(mock::pair().0) as Box<dyn GatewayTransport>
        });

        let start = Instant::now();
        let config = config(3).with_spawn_delay(Duration::ZERO);
        let (group, _events) = ShardGroup::start_with(config, factory).unwrap();

        tokio::time::sleep(Duration::from_millis(10_500)).await;

        let opened: Vec<Duration> = opened.lock().iter().map(|t| *t - start).collect();
        assert_eq!(opened.len(), 3);
        for pair in opened.windows(2) {
            assert!(pair[1] - pair[0] >= MIN_SHARD_SPAWN_DELAY);
        }

        let reports = group.stop().await;
        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| r.result.is_ok() && r.status == ShardStatus::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_shard_does_not_affect_siblings() {
        let (first, first_server) = mock::pair();
        let (second, second_server) = mock::pair();
        let (factory, _) = mock::factory(vec![first, second]);
        let (group, mut events) = ShardGroup::start_with(config(2), factory).unwrap();

        first_server.send_json(&hello());
        first_server.close(4004, "Authentication failed.");
        second_server.send_json(&hello());
        second_server.send_json(&ready(1, 2));

        let mut fatal = false;
        let mut ready = false;
        wait_until(&mut events, |event| {
            match event {
                ShardEvent::Fatal { shard, .. } if shard.index() == 0 => fatal = true,
                ShardEvent::Ready { shard, .. } if shard.index() == 1 => ready = true,
                _ => {}
            }
            !(fatal && ready)
        })
        .await;

        let status = group.status();
        assert_eq!(status[0].1, ShardStatus::Closed);
        assert_eq!(status[1].1, ShardStatus::Ready);
        assert!(!group.all_ready());

        let reports = group.stop().await;
        assert!(matches!(reports[0].result, Err(GatewayError::AuthRejected { .. })));
        assert!(reports[1].result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_shard_is_reported_and_isolated() {
        let calls = Arc::new(Mutex::new(0_u32));
        let counter = calls.clone();
        let factory: TransportFactory = Arc::new(move || {
            let mut calls = counter.lock();
            *calls += 1;
            assert!(*calls > 1, "transport construction failed");
            Box::new(mock::pair().0) as Box<dyn GatewayTransport>
        });

        let (group, _events) = ShardGroup::start_with(config(2), factory).unwrap();
        tokio::time::sleep(MIN_SHARD_SPAWN_DELAY + Duration::from_millis(500)).await;

        assert_eq!(group.status()[1].1, ShardStatus::Connecting);

        let reports = group.stop().await;
        assert!(matches!(
            &reports[0].result,
            Err(GatewayError::TaskFailed { message }) if message.contains("transport construction failed")
        ));
        assert!(reports[1].result.is_ok());
        assert_eq!(*calls.lock(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guilds_partition_and_commands_route_by_bucket() {
        let (first, mut first_server) = mock::pair();
        let (second, mut second_server) = mock::pair();
        let (factory, _) = mock::factory(vec![first, second]);
        let (group, mut events) = ShardGroup::start_with(config(2), factory).unwrap();

        let guilds: Vec<u64> = (0..6).map(|n| (n << 22) | 7).collect();
        for (index, server) in [&first_server, &second_server].into_iter().enumerate() {
            server.send_json(&hello());
            server.send_json(&ready(u32::try_from(index).unwrap(), 2));
            for (sequence, id) in guilds.iter().enumerate() {
                server.send_json(&guild_create(*id, sequence as u64 + 2));
            }
        }

        let mut available = 0;
        wait_until(&mut events, |event| {
            if matches!(event, ShardEvent::GuildAvailable { .. }) {
                available += 1;
            }
            available < guilds.len()
        })
        .await;
        assert!(group.all_ready());

        let owned = GuildId(1 << 22);
        assert_eq!(group.shard_for(owned).map(ShardId::index), Some(1));
        group
            .send(ShardCommand::RequestGuildMembers(RequestGuildMembers::all(owned)))
            .unwrap();

        let mut frame = second_server.next_sent().await.unwrap();
        while frame["op"] != 8 {
            frame = second_server.next_sent().await.unwrap();
        }
        assert_eq!(frame["d"]["guild_id"], owned.to_string());

        let reports = group.stop().await;
        assert!(!first_server.drain_sent().iter().any(|f| f["op"] == 8));

        let first: Vec<GuildId> = reports[0].guilds.iter().collect();
        let second: Vec<GuildId> = reports[1].guilds.iter().collect();
        assert_eq!(first.len() + second.len(), guilds.len());
        assert!(first.iter().all(|g| !second.contains(g)));
        assert!(first.iter().all(|g| g.shard_index(2) == 0));
        assert!(second.iter().all(|g| g.shard_index(2) == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_later_shards_connect() {
        let (factory, created) = mock::factory(Vec::new());
        let (group, _events) = ShardGroup::start_with(config(4), factory).unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        let reports = group.stop().await;

        assert_eq!(reports.len(), 4);
        assert_eq!(
            reports.iter().map(|r| r.shard.index()).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
        assert!(reports.iter().all(|r| r.result.is_ok()));
        assert_eq!(created.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
