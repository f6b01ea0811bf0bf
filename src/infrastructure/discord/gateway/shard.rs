use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, trace, warn};

use super::codec::OpCodec;
use super::constants::{
    CLOSE_NORMAL, CLOSE_RESUMABLE, GATEWAY_URL, HELLO_TIMEOUT, MAX_RECONNECT_ATTEMPTS,
    RECONNECT_DELAY_BASE, RECONNECT_DELAY_MAX, RECONNECT_JITTER_MAX,
};
use super::error::{GatewayError, GatewayResult};
use super::events::{ShardCommand, ShardEvent};
use super::guilds::GuildSet;
use super::heartbeat::{HeartbeatDue, HeartbeatMonitor};
use super::machine::{ShardAction, ShardMachine};
use super::payloads::{GatewayPayload, IdentifyData};
use super::state::ShardStatus;
use super::transport::{GatewayTransport, TransportFactory};
use crate::domain::ShardId;

#[derive(Debug, Clone)]
pub struct ShardConfig {
    pub gateway_url: String,
    pub compress: bool,
    pub auto_reconnect: bool,
    pub max_reconnect_attempts: u32,
    /// Wait before the first connection attempt.
    pub startup_delay: Duration,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            gateway_url: GATEWAY_URL.to_string(),
            compress: false,
            auto_reconnect: true,
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            startup_delay: Duration::ZERO,
        }
    }
}

impl ShardConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_url = url.into();
        self
    }

    #[must_use]
    pub const fn with_compression(mut self, enabled: bool) -> Self {
        self.compress = enabled;
        self
    }

    #[must_use]
    pub const fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    #[must_use]
    pub const fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    #[must_use]
    pub const fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }
}

/// Final state of a shard after [`Shard::run`] returns.
#[derive(Debug)]
pub struct ShardReport {
    pub shard: ShardId,
    pub status: ShardStatus,
    pub last_sequence: Option<u64>,
    pub guilds: GuildSet,
    /// `Ok` after a requested shutdown, the fatal error otherwise.
    pub result: GatewayResult<()>,
}

/// Cloneable view of a running shard.
#[derive(Debug, Clone)]
pub struct ShardHandle {
    shard: ShardId,
    status: watch::Receiver<ShardStatus>,
    commands: mpsc::UnboundedSender<ShardCommand>,
}

impl ShardHandle {
    #[must_use]
    pub const fn shard(&self) -> ShardId {
        self.shard
    }

    #[must_use]
    pub fn status(&self) -> ShardStatus {
        *self.status.borrow()
    }

    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<ShardStatus> {
        self.status.clone()
    }

    /// # Errors
    ///
    /// Returns `GatewayError::NotConnected` once the shard has stopped.
    pub fn send(&self, command: ShardCommand) -> GatewayResult<()> {
        self.commands
            .send(command)
            .map_err(|_| GatewayError::NotConnected)
    }
}

enum ConnectionOutcome {
    Shutdown,
    Lost(GatewayError),
}

/// One gateway session, driven to completion by [`Shard::run`].
///
/// The runner is the only owner of the transport, so every frame (identify,
/// heartbeats, commands) leaves through the same loop, one at a time.
pub struct Shard {
    machine: ShardMachine,
    config: ShardConfig,
    transport_factory: TransportFactory,
    heartbeat: HeartbeatMonitor,
    status_tx: watch::Sender<ShardStatus>,
    commands: mpsc::UnboundedReceiver<ShardCommand>,
    shutdown: watch::Receiver<bool>,
    events: Option<mpsc::UnboundedSender<ShardEvent>>,
}

impl Shard {
    /// The shard stops once `shutdown` flips to `true` or its sender is dropped.
    #[must_use]
    pub fn new(
        identify: IdentifyData,
        config: ShardConfig,
        transport_factory: TransportFactory,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, ShardHandle) {
        let shard = identify.shard();
        let (status_tx, status_rx) = watch::channel(ShardStatus::Connecting);
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let runner = Self {
            machine: ShardMachine::new(identify),
            config,
            transport_factory,
            heartbeat: HeartbeatMonitor::new(),
            status_tx,
            commands: command_rx,
            shutdown,
            events: None,
        };
        let handle = ShardHandle {
            shard,
            status: status_rx,
            commands: command_tx,
        };

        (runner, handle)
    }

    #[must_use]
    pub fn with_events(mut self, events: mpsc::UnboundedSender<ShardEvent>) -> Self {
        self.events = Some(events);
        self
    }

    #[must_use]
    pub fn shard(&self) -> ShardId {
        self.machine.shard()
    }

    pub async fn run(mut self) -> ShardReport {
        let shard = self.machine.shard();
        let result = self.run_until_closed().await;
        self.heartbeat.disarm();

        match &result {
            Ok(()) => info!(%shard, "Shard stopped"),
            Err(e) => {
                error!(
                    %shard,
                    status = %self.machine.status(),
                    sequence = ?self.machine.state().last_sequence(),
                    error = %e,
                    "Shard stopped on fatal error"
                );
                self.emit(ShardEvent::Fatal {
                    shard,
                    message: e.to_string(),
                });
            }
        }

        self.machine.close();
        self.publish_status();

        ShardReport {
            shard,
            status: self.machine.status(),
            last_sequence: self.machine.state().last_sequence(),
            guilds: self.machine.guilds().clone(),
            result,
        }
    }

    async fn run_until_closed(&mut self) -> GatewayResult<()> {
        let shard = self.machine.shard();

        if !self.config.startup_delay.is_zero() {
            debug!(
                %shard,
                delay_ms = duration_ms(self.config.startup_delay),
                "Waiting for startup slot"
            );
            if self.wait_or_shutdown(self.config.startup_delay).await {
                return Ok(());
            }
        }

        let mut reconnect_attempts: u32 = 0;

        loop {
            let error = match self.run_connection().await {
                ConnectionOutcome::Shutdown => return Ok(()),
                ConnectionOutcome::Lost(error) => error,
            };

            if self.machine.reached_ready() {
                reconnect_attempts = 0;
            }
            if error.is_fatal() || !self.config.auto_reconnect {
                return Err(error);
            }

            warn!(
                %shard,
                error = %error,
                code = ?error.close_code(),
                resumable = error.can_resume(),
                "Connection lost"
            );
            self.machine.on_disconnect(&error);
            self.publish_status();

            reconnect_attempts += 1;
            if reconnect_attempts > self.config.max_reconnect_attempts {
                return Err(GatewayError::ReconnectionLimitExceeded {
                    attempts: self.config.max_reconnect_attempts,
                });
            }

            let delay = calculate_backoff_delay(reconnect_attempts - 1);
            info!(
                %shard,
                attempt = reconnect_attempts,
                delay_ms = duration_ms(delay),
                "Reconnecting"
            );
            self.emit(ShardEvent::Reconnecting {
                shard,
                attempt: reconnect_attempts,
            });

            if self.wait_or_shutdown(delay).await {
                return Ok(());
            }
        }
    }

    async fn run_connection(&mut self) -> ConnectionOutcome {
        let shard = self.machine.shard();

        self.machine.begin_connection();
        self.publish_status();
        self.heartbeat = HeartbeatMonitor::new();
        if let Some(sequence) = self.machine.state().last_sequence() {
            self.heartbeat.acknowledge_sequence(sequence);
        }

        let url = self
            .machine
            .connect_url(&self.config.gateway_url, self.config.compress);
        let mut transport = (self.transport_factory)();

        debug!(%shard, %url, "Connecting to gateway");
        let opened = tokio::select! {
            result = transport.open(&url) => result,
            () = shutdown_requested(&mut self.shutdown) => return ConnectionOutcome::Shutdown,
        };
        if let Err(error) = opened {
            return ConnectionOutcome::Lost(error);
        }
        info!(%shard, "Gateway connected");

        let outcome = self.drive(transport.as_mut()).await;
        self.heartbeat.disarm();

        let close_code = match &outcome {
            ConnectionOutcome::Lost(error) if error.can_resume() => CLOSE_RESUMABLE,
            _ => CLOSE_NORMAL,
        };
        if transport.is_open()
            && let Err(error) = transport.close(close_code).await
        {
            debug!(%shard, error = %error, "Failed to close transport cleanly");
        }

        outcome
    }

    async fn drive(&mut self, transport: &mut dyn GatewayTransport) -> ConnectionOutcome {
        let hello_deadline = sleep(HELLO_TIMEOUT);
        tokio::pin!(hello_deadline);

        loop {
            tokio::select! {
                biased;

                () = shutdown_requested(&mut self.shutdown) => {
                    return ConnectionOutcome::Shutdown;
                }
                () = &mut hello_deadline, if !self.machine.hello_received() => {
                    return ConnectionOutcome::Lost(GatewayError::timeout("Hello"));
                }
                scheduled = self.heartbeat.tick() => {
                    if let Err(error) = self.on_heartbeat_tick(transport, scheduled).await {
                        return ConnectionOutcome::Lost(error);
                    }
                }
                Some(command) = self.commands.recv() => {
                    self.on_command(transport, command).await;
                }
                frame = transport.receive() => {
                    let result = match frame {
                        Ok(text) => self.on_frame(transport, &text).await,
                        Err(GatewayError::MalformedFrame { message }) => {
                            let shard = self.machine.shard();
                            warn!(%shard, %message, "Discarding undecodable frame");
                            Ok(())
                        }
                        Err(error) => Err(error),
                    };
                    if let Err(error) = result {
                        return ConnectionOutcome::Lost(error);
                    }
                }
            }
        }
    }

    async fn on_heartbeat_tick(
        &mut self,
        transport: &mut dyn GatewayTransport,
        scheduled: Instant,
    ) -> GatewayResult<()> {
        match self.heartbeat.on_tick(scheduled) {
            HeartbeatDue::Send(sequence) => {
                self.machine.on_heartbeat_sent();
                send_payload(self.machine.shard(), transport, &GatewayPayload::heartbeat(sequence))
                    .await;
                Ok(())
            }
            HeartbeatDue::Waiting | HeartbeatDue::Missed { .. } => Ok(()),
            HeartbeatDue::Timeout => Err(GatewayError::HeartbeatTimeout),
        }
    }

    async fn on_frame(&mut self, transport: &mut dyn GatewayTransport, frame: &str) -> GatewayResult<()> {
        let shard = self.machine.shard();

        let operation = match OpCodec::decode(frame) {
            Ok(operation) => operation,
            Err(error) => {
                warn!(%shard, error = %error, "Discarding malformed frame");
                return Ok(());
            }
        };
        trace!(%shard, sequence = ?operation.sequence, kind = ?operation.kind, "Received operation");

        if let Some(sequence) = operation.sequence {
            self.heartbeat.acknowledge_sequence(sequence);
        }

        let actions = self.machine.handle(operation)?;
        for action in actions {
            self.apply(transport, action).await;
        }
        self.publish_status();

        Ok(())
    }

    async fn apply(&mut self, transport: &mut dyn GatewayTransport, action: ShardAction) {
        let shard = self.machine.shard();

        match action {
            ShardAction::ArmHeartbeat { interval_ms } => self.heartbeat.arm(interval_ms),
            ShardAction::SendHeartbeat => {
                let sequence = self.heartbeat.immediate();
                self.machine.on_heartbeat_sent();
                send_payload(shard, transport, &GatewayPayload::heartbeat(sequence)).await;
            }
            ShardAction::HeartbeatAcked => {
                if let Some(latency) = self.heartbeat.on_ack() {
                    let latency_ms = duration_ms(latency);
                    trace!(%shard, latency_ms, "Heartbeat acknowledged");
                    self.emit(ShardEvent::HeartbeatAck { shard, latency_ms });
                }
            }
            ShardAction::Send(payload) => send_payload(shard, transport, &payload).await,
            ShardAction::Emit(event) => self.emit(event),
        }
    }

    async fn on_command(&mut self, transport: &mut dyn GatewayTransport, command: ShardCommand) {
        let shard = self.machine.shard();

        match command {
            ShardCommand::RequestGuildMembers(request) => {
                if !self.machine.status().is_ready() {
                    warn!(%shard, guild_id = %request.guild_id, "Dropping member request, shard not ready");
                    return;
                }
                if !request.guild_id.belongs_to(shard) {
                    warn!(%shard, guild_id = %request.guild_id, "Dropping member request for a guild of another shard");
                    return;
                }
                send_payload(
                    shard,
                    transport,
                    &GatewayPayload::request_guild_members(&request),
                )
                .await;
            }
        }
    }

    /// Returns `true` when shutdown was requested before `delay` elapsed.
    async fn wait_or_shutdown(&mut self, delay: Duration) -> bool {
        tokio::select! {
            () = sleep(delay) => false,
            () = shutdown_requested(&mut self.shutdown) => true,
        }
    }

    fn publish_status(&self) {
        let status = self.machine.status();
        let changed = self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });

        if changed {
            debug!(shard = %self.machine.shard(), %status, "Shard status changed");
            self.emit(ShardEvent::StatusChanged {
                shard: self.machine.shard(),
                status,
            });
        }
    }

    fn emit(&self, event: ShardEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

/// Resolves once shutdown is requested or the controlling side is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn send_payload(shard: ShardId, transport: &mut dyn GatewayTransport, payload: &GatewayPayload) {
    match transport.send(OpCodec::encode(payload)).await {
        Ok(()) => trace!(%shard, op = payload.op, "Sent payload"),
        Err(error) => warn!(%shard, op = payload.op, error = %error, "Failed to send payload"),
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn calculate_backoff_delay(attempt: u32) -> Duration {
    let base_delay = duration_ms(RECONNECT_DELAY_BASE);
    let max_delay = duration_ms(RECONNECT_DELAY_MAX);
    let jitter_max = duration_ms(RECONNECT_JITTER_MAX);

    let exponential_delay = base_delay.saturating_mul(2_u64.saturating_pow(attempt.min(6)));
    let capped_delay = exponential_delay.min(max_delay);

    let jitter = rand::random_range(0..jitter_max.max(1));
    Duration::from_millis(capped_delay.saturating_add(jitter))
}
