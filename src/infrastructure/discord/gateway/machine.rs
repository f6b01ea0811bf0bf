use tracing::{debug, info, trace, warn};

use super::constants::gateway_url;
use super::error::{GatewayError, GatewayResult};
use super::events::{DispatchEvent, Operation, OperationKind, ShardEvent};
use super::guilds::{GuildInsert, GuildSet};
use super::payloads::{GatewayPayload, IdentifyData};
use super::session::SessionInfo;
use super::state::{SessionState, ShardStatus};
use crate::domain::ShardId;

/// Side effects requested by the state machine. The runner that owns the
/// transport and heartbeat monitor carries them out in order.
#[derive(Debug, Clone)]
pub enum ShardAction {
    ArmHeartbeat { interval_ms: u64 },
    /// Server asked for a heartbeat outside the regular schedule.
    SendHeartbeat,
    HeartbeatAcked,
    Send(GatewayPayload),
    Emit(ShardEvent),
}

/// Protocol state of a single shard, free of any I/O.
///
/// Every inbound operation goes through [`ShardMachine::handle`], which
/// updates the session and returns the actions to perform. Anything that
/// must end the current connection comes back as an error.
#[derive(Debug)]
pub struct ShardMachine {
    identify: IdentifyData,
    state: SessionState,
    session: SessionInfo,
    guilds: GuildSet,
    hello_received: bool,
    handshake_sent: bool,
    reached_ready: bool,
}

impl ShardMachine {
    #[must_use]
    pub fn new(identify: IdentifyData) -> Self {
        let shard = identify.shard();
        Self {
            identify,
            state: SessionState::new(),
            session: SessionInfo::new(),
            guilds: GuildSet::new(shard),
            hello_received: false,
            handshake_sent: false,
            reached_ready: false,
        }
    }

    #[must_use]
    pub fn shard(&self) -> ShardId {
        self.identify.shard()
    }

    #[must_use]
    pub const fn status(&self) -> ShardStatus {
        self.state.status()
    }

    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub const fn session(&self) -> &SessionInfo {
        &self.session
    }

    #[must_use]
    pub const fn guilds(&self) -> &GuildSet {
        &self.guilds
    }

    #[must_use]
    pub const fn hello_received(&self) -> bool {
        self.hello_received
    }

    /// Whether the current connection got as far as READY or RESUMED.
    #[must_use]
    pub const fn reached_ready(&self) -> bool {
        self.reached_ready
    }

    #[must_use]
    pub fn can_resume(&self) -> bool {
        self.session.has_session() && self.state.last_sequence().is_some()
    }

    /// URL for the next connection: the resume URL when a resume is possible.
    #[must_use]
    pub fn connect_url(&self, default_base: &str, compress: bool) -> String {
        let base = if self.can_resume() {
            self.session.resume_gateway_url().unwrap_or(default_base)
        } else {
            default_base
        };
        gateway_url(base, compress)
    }

    /// Resets per-connection state before a new connection attempt. A
    /// resumable session keeps its sequence and guilds; otherwise the shard
    /// starts from scratch.
    pub fn begin_connection(&mut self) {
        self.state = if self.can_resume() {
            SessionState::resuming_from(self.state.last_sequence())
        } else {
            self.session.clear();
            self.guilds.clear();
            SessionState::new()
        };
        self.hello_received = false;
        self.handshake_sent = false;
        self.reached_ready = false;
    }

    pub fn on_heartbeat_sent(&mut self) {
        self.state.set_heartbeat_ack_received(false);
    }

    /// Records the loss of the current connection.
    pub fn on_disconnect(&mut self, error: &GatewayError) {
        if !error.can_resume() {
            self.session.clear();
        }
        self.state.set_status(ShardStatus::Reconnecting);
    }

    pub fn close(&mut self) {
        self.state.set_status(ShardStatus::Closed);
    }

    pub fn handle(&mut self, operation: Operation) -> GatewayResult<Vec<ShardAction>> {
        let mut actions = Vec::new();

        if let Some(sequence) = operation.sequence {
            self.state.observe_sequence(sequence);
        }

        match operation.kind {
            OperationKind::Hello {
                heartbeat_interval_ms,
            } => self.on_hello(heartbeat_interval_ms, &mut actions),
            OperationKind::Dispatch(event) => {
                self.on_dispatch(event, operation.sequence, &mut actions);
            }
            OperationKind::Heartbeat => actions.push(ShardAction::SendHeartbeat),
            OperationKind::HeartbeatAck => {
                self.state.set_heartbeat_ack_received(true);
                actions.push(ShardAction::HeartbeatAcked);
            }
            OperationKind::Reconnect => {
                info!(shard = %self.shard(), "Gateway requested reconnect");
                return Err(GatewayError::ReconnectRequested);
            }
            OperationKind::InvalidSession { resumable } => {
                warn!(shard = %self.shard(), resumable, "Session invalidated");
                if !resumable {
                    self.session.clear();
                }
                return Err(GatewayError::SessionInvalidated { resumable });
            }
            OperationKind::Unknown { opcode } => {
                debug!(shard = %self.shard(), opcode, "Ignoring unhandled opcode");
            }
        }

        Ok(actions)
    }

    /// Builds the identify payload, or `None` when identifying now would
    /// break the handshake order (before HELLO, or a second time on one
    /// connection).
    pub fn identify(&mut self) -> Option<GatewayPayload> {
        if let Err(violation) = self.check_handshake_order() {
            warn!(shard = %self.shard(), error = %violation, "Suppressed identify");
            return None;
        }

        self.handshake_sent = true;
        self.state.set_status(ShardStatus::Identifying);
        info!(shard = %self.shard(), "Identifying");
        Some(GatewayPayload::identify(&self.identify))
    }

    fn resume(&mut self) -> Option<GatewayPayload> {
        if let Err(violation) = self.check_handshake_order() {
            warn!(shard = %self.shard(), error = %violation, "Suppressed resume");
            return None;
        }
        let session_id = self.session.session_id()?;
        let sequence = self.state.last_sequence()?;

        let payload = GatewayPayload::resume(self.identify.token(), session_id, sequence);
        self.handshake_sent = true;
        self.state.set_status(ShardStatus::Resuming);
        info!(shard = %self.shard(), sequence, "Resuming session");
        Some(payload)
    }

    fn check_handshake_order(&self) -> GatewayResult<()> {
        if !self.hello_received {
            return Err(GatewayError::protocol_violation("handshake before Hello"));
        }
        if self.handshake_sent {
            return Err(GatewayError::protocol_violation(
                "handshake already sent on this connection",
            ));
        }
        Ok(())
    }

    fn on_hello(&mut self, interval_ms: u64, actions: &mut Vec<ShardAction>) {
        if self.hello_received {
            warn!(shard = %self.shard(), "Ignoring duplicate Hello");
            return;
        }

        self.hello_received = true;
        self.state.set_heartbeat_interval(interval_ms);
        debug!(shard = %self.shard(), interval_ms, "Received Hello");
        actions.push(ShardAction::ArmHeartbeat { interval_ms });

        let handshake = if self.can_resume() {
            self.resume()
        } else {
            self.identify()
        };
        if let Some(payload) = handshake {
            actions.push(ShardAction::Send(payload));
        }
    }

    fn on_dispatch(
        &mut self,
        event: DispatchEvent,
        sequence: Option<u64>,
        actions: &mut Vec<ShardAction>,
    ) {
        let shard = self.shard();
        trace!(%shard, event = event.name(), ?sequence, "Dispatch");

        match event {
            DispatchEvent::Ready {
                session_id,
                resume_gateway_url,
                user_id,
                shard: announced,
                unavailable_guilds,
            } => {
                if self.status() != ShardStatus::Identifying {
                    warn!(%shard, status = %self.status(), "Ignoring READY outside identify");
                    return;
                }
                if announced.is_some_and(|pair| pair != shard.as_pair()) {
                    warn!(%shard, ?announced, "READY announced a different shard");
                }

                info!(
                    %shard,
                    %session_id,
                    pending_guilds = unavailable_guilds.len(),
                    "Shard ready"
                );
                self.session.establish(session_id.clone(), resume_gateway_url, user_id.clone());
                self.state.set_status(ShardStatus::Ready);
                self.reached_ready = true;
                actions.push(ShardAction::Emit(ShardEvent::Ready {
                    shard,
                    session_id,
                    user_id,
                }));
            }
            DispatchEvent::Resumed => {
                if self.status() != ShardStatus::Resuming {
                    warn!(%shard, status = %self.status(), "Ignoring RESUMED outside resume");
                    return;
                }
                info!(%shard, "Session resumed");
                self.state.set_status(ShardStatus::Ready);
                self.reached_ready = true;
                actions.push(ShardAction::Emit(ShardEvent::Resumed { shard }));
            }
            DispatchEvent::GuildCreate { guild_id, .. } => {
                if !matches!(self.status(), ShardStatus::Ready | ShardStatus::Resuming) {
                    warn!(%shard, %guild_id, status = %self.status(), "Ignoring GUILD_CREATE before READY");
                    return;
                }
                match self.guilds.insert(guild_id) {
                    GuildInsert::Added => {
                        debug!(%shard, %guild_id, guilds = self.guilds.len(), "Guild available");
                        actions.push(ShardAction::Emit(ShardEvent::GuildAvailable {
                            shard,
                            guild_id,
                        }));
                    }
                    GuildInsert::Duplicate => {
                        debug!(%shard, %guild_id, "Guild already known");
                    }
                    GuildInsert::ForeignBucket { owner } => {
                        warn!(%shard, %guild_id, owner, "Discarding guild owned by another shard");
                    }
                }
            }
            DispatchEvent::GuildDelete {
                guild_id,
                unavailable,
            } => {
                if unavailable {
                    debug!(%shard, %guild_id, "Guild outage");
                } else if self.guilds.remove(guild_id) {
                    debug!(%shard, %guild_id, "Guild removed");
                    actions.push(ShardAction::Emit(ShardEvent::GuildRemoved { shard, guild_id }));
                }
            }
            DispatchEvent::Other { name, data } => {
                actions.push(ShardAction::Emit(ShardEvent::Dispatch {
                    shard,
                    name,
                    sequence,
                    data,
                }));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::domain::{AuthToken, GuildId};
    use crate::infrastructure::discord::gateway::codec::OpCodec;
    use crate::infrastructure::discord::gateway::constants::{GATEWAY_URL, GatewayIntents};

    fn machine(index: u32, total: u32) -> ShardMachine {
        ShardMachine::new(IdentifyData::new(
            Arc::new(AuthToken::new_unchecked("test_token")),
            GatewayIntents::default_bot(),
            ShardId::new(index, total).unwrap(),
        ))
    }

    fn feed(machine: &mut ShardMachine, frame: serde_json::Value) -> Vec<ShardAction> {
        let operation = OpCodec::decode(&frame.to_string()).unwrap();
        machine.handle(operation).unwrap()
    }

    fn hello() -> serde_json::Value {
        json!({"op": 10, "d": {"heartbeat_interval": 41250}})
    }

    fn ready(sequence: u64) -> serde_json::Value {
        json!({
            "op": 0, "t": "READY", "s": sequence,
            "d": {
                "session_id": "abc",
                "resume_gateway_url": "wss://resume.discord.gg",
                "user": {"id": "1"},
                "guilds": [],
                "shard": [0, 1]
            }
        })
    }

    fn guild_create(id: &str, sequence: u64) -> serde_json::Value {
        json!({"op": 0, "t": "GUILD_CREATE", "s": sequence, "d": {"id": id}})
    }

    fn sent_ops(actions: &[ShardAction]) -> Vec<u8> {
        actions
            .iter()
            .filter_map(|action| match action {
                ShardAction::Send(payload) => Some(payload.op),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_single_shard_handshake_to_ready() {
        let mut machine = machine(0, 1);
        machine.begin_connection();

        let actions = feed(&mut machine, hello());
        assert!(matches!(
            actions[0],
            ShardAction::ArmHeartbeat { interval_ms: 41250 }
        ));
        let ShardAction::Send(identify) = &actions[1] else {
            panic!("expected identify, got {actions:?}");
        };
        assert_eq!(identify.op, 2);
        assert_eq!(identify.d["shard"], json!([0, 1]));
        assert_eq!(machine.status(), ShardStatus::Identifying);

        feed(&mut machine, ready(1));
        feed(&mut machine, guild_create("42", 2));

        assert_eq!(machine.status(), ShardStatus::Ready);
        assert_eq!(machine.state().last_sequence(), Some(2));
        assert_eq!(machine.guilds().len(), 1);
        assert!(machine.guilds().contains(GuildId(42)));
        assert_eq!(machine.session().session_id(), Some("abc"));
    }

    #[test]
    fn test_identify_before_hello_is_suppressed() {
        let mut machine = machine(0, 1);
        machine.begin_connection();

        assert!(machine.identify().is_none());
        assert_eq!(machine.status(), ShardStatus::Connecting);

        let actions = feed(&mut machine, hello());
        assert_eq!(sent_ops(&actions), vec![2]);
    }

    #[test]
    fn test_identify_is_sent_once_per_connection() {
        let mut machine = machine(0, 1);
        machine.begin_connection();

        feed(&mut machine, hello());
        assert!(machine.identify().is_none());

        let actions = feed(&mut machine, hello());
        assert!(actions.is_empty());
    }

    #[test]
    fn test_ready_outside_identify_is_ignored() {
        let mut machine = machine(0, 1);
        machine.begin_connection();

        let actions = feed(&mut machine, ready(1));
        assert!(actions.is_empty());
        assert_eq!(machine.status(), ShardStatus::Connecting);
        assert!(!machine.session().has_session());
        assert_eq!(machine.state().last_sequence(), Some(1));
    }

    #[test]
    fn test_guild_create_before_ready_is_ignored() {
        let mut machine = machine(0, 1);
        machine.begin_connection();
        feed(&mut machine, hello());

        feed(&mut machine, guild_create("42", 1));
        assert!(machine.guilds().is_empty());
    }

    #[test]
    fn test_duplicate_guild_create_is_idempotent() {
        let mut machine = machine(0, 1);
        machine.begin_connection();
        feed(&mut machine, hello());
        feed(&mut machine, ready(1));

        let first = feed(&mut machine, guild_create("42", 2));
        let second = feed(&mut machine, guild_create("42", 3));

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(machine.guilds().len(), 1);
    }

    #[test]
    fn test_guild_from_foreign_bucket_is_discarded() {
        let mut machine = machine(0, 2);
        machine.begin_connection();
        feed(&mut machine, hello());
        feed(&mut machine, ready(1));

        let foreign = (1_u64 << 22).to_string();
        feed(&mut machine, guild_create(&foreign, 2));
        feed(&mut machine, guild_create("42", 3));

        assert_eq!(machine.guilds().iter().collect::<Vec<_>>(), vec![GuildId(42)]);
    }

    #[test]
    fn test_guild_delete_respects_outage_flag() {
        let mut machine = machine(0, 1);
        machine.begin_connection();
        feed(&mut machine, hello());
        feed(&mut machine, ready(1));
        feed(&mut machine, guild_create("42", 2));

        feed(
            &mut machine,
            json!({"op": 0, "t": "GUILD_DELETE", "s": 3, "d": {"id": "42", "unavailable": true}}),
        );
        assert!(machine.guilds().contains(GuildId(42)));

        feed(
            &mut machine,
            json!({"op": 0, "t": "GUILD_DELETE", "s": 4, "d": {"id": "42"}}),
        );
        assert!(machine.guilds().is_empty());
    }

    #[test]
    fn test_unknown_opcode_is_ignored() {
        let mut machine = machine(0, 1);
        machine.begin_connection();

        let actions = feed(&mut machine, json!({"op": 42, "d": null, "s": 7}));
        assert!(actions.is_empty());
        assert_eq!(machine.state().last_sequence(), Some(7));
    }

    #[test]
    fn test_other_dispatch_is_forwarded() {
        let mut machine = machine(0, 1);
        machine.begin_connection();

        let actions = feed(
            &mut machine,
            json!({"op": 0, "t": "MESSAGE_CREATE", "s": 5, "d": {"content": "hi"}}),
        );
        assert!(matches!(
            &actions[..],
            [ShardAction::Emit(ShardEvent::Dispatch { name, sequence: Some(5), .. })]
                if name == "MESSAGE_CREATE"
        ));
    }

    #[test]
    fn test_server_heartbeat_request_and_ack() {
        let mut machine = machine(0, 1);
        machine.begin_connection();

        let actions = feed(&mut machine, json!({"op": 1, "d": null}));
        assert!(matches!(&actions[..], [ShardAction::SendHeartbeat]));

        let actions = feed(&mut machine, json!({"op": 11}));
        assert!(matches!(&actions[..], [ShardAction::HeartbeatAcked]));
        assert!(machine.state().last_heartbeat_ack_received());
    }

    #[test]
    fn test_reconnect_request_then_resume() {
        let mut machine = machine(0, 1);
        machine.begin_connection();
        feed(&mut machine, hello());
        feed(&mut machine, ready(1));
        feed(&mut machine, guild_create("42", 2));

        let error = machine
            .handle(OpCodec::decode(r#"{"op":7,"d":null}"#).unwrap())
            .unwrap_err();
        assert!(matches!(error, GatewayError::ReconnectRequested));

        machine.on_disconnect(&error);
        assert_eq!(machine.status(), ShardStatus::Reconnecting);
        assert_eq!(
            machine.connect_url(GATEWAY_URL, false),
            "wss://resume.discord.gg/?v=10&encoding=json"
        );

        machine.begin_connection();
        let actions = feed(&mut machine, hello());
        let ShardAction::Send(resume) = &actions[1] else {
            panic!("expected resume, got {actions:?}");
        };
        assert_eq!(resume.op, 6);
        assert_eq!(resume.d["seq"], 2);
        assert_eq!(resume.d["session_id"], "abc");
        assert_eq!(machine.status(), ShardStatus::Resuming);

        feed(&mut machine, guild_create("42", 3));
        feed(&mut machine, json!({"op": 0, "t": "RESUMED", "s": 4, "d": null}));

        assert_eq!(machine.status(), ShardStatus::Ready);
        assert!(machine.reached_ready());
        assert_eq!(machine.guilds().len(), 1);
    }

    #[test]
    fn test_failed_reconnect_attempts_keep_session() {
        let mut machine = machine(0, 1);
        machine.begin_connection();
        feed(&mut machine, hello());
        feed(&mut machine, ready(1));
        feed(&mut machine, guild_create("42", 2));
        machine.on_disconnect(&GatewayError::ReconnectRequested);

        machine.begin_connection();
        machine.on_disconnect(&GatewayError::connection_failed("connection refused"));
        machine.begin_connection();
        machine.on_disconnect(&GatewayError::timeout("Hello"));

        assert!(machine.can_resume());
        machine.begin_connection();
        let actions = feed(&mut machine, hello());
        assert_eq!(sent_ops(&actions), vec![6]);
        assert_eq!(machine.guilds().len(), 1);
    }

    #[test]
    fn test_invalid_session_forces_fresh_identify() {
        let mut machine = machine(0, 1);
        machine.begin_connection();
        feed(&mut machine, hello());
        feed(&mut machine, ready(1));
        feed(&mut machine, guild_create("42", 2));

        let error = machine
            .handle(OpCodec::decode(r#"{"op":9,"d":false}"#).unwrap())
            .unwrap_err();
        assert!(!error.can_resume());

        machine.on_disconnect(&error);
        assert!(!machine.can_resume());

        machine.begin_connection();
        assert!(machine.guilds().is_empty());
        assert_eq!(machine.state().last_sequence(), None);

        let actions = feed(&mut machine, hello());
        assert_eq!(sent_ops(&actions), vec![2]);
    }

    #[test]
    fn test_close_is_terminal_status() {
        let mut machine = machine(0, 1);
        machine.close();
        assert_eq!(machine.status(), ShardStatus::Closed);
    }
}
