use flate2::{Decompress, FlushDecompress, Status};
use serde_json::Value;

use super::constants::{GatewayOpcode, ZLIB_SUFFIX};
use super::error::{GatewayError, GatewayResult};
use super::events::{DispatchEvent, Operation, OperationKind};
use super::payloads::{
    GatewayMessage, GatewayPayload, GuildCreatePayload, GuildDeletePayload, HelloPayload,
    ReadyPayload,
};

const INITIAL_BUFFER_SIZE: usize = 32 * 1024;
const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Inflates a `zlib-stream` transport: one shared inflater per connection,
/// messages delimited by the sync-flush suffix.
pub struct ZlibStream {
    inflater: Decompress,
    compressed_buffer: Vec<u8>,
    decompressed_buffer: Vec<u8>,
}

impl ZlibStream {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inflater: Decompress::new(true),
            compressed_buffer: Vec::with_capacity(4096),
            decompressed_buffer: Vec::with_capacity(INITIAL_BUFFER_SIZE),
        }
    }

    /// Buffers `data` and returns the decoded text once a full message arrived.
    pub fn push(&mut self, data: &[u8]) -> GatewayResult<Option<String>> {
        self.compressed_buffer.extend_from_slice(data);

        if !self.is_message_complete() {
            return Ok(None);
        }

        let result = self.decompress();
        self.compressed_buffer.clear();
        result.map(Some)
    }

    fn is_message_complete(&self) -> bool {
        self.compressed_buffer.len() >= 4
            && self.compressed_buffer[self.compressed_buffer.len() - 4..] == ZLIB_SUFFIX
    }

    fn decompress(&mut self) -> GatewayResult<String> {
        self.decompressed_buffer.clear();

        let mut total_in = 0;

        loop {
            if self.decompressed_buffer.len() == self.decompressed_buffer.capacity() {
                let capacity = self.decompressed_buffer.capacity().max(INITIAL_BUFFER_SIZE);
                if capacity * 2 > MAX_BUFFER_SIZE {
                    return Err(GatewayError::compression(
                        "decompressed data exceeds maximum size",
                    ));
                }
                self.decompressed_buffer.reserve(capacity);
            }

            let in_before = self.inflater.total_in();
            let status = self
                .inflater
                .decompress_vec(
                    &self.compressed_buffer[total_in..],
                    &mut self.decompressed_buffer,
                    FlushDecompress::Sync,
                )
                .map_err(|e| GatewayError::compression(e.to_string()))?;

            total_in += usize::try_from(self.inflater.total_in() - in_before).unwrap_or(0);

            match status {
                Status::StreamEnd => break,
                Status::Ok | Status::BufError => {
                    let output_full =
                        self.decompressed_buffer.len() == self.decompressed_buffer.capacity();
                    if total_in >= self.compressed_buffer.len() && !output_full {
                        break;
                    }
                }
            }
        }

        String::from_utf8(std::mem::take(&mut self.decompressed_buffer))
            .map_err(|e| GatewayError::compression(format!("invalid UTF-8: {e}")))
    }

    pub fn reset(&mut self) {
        self.inflater.reset(true);
        self.compressed_buffer.clear();
        self.decompressed_buffer.clear();
    }
}

impl Default for ZlibStream {
    fn default() -> Self {
        Self::new()
    }
}

/// Stateless translation between text frames and operations.
pub struct OpCodec;

impl OpCodec {
    /// Parses one frame. Fails with `MalformedFrame` when the frame is not a
    /// well-formed operation of a recognised shape.
    pub fn decode(frame: &str) -> GatewayResult<Operation> {
        let message: GatewayMessage =
            serde_json::from_str(frame).map_err(|e| GatewayError::malformed(e.to_string()))?;

        let kind = Self::decode_kind(message.op, message.t, message.d)?;

        Ok(Operation {
            sequence: message.s,
            kind,
        })
    }

    /// Serializes an outbound operation. Never fails.
    #[must_use]
    pub fn encode(payload: &GatewayPayload) -> String {
        serde_json::json!({ "op": payload.op, "d": payload.d }).to_string()
    }

    fn decode_kind(op: u8, t: Option<String>, d: Option<Value>) -> GatewayResult<OperationKind> {
        let Some(opcode) = GatewayOpcode::from_u8(op) else {
            return Ok(OperationKind::Unknown { opcode: op });
        };

        let kind = match opcode {
            GatewayOpcode::Hello => {
                let data = d.ok_or_else(|| GatewayError::malformed("Hello missing data"))?;
                let hello: HelloPayload = serde_json::from_value(data)
                    .map_err(|e| GatewayError::malformed(format!("Failed to parse Hello: {e}")))?;
                if hello.heartbeat_interval == 0 {
                    return Err(GatewayError::malformed("Hello with zero heartbeat interval"));
                }
                OperationKind::Hello {
                    heartbeat_interval_ms: hello.heartbeat_interval,
                }
            }
            GatewayOpcode::Dispatch => {
                let name = t.ok_or_else(|| GatewayError::malformed("Dispatch missing event name"))?;
                OperationKind::Dispatch(Self::decode_dispatch(name, d.unwrap_or(Value::Null))?)
            }
            GatewayOpcode::Heartbeat => OperationKind::Heartbeat,
            GatewayOpcode::HeartbeatAck => OperationKind::HeartbeatAck,
            GatewayOpcode::Reconnect => OperationKind::Reconnect,
            GatewayOpcode::InvalidSession => OperationKind::InvalidSession {
                resumable: d.and_then(|d| d.as_bool()).unwrap_or(false),
            },
            GatewayOpcode::Identify
            | GatewayOpcode::PresenceUpdate
            | GatewayOpcode::VoiceStateUpdate
            | GatewayOpcode::Resume
            | GatewayOpcode::RequestGuildMembers => OperationKind::Unknown { opcode: op },
        };

        Ok(kind)
    }

    fn decode_dispatch(name: String, data: Value) -> GatewayResult<DispatchEvent> {
        let event = match name.as_str() {
            "READY" => {
                let ready: ReadyPayload = serde_json::from_value(data)
                    .map_err(|e| GatewayError::malformed(format!("Failed to parse Ready: {e}")))?;
                DispatchEvent::Ready {
                    session_id: ready.session_id,
                    resume_gateway_url: ready.resume_gateway_url,
                    user_id: ready.user.id,
                    shard: ready.shard,
                    unavailable_guilds: ready.guilds.into_iter().map(|g| g.id).collect(),
                }
            }
            "RESUMED" => DispatchEvent::Resumed,
            "GUILD_CREATE" => {
                let guild: GuildCreatePayload = serde_json::from_value(data).map_err(|e| {
                    GatewayError::malformed(format!("Failed to parse GUILD_CREATE: {e}"))
                })?;
                DispatchEvent::GuildCreate {
                    guild_id: guild.id,
                    unavailable: guild.unavailable,
                }
            }
            "GUILD_DELETE" => {
                let guild: GuildDeletePayload = serde_json::from_value(data).map_err(|e| {
                    GatewayError::malformed(format!("Failed to parse GUILD_DELETE: {e}"))
                })?;
                DispatchEvent::GuildDelete {
                    guild_id: guild.id,
                    unavailable: guild.unavailable,
                }
            }
            _ => DispatchEvent::Other { name, data },
        };

        Ok(event)
    }
}
