mod codec;
mod constants;
mod coordinator;
mod error;
mod events;
mod guilds;
mod heartbeat;
mod machine;
mod payloads;
mod session;
mod shard;
mod state;
mod transport;

pub use codec::{OpCodec, ZlibStream};
pub use constants::{
    GATEWAY_URL, GatewayIntent, GatewayIntents, GatewayOpcode, LARGE_THRESHOLD,
    MAX_RECONNECT_ATTEMPTS, MIN_SHARD_SPAWN_DELAY, gateway_url,
};
pub use coordinator::{ShardGroup, ShardGroupConfig};
pub use error::{GatewayCloseCode, GatewayError, GatewayResult};
pub use events::{DispatchEvent, Operation, OperationKind, ShardCommand, ShardEvent};
pub use guilds::{GuildInsert, GuildSet};
pub use heartbeat::{HeartbeatDue, HeartbeatMonitor};
pub use machine::{ShardAction, ShardMachine};
pub use payloads::{GatewayPayload, IdentifyData, RequestGuildMembers};
pub use session::SessionInfo;
pub use shard::{Shard, ShardConfig, ShardHandle, ShardReport};
pub use state::{SessionState, ShardStatus};
pub use transport::{GatewayTransport, TransportFactory, WebSocketTransport};
