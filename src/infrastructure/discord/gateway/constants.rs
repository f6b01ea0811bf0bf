use std::time::Duration;

pub const GATEWAY_URL: &str = "wss://gateway.discord.gg";
pub const GATEWAY_VERSION: u8 = 10;
pub const ZLIB_SUFFIX: [u8; 4] = [0x00, 0x00, 0xff, 0xff];

/// Consecutive unacknowledged heartbeats after which the connection is dead.
pub const MAX_MISSED_HEARTBEAT_ACKS: u32 = 2;

pub const RECONNECT_DELAY_BASE: Duration = Duration::from_secs(1);
pub const RECONNECT_DELAY_MAX: Duration = Duration::from_secs(60);
pub const RECONNECT_JITTER_MAX: Duration = Duration::from_millis(500);
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Platform identify rate limit: one shard connect per five seconds.
pub const MIN_SHARD_SPAWN_DELAY: Duration = Duration::from_secs(5);

pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);
pub const HELLO_TIMEOUT: Duration = Duration::from_secs(10);

pub const CLOSE_NORMAL: u16 = 1000;
/// Non-1000 close code so the server keeps the session resumable.
pub const CLOSE_RESUMABLE: u16 = 4000;

pub const CLIENT_PROPERTIES_BROWSER: &str = "oxishard";
pub const CLIENT_PROPERTIES_DEVICE: &str = "oxishard";

pub const LARGE_THRESHOLD: u16 = 250;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOpcode {
    Dispatch = 0,
    Heartbeat = 1,
    Identify = 2,
    PresenceUpdate = 3,
    VoiceStateUpdate = 4,
    Resume = 6,
    Reconnect = 7,
    RequestGuildMembers = 8,
    InvalidSession = 9,
    Hello = 10,
    HeartbeatAck = 11,
}

impl GatewayOpcode {
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Dispatch),
            1 => Some(Self::Heartbeat),
            2 => Some(Self::Identify),
            3 => Some(Self::PresenceUpdate),
            4 => Some(Self::VoiceStateUpdate),
            6 => Some(Self::Resume),
            7 => Some(Self::Reconnect),
            8 => Some(Self::RequestGuildMembers),
            9 => Some(Self::InvalidSession),
            10 => Some(Self::Hello),
            11 => Some(Self::HeartbeatAck),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl From<GatewayOpcode> for u8 {
    fn from(opcode: GatewayOpcode) -> Self {
        opcode.as_u8()
    }
}

/// Intents the engine names. Other bits pass through
/// [`GatewayIntents::from_bits`] untouched.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayIntent {
    Guilds = 1 << 0,
    GuildPresences = 1 << 8,
    GuildMessages = 1 << 9,
    DirectMessages = 1 << 12,
    MessageContent = 1 << 15,
}

impl GatewayIntent {
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }
}

impl From<GatewayIntent> for u32 {
    fn from(intent: GatewayIntent) -> Self {
        intent.as_u32()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GatewayIntents(u32);

impl GatewayIntents {
    #[must_use]
    pub const fn new() -> Self {
        Self(0)
    }

    /// Wraps a raw intent bitfield as passed on the command line.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn with(mut self, intent: GatewayIntent) -> Self {
        self.0 |= intent.as_u32();
        self
    }

    #[must_use]
    pub const fn has(self, intent: GatewayIntent) -> bool {
        (self.0 & intent.as_u32()) != 0
    }

    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Non-privileged intents a guild-tracking bot needs.
    #[must_use]
    pub const fn default_bot() -> Self {
        Self::new()
            .with(GatewayIntent::Guilds)
            .with(GatewayIntent::GuildMessages)
            .with(GatewayIntent::DirectMessages)
    }
}

impl From<GatewayIntents> for u32 {
    fn from(intents: GatewayIntents) -> Self {
        intents.as_u32()
    }
}

impl From<u32> for GatewayIntents {
    fn from(bits: u32) -> Self {
        Self::from_bits(bits)
    }
}

/// Builds the connect URL for a gateway base (default or resume URL).
#[must_use]
pub fn gateway_url(base: &str, compress: bool) -> String {
    let base = base.trim_end_matches('/');
    let mut url = format!("{base}/?v={GATEWAY_VERSION}&encoding=json");
    if compress {
        url.push_str("&compress=zlib-stream");
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip() {
        for opcode in [
            GatewayOpcode::Dispatch,
            GatewayOpcode::Heartbeat,
            GatewayOpcode::Identify,
            GatewayOpcode::RequestGuildMembers,
            GatewayOpcode::Hello,
            GatewayOpcode::HeartbeatAck,
        ] {
            let value = opcode.as_u8();
            assert_eq!(GatewayOpcode::from_u8(value), Some(opcode));
        }
        assert_eq!(GatewayOpcode::from_u8(5), None);
        assert_eq!(GatewayOpcode::from_u8(42), None);
    }

    #[test]
    fn test_intents_builder() {
        let intents = GatewayIntents::default_bot();
        assert!(intents.has(GatewayIntent::Guilds));
        assert!(intents.has(GatewayIntent::GuildMessages));
        assert!(!intents.has(GatewayIntent::GuildPresences));
        assert!(!intents.has(GatewayIntent::MessageContent));
    }

    #[test]
    fn test_intents_from_raw_bits() {
        let intents = GatewayIntents::from(513);
        assert!(intents.has(GatewayIntent::Guilds));
        assert!(intents.has(GatewayIntent::GuildMessages));
        assert_eq!(u32::from(intents), 513);

        let members = GatewayIntents::from_bits(1 << 1).with(GatewayIntent::Guilds);
        assert_eq!(members.as_u32(), 0b11);
        assert!(!members.has(GatewayIntent::GuildPresences));
    }

    #[test]
    fn test_gateway_url() {
        assert_eq!(
            gateway_url(GATEWAY_URL, false),
            "wss://gateway.discord.gg/?v=10&encoding=json"
        );
        assert_eq!(
            gateway_url("wss://resume.discord.gg/", true),
            "wss://resume.discord.gg/?v=10&encoding=json&compress=zlib-stream"
        );
    }
}
