//! Discord guild identifier.

use serde::{Deserialize, Serialize};

use super::ShardId;

/// Unique identifier for a Discord guild (server).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GuildId(#[serde(with = "crate::domain::serde_utils::snowflake")] pub u64);

impl GuildId {
    /// Returns the underlying u64 value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the shard index responsible for this guild among `total` shards.
    ///
    /// Discord routes guilds by the timestamp bits of the snowflake, so the
    /// mapping is stable for the lifetime of the guild.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn shard_index(self, total: u32) -> u32 {
        if total == 0 {
            return 0;
        }
        ((self.0 >> 22) % total as u64) as u32
    }

    /// Returns whether the given shard owns this guild.
    #[must_use]
    pub const fn belongs_to(self, shard: ShardId) -> bool {
        self.shard_index(shard.total()) == shard.index()
    }
}

impl std::fmt::Display for GuildId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for GuildId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl std::str::FromStr for GuildId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}
