//! Shard identity value object.

use std::fmt;

/// Position of one shard among `total` shards sharing a connection pool.
///
/// Both fields are fixed at construction; `index < total` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShardId {
    index: u32,
    total: u32,
}

impl ShardId {
    /// Creates a shard identity, rejecting `total == 0` and `index >= total`.
    #[must_use]
    pub const fn new(index: u32, total: u32) -> Option<Self> {
        if total == 0 || index >= total {
            return None;
        }
        Some(Self { index, total })
    }

    /// Identity of the only shard in a single-shard deployment.
    pub const SINGLE: Self = Self { index: 0, total: 1 };

    /// Returns the zero-based shard index.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Returns the total shard count.
    #[must_use]
    pub const fn total(self) -> u32 {
        self.total
    }

    /// Returns the `[index, total]` pair sent in the identify payload.
    #[must_use]
    pub const fn as_pair(self) -> [u32; 2] {
        [self.index, self.total]
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.total)
    }
}
