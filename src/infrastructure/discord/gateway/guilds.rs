use std::collections::HashSet;

use crate::domain::{GuildId, ShardId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuildInsert {
    Added,
    Duplicate,
    /// The guild hashes to another shard and was not recorded.
    ForeignBucket { owner: u32 },
}

/// Guilds announced to one shard. Only guilds in the shard's own bucket are
/// ever stored, so two shards of one group never share an entry.
#[derive(Debug, Clone)]
pub struct GuildSet {
    shard: ShardId,
    guilds: HashSet<GuildId>,
}

impl GuildSet {
    #[must_use]
    pub fn new(shard: ShardId) -> Self {
        Self {
            shard,
            guilds: HashSet::new(),
        }
    }

    pub fn insert(&mut self, guild_id: GuildId) -> GuildInsert {
        if !guild_id.belongs_to(self.shard) {
            return GuildInsert::ForeignBucket {
                owner: guild_id.shard_index(self.shard.total()),
            };
        }

        if self.guilds.insert(guild_id) {
            GuildInsert::Added
        } else {
            GuildInsert::Duplicate
        }
    }

    pub fn remove(&mut self, guild_id: GuildId) -> bool {
        self.guilds.remove(&guild_id)
    }

    #[must_use]
    pub fn contains(&self, guild_id: GuildId) -> bool {
        self.guilds.contains(&guild_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.guilds.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.guilds.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = GuildId> + '_ {
        self.guilds.iter().copied()
    }

    pub fn clear(&mut self) {
        self.guilds.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guild_in_bucket(bucket: u64, salt: u64) -> GuildId {
        GuildId((salt * 4 + bucket) << 22)
    }

    #[test]
    fn test_duplicate_insert_is_idempotent() {
        let mut set = GuildSet::new(ShardId::SINGLE);
        assert_eq!(set.insert(GuildId(42)), GuildInsert::Added);
        assert_eq!(set.insert(GuildId(42)), GuildInsert::Duplicate);
        assert_eq!(set.insert(GuildId(43)), GuildInsert::Added);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_size_matches_distinct_ids() {
        let mut set = GuildSet::new(ShardId::SINGLE);
        let deliveries = [1_u64, 2, 2, 3, 1, 1, 5, 3];
        for id in deliveries {
            set.insert(GuildId(id));
        }

        let distinct: HashSet<_> = deliveries.iter().collect();
        assert_eq!(set.len(), distinct.len());
    }

    #[test]
    fn test_foreign_bucket_rejected() {
        let shard = ShardId::new(1, 4).unwrap();
        let mut set = GuildSet::new(shard);

        assert_eq!(set.insert(guild_in_bucket(1, 7)), GuildInsert::Added);
        assert_eq!(
            set.insert(guild_in_bucket(3, 7)),
            GuildInsert::ForeignBucket { owner: 3 }
        );
        assert_eq!(set.len(), 1);
        assert!(!set.contains(guild_in_bucket(3, 7)));
    }

    #[test]
    fn test_partition_is_disjoint() {
        let total = 4;
        let mut sets: Vec<_> = (0..total)
            .map(|i| GuildSet::new(ShardId::new(i, total).unwrap()))
            .collect();

        for salt in 0..10 {
            for bucket in 0..4 {
                for set in &mut sets {
                    set.insert(guild_in_bucket(bucket, salt));
                }
            }
        }

        assert!(sets.iter().all(|set| set.len() == 10));
        for (i, a) in sets.iter().enumerate() {
            for b in sets.iter().skip(i + 1) {
                assert!(a.iter().all(|id| !b.contains(id)));
            }
        }
    }

    #[test]
    fn test_remove() {
        let mut set = GuildSet::new(ShardId::SINGLE);
        set.insert(GuildId(42));
        assert!(set.remove(GuildId(42)));
        assert!(!set.remove(GuildId(42)));
        assert!(set.is_empty());
    }
}
