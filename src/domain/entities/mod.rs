//! Domain entity definitions.

mod guild;
mod message;
mod shard;
mod token;
mod user;

pub use guild::GuildId;
pub use message::{ChannelId, Message, MessageId};
pub use shard::ShardId;
pub use token::AuthToken;
pub use user::{User, UserId};
