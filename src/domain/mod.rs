//! Domain layer with core entities and error types.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Serde utilities.
pub mod serde_utils;

pub use entities::{AuthToken, GuildId, ShardId, User};
pub use errors::RestError;
