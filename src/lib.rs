//! oxishard - a sharded Discord gateway client.
//!
//! The gateway engine lives in [`infrastructure::discord::gateway`]: one
//! [`infrastructure::Shard`] per connection, grouped and staggered by
//! [`infrastructure::ShardGroup`]. Domain types (shard and guild identifiers,
//! tokens, users) live in [`domain`].

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Domain layer containing entities and error types.
pub mod domain;
/// Infrastructure layer containing the gateway engine and its adapters.
pub mod infrastructure;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "oxishard";
