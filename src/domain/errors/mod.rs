//! Domain error types.

mod rest_error;

pub use rest_error::RestError;
