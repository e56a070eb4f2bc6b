//! Shared error taxonomy and CLI-facing types for omni.

pub mod error;
pub mod types;

pub use error::ConfigError;
