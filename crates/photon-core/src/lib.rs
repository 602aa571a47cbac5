//! Photon Core Library
//!
//! This crate provides the configuration, error types and value parsing helpers
//! shared across all Photon components.

pub mod config;
pub mod error;
pub mod normalize;

// Re-export commonly used types
pub use config::{Config, Deployment, LogFormat};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use normalize::{
    normalize_string_to_undefined, parse_boolean, parse_number, require_string_with_message,
    MissingValue,
};
