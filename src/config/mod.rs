//! Persisted preferences
//!
//! Preferences are a read-only key/value source backed by an optional JSON
//! file. Every key has a default, so a missing file or a partial file is
//! always usable.

pub mod preferences;

use thiserror::Error;

pub use preferences::{PresenterPreferences, Preferences, StreamPreferences};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Preferences file could not be read
    #[error("failed to read preferences: {0}")]
    Io(#[from] std::io::Error),

    /// Preferences file is not valid JSON for the expected schema
    #[error("failed to parse preferences: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is outside its allowed range
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
