//! Error types for the tiered cache

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error carried by [`Error::Fetch`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in the cache
#[derive(Error, Debug)]
pub enum Error {
    /// Identifier is not in the known-set. Not a fault: the caller must fill it.
    #[error("Key '{identifier}' is not known to cache")]
    NotFound { identifier: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Remote refresh of an expired entry failed. The stale file is left in place.
    #[error("Refreshing '{key}' from remote failed: {source}")]
    Fetch {
        key: String,
        #[source]
        source: BoxError,
    },

    /// Key could not be normalized
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    /// TTL rule could not be compiled
    #[error("Invalid TTL rule '{name}': {reason}")]
    InvalidRule { name: String, reason: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metrics registration or encoding error
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// Duration parse error
    #[error("Failed to parse duration: {0}")]
    DurationParse(String),

    /// A fill permit was presented for a different identifier than the key being written
    #[error("Fill permit for '{actual}' cannot be used to write '{expected}'")]
    PermitMismatch { expected: String, actual: String },
}

impl Error {
    /// Returns true for the legitimate "never cached" result.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Returns true if a TTL refresh failed.
    pub fn is_fetch(&self) -> bool {
        matches!(self, Error::Fetch { .. })
    }
}
