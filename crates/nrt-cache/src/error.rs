//! Error types for the topology cache
//!
//! Cache operations themselves are total: unknown nodes and missing keys are
//! reported as absent values. Errors only arise at the edges, when decoding
//! resource quantities or loading configuration.

use thiserror::Error;

/// Errors surfaced by the cache crate
#[derive(Debug, Error)]
pub enum CacheError {
    /// A resource quantity string could not be parsed
    #[error("invalid quantity {input:?}: {reason}")]
    InvalidQuantity { input: String, reason: &'static str },

    /// A quantity does not fit the fixed-point representation
    #[error("quantity {0:?} is out of range")]
    QuantityOverflow(String),

    /// Configuration could not be loaded or decoded
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

/// Result alias for fallible cache helpers
pub type Result<T> = std::result::Result<T, CacheError>;
