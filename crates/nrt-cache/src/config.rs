//! Cache configuration

use crate::error::Result;
use crate::models::{FINGERPRINT_ANNOTATION, ZONE_TYPE_NODE};
use serde::Deserialize;
use std::path::Path;

/// Environment prefix for configuration overrides (`NRT_CACHE_ZONE_TYPE`, ...)
pub const ENV_PREFIX: &str = "NRT_CACHE";

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CacheConfig {
    /// Zone granularity the reservation overlay applies to
    #[serde(default = "default_zone_type")]
    pub zone_type: String,

    /// Metadata key holding the published workload fingerprint
    #[serde(default = "default_fingerprint_annotation")]
    pub fingerprint_annotation: String,

    /// Consecutive stale flush attempts tolerated before escalating
    #[serde(default = "default_max_stale_flush_attempts")]
    pub max_stale_flush_attempts: u64,
}

fn default_zone_type() -> String {
    ZONE_TYPE_NODE.to_string()
}

fn default_fingerprint_annotation() -> String {
    FINGERPRINT_ANNOTATION.to_string()
}

fn default_max_stale_flush_attempts() -> u64 {
    5
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            zone_type: default_zone_type(),
            fingerprint_annotation: default_fingerprint_annotation(),
            max_stale_flush_attempts: default_max_stale_flush_attempts(),
        }
    }
}

impl CacheConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Load configuration from a file, with environment overrides on top
    pub fn from_file(path: &Path) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
