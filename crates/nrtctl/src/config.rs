//! Configuration loading for the CLI

use anyhow::{Context, Result};
use nrt_cache::CacheConfig;
use std::path::Path;

/// Load cache configuration from a file if given, else from the environment
pub fn load(path: Option<&Path>) -> Result<CacheConfig> {
    match path {
        Some(path) => CacheConfig::from_file(path)
            .with_context(|| format!("Failed to load config file {:?}", path)),
        None => CacheConfig::load().context("Failed to load configuration from environment"),
    }
}
