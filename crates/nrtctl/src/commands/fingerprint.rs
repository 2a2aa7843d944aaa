//! Local fingerprint computation

use anyhow::Result;
use nrt_cache::OverReserveCache;
use serde::Serialize;

use crate::output::OutputFormat;

#[derive(Debug, Serialize)]
struct FingerprintOutput<'a> {
    node: &'a str,
    workloads: usize,
    fingerprint: String,
}

/// Print the fingerprint of the workloads replayed onto a node
pub fn show_fingerprint(cache: &OverReserveCache, node: &str, format: OutputFormat) -> Result<()> {
    let output = FingerprintOutput {
        node,
        workloads: cache.placed_count(node),
        fingerprint: cache.local_fingerprint(node),
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
        OutputFormat::Table => println!("{}", output.fingerprint),
    }
    Ok(())
}
