//! Trace files replayed into the cache

use anyhow::{Context, Result};
use nrt_cache::{CacheConfig, OverReserveCache, TopologySnapshot, Workload};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Log id used for every cache call made while replaying
pub const REPLAY_LOG_ID: &str = "nrtctl-replay";

/// Recorded cluster state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trace {
    /// Topology reports the cache starts from
    #[serde(default)]
    pub snapshots: Vec<TopologySnapshot>,
    /// Workloads the scheduler placed; each must name its node
    #[serde(default)]
    pub workloads: Vec<Workload>,
    /// Later topology reports offered for flushing
    #[serde(default)]
    pub reports: Vec<TopologySnapshot>,
}

impl Trace {
    /// Load a JSON trace file
    pub async fn load(path: &Path) -> Result<Self> {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read trace file {:?}", path))?;
        let trace: Trace = serde_json::from_slice(&data)
            .with_context(|| format!("Failed to parse trace file {:?}", path))?;
        info!(
            path = %path.display(),
            snapshots = trace.snapshots.len(),
            workloads = trace.workloads.len(),
            reports = trace.reports.len(),
            "Trace loaded"
        );
        Ok(trace)
    }

    /// Build a cache from the snapshots and reserve every placed workload
    pub fn replay(&self, config: CacheConfig) -> Result<OverReserveCache> {
        let cache = OverReserveCache::new(config, &self.snapshots);
        for workload in &self.workloads {
            let node = workload.node_name.as_deref().with_context(|| {
                format!("Workload {} has no nodeName", workload.key())
            })?;
            let existed = cache.reserve(REPLAY_LOG_ID, node, workload);
            debug!(node = %node, workload = %workload.key(), existed, "Replayed reservation");
        }
        Ok(cache)
    }
}
