//! Fingerprint consistency report

use anyhow::Result;
use nrt_cache::{OverReserveCache, TopologySnapshot};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{color_fingerprint_status, print_rows, short_token, OutputFormat};

/// Row for the fingerprint check table
#[derive(Debug, Tabled, Serialize)]
pub struct CheckRow {
    #[tabled(rename = "Node")]
    pub node: String,
    #[tabled(rename = "Published")]
    pub published: String,
    #[tabled(rename = "Local")]
    pub local: String,
    #[tabled(rename = "Status")]
    pub status: String,
}

/// Compare every snapshot's published fingerprint with the replayed workloads
pub fn check_snapshots(
    cache: &OverReserveCache,
    snapshots: &[TopologySnapshot],
    format: OutputFormat,
) -> Result<()> {
    let annotation = cache.config().fingerprint_annotation.clone();
    let rows: Vec<CheckRow> = snapshots
        .iter()
        .map(|snapshot| {
            let status = cache.check_snapshot(snapshot);
            let published = snapshot.annotation(&annotation).unwrap_or_default();
            let local = cache.local_fingerprint(&snapshot.node_name);
            match format {
                OutputFormat::Table => CheckRow {
                    node: snapshot.node_name.clone(),
                    published: short_token(published),
                    local: short_token(&local),
                    status: color_fingerprint_status(status),
                },
                OutputFormat::Json => CheckRow {
                    node: snapshot.node_name.clone(),
                    published: published.to_string(),
                    local,
                    status: status.to_string(),
                },
            }
        })
        .collect();

    print_rows(&rows, format)
}

