//! Reservation overlay view

use anyhow::{bail, Result};
use colored::Colorize;
use nrt_cache::{CachedTopology, OverReserveCache};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{color_available, print_rows, print_warning, OutputFormat};
use crate::trace::REPLAY_LOG_ID;

/// Row for the adjusted availability table
#[derive(Debug, Tabled, Serialize)]
pub struct ZoneResourceRow {
    #[tabled(rename = "Node")]
    pub node: String,
    #[tabled(rename = "Zone")]
    pub zone: String,
    #[tabled(rename = "Type")]
    pub zone_type: String,
    #[tabled(rename = "Resource")]
    pub resource: String,
    #[tabled(rename = "Capacity")]
    pub capacity: String,
    #[tabled(rename = "Available")]
    pub available: String,
}

fn rows_for(cached: &CachedTopology, format: OutputFormat) -> Vec<ZoneResourceRow> {
    let mut rows = Vec::new();
    for zone in &cached.snapshot.zones {
        for info in &zone.resources {
            let available = match format {
                OutputFormat::Table => color_available(&info.available),
                OutputFormat::Json => info.available.to_string(),
            };
            rows.push(ZoneResourceRow {
                node: cached.snapshot.node_name.clone(),
                zone: zone.name.clone(),
                zone_type: zone.zone_type.clone(),
                resource: info.name.clone(),
                capacity: info.capacity.to_string(),
                available,
            });
        }
    }
    rows
}

/// Show zone availability with pending reservations subtracted
pub fn show_overlay(
    cache: &OverReserveCache,
    node: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let nodes = match node {
        Some(node) => vec![node.to_string()],
        None => cache.node_names(),
    };

    let mut rows = Vec::new();
    let mut negative = 0;
    for name in &nodes {
        let Some(cached) = cache.get_cached_copy(REPLAY_LOG_ID, name) else {
            if node.is_some() {
                bail!("Node {} has no topology snapshot in the trace", name);
            }
            continue;
        };
        negative += cached.negative.len();
        rows.extend(rows_for(&cached, format));
    }

    print_rows(&rows, format)?;

    if matches!(format, OutputFormat::Table) {
        let reservations: usize = nodes.iter().map(|n| cache.reservation_count(n)).sum();
        println!("\nReservations applied: {}", reservations.to_string().cyan());
    }
    if negative > 0 {
        print_warning(&format!(
            "{} zone resource(s) below zero: the topology report may already include reserved workloads",
            negative
        ));
    }
    Ok(())
}
