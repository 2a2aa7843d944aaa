//! Flush pass over later topology reports

use anyhow::Result;
use colored::Colorize;
use nrt_cache::{OverReserveCache, TopologySnapshot};

use crate::output::{print_info, print_warning, OutputFormat};
use crate::trace::REPLAY_LOG_ID;

/// Offer the trace's later reports to the cache and show what was trusted
pub fn flush_reports(
    cache: &OverReserveCache,
    reports: &[TopologySnapshot],
    format: OutputFormat,
) -> Result<()> {
    if reports.is_empty() {
        print_info("Trace contains no reports to flush");
        return Ok(());
    }

    let outcome = cache.flush_nodes(REPLAY_LOG_ID, reports);

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "flushed": &outcome.flushed,
                "stale": &outcome.stale,
                "unverified": &outcome.unverified,
                "escalated": &outcome.escalated,
                "maybeOverreserved": cache.nodes_maybe_overreserved(),
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Table => {
            println!("{}", "Flush Result".bold());
            println!("{}", "=".repeat(40));
            println!("Flushed:    {}", outcome.flushed.join(", ").green());
            println!("Stale:      {}", outcome.stale.join(", ").red());
            println!("Unverified: {}", outcome.unverified.join(", ").yellow());
            for node in &outcome.escalated {
                print_warning(&format!(
                    "{} reached {} stale reports",
                    node,
                    cache.stale_attempts(node)
                ));
            }
        }
    }

    Ok(())
}
