//! In-flight reservation overlay
//!
//! Tracks resources consumed by workloads the scheduler has placed but that
//! the node's topology report does not reflect yet, and subtracts them from a
//! snapshot's availability on demand.

use super::lock;
use crate::fingerprint::{PlacedWorkloads, WorkloadShape};
use crate::models::{ResourceList, TopologySnapshot, Workload, WorkloadKey, ZONE_TYPE_NODE};
use crate::observability::{CacheMetrics, StructuredLogger};
use crate::quantity::Quantity;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;
use tracing::debug;

type NodeReservations = HashMap<WorkloadKey, ResourceList>;

/// A zone resource left below zero after the overlay was applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegativeAvailable {
    pub node: String,
    pub zone: String,
    pub resource: String,
    pub available: Quantity,
}

/// Reservations partitioned by node, keyed by workload identity
#[derive(Debug)]
pub struct ResourceStore {
    zone_type: String,
    nodes: Mutex<HashMap<String, NodeReservations>>,
    metrics: CacheMetrics,
    logger: StructuredLogger,
}

impl Default for ResourceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceStore {
    /// Create a store whose overlay applies to "Node" zones
    pub fn new() -> Self {
        Self::with_zone_type(ZONE_TYPE_NODE)
    }

    /// Create a store whose overlay applies to zones of the given type
    pub fn with_zone_type(zone_type: impl Into<String>) -> Self {
        Self {
            zone_type: zone_type.into(),
            nodes: Mutex::new(HashMap::new()),
            metrics: CacheMetrics::new(),
            logger: StructuredLogger::new(),
        }
    }

    /// Reserve a workload's effective request on a node
    ///
    /// Returns true if a reservation for the same workload already existed on
    /// that node; the new request replaces it.
    pub fn add_workload(&self, node: &str, workload: &Workload) -> bool {
        let key = workload.key();
        let requests = workload.effective_requests();

        let existed = {
            let mut nodes = lock(&self.nodes);
            nodes
                .entry(node.to_string())
                .or_default()
                .insert(key.clone(), requests)
                .is_some()
        };

        if existed {
            self.metrics.inc_duplicate_event("add");
        } else {
            self.metrics.inc_reservations();
        }
        debug!(node = %node, workload = %key, existed, "Workload reservation recorded");
        existed
    }

    /// Drop a workload's reservation on a node
    ///
    /// Returns whether a reservation was present. Absent workloads are not an
    /// error: delete events can be replayed.
    pub fn delete_workload(&self, node: &str, workload: &Workload) -> bool {
        let key = workload.key();
        let existed = {
            let mut nodes = lock(&self.nodes);
            let removed = match nodes.get_mut(node) {
                Some(reservations) => reservations.remove(&key).is_some(),
                None => false,
            };
            if nodes.get(node).is_some_and(HashMap::is_empty) {
                nodes.remove(node);
            }
            removed
        };

        if existed {
            self.metrics.sub_reservations(1);
        } else {
            self.metrics.inc_duplicate_event("delete");
        }
        debug!(node = %node, workload = %key, existed, "Workload reservation dropped");
        existed
    }

    /// Drop a workload's reservation from every node holding it
    ///
    /// Returns the nodes the reservation was attributed to, sorted.
    pub fn forget_workload(&self, key: &WorkloadKey) -> Vec<String> {
        let mut nodes = lock(&self.nodes);
        let mut holders: Vec<String> = nodes
            .iter_mut()
            .filter_map(|(node, reservations)| {
                reservations.remove(key).map(|_| node.clone())
            })
            .collect();
        nodes.retain(|_, reservations| !reservations.is_empty());
        drop(nodes);

        if !holders.is_empty() {
            self.metrics.sub_reservations(holders.len() as i64);
        }
        holders.sort();
        holders
    }

    /// Drop the given workloads' reservations on a node
    ///
    /// Reservations for other workloads on the node are kept. Returns how many
    /// were dropped.
    pub fn remove_keys(&self, node: &str, keys: &[WorkloadKey]) -> usize {
        let dropped = {
            let mut nodes = lock(&self.nodes);
            let Some(reservations) = nodes.get_mut(node) else {
                return 0;
            };
            let before = reservations.len();
            for key in keys {
                reservations.remove(key);
            }
            let dropped = before - reservations.len();
            if reservations.is_empty() {
                nodes.remove(node);
            }
            dropped
        };
        if dropped > 0 {
            self.metrics.sub_reservations(dropped as i64);
        }
        dropped
    }

    /// Drop every reservation held against a node
    ///
    /// Used once a verified topology report has absorbed them. Returns how
    /// many reservations were dropped.
    pub fn clear_node(&self, node: &str) -> usize {
        let dropped = lock(&self.nodes)
            .remove(node)
            .map(|reservations| reservations.len())
            .unwrap_or(0);
        if dropped > 0 {
            self.metrics.sub_reservations(dropped as i64);
        }
        dropped
    }

    /// Summed reservations per resource for one node
    pub fn reservations_for(&self, node: &str) -> ResourceList {
        let nodes = lock(&self.nodes);
        let mut total = ResourceList::new();
        if let Some(reservations) = nodes.get(node) {
            for requests in reservations.values() {
                for (name, qty) in requests {
                    *total.entry(name.clone()).or_insert_with(Quantity::zero) += *qty;
                }
            }
        }
        total
    }

    /// Subtract the node's reservations from the snapshot's zone availability
    ///
    /// Only zones of the configured type are touched, and a reservation only
    /// affects zones that publish the same resource name. The scheduler does
    /// not know which zone the kubelet picked, so the full reservation is
    /// charged against every matching zone. Capacity is left untouched and
    /// results below zero are reported, never clamped.
    pub fn apply_overlay(
        &self,
        log_id: &str,
        snapshot: &mut TopologySnapshot,
    ) -> Vec<NegativeAvailable> {
        let start = Instant::now();
        let reserved = self.reservations_for(&snapshot.node_name);
        let mut anomalies = Vec::new();

        if !reserved.is_empty() {
            for zone in snapshot
                .zones
                .iter_mut()
                .filter(|zone| zone.zone_type == self.zone_type)
            {
                for info in zone.resources.iter_mut() {
                    let Some(qty) = reserved.get(&info.name) else {
                        continue;
                    };
                    info.available -= *qty;

                    if info.available.is_negative() {
                        self.metrics.inc_negative_available();
                        self.logger.log_negative_available(
                            log_id,
                            &snapshot.node_name,
                            &zone.name,
                            &info.name,
                            &info.available.to_string(),
                        );
                        anomalies.push(NegativeAvailable {
                            node: snapshot.node_name.clone(),
                            zone: zone.name.clone(),
                            resource: info.name.clone(),
                            available: info.available,
                        });
                    }
                }
            }
        }

        self.metrics
            .observe_overlay_latency(start.elapsed().as_secs_f64());
        anomalies
    }

    /// Number of reservations held against a node
    pub fn workload_count(&self, node: &str) -> usize {
        lock(&self.nodes).get(node).map_or(0, HashMap::len)
    }

    /// Nodes with at least one reservation, sorted
    pub fn nodes(&self) -> Vec<String> {
        let mut nodes: Vec<String> = lock(&self.nodes).keys().cloned().collect();
        nodes.sort();
        nodes
    }
}

impl PlacedWorkloads for ResourceStore {
    fn workloads_on(&self, node: &str) -> Vec<WorkloadShape> {
        lock(&self.nodes)
            .get(node)
            .map(|reservations| {
                reservations
                    .iter()
                    .map(|(key, requests)| WorkloadShape::new(key.clone(), requests.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}
