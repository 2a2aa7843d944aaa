//! Per-node index of placed workloads

use super::{PlacedWorkloads, WorkloadShape};
use crate::models::{Workload, WorkloadKey};
use crate::store::lock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// Workloads believed placed on each node
///
/// Unlike reservations, entries stay here for as long as the workload runs,
/// so the index describes the full set the node agent fingerprints.
#[derive(Debug, Default)]
pub struct NodeWorkloadIndex {
    nodes: Mutex<HashMap<String, BTreeMap<WorkloadKey, WorkloadShape>>>,
}

impl NodeWorkloadIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a workload on a node; returns true if it was already recorded
    pub fn observe_placed(&self, node: &str, workload: &Workload) -> bool {
        let shape = WorkloadShape::from_workload(workload);
        lock(&self.nodes)
            .entry(node.to_string())
            .or_default()
            .insert(shape.key.clone(), shape)
            .is_some()
    }

    /// Forget a workload on a node; returns true if it was recorded
    pub fn observe_removed(&self, node: &str, key: &WorkloadKey) -> bool {
        let mut nodes = lock(&self.nodes);
        let Some(workloads) = nodes.get_mut(node) else {
            return false;
        };
        let removed = workloads.remove(key).is_some();
        if workloads.is_empty() {
            nodes.remove(node);
        }
        removed
    }

    /// Forget a workload on every node recording it; returns those nodes,
    /// sorted
    pub fn remove_anywhere(&self, key: &WorkloadKey) -> Vec<String> {
        let mut nodes = lock(&self.nodes);
        let mut holders: Vec<String> = nodes
            .iter_mut()
            .filter_map(|(node, workloads)| workloads.remove(key).map(|_| node.clone()))
            .collect();
        nodes.retain(|_, workloads| !workloads.is_empty());
        holders.sort();
        holders
    }

    pub fn count(&self, node: &str) -> usize {
        lock(&self.nodes).get(node).map_or(0, BTreeMap::len)
    }
}

impl PlacedWorkloads for NodeWorkloadIndex {
    fn workloads_on(&self, node: &str) -> Vec<WorkloadShape> {
        lock(&self.nodes)
            .get(node)
            .map(|workloads| workloads.values().cloned().collect())
            .unwrap_or_default()
    }
}
