//! Per-node topology snapshot store

use super::lock;
use crate::models::TopologySnapshot;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// Holds the latest topology snapshot of every known node
///
/// Snapshots are cloned on the way in and on the way out: the stored value is
/// never shared with a caller, so readers can mutate what they get back (for
/// example by applying the reservation overlay) without holding the lock.
#[derive(Debug, Default)]
pub struct NrtStore {
    data: Mutex<HashMap<String, TopologySnapshot>>,
}

impl NrtStore {
    /// Build a store from an initial batch of snapshots
    ///
    /// Later entries win when two snapshots name the same node.
    pub fn new(snapshots: &[TopologySnapshot]) -> Self {
        let data: HashMap<String, TopologySnapshot> = snapshots
            .iter()
            .map(|snapshot| (snapshot.node_name.clone(), snapshot.clone()))
            .collect();
        debug!(nodes = data.len(), "Topology store initialized");
        Self {
            data: Mutex::new(data),
        }
    }

    /// Get an independent copy of a node's snapshot
    pub fn get_copy_by_node_name(&self, node_name: &str) -> Option<TopologySnapshot> {
        lock(&self.data).get(node_name).cloned()
    }

    /// Store a copy of the snapshot, replacing any previous one for its node
    ///
    /// Unknown nodes are inserted: reports can arrive before the node shows
    /// up in any initial batch.
    pub fn update(&self, snapshot: &TopologySnapshot) {
        let mut data = lock(&self.data);
        let replaced = data
            .insert(snapshot.node_name.clone(), snapshot.clone())
            .is_some();
        debug!(node = %snapshot.node_name, replaced, "Topology snapshot stored");
    }

    pub fn contains(&self, node_name: &str) -> bool {
        lock(&self.data).contains_key(node_name)
    }

    /// Names of all stored nodes, sorted
    pub fn node_names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.data).keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        lock(&self.data).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.data).is_empty()
    }
}
