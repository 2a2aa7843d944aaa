//! Over-reserving topology cache
//!
//! Composes the stores the way a topology-aware scheduler uses them: topology
//! reports land in the snapshot store, the scheduler's own placements are
//! reserved on top of them until a report proves it has caught up, and nodes
//! whose availability may be overstated are tracked for a later flush.

use crate::config::CacheConfig;
use crate::fingerprint::{FingerprintReconciler, FingerprintStatus, NodeWorkloadIndex};
use crate::models::{TopologySnapshot, Workload};
use crate::observability::{CacheMetrics, StructuredLogger};
use crate::store::{Counter, NegativeAvailable, NrtStore, ResourceStore};
use std::sync::Arc;
use tracing::{debug, info};

/// A node's cached topology with pending reservations subtracted
#[derive(Debug, Clone)]
pub struct CachedTopology {
    pub snapshot: TopologySnapshot,
    /// Zone resources the overlay drove below zero
    pub negative: Vec<NegativeAvailable>,
}

/// Result of a flush pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushOutcome {
    /// Nodes whose snapshot was replaced and reservations dropped
    pub flushed: Vec<String>,
    /// Nodes whose report is still behind the locally known workloads
    pub stale: Vec<String>,
    /// Nodes whose report carries no fingerprint
    pub unverified: Vec<String>,
    /// Stale nodes that reached the attempt limit during this pass
    pub escalated: Vec<String>,
}

/// Topology cache that reserves in-flight placements until reports catch up
#[derive(Debug)]
pub struct OverReserveCache {
    config: CacheConfig,
    nrts: NrtStore,
    assumed: ResourceStore,
    placed: Arc<NodeWorkloadIndex>,
    reconciler: FingerprintReconciler,
    maybe_overreserved: Counter,
    stale_flushes: Counter,
    metrics: CacheMetrics,
    logger: StructuredLogger,
}

impl OverReserveCache {
    pub fn new(config: CacheConfig, snapshots: &[TopologySnapshot]) -> Self {
        let placed = Arc::new(NodeWorkloadIndex::new());
        let reconciler = FingerprintReconciler::new(placed.clone())
            .with_annotation(config.fingerprint_annotation.clone());
        info!(
            nodes = snapshots.len(),
            zone_type = %config.zone_type,
            "Topology cache initialized"
        );
        Self {
            nrts: NrtStore::new(snapshots),
            assumed: ResourceStore::with_zone_type(config.zone_type.clone()),
            placed,
            reconciler,
            maybe_overreserved: Counter::new(),
            stale_flushes: Counter::new(),
            metrics: CacheMetrics::new(),
            logger: StructuredLogger::new(),
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Store a topology report as delivered by the informer
    pub fn update_snapshot(&self, snapshot: &TopologySnapshot) {
        self.nrts.update(snapshot);
    }

    /// Copy of a node's topology with pending reservations subtracted
    pub fn get_cached_copy(&self, log_id: &str, node: &str) -> Option<CachedTopology> {
        let mut snapshot = self.nrts.get_copy_by_node_name(node)?;
        let negative = self.assumed.apply_overlay(log_id, &mut snapshot);
        debug!(
            log_id = %log_id,
            node = %node,
            reservations = self.assumed.workload_count(node),
            "Serving cached topology"
        );
        Some(CachedTopology { snapshot, negative })
    }

    /// Reserve a workload the scheduler just placed on a node
    ///
    /// Returns true if the workload was already reserved there.
    pub fn reserve(&self, log_id: &str, node: &str, workload: &Workload) -> bool {
        let existed = self.assumed.add_workload(node, workload);
        self.placed.observe_placed(node, workload);
        self.logger
            .log_reservation(log_id, node, &workload.key().to_string(), existed);
        existed
    }

    /// Undo a reservation after a failed binding
    ///
    /// The node may have been charged twice in the meantime, so it is marked
    /// as maybe over-reserved. Returns whether a reservation existed.
    pub fn unreserve(&self, log_id: &str, node: &str, workload: &Workload) -> bool {
        let existed = self.assumed.delete_workload(node, workload);
        self.placed.observe_removed(node, &workload.key());
        self.logger
            .log_release(log_id, node, &workload.key().to_string(), existed);
        self.mark_maybe_overreserved(log_id, node);
        existed
    }

    /// Informer event: a workload is running on its node
    ///
    /// Workloads without a node are ignored; they cannot be fingerprinted.
    pub fn workload_placed(&self, workload: &Workload) -> bool {
        match workload.node_name.as_deref() {
            Some(node) => self.placed.observe_placed(node, workload),
            None => false,
        }
    }

    /// Informer event: a workload is gone
    ///
    /// Drops it from the fingerprint index and any reservation still held
    /// for it. Returns whether the workload was known at all.
    pub fn workload_removed(&self, workload: &Workload) -> bool {
        let key = workload.key();
        let indexed = match workload.node_name.as_deref() {
            Some(node) => self.placed.observe_removed(node, &key),
            None => !self.placed.remove_anywhere(&key).is_empty(),
        };
        let reserved = match workload.node_name.as_deref() {
            Some(node) => self.assumed.delete_workload(node, workload),
            None => !self.assumed.forget_workload(&key).is_empty(),
        };
        indexed || reserved
    }

    /// Flag a node whose cached availability may be overstated
    pub fn mark_maybe_overreserved(&self, log_id: &str, node: &str) -> u64 {
        let count = self.maybe_overreserved.incr(node);
        debug!(log_id = %log_id, node = %node, count, "Node marked maybe over-reserved");
        count
    }

    /// Nodes waiting for a verified report, sorted
    pub fn nodes_maybe_overreserved(&self) -> Vec<String> {
        let mut nodes = self.maybe_overreserved.keys();
        nodes.sort();
        nodes
    }

    /// Fingerprint verdict for a report without acting on it
    pub fn check_snapshot(&self, snapshot: &TopologySnapshot) -> FingerprintStatus {
        self.reconciler.check(snapshot)
    }

    pub fn local_fingerprint(&self, node: &str) -> String {
        self.reconciler.compute_local_token(node)
    }

    /// Replace cached topology with reports that match the known workloads
    ///
    /// A consistent report accounts for the workloads its fingerprint was
    /// checked against, so their reservations and the node's flags are
    /// dropped with it. Reservations made after the comparison are kept.
    /// Anything else leaves the cache untouched.
    pub fn flush_nodes(&self, log_id: &str, snapshots: &[TopologySnapshot]) -> FlushOutcome {
        let mut outcome = FlushOutcome::default();

        for snapshot in snapshots {
            let node = snapshot.node_name.as_str();
            let verification = self.reconciler.verify(snapshot);
            match verification.status {
                FingerprintStatus::Consistent => {
                    self.nrts.update(snapshot);
                    let dropped = self
                        .assumed
                        .remove_keys(node, &verification.workload_keys());
                    self.maybe_overreserved.delete(node);
                    self.stale_flushes.delete(node);
                    self.metrics.inc_flushed_nodes();
                    self.logger.log_flush(log_id, node, dropped);
                    outcome.flushed.push(node.to_string());
                }
                FingerprintStatus::Stale => {
                    // incr hands out each count once, so exactly one pass sees the limit
                    let attempts = self.stale_flushes.incr(node);
                    if attempts == self.config.max_stale_flush_attempts {
                        self.metrics.inc_stale_escalations();
                        self.logger.log_stale_escalation(log_id, node, attempts);
                        outcome.escalated.push(node.to_string());
                    }
                    outcome.stale.push(node.to_string());
                }
                FingerprintStatus::Unverified => {
                    debug!(log_id = %log_id, node = %node, "Report carries no fingerprint, not flushed");
                    outcome.unverified.push(node.to_string());
                }
            }
        }

        outcome
    }

    /// Reservations currently held against a node
    pub fn reservation_count(&self, node: &str) -> usize {
        self.assumed.workload_count(node)
    }

    /// Workloads the fingerprint index knows on a node
    pub fn placed_count(&self, node: &str) -> usize {
        self.placed.count(node)
    }

    /// Stale flush attempts for a node since its last successful flush
    pub fn stale_attempts(&self, node: &str) -> u64 {
        self.stale_flushes.get(node).unwrap_or(0)
    }

    /// Names of nodes with a stored topology, sorted
    pub fn node_names(&self) -> Vec<String> {
        self.nrts.node_names()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Container, ResourceInfo, Zone, FINGERPRINT_ANNOTATION, RESOURCE_CPU};
    use crate::quantity::Quantity;

    fn q(s: &str) -> Quantity {
        Quantity::parse(s).unwrap()
    }

    fn report(node: &str, cpu_available: &str) -> TopologySnapshot {
        let mut snapshot = TopologySnapshot::new(node);
        snapshot.zones.push(Zone {
            name: "numa-0".to_string(),
            zone_type: "Node".to_string(),
            resources: vec![ResourceInfo::new(RESOURCE_CPU, q("16"), q(cpu_available))],
        });
        snapshot
    }

    fn pod(name: &str, cpu: &str) -> Workload {
        Workload::new("ns-0", name)
            .with_container(Container::new("cnt-0").with_request(RESOURCE_CPU, q(cpu)))
    }

    fn cpu_available(cached: &CachedTopology) -> Quantity {
        cached.snapshot.zones[0].resource(RESOURCE_CPU).unwrap().available
    }

    #[test]
    fn test_cached_copy_subtracts_reservations() {
        let cache = OverReserveCache::new(CacheConfig::default(), &[report("node-0", "16")]);
        assert!(!cache.reserve("cycle-1", "node-0", &pod("pod-0", "4")));

        let cached = cache.get_cached_copy("cycle-2", "node-0").unwrap();
        assert_eq!(cpu_available(&cached), q("12"));
        assert!(cached.negative.is_empty());
        assert!(cache.get_cached_copy("cycle-2", "node-9").is_none());
    }

    #[test]
    fn test_unreserve_marks_node() {
        let cache = OverReserveCache::new(CacheConfig::default(), &[report("node-0", "16")]);
        let workload = pod("pod-0", "4");
        cache.reserve("cycle-1", "node-0", &workload);

        assert!(cache.unreserve("cycle-1", "node-0", &workload));
        assert_eq!(cache.reservation_count("node-0"), 0);
        assert_eq!(cache.nodes_maybe_overreserved(), vec!["node-0"]);
    }

    #[test]
    fn test_flush_consistent_report() {
        let cache = OverReserveCache::new(CacheConfig::default(), &[report("node-0", "16")]);
        let workload = pod("pod-0", "4");
        cache.reserve("cycle-1", "node-0", &workload);
        cache.mark_maybe_overreserved("cycle-1", "node-0");

        let mut fresh = report("node-0", "12");
        fresh.set_annotation(FINGERPRINT_ANNOTATION, cache.local_fingerprint("node-0"));

        let outcome = cache.flush_nodes("resync", &[fresh]);
        assert_eq!(outcome.flushed, vec!["node-0"]);
        assert_eq!(cache.reservation_count("node-0"), 0);
        assert!(cache.nodes_maybe_overreserved().is_empty());

        // the report already accounts for pod-0, so it is not subtracted again
        let cached = cache.get_cached_copy("cycle-2", "node-0").unwrap();
        assert_eq!(cpu_available(&cached), q("12"));
        // but it is still part of the node's fingerprint
        assert_eq!(cache.placed_count("node-0"), 1);
    }

    #[test]
    fn test_flush_stale_report_escalates_once() {
        let config = CacheConfig {
            max_stale_flush_attempts: 2,
            ..CacheConfig::default()
        };
        let cache = OverReserveCache::new(config, &[report("node-0", "16")]);
        cache.reserve("cycle-1", "node-0", &pod("pod-0", "4"));

        let mut behind = report("node-0", "16");
        behind.set_annotation(FINGERPRINT_ANNOTATION, "pfp0v001outdated");

        let first = cache.flush_nodes("resync", &[behind.clone()]);
        assert_eq!(first.stale, vec!["node-0"]);
        assert!(first.escalated.is_empty());

        let second = cache.flush_nodes("resync", &[behind.clone()]);
        assert_eq!(second.escalated, vec!["node-0"]);

        let third = cache.flush_nodes("resync", &[behind]);
        assert!(third.escalated.is_empty());
        assert_eq!(cache.stale_attempts("node-0"), 3);

        // stale reports never replace the cached snapshot
        assert_eq!(cache.reservation_count("node-0"), 1);
        let cached = cache.get_cached_copy("cycle-2", "node-0").unwrap();
        assert_eq!(cpu_available(&cached), q("12"));
    }

    #[test]
    fn test_consistency_queries_do_not_skip_escalation() {
        let config = CacheConfig {
            max_stale_flush_attempts: 2,
            ..CacheConfig::default()
        };
        let cache = OverReserveCache::new(config, &[report("node-0", "16")]);
        cache.reserve("cycle-1", "node-0", &pod("pod-0", "4"));

        let mut behind = report("node-0", "16");
        behind.set_annotation(FINGERPRINT_ANNOTATION, "pfp0v001outdated");

        let mut escalations = Vec::new();
        for round in 0..5 {
            let outcome = cache.flush_nodes("resync", &[behind.clone()]);
            if !outcome.escalated.is_empty() {
                escalations.push(round);
            }
            assert_eq!(cache.check_snapshot(&behind), FingerprintStatus::Stale);
        }

        assert_eq!(escalations, vec![1]);
        assert_eq!(cache.stale_attempts("node-0"), 5);
    }

    #[test]
    fn test_consistent_flush_resets_stale_attempts() {
        let cache = OverReserveCache::new(CacheConfig::default(), &[report("node-0", "16")]);
        cache.reserve("cycle-1", "node-0", &pod("pod-0", "4"));

        let mut behind = report("node-0", "16");
        behind.set_annotation(FINGERPRINT_ANNOTATION, "pfp0v001outdated");
        cache.flush_nodes("resync", &[behind]);
        assert_eq!(cache.stale_attempts("node-0"), 1);

        let mut fresh = report("node-0", "12");
        fresh.set_annotation(FINGERPRINT_ANNOTATION, cache.local_fingerprint("node-0"));
        cache.flush_nodes("resync", &[fresh]);
        assert_eq!(cache.stale_attempts("node-0"), 0);
    }

    #[test]
    fn test_flush_keeps_reservations_made_during_the_pass() {
        let cache = Arc::new(OverReserveCache::new(
            CacheConfig::default(),
            &[report("node-0", "64")],
        ));
        cache.reserve("cycle-0", "node-0", &pod("pod-0", "1"));

        // this report only accounts for pod-0
        let mut fresh = report("node-0", "63");
        fresh.set_annotation(FINGERPRINT_ANNOTATION, cache.local_fingerprint("node-0"));

        let flusher = {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                for _ in 0..200 {
                    cache.flush_nodes("resync", &[fresh.clone()]);
                }
            })
        };
        let reserver = {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                for i in 1..=50 {
                    cache.reserve("cycle-1", "node-0", &pod(&format!("pod-{i}"), "1"));
                }
            })
        };
        flusher.join().unwrap();
        reserver.join().unwrap();

        let held = cache.reservation_count("node-0");
        assert!(held == 50 || held == 51, "held {held} reservations");
    }

    #[test]
    fn test_workload_removed_without_node_clears_every_node() {
        let cache = OverReserveCache::new(CacheConfig::default(), &[]);
        let workload = pod("pod-0", "1");
        cache.reserve("cycle-1", "node-0", &workload);
        cache.reserve("cycle-2", "node-1", &workload);

        assert!(cache.workload_removed(&workload));
        assert_eq!(cache.reservation_count("node-0"), 0);
        assert_eq!(cache.reservation_count("node-1"), 0);
        assert_eq!(cache.placed_count("node-1"), 0);
    }

    #[test]
    fn test_flush_unverified_report_is_ignored() {
        let cache = OverReserveCache::new(CacheConfig::default(), &[report("node-0", "16")]);
        let outcome = cache.flush_nodes("resync", &[report("node-0", "2")]);

        assert_eq!(outcome.unverified, vec!["node-0"]);
        let cached = cache.get_cached_copy("cycle-1", "node-0").unwrap();
        assert_eq!(cpu_available(&cached), q("16"));
    }

    #[test]
    fn test_workload_removed_drops_reservation() {
        let cache = OverReserveCache::new(CacheConfig::default(), &[report("node-0", "16")]);
        let workload = pod("pod-0", "4");
        cache.reserve("cycle-1", "node-0", &workload);

        // delete event without a node name still finds the reservation
        assert!(cache.workload_removed(&workload));
        assert_eq!(cache.reservation_count("node-0"), 0);
        assert_eq!(cache.placed_count("node-0"), 0);
        assert!(!cache.workload_removed(&workload));
    }

    #[test]
    fn test_workload_placed_requires_node() {
        let cache = OverReserveCache::new(CacheConfig::default(), &[]);
        assert!(!cache.workload_placed(&pod("pod-0", "1")));
        assert_eq!(cache.placed_count("node-0"), 0);

        cache.workload_placed(&pod("pod-0", "1").on_node("node-0"));
        assert_eq!(cache.placed_count("node-0"), 1);
    }
}
