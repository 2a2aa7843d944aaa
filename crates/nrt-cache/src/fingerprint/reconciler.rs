//! Published vs. locally computed fingerprint comparison

use super::{PlacedWorkloads, Sha256Digest, WorkloadDigest, WorkloadShape};
use crate::models::{TopologySnapshot, WorkloadKey, FINGERPRINT_ANNOTATION};
use crate::observability::{CacheMetrics, StructuredLogger};
use crate::store::Counter;
use std::fmt;
use std::sync::Arc;

/// Trust verdict for a node's published topology snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerprintStatus {
    /// The snapshot carries no fingerprint, so it cannot be checked
    Unverified,
    /// Published and local fingerprints match
    Consistent,
    /// Both fingerprints are present and differ
    Stale,
}

impl FingerprintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FingerprintStatus::Unverified => "unverified",
            FingerprintStatus::Consistent => "consistent",
            FingerprintStatus::Stale => "stale",
        }
    }
}

impl fmt::Display for FingerprintStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict for one snapshot together with the workloads it was checked against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub status: FingerprintStatus,
    pub workloads: Vec<WorkloadShape>,
}

impl Verification {
    /// Keys of the workloads the verdict covers
    pub fn workload_keys(&self) -> Vec<WorkloadKey> {
        self.workloads.iter().map(|shape| shape.key.clone()).collect()
    }
}

/// Decides whether a topology snapshot reflects the node's current workloads
///
/// The reconciler only compares; what to do with a stale snapshot is up to the
/// caller. Consecutive mismatches are counted per node and reset on the first
/// consistent report, so callers can bound how long they tolerate staleness.
pub struct FingerprintReconciler {
    annotation: String,
    digest: Arc<dyn WorkloadDigest>,
    workloads: Arc<dyn PlacedWorkloads>,
    mismatches: Counter,
    metrics: CacheMetrics,
    logger: StructuredLogger,
}

impl FingerprintReconciler {
    /// Create a reconciler over a workload source, using the default
    /// annotation key and SHA-256 digest
    pub fn new(workloads: Arc<dyn PlacedWorkloads>) -> Self {
        Self {
            annotation: FINGERPRINT_ANNOTATION.to_string(),
            digest: Arc::new(Sha256Digest),
            workloads,
            mismatches: Counter::new(),
            metrics: CacheMetrics::new(),
            logger: StructuredLogger::new(),
        }
    }

    /// Read the fingerprint from a different metadata key
    pub fn with_annotation(mut self, annotation: impl Into<String>) -> Self {
        self.annotation = annotation.into();
        self
    }

    /// Use a different digest implementation
    pub fn with_digest(mut self, digest: Arc<dyn WorkloadDigest>) -> Self {
        self.digest = digest;
        self
    }

    /// The fingerprint published in a snapshot's metadata
    ///
    /// Missing metadata, a missing key and an empty value all mean "no
    /// fingerprint".
    pub fn extract_token<'a>(&self, snapshot: &'a TopologySnapshot) -> Option<&'a str> {
        snapshot
            .annotation(&self.annotation)
            .filter(|token| !token.is_empty())
    }

    /// Fingerprint of the workloads currently believed placed on a node
    pub fn compute_local_token(&self, node: &str) -> String {
        let shapes = self.workloads.workloads_on(node);
        self.digest.digest(&shapes)
    }

    /// Compare the snapshot's published fingerprint with the local one
    pub fn check(&self, snapshot: &TopologySnapshot) -> FingerprintStatus {
        self.verify(snapshot).status
    }

    /// Compare like [`check`](Self::check), also returning the workload set
    /// the local fingerprint was computed from
    ///
    /// Callers acting on a consistent verdict should act on exactly this set;
    /// workloads placed after the comparison are not covered by it.
    pub fn verify(&self, snapshot: &TopologySnapshot) -> Verification {
        let node = &snapshot.node_name;
        let Some(published) = self.extract_token(snapshot) else {
            self.metrics.inc_fingerprint_check(FingerprintStatus::Unverified);
            self.logger
                .log_fingerprint(node, "", "", FingerprintStatus::Unverified);
            return Verification {
                status: FingerprintStatus::Unverified,
                workloads: Vec::new(),
            };
        };

        let workloads = self.workloads.workloads_on(node);
        let computed = self.digest.digest(&workloads);
        let status = if published == computed {
            self.mismatches.delete(node);
            FingerprintStatus::Consistent
        } else {
            self.mismatches.incr(node);
            FingerprintStatus::Stale
        };

        self.metrics.inc_fingerprint_check(status);
        self.logger.log_fingerprint(node, published, &computed, status);
        Verification { status, workloads }
    }

    /// True only when the snapshot carries a fingerprint equal to the local one
    pub fn is_consistent(&self, snapshot: &TopologySnapshot) -> bool {
        self.check(snapshot) == FingerprintStatus::Consistent
    }

    /// Stale verdicts for a node since its last consistent one
    pub fn consecutive_mismatches(&self, node: &str) -> u64 {
        self.mismatches.get(node).unwrap_or(0)
    }

    /// Forget a node's mismatch history
    pub fn reset(&self, node: &str) {
        self.mismatches.delete(node);
    }

    /// Nodes with at least one outstanding mismatch
    pub fn stale_nodes(&self) -> Vec<String> {
        let mut nodes = self.mismatches.keys();
        nodes.sort();
        nodes
    }
}

impl fmt::Debug for FingerprintReconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FingerprintReconciler")
            .field("annotation", &self.annotation)
            .field("mismatches", &self.mismatches)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::NodeWorkloadIndex;
    use crate::models::Workload;

    fn setup() -> (Arc<NodeWorkloadIndex>, FingerprintReconciler) {
        let index = Arc::new(NodeWorkloadIndex::new());
        let reconciler = FingerprintReconciler::new(index.clone());
        (index, reconciler)
    }

    #[test]
    fn test_extract_token_variants() {
        let (_, reconciler) = setup();
        let mut snapshot = TopologySnapshot::new("node-0");
        assert_eq!(reconciler.extract_token(&snapshot), None);

        snapshot.annotations = Some(Default::default());
        assert_eq!(reconciler.extract_token(&snapshot), None);

        snapshot.set_annotation(FINGERPRINT_ANNOTATION, "");
        assert_eq!(reconciler.extract_token(&snapshot), None);

        snapshot.set_annotation(FINGERPRINT_ANNOTATION, "test");
        assert_eq!(reconciler.extract_token(&snapshot), Some("test"));
    }

    #[test]
    fn test_state_transitions() {
        let (index, reconciler) = setup();
        index.observe_placed("node-0", &Workload::new("ns-0", "pod-0"));

        let mut snapshot = TopologySnapshot::new("node-0");
        assert_eq!(reconciler.check(&snapshot), FingerprintStatus::Unverified);

        snapshot.set_annotation(FINGERPRINT_ANNOTATION, "pfp0v001deadbeef");
        assert_eq!(reconciler.check(&snapshot), FingerprintStatus::Stale);
        assert_eq!(reconciler.check(&snapshot), FingerprintStatus::Stale);
        assert_eq!(reconciler.consecutive_mismatches("node-0"), 2);
        assert_eq!(reconciler.stale_nodes(), vec!["node-0"]);

        let local = reconciler.compute_local_token("node-0");
        snapshot.set_annotation(FINGERPRINT_ANNOTATION, local);
        assert_eq!(reconciler.check(&snapshot), FingerprintStatus::Consistent);
        assert_eq!(reconciler.consecutive_mismatches("node-0"), 0);
        assert!(reconciler.stale_nodes().is_empty());
    }

    #[test]
    fn test_verify_reports_checked_workloads() {
        let (index, reconciler) = setup();
        index.observe_placed("node-0", &Workload::new("ns-0", "pod-0"));

        let mut snapshot = TopologySnapshot::new("node-0");
        snapshot.set_annotation(FINGERPRINT_ANNOTATION, reconciler.compute_local_token("node-0"));
        let verification = reconciler.verify(&snapshot);

        // placements after the comparison are not part of the verdict
        index.observe_placed("node-0", &Workload::new("ns-0", "pod-1"));

        assert_eq!(verification.status, FingerprintStatus::Consistent);
        assert_eq!(
            verification.workload_keys(),
            vec![WorkloadKey::new("ns-0", "pod-0")]
        );

        let unverified = reconciler.verify(&TopologySnapshot::new("node-0"));
        assert_eq!(unverified.status, FingerprintStatus::Unverified);
        assert!(unverified.workloads.is_empty());
    }

    #[test]
    fn test_custom_annotation_key() {
        let (_, reconciler) = setup();
        let reconciler = reconciler.with_annotation("example.com/pfp");

        let mut snapshot = TopologySnapshot::new("node-0");
        snapshot.set_annotation(FINGERPRINT_ANNOTATION, "ignored");
        assert_eq!(reconciler.extract_token(&snapshot), None);

        snapshot.set_annotation("example.com/pfp", "used");
        assert_eq!(reconciler.extract_token(&snapshot), Some("used"));
    }

    struct FixedDigest;

    impl WorkloadDigest for FixedDigest {
        fn digest(&self, _shapes: &[crate::fingerprint::WorkloadShape]) -> String {
            "fixed".to_string()
        }
    }

    #[test]
    fn test_custom_digest() {
        let (_, reconciler) = setup();
        let reconciler = reconciler.with_digest(Arc::new(FixedDigest));

        let mut snapshot = TopologySnapshot::new("node-0");
        snapshot.set_annotation(FINGERPRINT_ANNOTATION, "fixed");
        assert!(reconciler.is_consistent(&snapshot));
    }
}
