//! Workload fingerprints and topology staleness detection
//!
//! This module provides:
//! - A canonical workload shape used as digest input
//! - Order-independent fingerprint signing (SHA-256, versioned prefix)
//! - A per-node index of the workloads believed placed on each node
//! - The reconciler comparing published and locally computed fingerprints

mod digest;
mod index;
mod reconciler;

pub use digest::{Fingerprint, Sha256Digest, WorkloadDigest, WorkloadShape, FINGERPRINT_PREFIX};
pub use index::NodeWorkloadIndex;
pub use reconciler::{FingerprintReconciler, FingerprintStatus, Verification};

/// Source of the workload set believed placed on a node
pub trait PlacedWorkloads: Send + Sync {
    fn workloads_on(&self, node: &str) -> Vec<WorkloadShape>;
}
