//! Consistency-aware cache for node resource topology
//!
//! This crate provides the core functionality for:
//! - Copy-isolated storage of per-node topology snapshots
//! - Overlaying in-flight workload reservations onto zone availability
//! - Per-key occurrence counters for retry and resync gating
//! - Fingerprint-based detection of stale topology reports
//! - Metrics and structured logging of cache events

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod models;
pub mod observability;
pub mod overreserve;
pub mod quantity;
pub mod store;

pub use crate::config::CacheConfig;
pub use error::{CacheError, Result};
pub use fingerprint::{
    Fingerprint, FingerprintReconciler, FingerprintStatus, NodeWorkloadIndex, PlacedWorkloads,
    Sha256Digest, Verification, WorkloadDigest, WorkloadShape,
};
pub use models::*;
pub use observability::{CacheMetrics, StructuredLogger};
pub use overreserve::{CachedTopology, FlushOutcome, OverReserveCache};
pub use quantity::{Quantity, QuantityFormat};
pub use store::{Counter, NegativeAvailable, NrtStore, ResourceStore};
