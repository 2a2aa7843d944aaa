//! Fingerprint signing

use crate::models::{ResourceList, Workload, WorkloadKey};
use sha2::{Digest, Sha256};
use std::fmt::Write;

/// Version tag prepended to every signed fingerprint
pub const FINGERPRINT_PREFIX: &str = "pfp0v001";

/// Canonical digest input: a workload's identity and effective requests
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkloadShape {
    pub key: WorkloadKey,
    pub requests: ResourceList,
}

impl WorkloadShape {
    pub fn new(key: WorkloadKey, requests: ResourceList) -> Self {
        Self { key, requests }
    }

    pub fn from_workload(workload: &Workload) -> Self {
        Self::new(workload.key(), workload.effective_requests())
    }

    /// Render the shape as one canonical line
    ///
    /// Quantities are written in milli-units so "1Gi" and "1024Mi" agree;
    /// resources are already ordered by name.
    pub fn canonical(&self) -> String {
        let mut line = format!("{}/{}", self.key.namespace, self.key.name);
        for (name, qty) in &self.requests {
            // writing into a String cannot fail
            let _ = write!(line, ";{}={}", name, qty.millis());
        }
        line
    }
}

/// External digest over a node's workload set
///
/// Implementations must be deterministic and independent of input order.
pub trait WorkloadDigest: Send + Sync {
    fn digest(&self, shapes: &[WorkloadShape]) -> String;
}

/// Accumulates workload shapes and signs them
#[derive(Debug, Clone, Default)]
pub struct Fingerprint {
    lines: Vec<String>,
}

impl Fingerprint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lines: Vec::with_capacity(capacity),
        }
    }

    pub fn add(&mut self, shape: &WorkloadShape) {
        self.lines.push(shape.canonical());
    }

    pub fn add_workload(&mut self, workload: &Workload) {
        self.add(&WorkloadShape::from_workload(workload));
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Produce the versioned fingerprint token
    pub fn sign(&self) -> String {
        let mut lines: Vec<&str> = self.lines.iter().map(String::as_str).collect();
        lines.sort_unstable();

        let mut hasher = Sha256::new();
        for line in lines {
            hasher.update(line.as_bytes());
            hasher.update(b"\n");
        }
        format!("{FINGERPRINT_PREFIX}{}", hex::encode(hasher.finalize()))
    }
}

/// Default digest: SHA-256 over sorted canonical shapes
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Digest;

impl WorkloadDigest for Sha256Digest {
    fn digest(&self, shapes: &[WorkloadShape]) -> String {
        let mut fingerprint = Fingerprint::with_capacity(shapes.len());
        for shape in shapes {
            fingerprint.add(shape);
        }
        fingerprint.sign()
    }
}
