//! Core data models for the topology cache

use crate::quantity::Quantity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Zone granularity published for NUMA cells
pub const ZONE_TYPE_NODE: &str = "Node";

/// Metadata key carrying the node agent's workload fingerprint
pub const FINGERPRINT_ANNOTATION: &str = "topology.node.k8s.io/fingerprint";

pub const RESOURCE_CPU: &str = "cpu";
pub const RESOURCE_MEMORY: &str = "memory";

/// Per-resource quantities, ordered by resource name
pub type ResourceList = BTreeMap<String, Quantity>;

/// Capacity and availability of one resource inside a zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub name: String,
    pub capacity: Quantity,
    pub available: Quantity,
}

impl ResourceInfo {
    pub fn new(name: impl Into<String>, capacity: Quantity, available: Quantity) -> Self {
        Self {
            name: name.into(),
            capacity,
            available,
        }
    }
}

/// A topology partition of a machine, typically a NUMA cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    #[serde(rename = "type")]
    pub zone_type: String,
    #[serde(default)]
    pub resources: Vec<ResourceInfo>,
}

impl Zone {
    /// Look up a resource by name
    pub fn resource(&self, name: &str) -> Option<&ResourceInfo> {
        self.resources.iter().find(|r| r.name == name)
    }

    pub fn resource_mut(&mut self, name: &str) -> Option<&mut ResourceInfo> {
        self.resources.iter_mut().find(|r| r.name == name)
    }
}

/// Resource topology report published by a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologySnapshot {
    pub node_name: String,
    #[serde(default)]
    pub topology_policies: Vec<String>,
    #[serde(default)]
    pub zones: Vec<Zone>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

impl TopologySnapshot {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            topology_policies: Vec::new(),
            zones: Vec::new(),
            annotations: None,
        }
    }

    /// Read a metadata annotation, if present
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations
            .as_ref()
            .and_then(|a| a.get(key))
            .map(String::as_str)
    }

    pub fn set_annotation(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
    }

    pub fn zone(&self, name: &str) -> Option<&Zone> {
        self.zones.iter().find(|z| z.name == name)
    }
}

/// Stable identity of a workload across nodes
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkloadKey {
    pub namespace: String,
    pub name: String,
}

impl WorkloadKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for WorkloadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// One sub-unit (container) of a workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    #[serde(default)]
    pub requests: ResourceList,
}

impl Container {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requests: ResourceList::new(),
        }
    }

    pub fn with_request(mut self, resource: impl Into<String>, quantity: Quantity) -> Self {
        self.requests.insert(resource.into(), quantity);
        self
    }
}

/// A schedulable workload (pod) and its resource requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workload {
    pub namespace: String,
    pub name: String,
    /// Node the workload is bound or assumed to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(default)]
    pub init_containers: Vec<Container>,
}

impl Workload {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            node_name: None,
            containers: Vec::new(),
            init_containers: Vec::new(),
        }
    }

    pub fn on_node(mut self, node_name: impl Into<String>) -> Self {
        self.node_name = Some(node_name.into());
        self
    }

    pub fn with_container(mut self, container: Container) -> Self {
        self.containers.push(container);
        self
    }

    pub fn with_init_container(mut self, container: Container) -> Self {
        self.init_containers.push(container);
        self
    }

    pub fn key(&self) -> WorkloadKey {
        WorkloadKey::new(&self.namespace, &self.name)
    }

    /// Effective per-resource request of the workload
    ///
    /// App containers run together, so their requests add up. Init containers
    /// run one at a time before them, so each only has to fit on its own: the
    /// effective request is the larger of the two for every resource.
    pub fn effective_requests(&self) -> ResourceList {
        let mut total = ResourceList::new();
        for container in &self.containers {
            for (name, qty) in &container.requests {
                *total.entry(name.clone()).or_insert_with(Quantity::zero) += *qty;
            }
        }
        for init in &self.init_containers {
            for (name, qty) in &init.requests {
                let entry = total.entry(name.clone()).or_insert_with(Quantity::zero);
                if *qty > *entry {
                    *entry = *qty;
                }
            }
        }
        total
    }
}
