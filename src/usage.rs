//! Usage index: which owners hold which addresses.
//!
//! Maps canonical address to the owner records observed to be using it.
//! Callers normalize addresses before recording; this keeps the single
//! normalization point at the source (node or workload extraction), where a
//! malformed address can be reported against the owning entity.

use std::collections::BTreeMap;

use serde::Serialize;

/// Lightweight identifier for the resource holding an address. Kept for
/// diagnostic drill-down only; never read by the comparison logic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceRef {
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceRef {
    pub fn node(name: &str) -> Self {
        ResourceRef {
            kind: "Node",
            namespace: None,
            name: name.to_string(),
        }
    }

    pub fn workload(namespace: &str, name: &str) -> Self {
        ResourceRef {
            kind: "WorkloadEndpoint",
            namespace: Some(namespace.to_string()),
            name: name.to_string(),
        }
    }

    pub fn block(cidr: &str) -> Self {
        ResourceRef {
            kind: "AllocationBlock",
            namespace: None,
            name: cidr.to_string(),
        }
    }
}

/// One observed holder of an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnerRecord {
    /// Human-readable label, e.g. `Node(node-a)` or `Workload(default/nginx)`.
    pub friendly_name: String,
    pub resource: ResourceRef,
}

/// Index of in-use addresses, keyed by canonical address.
#[derive(Debug, Default)]
pub struct UsageIndex {
    by_addr: BTreeMap<String, Vec<OwnerRecord>>,
}

impl UsageIndex {
    pub fn new() -> Self {
        UsageIndex {
            by_addr: BTreeMap::new(),
        }
    }

    /// Record `resource` as an owner of the already-canonical `addr`.
    pub fn record(&mut self, addr: &str, resource: ResourceRef, friendly_name: String) {
        self.by_addr.entry(addr.to_string()).or_default().push(OwnerRecord {
            friendly_name,
            resource,
        });
    }

    /// Number of distinct in-use addresses.
    pub fn len(&self) -> usize {
        self.by_addr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_addr.is_empty()
    }

    pub fn contains(&self, addr: &str) -> bool {
        self.by_addr.contains_key(addr)
    }

    /// Iterate addresses and their owners in sorted address order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<OwnerRecord>)> {
        self.by_addr.iter()
    }
}
