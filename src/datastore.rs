//! Datastore record types and the listing interface the checker consumes.
//!
//! The checker never talks to a live cluster directly; it pulls four ordered
//! record lists through the [`Datastore`] trait. [`SnapshotDatastore`] is the
//! file-backed implementation used by the CLI: a single YAML document holding
//! all four lists, typically produced by an export from the real datastore.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use color_eyre::Result;
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::ListError;

/// Attribute metadata attached to one or more allocations in a block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationAttribute {
    /// Primary tag, e.g. a handle identifying who requested the allocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<String>,
    /// Secondary key/value pairs; rendered sorted by key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub secondary: BTreeMap<String, String>,
}

/// One IPAM address block as stored in the datastore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationBlock {
    /// The CIDR owning this block, e.g. `10.0.0.0/26`.
    pub cidr: String,
    /// Node affinity string, if the block is affine to a node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<String>,
    /// One slot per address in the block, in ordinal order. `None` means the
    /// ordinal is unallocated; `Some(i)` is an index into `attributes`.
    #[serde(default)]
    pub allocations: Vec<Option<usize>>,
    /// Attribute table referenced by `allocations`.
    #[serde(default)]
    pub attributes: Vec<AllocationAttribute>,
}

/// One address pool definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pool {
    pub cidr: String,
    /// Administratively disabled pools are excluded from membership checks.
    #[serde(default)]
    pub disabled: bool,
}

/// One cluster node and its tunnel addresses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    /// Overlay (VXLAN) tunnel address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vxlan_tunnel_addr: Option<String>,
    /// Secure-tunnel (wireguard) interface address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wireguard_addr: Option<String>,
    /// Encapsulation (IPIP) tunnel address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipip_tunnel_addr: Option<String>,
}

/// One workload endpoint and the addresses it claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadEndpoint {
    pub namespace: String,
    pub name: String,
    /// Address or CIDR strings assigned to this endpoint.
    #[serde(default)]
    pub ip_networks: Vec<String>,
}

/// Read-only listing interface over the cluster datastore.
pub trait Datastore {
    fn list_blocks(&self) -> Result<Vec<AllocationBlock>, ListError>;
    fn list_pools(&self) -> Result<Vec<Pool>, ListError>;
    fn list_nodes(&self) -> Result<Vec<Node>, ListError>;
    fn list_workload_endpoints(&self) -> Result<Vec<WorkloadEndpoint>, ListError>;
}

/// All four record lists in one document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub blocks: Vec<AllocationBlock>,
    #[serde(default)]
    pub pools: Vec<Pool>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub workload_endpoints: Vec<WorkloadEndpoint>,
}

/// File-backed datastore serving records out of a loaded [`Snapshot`].
#[derive(Debug, Clone)]
pub struct SnapshotDatastore {
    snapshot: Snapshot,
}

impl SnapshotDatastore {
    pub fn new(snapshot: Snapshot) -> Self {
        SnapshotDatastore { snapshot }
    }

    /// Load a snapshot from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading datastore snapshot from: {:?}", path);

        let file = File::open(path)?;
        let snapshot: Snapshot = serde_yaml::from_reader(file)?;

        info!(
            "Snapshot contains {} blocks, {} pools, {} nodes, {} workload endpoints",
            snapshot.blocks.len(),
            snapshot.pools.len(),
            snapshot.nodes.len(),
            snapshot.workload_endpoints.len()
        );

        Ok(SnapshotDatastore::new(snapshot))
    }
}

impl Datastore for SnapshotDatastore {
    fn list_blocks(&self) -> Result<Vec<AllocationBlock>, ListError> {
        Ok(self.snapshot.blocks.clone())
    }

    fn list_pools(&self) -> Result<Vec<Pool>, ListError> {
        Ok(self.snapshot.pools.clone())
    }

    fn list_nodes(&self) -> Result<Vec<Node>, ListError> {
        Ok(self.snapshot.nodes.clone())
    }

    fn list_workload_endpoints(&self) -> Result<Vec<WorkloadEndpoint>, ListError> {
        Ok(self.snapshot.workload_endpoints.clone())
    }
}
