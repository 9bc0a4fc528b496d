//! The reconciliation engine.
//!
//! Runs the audit as six strictly sequential phases: load blocks, load pools,
//! load nodes, load workload endpoints, classify, summarize. Each phase prints
//! its progress to stdout before the next begins; a failure in any phase aborts
//! the run with no report.

use log::debug;

use crate::allocations::AllocationIndex;
use crate::datastore::{Datastore, Node, WorkloadEndpoint};
use crate::error::CheckError;
use crate::normalize::normalize;
use crate::pools::ActivePools;
use crate::usage::{ResourceRef, UsageIndex};

/// A leaked address and the attribute strings of its allocations.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct LeakedAddress {
    pub address: String,
    pub attributes: Vec<String>,
}

/// Result of one completed audit run. Immutable once produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct Report {
    /// Distinct addresses allocated in IPAM.
    pub num_allocations: usize,
    /// Distinct addresses in use by nodes, workloads, or reservations.
    pub num_in_use: usize,
    /// Allocated in IPAM but not in use by anything.
    pub leaked: Vec<LeakedAddress>,
    /// In use by more than one owner. Diagnostic only; not counted as a
    /// problem, since shared addresses (e.g. anycast) may be legitimate.
    pub multiple_owners: Vec<String>,
    /// In use but not allocated and outside every active pool.
    pub foreign: Vec<String>,
    /// In use and inside an active pool, but IPAM has no record of it.
    pub missing_allocations: Vec<String>,
    /// Leaked + foreign + missing-allocation count.
    pub num_problems: usize,
}

/// One-shot IPAM consistency checker. Owns all index state for a single run;
/// create a fresh instance per audit.
pub struct IpamChecker<'a, D: Datastore> {
    datastore: &'a D,
    allocations: AllocationIndex,
    in_use: UsageIndex,
    active_pools: ActivePools,

    show_all_ips: bool,
    show_problem_ips: bool,
}

impl<'a, D: Datastore> IpamChecker<'a, D> {
    pub fn new(datastore: &'a D, show_all_ips: bool, show_problem_ips: bool) -> Self {
        IpamChecker {
            datastore,
            allocations: AllocationIndex::new(),
            in_use: UsageIndex::new(),
            active_pools: ActivePools::new(),
            show_all_ips,
            // Showing all addresses implies showing the problem ones.
            show_problem_ips: show_all_ips || show_problem_ips,
        }
    }

    /// Run the full audit and produce a report.
    pub fn check(mut self) -> Result<Report, CheckError> {
        println!("Checking IPAM for inconsistencies...");
        println!();

        self.load_blocks()?;
        self.load_pools()?;
        self.load_nodes()?;
        self.load_workloads()?;

        let report = self.classify();
        println!("Check complete; found {} problems.", report.num_problems);
        Ok(report)
    }

    /// Phase 1: walk every block and index each allocated ordinal.
    fn load_blocks(&mut self) -> Result<(), CheckError> {
        println!("Loading all IPAM blocks...");
        let blocks = self
            .datastore
            .list_blocks()
            .map_err(|source| CheckError::Listing {
                what: "IPAM blocks",
                source,
            })?;
        println!("Found {} IPAM blocks.", blocks.len());

        for block in &blocks {
            let affinity = block.affinity.as_deref().unwrap_or("<none>");
            println!(" IPAM block {} affinity={}:", block.cidr, affinity);
            for (ordinal, marker) in block.allocations.iter().enumerate() {
                if marker.is_none() {
                    continue; // ordinal is unallocated
                }
                let recorded = self.allocations.record(block, ordinal, &mut self.in_use)?;
                if self.show_all_ips {
                    println!("  {} allocated; attrs {}", recorded.addr, recorded.attr_string);
                    if recorded.reserved {
                        println!("  {} belongs to {}", recorded.addr, crate::allocations::RESERVED_OWNER);
                    }
                }
            }
        }
        println!("IPAM blocks record {} allocations.", self.allocations.len());
        println!();
        Ok(())
    }

    /// Phase 2: build the active pool set, skipping disabled pools.
    fn load_pools(&mut self) -> Result<(), CheckError> {
        println!("Loading all IPAM pools...");
        let pools = self
            .datastore
            .list_pools()
            .map_err(|source| CheckError::Listing {
                what: "IP pools",
                source,
            })?;

        for pool in &pools {
            if pool.disabled {
                debug!("skipping disabled pool {}", pool.cidr);
                continue;
            }
            println!("  {}", pool.cidr);
            self.active_pools.add(&pool.cidr)?;
        }
        println!("Found {} active IP pools.", self.active_pools.len());
        println!();
        Ok(())
    }

    /// Phase 3: register every node tunnel address as in use.
    fn load_nodes(&mut self) -> Result<(), CheckError> {
        println!("Loading all nodes.");
        let nodes = self
            .datastore
            .list_nodes()
            .map_err(|source| CheckError::Listing {
                what: "nodes",
                source,
            })?;

        let mut num_node_ips = 0;
        for node in &nodes {
            for ip in node_ips(node)? {
                self.record_in_use(&ip, ResourceRef::node(&node.name), format!("Node({})", node.name));
                num_node_ips += 1;
            }
        }
        println!("Found {} node tunnel IPs.", num_node_ips);
        println!();
        Ok(())
    }

    /// Phase 4: register every workload endpoint address as in use.
    fn load_workloads(&mut self) -> Result<(), CheckError> {
        println!("Loading all workload endpoints.");
        let weps = self
            .datastore
            .list_workload_endpoints()
            .map_err(|source| CheckError::Listing {
                what: "workload endpoints",
                source,
            })?;

        let mut num_workload_ips = 0;
        for wep in &weps {
            for ip in workload_ips(wep)? {
                self.record_in_use(
                    &ip,
                    ResourceRef::workload(&wep.namespace, &wep.name),
                    format!("Workload({}/{})", wep.namespace, wep.name),
                );
                num_workload_ips += 1;
            }
        }
        println!("Found {} workload IPs.", num_workload_ips);
        println!("Workloads and nodes are using {} IPs.", self.in_use.len());
        println!();
        Ok(())
    }

    fn record_in_use(&mut self, ip: &str, resource: ResourceRef, friendly_name: String) {
        if self.show_all_ips {
            println!("  {} belongs to {}", ip, friendly_name);
        }
        self.in_use.record(ip, resource, friendly_name);
    }

    /// Phases 5 and 6: compare the two indexes and emit the summary counts.
    fn classify(&self) -> Report {
        let mut report = Report {
            num_allocations: self.allocations.len(),
            num_in_use: self.in_use.len(),
            ..Default::default()
        };

        println!("Scanning for IPs that are allocated but not actually in use...");
        for (ip, allocs) in self.allocations.iter() {
            if self.in_use.contains(ip) {
                continue;
            }
            let attributes: Vec<String> = allocs.iter().map(|a| a.attr_string()).collect();
            if self.show_problem_ips {
                for attrs in &attributes {
                    println!("  {} leaked; attrs {}", ip, attrs);
                }
            }
            report.leaked.push(LeakedAddress {
                address: ip.clone(),
                attributes,
            });
        }
        println!(
            "Found {} IPs that are allocated in IPAM but not actually in use.",
            report.leaked.len()
        );

        println!("Scanning for IPs that are in use by a workload or node but not allocated in IPAM...");
        for (ip, owners) in self.in_use.iter() {
            if owners.len() > 1 {
                if self.show_problem_ips {
                    println!("  {} has multiple owners.", ip);
                }
                report.multiple_owners.push(ip.clone());
            }
            if self.allocations.contains(ip) {
                continue;
            }
            if !self.active_pools.contains_str(ip) {
                if self.show_problem_ips {
                    for owner in owners {
                        println!(
                            "  {} in use by {} is not in any active IP pool.",
                            ip, owner.friendly_name
                        );
                    }
                }
                report.foreign.push(ip.clone());
                continue;
            }
            if self.show_problem_ips {
                for owner in owners {
                    println!(
                        "  {} in use by {} and in active IPAM pool but has no IPAM allocation.",
                        ip, owner.friendly_name
                    );
                }
            }
            report.missing_allocations.push(ip.clone());
        }
        println!(
            "Found {} in-use IPs that are not in active IP pools.",
            report.foreign.len()
        );
        println!(
            "Found {} in-use IPs that are in active IP pools but have no corresponding IPAM allocation.",
            report.missing_allocations.len()
        );
        println!();

        // Multiple owners stay out of the total: a shared address may be
        // intentional, so it is reported but not counted.
        report.num_problems =
            report.leaked.len() + report.foreign.len() + report.missing_allocations.len();
        report
    }
}

/// Candidate in-use addresses of one node, canonicalized. A parse failure on
/// any address is fatal: it indicates malformed cluster state.
fn node_ips(node: &Node) -> Result<Vec<String>, CheckError> {
    let mut ips = Vec::new();
    let sources = [
        ("vxlan_tunnel_addr", &node.vxlan_tunnel_addr),
        ("wireguard_addr", &node.wireguard_addr),
        ("ipip_tunnel_addr", &node.ipip_tunnel_addr),
    ];
    for (field, addr) in sources {
        if let Some(addr) = addr.as_deref().filter(|a| !a.is_empty()) {
            let ip = normalize(addr).map_err(|source| CheckError::BadAddress {
                entity: format!("{} of node {}", field, node.name),
                value: addr.to_string(),
                source,
            })?;
            ips.push(ip);
        }
    }
    Ok(ips)
}

/// Canonicalized addresses of one workload endpoint; same fatal-parse policy
/// as nodes.
fn workload_ips(wep: &WorkloadEndpoint) -> Result<Vec<String>, CheckError> {
    let mut ips = Vec::new();
    for addr in &wep.ip_networks {
        let ip = normalize(addr).map_err(|source| CheckError::BadAddress {
            entity: format!("workload {}/{}", wep.namespace, wep.name),
            value: addr.to_string(),
            source,
        })?;
        ips.push(ip);
    }
    Ok(ips)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_ips_extraction() {
        let node = Node {
            name: "node-a".to_string(),
            vxlan_tunnel_addr: Some("10.0.0.1".to_string()),
            wireguard_addr: None,
            ipip_tunnel_addr: Some("10.0.0.2/32".to_string()),
        };

        let ips = node_ips(&node).unwrap();
        assert_eq!(ips, vec!["10.0.0.1", "10.0.0.2"]);
    }

    #[test]
    fn test_node_with_no_tunnels_contributes_nothing() {
        let node = Node {
            name: "node-b".to_string(),
            ..Default::default()
        };
        assert!(node_ips(&node).unwrap().is_empty());
    }

    #[test]
    fn test_node_bad_address_names_field_and_node() {
        let node = Node {
            name: "node-a".to_string(),
            wireguard_addr: Some("bogus".to_string()),
            ..Default::default()
        };

        let err = node_ips(&node).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("wireguard_addr of node node-a"), "got: {}", msg);
        assert!(msg.contains("bogus"), "got: {}", msg);
    }

    #[test]
    fn test_workload_ips_extraction() {
        let wep = WorkloadEndpoint {
            namespace: "default".to_string(),
            name: "nginx-1".to_string(),
            ip_networks: vec!["10.0.0.5/32".to_string(), "fd00::5/128".to_string()],
        };

        let ips = workload_ips(&wep).unwrap();
        assert_eq!(ips, vec!["10.0.0.5", "fd00::5"]);
    }

    #[test]
    fn test_workload_bad_address_names_workload() {
        let wep = WorkloadEndpoint {
            namespace: "default".to_string(),
            name: "nginx-1".to_string(),
            ip_networks: vec!["10.0.0.999".to_string()],
        };

        let err = workload_ips(&wep).unwrap_err();
        assert!(err.to_string().contains("workload default/nginx-1"));
    }
}
