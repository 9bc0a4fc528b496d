//! Allocation index: which addresses IPAM believes are allocated.
//!
//! Built by walking every address block and recording each ordinal that
//! carries an allocation marker. The marker is an index into the block's
//! attribute table; a marker pointing outside the table degrades that one
//! allocation's display string to `<missing>` but never aborts the scan.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnet::IpNet;

use crate::datastore::{AllocationAttribute, AllocationBlock};
use crate::error::CheckError;
use crate::usage::{ResourceRef, UsageIndex};

/// Primary attribute tag marking an address reserved for platform
/// infrastructure rather than any node or workload.
pub const RESERVED_HANDLE: &str = "windows-reserved-ipam-handle";

/// Friendly name registered for infrastructure reservations.
pub const RESERVED_OWNER: &str = "Reserved for Windows";

/// One allocated ordinal within a block, with its attribute resolved.
#[derive(Debug, Clone)]
pub struct Allocation {
    pub block_cidr: String,
    pub ordinal: usize,
    /// `None` when the allocation marker pointed outside the attribute table.
    attribute: Option<AllocationAttribute>,
}

impl Allocation {
    /// Render the allocation's attributes for display.
    pub fn attr_string(&self) -> String {
        match &self.attribute {
            Some(attr) => format_attrs(attr),
            None => "<missing>".to_string(),
        }
    }
}

fn format_attrs(attr: &AllocationAttribute) -> String {
    let primary = attr.primary.as_deref().unwrap_or("<none>");
    let kvs: Vec<String> = attr
        .secondary
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    format!("Main:{} Extra:{}", primary, kvs.join(","))
}

/// Outcome of recording one allocation, for progress display.
#[derive(Debug)]
pub struct Recorded {
    pub addr: String,
    pub attr_string: String,
    /// True when the allocation was also registered as in use because its
    /// primary tag is the infrastructure reservation marker.
    pub reserved: bool,
}

/// Index of allocated addresses, keyed by canonical address.
#[derive(Debug, Default)]
pub struct AllocationIndex {
    by_addr: BTreeMap<String, Vec<Allocation>>,
}

impl AllocationIndex {
    pub fn new() -> Self {
        AllocationIndex {
            by_addr: BTreeMap::new(),
        }
    }

    /// Record the allocation at `ordinal` of `block`.
    ///
    /// Resolves the ordinal to its canonical address and its attribute entry.
    /// Allocations whose primary tag equals [`RESERVED_HANDLE`] are also
    /// registered in `in_use`, so reservations never show up as leaks.
    pub fn record(
        &mut self,
        block: &AllocationBlock,
        ordinal: usize,
        in_use: &mut UsageIndex,
    ) -> Result<Recorded, CheckError> {
        let net: IpNet = block
            .cidr
            .parse()
            .map_err(|source| CheckError::BadBlockCidr {
                cidr: block.cidr.clone(),
                source,
            })?;
        let addr = ordinal_to_ip(&net, ordinal)
            .ok_or_else(|| CheckError::OrdinalOutOfRange {
                cidr: block.cidr.clone(),
                ordinal,
            })?
            .to_string();

        let attribute = block
            .allocations
            .get(ordinal)
            .copied()
            .flatten()
            .and_then(|attr_idx| block.attributes.get(attr_idx))
            .cloned();

        let reserved = matches!(
            &attribute,
            Some(attr) if attr.primary.as_deref() == Some(RESERVED_HANDLE)
        );
        if reserved {
            in_use.record(&addr, ResourceRef::block(&block.cidr), RESERVED_OWNER.to_string());
        }

        let alloc = Allocation {
            block_cidr: block.cidr.clone(),
            ordinal,
            attribute,
        };
        let attr_string = alloc.attr_string();
        self.by_addr.entry(addr.clone()).or_default().push(alloc);

        Ok(Recorded {
            addr,
            attr_string,
            reserved,
        })
    }

    /// Number of distinct allocated addresses.
    pub fn len(&self) -> usize {
        self.by_addr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_addr.is_empty()
    }

    pub fn contains(&self, addr: &str) -> bool {
        self.by_addr.contains_key(addr)
    }

    /// Iterate addresses and their allocations in sorted address order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<Allocation>)> {
        self.by_addr.iter()
    }
}

/// Address at `ordinal` positions past the network base of `net`, or `None`
/// when the ordinal does not fit inside the block.
fn ordinal_to_ip(net: &IpNet, ordinal: usize) -> Option<IpAddr> {
    match net.network() {
        IpAddr::V4(base) => {
            let host_bits = 32 - u32::from(net.prefix_len());
            if (ordinal as u64) >= (1u64 << host_bits) {
                return None;
            }
            u32::from(base)
                .checked_add(ordinal as u32)
                .map(|n| IpAddr::V4(Ipv4Addr::from(n)))
        }
        IpAddr::V6(base) => {
            let host_bits = 128 - u32::from(net.prefix_len());
            if host_bits < 128 && (ordinal as u128) >= (1u128 << host_bits) {
                return None;
            }
            u128::from(base)
                .checked_add(ordinal as u128)
                .map(|n| IpAddr::V6(Ipv6Addr::from(n)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_with_allocation(
        cidr: &str,
        ordinal: usize,
        attribute: AllocationAttribute,
    ) -> AllocationBlock {
        let mut allocations = vec![None; 64];
        allocations[ordinal] = Some(0);
        AllocationBlock {
            cidr: cidr.to_string(),
            affinity: None,
            allocations,
            attributes: vec![attribute],
        }
    }

    #[test]
    fn test_ordinal_to_ip() {
        let net: IpNet = "10.0.0.0/26".parse().unwrap();
        assert_eq!(ordinal_to_ip(&net, 0).unwrap().to_string(), "10.0.0.0");
        assert_eq!(ordinal_to_ip(&net, 5).unwrap().to_string(), "10.0.0.5");
        assert_eq!(ordinal_to_ip(&net, 63).unwrap().to_string(), "10.0.0.63");
        assert!(ordinal_to_ip(&net, 64).is_none());
    }

    #[test]
    fn test_ordinal_to_ip_v6() {
        let net: IpNet = "fd00::/122".parse().unwrap();
        assert_eq!(ordinal_to_ip(&net, 1).unwrap().to_string(), "fd00::1");
        assert!(ordinal_to_ip(&net, 64).is_none());
    }

    #[test]
    fn test_record_resolves_address_and_attrs() {
        let mut attrs = BTreeMap::new();
        attrs.insert("node".to_string(), "node-a".to_string());
        attrs.insert("a-key".to_string(), "v".to_string());
        let block = block_with_allocation(
            "10.0.0.0/26",
            5,
            AllocationAttribute {
                primary: Some("k8s-pod-network.abc".to_string()),
                secondary: attrs,
            },
        );

        let mut index = AllocationIndex::new();
        let mut in_use = UsageIndex::new();
        let recorded = index.record(&block, 5, &mut in_use).unwrap();

        assert_eq!(recorded.addr, "10.0.0.5");
        assert!(!recorded.reserved);
        assert!(in_use.is_empty());
        assert!(index.contains("10.0.0.5"));
        // Secondary keys render sorted.
        assert_eq!(
            recorded.attr_string,
            "Main:k8s-pod-network.abc Extra:a-key=v,node=node-a"
        );
    }

    #[test]
    fn test_attribute_index_out_of_range_degrades_display() {
        let mut allocations = vec![None; 64];
        allocations[3] = Some(7); // table has no entry 7
        let block = AllocationBlock {
            cidr: "10.0.0.0/26".to_string(),
            affinity: None,
            allocations,
            attributes: vec![],
        };

        let mut index = AllocationIndex::new();
        let mut in_use = UsageIndex::new();
        let recorded = index.record(&block, 3, &mut in_use).unwrap();

        assert_eq!(recorded.addr, "10.0.0.3");
        assert_eq!(recorded.attr_string, "<missing>");
    }

    #[test]
    fn test_reserved_allocation_registers_in_use() {
        let block = block_with_allocation(
            "10.0.0.0/26",
            2,
            AllocationAttribute {
                primary: Some(RESERVED_HANDLE.to_string()),
                secondary: BTreeMap::new(),
            },
        );

        let mut index = AllocationIndex::new();
        let mut in_use = UsageIndex::new();
        let recorded = index.record(&block, 2, &mut in_use).unwrap();

        assert!(recorded.reserved);
        assert!(in_use.contains("10.0.0.2"));
        let owners = in_use.iter().next().unwrap().1;
        assert_eq!(owners[0].friendly_name, RESERVED_OWNER);
        assert_eq!(owners[0].resource.kind, "AllocationBlock");
    }

    #[test]
    fn test_bad_block_cidr_is_fatal() {
        let block = AllocationBlock {
            cidr: "not-a-cidr".to_string(),
            affinity: None,
            allocations: vec![Some(0)],
            attributes: vec![AllocationAttribute::default()],
        };

        let mut index = AllocationIndex::new();
        let mut in_use = UsageIndex::new();
        let err = index.record(&block, 0, &mut in_use).unwrap_err();
        assert!(matches!(err, CheckError::BadBlockCidr { .. }));
    }

    #[test]
    fn test_no_attributes_renders_none_primary() {
        let block = block_with_allocation("10.0.0.0/26", 0, AllocationAttribute::default());

        let mut index = AllocationIndex::new();
        let mut in_use = UsageIndex::new();
        let recorded = index.record(&block, 0, &mut in_use).unwrap();
        assert_eq!(recorded.attr_string, "Main:<none> Extra:");
    }
}
