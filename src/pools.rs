//! Active pool set and membership checks.
//!
//! Disabled pools are filtered out before this set is built, so membership
//! here always means "inside a currently-enabled pool". Pool counts are small;
//! a linear containment scan is sufficient.

use std::net::IpAddr;

use ipnet::IpNet;

use crate::error::CheckError;

/// The set of enabled address pools loaded for one audit run.
#[derive(Debug, Default)]
pub struct ActivePools {
    nets: Vec<IpNet>,
}

impl ActivePools {
    pub fn new() -> Self {
        ActivePools { nets: Vec::new() }
    }

    /// Parse and add one enabled pool CIDR. An unparseable CIDR is fatal.
    pub fn add(&mut self, cidr: &str) -> Result<(), CheckError> {
        let net: IpNet = cidr.parse().map_err(|source| CheckError::BadPoolCidr {
            cidr: cidr.to_string(),
            source,
        })?;
        self.nets.push(net);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nets.is_empty()
    }

    /// Whether any enabled pool contains the address.
    pub fn contains(&self, addr: &IpAddr) -> bool {
        self.nets.iter().any(|net| net.contains(addr))
    }

    /// String-keyed convenience for canonical addresses. Strings that do not
    /// parse are outside every pool.
    pub fn contains_str(&self, addr: &str) -> bool {
        match addr.parse::<IpAddr>() {
            Ok(ip) => self.contains(&ip),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_containment() {
        let mut pools = ActivePools::new();
        pools.add("10.0.0.0/24").unwrap();
        pools.add("192.168.0.0/16").unwrap();

        assert!(pools.contains_str("10.0.0.9"));
        assert!(pools.contains_str("192.168.5.5"));
        assert!(!pools.contains_str("172.16.0.1"));
        assert_eq!(pools.len(), 2);
    }

    #[test]
    fn test_empty_set_contains_nothing() {
        let pools = ActivePools::new();
        assert!(pools.is_empty());
        assert!(!pools.contains_str("10.0.0.1"));
    }

    #[test]
    fn test_bad_cidr_is_fatal() {
        let mut pools = ActivePools::new();
        let err = pools.add("10.0.0.0/99").unwrap_err();
        assert!(matches!(err, CheckError::BadPoolCidr { .. }));
    }

    #[test]
    fn test_unparseable_string_outside_all_pools() {
        let mut pools = ActivePools::new();
        pools.add("10.0.0.0/8").unwrap();
        assert!(!pools.contains_str("bogus"));
    }
}
