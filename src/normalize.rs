//! Address normalization.
//!
//! Every address string entering the audit passes through [`normalize`] so
//! that the allocation and usage indexes join on a single canonical form.
//! An address may arrive bare (`10.0.0.1`) or CIDR-qualified (`10.0.0.1/32`);
//! both must normalize to the same string.

use std::net::IpAddr;

use ipnet::IpNet;

/// Errors from canonicalizing a single address string.
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("invalid IP address: {0}")]
    Addr(#[from] std::net::AddrParseError),

    #[error("invalid CIDR: {0}")]
    Cidr(#[from] ipnet::AddrParseError),
}

/// Canonicalize an address that may carry a CIDR suffix.
///
/// Returns the bare address rendered by the standard library's `Display`,
/// which strips leading zeros and lower-cases IPv6 hex digits. Two textually
/// different spellings of the same address always normalize identically.
pub fn normalize(addr: &str) -> Result<String, NormalizeError> {
    if addr.contains('/') {
        let net: IpNet = addr.parse()?;
        Ok(net.addr().to_string())
    } else {
        let ip: IpAddr = addr.parse()?;
        Ok(ip.to_string())
    }
}
