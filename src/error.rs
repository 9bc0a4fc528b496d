//! Error taxonomy for the audit run.
//!
//! Every variant here is fatal: the audit either completes all of its phases
//! and produces a report, or it returns exactly one of these and no report.

use crate::normalize::NormalizeError;

/// Errors that abort an audit run.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("failed to list {what}: {source}")]
    Listing {
        what: &'static str,
        #[source]
        source: ListError,
    },

    #[error("failed to parse IP ({value}) of {entity}: {source}")]
    BadAddress {
        entity: String,
        value: String,
        #[source]
        source: NormalizeError,
    },

    #[error("failed to parse IP pool CIDR ({cidr}): {source}")]
    BadPoolCidr {
        cidr: String,
        #[source]
        source: ipnet::AddrParseError,
    },

    #[error("failed to parse IPAM block CIDR ({cidr}): {source}")]
    BadBlockCidr {
        cidr: String,
        #[source]
        source: ipnet::AddrParseError,
    },

    #[error("ordinal {ordinal} is out of range for IPAM block {cidr}")]
    OrdinalOutOfRange { cidr: String, ordinal: usize },
}

/// Failure of one of the datastore's bulk listing calls.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ListError {
    pub message: String,
}

impl ListError {
    pub fn new(message: impl Into<String>) -> Self {
        ListError {
            message: message.into(),
        }
    }
}
