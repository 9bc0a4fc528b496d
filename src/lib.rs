//! # ipam-audit - Consistency checker for cluster IPAM allocation data
//!
//! This library audits a cluster's IP address management (IPAM) records
//! against the addresses actually in use by nodes and workload endpoints,
//! and reports every discrepancy it finds. It never mutates state.
//!
//! ## Overview
//!
//! The audit builds two independent views of "which IP is assigned to what":
//! one from the IPAM allocation blocks, one from the addresses observed on
//! live nodes and workloads. It joins the two by canonical address string and
//! classifies every mismatch:
//!
//! - **Leaked**: allocated in IPAM but not in use by anything
//! - **Foreign**: in use but unallocated and outside every active pool
//! - **Missing allocation**: in use and inside an active pool, but IPAM has
//!   no record of it
//! - **Multiple owners**: more than one owner claims the address (diagnostic
//!   only, not counted as a problem)
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - `datastore`: record types, the read-only listing interface, and the
//!   YAML snapshot implementation the CLI runs against
//! - `normalize`: canonicalization of bare and CIDR-qualified address strings
//! - `allocations`: index of allocated addresses built from block scans
//! - `usage`: index of in-use addresses and their owners
//! - `pools`: active pool set and membership checks
//! - `checker`: the six-phase reconciliation engine and its report
//! - `error`: the fatal error taxonomy of an audit run
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use ipam_audit::checker::IpamChecker;
//! use ipam_audit::datastore::SnapshotDatastore;
//! use std::path::Path;
//!
//! # fn main() -> color_eyre::Result<()> {
//! let datastore = SnapshotDatastore::load(Path::new("snapshot.yaml"))?;
//! let checker = IpamChecker::new(&datastore, false, true);
//! let report = checker.check()?;
//! println!("{} problems", report.num_problems);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Every failure that can abort an audit is a variant of
//! [`error::CheckError`]; the run either completes all phases and returns a
//! [`checker::Report`], or returns exactly one error and no report.

pub mod allocations;
pub mod checker;
pub mod datastore;
pub mod error;
pub mod normalize;
pub mod pools;
pub mod usage;
