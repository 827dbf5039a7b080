//! Deciding which proxies are still worth keeping.
//!
//! Two independent sources: an active TCP probe and the delay-test results
//! a client has already written to its log.

pub mod dead_set;
pub mod probe;

pub use dead_set::{extract_dead_names, load_dead_names, DeadNameSet, DIRECT};
pub use probe::{ActiveProbe, ProbeAddress, ProbeConfig, ProbeReport, ProbeResult, Reachability};
