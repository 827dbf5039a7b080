//! Core data models for the application
//!
//! This module contains the primary data structures used throughout the
//! curator, separated from the logic that produces and filters them.
//!
//! # Usage
//!
//! ```rust
//! use subcurator::models::{merge, ProxyRecord, ProxySet};
//!
//! let existing: ProxySet = vec![ProxyRecord::new("A", "a.example.com", 443)]
//!     .into_iter()
//!     .collect();
//! let incoming: ProxySet = vec![ProxyRecord::new("B", "b.example.com", 80)]
//!     .into_iter()
//!     .collect();
//!
//! let outcome = merge(&incoming, &existing);
//! assert!(outcome.has_new_entries);
//! assert_eq!(outcome.merged.len(), 2);
//! ```

mod proxy;
mod proxy_set;

pub use proxy::*;
pub use proxy_set::*;
