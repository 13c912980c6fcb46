//! # `occ-index`
//!
//! Per-table sorted indexes for an optimistic-concurrency (OCC) transactional
//! storage engine.
//!
//! Each table's index maps fixed 64-bit keys to value handles and supports
//! point lookup, forward and reverse range scans, insertion and deletion.
//! What this crate adds on top of the sorted structure is **node-version
//! validation**: every index call a transaction makes reports which internal
//! pages it touched and at which version, and these observations accumulate
//! in one [`NodeVersionSet`] per transaction. If a page turns up at a
//! different version than the transaction saw before, another transaction
//! changed it in between, and the call reports a conflict.
//!
//! | Component | Role |
//! |-----------|------|
//! | [`NodeVersionSet`] | Transaction-owned (page, version) record with merge/validate |
//! | [`Index`] | One table's index; merges touched pages on every tracked call |
//! | [`IndexRegistry`] | Lazily created `TableId -> Index` map, one index per table |
//! | [`SortedIndex`] | The sorted-structure collaborator, injected |
//! | [`PageTree`] | Built-in concurrent paged collaborator |
//!
//! ## Usage
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use occ_index::{IndexError, IndexRegistry, NodeVersionSet, PageTree, TableId};
//!
//! let registry: IndexRegistry<PageTree<&str>> = IndexRegistry::new();
//! let orders = TableId(1);
//!
//! // Transaction A reads key 10
//! registry.index(orders).insert(10, "a").unwrap();
//! let mut txn_a = NodeVersionSet::new();
//! assert_eq!(registry.find(orders, 10, &mut txn_a), Ok("a"));
//!
//! // Transaction B changes the same page
//! let mut txn_b = NodeVersionSet::new();
//! registry.insert(orders, 11, "b", &mut txn_b).unwrap();
//!
//! // A's next touch of that page detects it
//! let mut out = BTreeMap::new();
//! assert_eq!(
//!     registry.get_kv_in_range(orders, 0, 20, usize::MAX, &mut out, &mut txn_a),
//!     Err(IndexError::BadScan)
//! );
//! ```
//!
//! ## Guarantees
//!
//! If a transaction's set stays free of conflicts, no page it touched more
//! than once was structurally changed between its first and last touch.
//! Pages touched only once, and value changes that leave a page's version
//! alone, are not covered. The crate never locks on the caller's behalf and
//! never retries; conflict codes are signals for the caller.
//!
//! ## Logging
//!
//! Enable the `tracing` feature to route conflict, split and registry events
//! to the `tracing` crate. Without it the log macros compile to nothing.

#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod tracing_helpers;

pub mod handle;
pub mod index;
pub mod nodeversion;
pub mod ordering;
pub mod registry;
pub mod sorted;
pub mod status;
pub mod tree;
pub mod version_set;

// Re-export main types for convenience
pub use handle::{Key, NodeId, NodeObservation, PageRef, TableId, Version};
pub use index::Index;
pub use registry::IndexRegistry;
pub use sorted::{DeleteOutcome, InsertOutcome, ReadOutcome, ScanDirection, SortedIndex};
pub use status::{IndexError, InsertError, ResultCode};
pub use tree::{DEFAULT_WIDTH, PageTree};
pub use version_set::{NodeVersionSet, VersionConflict};
