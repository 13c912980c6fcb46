//! Page version counter for the built-in page tree.
//!
//! [`NodeVersion`] is a monotone `u64` that moves forward once per structural
//! change of its page. It is what callers record in a
//! [`NodeVersionSet`](crate::NodeVersionSet).
//!
//! # Concurrency Model
//! 1. Writers: change the page content and call [`NodeVersion::bump`] while
//!    holding the page's write lock.
//! 2. Readers holding the page's read lock: [`NodeVersion::current`] is the
//!    version of exactly the content they see.
//! 3. Readers without the page lock (commit-time validation): `current` is a
//!    value the page has had, and it never goes backwards.

use std::sync::atomic::AtomicU64;

use crate::handle::Version;
use crate::ordering::{BUMP_ORD, VERSION_ORD};


#[cfg(all(test, loom))]
mod loom_tests;

/// Version counter of one tree page.
///
/// # Example
///
/// ```rust
/// use occ_index::nodeversion::NodeVersion;
///
/// let v = NodeVersion::new();
/// let before = v.current();
///
/// let after = v.bump();
///
/// assert!(after > before);
/// assert_eq!(v.current(), after);
/// ```
#[derive(Debug, Default)]
pub struct NodeVersion {
    value: AtomicU64,
}

impl NodeVersion {
    /// Create a counter at version zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    /// Current version.
    #[inline]
    #[must_use]
    pub fn current(&self) -> Version {
        self.value.load(VERSION_ORD)
    }

    /// Record one structural change and return the new version.
    ///
    /// Call with the page's write lock held, after the content change.
    #[inline]
    pub fn bump(&self) -> Version {
        self.value.fetch_add(1, BUMP_ORD) + 1
    }
}
