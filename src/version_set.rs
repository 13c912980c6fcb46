//! Transaction-scoped record of page versions.
//!
//! A [`NodeVersionSet`] accumulates every (page, version) pair a transaction
//! observes across its index calls. Each call merges the pages it touched:
//!
//! ```text
//! page not yet recorded   -> record it (first sighting, never a conflict)
//! recorded == observed    -> no-op
//! recorded != observed    -> conflict: the page changed between two touches
//! ```
//!
//! Validity is maintained incrementally, so commit never has to revisit every
//! page. A set is owned by one transaction and is not synchronized; it must not
//! be shared across threads without external locking.
//!
//! The first conflict is latched. After that the set is poisoned: every later
//! tracked call reports a conflict, and the recorded version of a conflicting
//! page is left as it was first seen.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt as StdFmt;

use crate::handle::{PageRef, Version};

// ============================================================================
//  VersionConflict
// ============================================================================

/// A page was seen at two different versions by the same transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VersionConflict {
    /// Page whose version moved.
    pub page: PageRef,

    /// Version recorded by an earlier call.
    pub recorded: Version,

    /// Version seen by the conflicting call.
    pub observed: Version,
}

impl StdFmt::Display for VersionConflict {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        write!(
            f,
            "{} changed from version {} to {}",
            self.page, self.recorded, self.observed
        )
    }
}

impl std::error::Error for VersionConflict {}

// ============================================================================
//  NodeVersionSet
// ============================================================================

/// Structural read set of one transaction.
///
/// # Example
///
/// ```rust
/// use occ_index::{NodeId, NodeVersionSet, PageRef, TableId};
///
/// let page = PageRef::new(TableId(1), NodeId::new(4));
/// let mut set = NodeVersionSet::new();
///
/// assert!(set.observe(page, 8).is_ok());
/// assert!(set.observe(page, 8).is_ok());
/// assert!(set.observe(page, 16).is_err());
/// assert!(set.is_conflicted());
/// ```
#[derive(Debug, Clone, Default)]
pub struct NodeVersionSet {
    versions: HashMap<PageRef, Version>,

    /// First conflict detected through this set.
    conflict: Option<VersionConflict>,
}

impl NodeVersionSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty set with room for `capacity` pages.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            versions: HashMap::with_capacity(capacity),
            conflict: None,
        }
    }

    /// Number of recorded pages.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// True if no page has been recorded.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Version recorded for `page`, if any.
    #[inline]
    #[must_use]
    pub fn get(&self, page: &PageRef) -> Option<Version> {
        self.versions.get(page).copied()
    }

    /// True if `page` has been recorded.
    #[inline]
    #[must_use]
    pub fn contains(&self, page: &PageRef) -> bool {
        self.versions.contains_key(page)
    }

    /// Iterate over recorded pages in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (PageRef, Version)> + '_ {
        self.versions.iter().map(|(page, version)| (*page, *version))
    }

    /// True once any merge through this set has conflicted.
    #[inline]
    #[must_use]
    pub const fn is_conflicted(&self) -> bool {
        self.conflict.is_some()
    }

    /// The first conflict detected, if any.
    #[inline]
    #[must_use]
    pub const fn conflict(&self) -> Option<VersionConflict> {
        self.conflict
    }

    /// Check that no merge through this set has conflicted.
    ///
    /// # Errors
    ///
    /// Returns the first latched conflict.
    pub fn validate(&self) -> Result<(), VersionConflict> {
        self.conflict.map_or(Ok(()), Err)
    }

    /// Forget every page and any latched conflict.
    ///
    /// For reusing the allocation across transactions on one thread.
    pub fn clear(&mut self) {
        self.versions.clear();
        self.conflict = None;
    }

    // ========================================================================
    //  Merge Protocol
    // ========================================================================

    /// Merge one page observed by a read.
    ///
    /// # Errors
    ///
    /// Returns a conflict if `page` was recorded at a different version.
    pub fn observe(&mut self, page: PageRef, version: Version) -> Result<(), VersionConflict> {
        let recorded: Version = match self.versions.entry(page) {
            Entry::Vacant(slot) => {
                slot.insert(version);
                return Ok(());
            }
            Entry::Occupied(slot) => *slot.get(),
        };

        if recorded == version {
            Ok(())
        } else {
            Err(self.latch(VersionConflict {
                page,
                recorded,
                observed: version,
            }))
        }
    }

    /// Merge every page observed by one call.
    ///
    /// All pages are merged even after a conflict, so the set records every
    /// first sighting of the call.
    ///
    /// # Errors
    ///
    /// Returns the first conflict among the merged pages.
    pub fn merge<I>(&mut self, observed: I) -> Result<(), VersionConflict>
    where
        I: IntoIterator<Item = (PageRef, Version)>,
    {
        let mut first: Option<VersionConflict> = None;

        for (page, version) in observed {
            if let Err(conflict) = self.observe(page, version) {
                first.get_or_insert(conflict);
            }
        }

        first.map_or(Ok(()), Err)
    }

    /// Merge a page the caller itself just modified.
    ///
    /// `prior` is the version the writer found before its change and `new`
    /// the version it left. A recorded `prior` moves to `new`: the
    /// transaction's own write is not a conflict. An unrecorded page is
    /// recorded at `new`.
    ///
    /// # Errors
    ///
    /// Returns a conflict if `page` was recorded at a version other than
    /// `prior`, meaning someone else changed it first.
    pub fn advance(
        &mut self,
        page: PageRef,
        prior: Version,
        new: Version,
    ) -> Result<(), VersionConflict> {
        let recorded: Version = match self.versions.entry(page) {
            Entry::Vacant(slot) => {
                slot.insert(new);
                return Ok(());
            }
            Entry::Occupied(mut slot) => {
                let recorded: Version = *slot.get();
                if recorded == prior {
                    slot.insert(new);
                    return Ok(());
                }
                recorded
            }
        };

        Err(self.latch(VersionConflict {
            page,
            recorded,
            observed: prior,
        }))
    }

    /// Mark the set conflicted because a write through `page` failed without
    /// reporting a version.
    ///
    /// The latched conflict carries the recorded version of `page` (or
    /// `Version::MAX` if it was never recorded) and `observed ==
    /// Version::MAX`. Recorded versions are left alone.
    pub fn poison(&mut self, page: PageRef) -> VersionConflict {
        let recorded: Version = self.get(&page).unwrap_or(Version::MAX);

        self.latch(VersionConflict {
            page,
            recorded,
            observed: Version::MAX,
        })
    }

    fn latch(&mut self, conflict: VersionConflict) -> VersionConflict {
        self.conflict.get_or_insert(conflict);
        conflict
    }
}

impl<'a> IntoIterator for &'a NodeVersionSet {
    type Item = (&'a PageRef, &'a Version);
    type IntoIter = std::collections::hash_map::Iter<'a, PageRef, Version>;

    fn into_iter(self) -> Self::IntoIter {
        self.versions.iter()
    }
}
