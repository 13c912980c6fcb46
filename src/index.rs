//! Per-table index: the node-version validation layer.
//!
//! [`Index`] wraps one table's [`SortedIndex`] collaborator. Every tracked
//! call merges the pages the collaborator touched into the caller's
//! [`NodeVersionSet`]:
//!
//! | Call                   | Merge        | Conflict code |
//! |------------------------|--------------|---------------|
//! | `find_tracked`         | `observe`    | `BAD_SCAN`    |
//! | `insert_tracked`       | `advance`    | `BAD_INSERT`  |
//! | `remove_tracked`       | `advance`    | `BAD_INSERT`  |
//! | `get_kv_in_range`      | `merge`      | `BAD_SCAN`    |
//! | `get_kv_in_rev_range`  | `merge`      | `BAD_SCAN`    |
//!
//! A conflict always wins over the logical outcome of the call, and a set
//! that has conflicted once keeps every later tracked call failing. Writes are
//! applied before the merge; a conflicting insert or delete is not rolled
//! back, since undoing it belongs to the caller's abort path.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt as StdFmt;
use std::ops::ControlFlow;

use crate::handle::{Key, NodeId, NodeObservation, PageRef, TableId, Version};
use crate::sorted::{DeleteOutcome, InsertOutcome, ScanDirection, SortedIndex};
use crate::status::{IndexError, InsertError};
use crate::tracing_helpers::{debug_log, trace_log, warn_log};
use crate::version_set::{NodeVersionSet, VersionConflict};


/// Sorted index of one table, validated through node versions.
///
/// # Example
///
/// ```rust
/// use occ_index::{Index, NodeVersionSet, PageTree, TableId};
///
/// let index: Index<PageTree<&str>> = Index::new(TableId(1), PageTree::new());
/// let mut txn = NodeVersionSet::new();
///
/// index.insert_tracked(10, "a", &mut txn).unwrap();
/// assert_eq!(index.find_tracked(10, &mut txn), Ok("a"));
/// ```
pub struct Index<T> {
    table: TableId,
    tree: T,
}

impl<T: SortedIndex> StdFmt::Debug for Index<T> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("Index")
            .field("table", &self.table)
            .field("len", &self.tree.len())
            .finish_non_exhaustive()
    }
}

impl<T: SortedIndex> Index<T> {
    /// Wrap `tree` as the index of `table`.
    #[must_use]
    pub const fn new(table: TableId, tree: T) -> Self {
        Self { table, tree }
    }

    /// Table this index belongs to.
    #[inline]
    #[must_use]
    pub const fn table(&self) -> TableId {
        self.table
    }

    /// The wrapped collaborator.
    #[inline]
    #[must_use]
    pub const fn tree(&self) -> &T {
        &self.tree
    }

    /// Number of stored keys.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// True if no key is stored.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    #[inline]
    const fn page(&self, node: NodeId) -> PageRef {
        PageRef::new(self.table, node)
    }

    // ========================================================================
    //  Point Lookup
    // ========================================================================

    /// Point lookup without version tracking.
    ///
    /// # Errors
    ///
    /// [`IndexError::NotFound`] if `key` is absent.
    pub fn find(&self, key: Key) -> Result<T::Value, IndexError> {
        self.tree
            .optimistic_read(key)
            .value
            .ok_or(IndexError::NotFound)
    }

    /// Point lookup that merges the pages it touched into `versions`.
    ///
    /// Only the page covering `key` is recorded. If a foreign split moves
    /// `key` to a new page, a repeated lookup records that page at its first
    /// version and succeeds without a conflict. The page recorded earlier
    /// has moved, so [`Index::validate`] reports it at commit.
    ///
    /// # Errors
    ///
    /// - [`IndexError::BadScan`] if a touched page conflicts with `versions`,
    ///   or `versions` already holds a conflict. Takes precedence over the
    ///   lookup result.
    /// - [`IndexError::NotFound`] if `key` is absent.
    pub fn find_tracked(
        &self,
        key: Key,
        versions: &mut NodeVersionSet,
    ) -> Result<T::Value, IndexError> {
        let read = self.tree.optimistic_read(key);

        self.merge_observed(&read.touched, versions)
            .map_err(|_| IndexError::BadScan)?;

        read.value.ok_or(IndexError::NotFound)
    }

    // ========================================================================
    //  Insert
    // ========================================================================

    /// Add `key` without version tracking.
    ///
    /// # Errors
    ///
    /// - [`InsertError::AlreadyInserted`] with the stored value if `key` is
    ///   present. The stored value is not replaced.
    /// - [`InsertError::BadInsert`] if the structural insert failed.
    /// - [`InsertError::NotInserted`] if the collaborator refused the key.
    pub fn insert(&self, key: Key, value: T::Value) -> Result<(), InsertError<T::Value>> {
        match self.tree.try_insert(key, value) {
            InsertOutcome::Inserted { .. } => Ok(()),
            InsertOutcome::Exists { existing, .. } => {
                Err(InsertError::AlreadyInserted { existing })
            }
            InsertOutcome::Conflict { .. } => Err(InsertError::BadInsert),
            InsertOutcome::Rejected => Err(InsertError::NotInserted),
        }
    }

    /// Add `key`, merging the page it went through into `versions`.
    ///
    /// The page's move from its prior to its new version is recorded as this
    /// transaction's own write.
    ///
    /// # Errors
    ///
    /// - [`InsertError::BadInsert`] if the touched page conflicts with
    ///   `versions`, `versions` already holds a conflict, or the structural
    ///   insert failed. Takes precedence over a duplicate key. A failed
    ///   structural insert also marks `versions` conflicted.
    /// - [`InsertError::AlreadyInserted`] with the stored value if `key` is
    ///   present.
    /// - [`InsertError::NotInserted`] if the collaborator refused the key.
    pub fn insert_tracked(
        &self,
        key: Key,
        value: T::Value,
        versions: &mut NodeVersionSet,
    ) -> Result<(), InsertError<T::Value>> {
        match self.tree.try_insert(key, value) {
            InsertOutcome::Inserted { node, prior, new } => {
                trace_log!(table = %self.table, key, node = %node, prior, new, "inserted");
                self.merge_write(node, prior, new, versions)
                    .map_err(|_| InsertError::BadInsert)
            }

            InsertOutcome::Exists { existing, observed } => {
                self.merge_observed(&[observed], versions)
                    .map_err(|_| InsertError::BadInsert)?;
                Err(InsertError::AlreadyInserted { existing })
            }

            InsertOutcome::Conflict { node } => {
                debug_log!(table = %self.table, key, node = %node, "structural insert conflict");
                versions.poison(self.page(node));
                Err(InsertError::BadInsert)
            }

            InsertOutcome::Rejected => {
                Self::check_poisoned(versions).map_err(|_| InsertError::BadInsert)?;
                Err(InsertError::NotInserted)
            }
        }
    }

    // ========================================================================
    //  Delete
    // ========================================================================

    /// Delete `key` unconditionally.
    ///
    /// Always succeeds, whether or not `key` was present, and validates
    /// nothing. Use [`Index::remove_tracked`] inside a transaction.
    #[allow(
        clippy::unnecessary_wraps,
        reason = "same result contract as every other operation"
    )]
    pub fn remove(&self, key: Key) -> Result<(), IndexError> {
        let _ = self.tree.delete(key);
        Ok(())
    }

    /// Delete `key`, merging the page it was removed from into `versions`.
    ///
    /// # Errors
    ///
    /// - [`IndexError::BadInsert`] if the touched page conflicts with
    ///   `versions` or `versions` already holds a conflict.
    /// - [`IndexError::NotDeleted`] if `key` was absent.
    pub fn remove_tracked(
        &self,
        key: Key,
        versions: &mut NodeVersionSet,
    ) -> Result<(), IndexError> {
        match self.tree.delete(key) {
            DeleteOutcome::Deleted { node, prior, new } => {
                trace_log!(table = %self.table, key, node = %node, prior, new, "deleted");
                self.merge_write(node, prior, new, versions)
                    .map_err(|_| IndexError::BadInsert)
            }

            DeleteOutcome::Absent => {
                Self::check_poisoned(versions).map_err(|_| IndexError::BadInsert)?;
                Err(IndexError::NotDeleted)
            }
        }
    }

    // ========================================================================
    //  Range Scans
    // ========================================================================

    /// Collect pairs with `low <= key <= high` in ascending order.
    ///
    /// At most `max_count` pairs are added to `out`; the scan stops at the
    /// page where the limit is reached. An empty range (`low > high`) or a
    /// zero limit collects nothing and touches no page. Every page touched is
    /// merged into `versions`.
    ///
    /// Returns the number of pairs added.
    ///
    /// # Errors
    ///
    /// [`IndexError::BadScan`] if a touched page conflicts with `versions` or
    /// `versions` already holds a conflict. `out` keeps whatever the scan
    /// collected, but none of it may be trusted.
    pub fn get_kv_in_range(
        &self,
        low: Key,
        high: Key,
        max_count: usize,
        out: &mut BTreeMap<Key, T::Value>,
        versions: &mut NodeVersionSet,
    ) -> Result<usize, IndexError> {
        self.scan_into(low, high, max_count, ScanDirection::Forward, versions, |k, v| {
            out.insert(k, v);
        })
    }

    /// Collect pairs with `low <= key <= high` in descending order.
    ///
    /// Same contract as [`Index::get_kv_in_range`], except that the scan runs
    /// from `high` down, so a limited scan keeps the highest keys. `out` is
    /// keyed by [`Reverse`] so it iterates in descending key order.
    ///
    /// # Errors
    ///
    /// [`IndexError::BadScan`] if a touched page conflicts with `versions` or
    /// `versions` already holds a conflict.
    pub fn get_kv_in_rev_range(
        &self,
        low: Key,
        high: Key,
        max_count: usize,
        out: &mut BTreeMap<Reverse<Key>, T::Value>,
        versions: &mut NodeVersionSet,
    ) -> Result<usize, IndexError> {
        self.scan_into(low, high, max_count, ScanDirection::Reverse, versions, |k, v| {
            out.insert(Reverse(k), v);
        })
    }

    fn scan_into<F>(
        &self,
        low: Key,
        high: Key,
        max_count: usize,
        direction: ScanDirection,
        versions: &mut NodeVersionSet,
        mut emit: F,
    ) -> Result<usize, IndexError>
    where
        F: FnMut(Key, T::Value),
    {
        let mut collected: usize = 0;

        if max_count > 0 && low <= high {
            let touched: Vec<NodeObservation> =
                self.tree
                    .optimistic_scan(low, high, direction, |k, v: &T::Value| {
                        emit(k, v.clone());
                        collected += 1;

                        if collected >= max_count {
                            ControlFlow::Break(())
                        } else {
                            ControlFlow::Continue(())
                        }
                    });

            trace_log!(
                table = %self.table,
                low,
                high,
                collected,
                pages = touched.len(),
                "scan"
            );

            self.merge_observed(&touched, versions)
                .map_err(|_| IndexError::BadScan)?;
        } else {
            Self::check_poisoned(versions).map_err(|_| IndexError::BadScan)?;
        }

        Ok(collected)
    }

    // ========================================================================
    //  Versions
    // ========================================================================

    /// Current version of `node`, outside the merge protocol.
    ///
    /// `None` if `node` is not a live page of this index.
    #[must_use]
    pub fn get_version_value(&self, node: NodeId) -> Option<Version> {
        self.tree.node_version(node)
    }

    /// Re-check every page of this table recorded in `versions` against its
    /// current version.
    ///
    /// Pages of other tables are ignored.
    ///
    /// # Errors
    ///
    /// The conflict already latched in `versions`, or the first page whose
    /// version moved. A page that is no longer live is reported with
    /// `observed == Version::MAX`.
    pub fn validate(&self, versions: &NodeVersionSet) -> Result<(), VersionConflict> {
        versions.validate()?;

        for (page, recorded) in versions.iter() {
            if page.table != self.table {
                continue;
            }

            let current: Option<Version> = self.tree.node_version(page.node);
            if current.is_none() {
                warn_log!(page = %page, recorded, "recorded page is no longer live");
            }

            if current != Some(recorded) {
                debug_log!(page = %page, recorded, ?current, "validation failed");
                return Err(VersionConflict {
                    page,
                    recorded,
                    observed: current.unwrap_or(Version::MAX),
                });
            }
        }

        Ok(())
    }

    // ========================================================================
    //  Merge Helpers
    // ========================================================================

    fn merge_observed(
        &self,
        touched: &[NodeObservation],
        versions: &mut NodeVersionSet,
    ) -> Result<(), VersionConflict> {
        let merged = versions.merge(
            touched
                .iter()
                .map(|obs| (self.page(obs.node), obs.version)),
        );

        Self::report(merged, versions)
    }

    fn merge_write(
        &self,
        node: NodeId,
        prior: Version,
        new: Version,
        versions: &mut NodeVersionSet,
    ) -> Result<(), VersionConflict> {
        let merged = versions.advance(self.page(node), prior, new);

        Self::report(merged, versions)
    }

    /// A clean merge through a poisoned set still fails.
    fn report(
        merged: Result<(), VersionConflict>,
        versions: &NodeVersionSet,
    ) -> Result<(), VersionConflict> {
        if let Err(conflict) = merged {
            debug_log!(
                page = %conflict.page,
                recorded = conflict.recorded,
                observed = conflict.observed,
                "node version conflict"
            );
            return Err(conflict);
        }

        Self::check_poisoned(versions)
    }

    #[inline]
    fn check_poisoned(versions: &NodeVersionSet) -> Result<(), VersionConflict> {
        versions.validate()
    }
}
