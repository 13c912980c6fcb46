//! The sorted-index collaborator an [`Index`](crate::Index) wraps.
//!
//! Page layout, splits, latching and page versioning all live behind
//! [`SortedIndex`]. The index layer only asks it to read, insert, scan and
//! delete, and to report which pages each call touched at which version.
//! [`PageTree`](crate::PageTree) is the built-in implementation; tests inject
//! scripted fakes to drive conflicts deterministically.

use std::ops::ControlFlow;

use crate::handle::{Key, NodeId, NodeObservation, Version};

/// Direction of a range scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanDirection {
    /// Ascending key order.
    Forward,

    /// Descending key order.
    Reverse,
}

/// Outcome of [`SortedIndex::optimistic_read`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOutcome<V> {
    /// The stored value, if the key is present.
    pub value: Option<V>,

    /// Every page the lookup touched.
    pub touched: Vec<NodeObservation>,
}

/// Outcome of [`SortedIndex::try_insert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome<V> {
    /// Key added. `node` went from version `prior` to `new`.
    Inserted {
        /// Page the key was inserted through.
        node: NodeId,
        /// Version of `node` before the insert.
        prior: Version,
        /// Version of `node` after the insert.
        new: Version,
    },

    /// Key already present; nothing changed.
    Exists {
        /// Value stored under the key.
        existing: V,
        /// Page holding the key, at the version seen.
        observed: NodeObservation,
    },

    /// Structural insert failed because of a concurrent change.
    Conflict {
        /// Page the insert was going through when it failed.
        node: NodeId,
    },

    /// Insert refused for a reason unrelated to concurrency.
    Rejected,
}

/// Outcome of [`SortedIndex::delete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Key removed. `node` went from version `prior` to `new`.
    Deleted {
        /// Page the key was removed from.
        node: NodeId,
        /// Version of `node` before the delete.
        prior: Version,
        /// Version of `node` after the delete.
        new: Version,
    },

    /// Key was not present.
    Absent,
}

/// A concurrent sorted map from [`Key`] to a value handle, versioned per page.
///
/// Implementations must give each call a view that is consistent per page,
/// even if stale, and must bump a page's version whenever its content changes
/// structurally. Values are handles (`Arc`s, row ids); they are cloned out,
/// never borrowed past the call.
pub trait SortedIndex: Send + Sync {
    /// Value handle stored under each key.
    type Value: Clone;

    /// Point lookup.
    fn optimistic_read(&self, key: Key) -> ReadOutcome<Self::Value>;

    /// Add `key` unless present.
    fn try_insert(&self, key: Key, value: Self::Value) -> InsertOutcome<Self::Value>;

    /// Visit pairs with `low <= key <= high` in `direction` order.
    ///
    /// Stops as soon as `visit` breaks. Returns every page touched, including
    /// the page the scan stopped in.
    fn optimistic_scan<F>(
        &self,
        low: Key,
        high: Key,
        direction: ScanDirection,
        visit: F,
    ) -> Vec<NodeObservation>
    where
        F: FnMut(Key, &Self::Value) -> ControlFlow<()>;

    /// Remove `key` if present.
    fn delete(&self, key: Key) -> DeleteOutcome;

    /// Current version of `node`, or `None` if the id is not a live page.
    fn node_version(&self, node: NodeId) -> Option<Version>;

    /// Number of stored keys.
    fn len(&self) -> usize;

    /// True if no key is stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
