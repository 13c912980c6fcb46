//! Leaf pages of [`PageTree`](super::PageTree).

use parking_lot::RwLock;

use crate::handle::{Key, NodeId, NodeObservation};
use crate::nodeversion::NodeVersion;

/// A sorted run of entries covering `[low, next page's low)`.
///
/// Content is guarded by `entries`. `version` is only bumped by a writer
/// holding the `entries` write lock, so a reader holding the read lock sees
/// the version that matches the content.
pub(crate) struct Page<V> {
    id: NodeId,

    /// Inclusive low fence. Fixed for the page's lifetime.
    low: Key,

    version: NodeVersion,

    entries: RwLock<Vec<(Key, V)>>,
}

impl<V> Page<V> {
    pub(crate) fn new(id: NodeId, low: Key, entries: Vec<(Key, V)>) -> Self {
        debug_assert!(entries.first().is_none_or(|(k, _)| *k >= low));

        Self {
            id,
            low,
            version: NodeVersion::new(),
            entries: RwLock::new(entries),
        }
    }

    #[inline]
    pub(crate) const fn id(&self) -> NodeId {
        self.id
    }

    #[inline]
    pub(crate) const fn low(&self) -> Key {
        self.low
    }

    #[inline]
    pub(crate) const fn version(&self) -> &NodeVersion {
        &self.version
    }

    #[inline]
    pub(crate) const fn entries(&self) -> &RwLock<Vec<(Key, V)>> {
        &self.entries
    }

    /// Observation of this page at its current version.
    #[inline]
    pub(crate) fn observe(&self) -> NodeObservation {
        NodeObservation::new(self.id, self.version.current())
    }

    /// Mutable access for a page not yet published to the directory.
    #[inline]
    pub(crate) fn entries_mut(&mut self) -> &mut Vec<(Key, V)> {
        self.entries.get_mut()
    }
}

/// Position of the page covering `key` in a directory sorted by low fence.
#[inline]
pub(crate) fn locate<V>(directory: &[Page<V>], key: Key) -> usize {
    directory
        .partition_point(|page| page.low() <= key)
        .saturating_sub(1)
}

/// Position of `key` in a sorted entry run.
#[inline]
pub(crate) fn search<V>(entries: &[(Key, V)], key: Key) -> Result<usize, usize> {
    entries.binary_search_by_key(&key, |(k, _)| *k)
}
