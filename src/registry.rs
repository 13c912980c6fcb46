//! Table registry: one [`Index`] per [`TableId`], created on first use.
//!
//! The registry is an ordinary value built once at startup and handed to
//! whoever needs it (typically behind an `Arc`). Creation goes through the
//! map's entry API, so concurrent first requests for a table agree on a single
//! index: the first writer wins and everyone else gets its instance. Indexes
//! are never evicted.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt as StdFmt;
use std::sync::Arc;

use dashmap::DashMap;

use crate::handle::{Key, NodeId, TableId, Version};
use crate::index::Index;
use crate::sorted::SortedIndex;
use crate::status::{IndexError, InsertError};
use crate::tracing_helpers::debug_log;
use crate::version_set::{NodeVersionSet, VersionConflict};

type Factory<T> = Box<dyn Fn(TableId) -> T + Send + Sync>;

/// Process-lifetime mapping from table to index.
///
/// # Example
///
/// ```rust
/// use occ_index::{IndexRegistry, NodeVersionSet, PageTree, TableId};
///
/// let registry: IndexRegistry<PageTree<u64>> = IndexRegistry::new();
/// let mut txn = NodeVersionSet::new();
///
/// registry.insert(TableId(1), 5, 50, &mut txn).unwrap();
/// assert_eq!(registry.find(TableId(1), 5, &mut txn), Ok(50));
/// assert_eq!(registry.len(), 1);
/// ```
pub struct IndexRegistry<T> {
    indexes: DashMap<TableId, Arc<Index<T>>>,
    factory: Factory<T>,
}

impl<T> StdFmt::Debug for IndexRegistry<T> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("IndexRegistry")
            .field("tables", &self.indexes.len())
            .finish_non_exhaustive()
    }
}

impl<T: SortedIndex + Default + 'static> IndexRegistry<T> {
    /// Create an empty registry whose indexes start from `T::default()`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_factory(|_| T::default())
    }
}

impl<T: SortedIndex + Default + 'static> Default for IndexRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SortedIndex> IndexRegistry<T> {
    /// Create an empty registry that builds each table's collaborator with
    /// `factory`.
    #[must_use]
    pub fn with_factory<F>(factory: F) -> Self
    where
        F: Fn(TableId) -> T + Send + Sync + 'static,
    {
        Self {
            indexes: DashMap::new(),
            factory: Box::new(factory),
        }
    }

    /// The index of `table`, created if absent.
    pub fn index(&self, table: TableId) -> Arc<Index<T>> {
        if let Some(index) = self.indexes.get(&table) {
            return Arc::clone(index.value());
        }

        let entry = self.indexes.entry(table).or_insert_with(|| {
            debug_log!(table = %table, "creating index");
            Arc::new(Index::new(table, (self.factory)(table)))
        });

        Arc::clone(entry.value())
    }

    /// The index of `table`, if it was ever created.
    #[must_use]
    pub fn get(&self, table: TableId) -> Option<Arc<Index<T>>> {
        self.indexes.get(&table).map(|index| Arc::clone(index.value()))
    }

    /// Number of tables with an index.
    #[must_use]
    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    /// True if no index was created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    /// Tables with an index, in ascending order.
    #[must_use]
    pub fn table_ids(&self) -> Vec<TableId> {
        let mut ids: Vec<TableId> = self.indexes.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

    // ========================================================================
    //  Table-Keyed Operations
    // ========================================================================

    /// [`Index::find_tracked`] on `table`.
    ///
    /// # Errors
    ///
    /// See [`Index::find_tracked`].
    pub fn find(
        &self,
        table: TableId,
        key: Key,
        versions: &mut NodeVersionSet,
    ) -> Result<T::Value, IndexError> {
        self.index(table).find_tracked(key, versions)
    }

    /// [`Index::insert_tracked`] on `table`.
    ///
    /// # Errors
    ///
    /// See [`Index::insert_tracked`].
    pub fn insert(
        &self,
        table: TableId,
        key: Key,
        value: T::Value,
        versions: &mut NodeVersionSet,
    ) -> Result<(), InsertError<T::Value>> {
        self.index(table).insert_tracked(key, value, versions)
    }

    /// [`Index::remove`] on `table`.
    ///
    /// # Errors
    ///
    /// See [`Index::remove`].
    pub fn remove(&self, table: TableId, key: Key) -> Result<(), IndexError> {
        self.index(table).remove(key)
    }

    /// [`Index::remove_tracked`] on `table`.
    ///
    /// # Errors
    ///
    /// See [`Index::remove_tracked`].
    pub fn remove_tracked(
        &self,
        table: TableId,
        key: Key,
        versions: &mut NodeVersionSet,
    ) -> Result<(), IndexError> {
        self.index(table).remove_tracked(key, versions)
    }

    /// [`Index::get_kv_in_range`] on `table`.
    ///
    /// # Errors
    ///
    /// See [`Index::get_kv_in_range`].
    pub fn get_kv_in_range(
        &self,
        table: TableId,
        low: Key,
        high: Key,
        max_count: usize,
        out: &mut BTreeMap<Key, T::Value>,
        versions: &mut NodeVersionSet,
    ) -> Result<usize, IndexError> {
        self.index(table)
            .get_kv_in_range(low, high, max_count, out, versions)
    }

    /// [`Index::get_kv_in_rev_range`] on `table`.
    ///
    /// # Errors
    ///
    /// See [`Index::get_kv_in_rev_range`].
    pub fn get_kv_in_rev_range(
        &self,
        table: TableId,
        low: Key,
        high: Key,
        max_count: usize,
        out: &mut BTreeMap<Reverse<Key>, T::Value>,
        versions: &mut NodeVersionSet,
    ) -> Result<usize, IndexError> {
        self.index(table)
            .get_kv_in_rev_range(low, high, max_count, out, versions)
    }

    /// [`Index::get_version_value`] on `table`. Does not create the index.
    #[must_use]
    pub fn get_version_value(&self, table: TableId, node: NodeId) -> Option<Version> {
        self.get(table)?.get_version_value(node)
    }

    /// Re-check every page recorded in `versions`, across all tables.
    ///
    /// # Errors
    ///
    /// The conflict already latched in `versions`, or the first page whose
    /// version moved. A page of a table without an index is reported with
    /// `observed == Version::MAX`.
    pub fn validate(&self, versions: &NodeVersionSet) -> Result<(), VersionConflict> {
        versions.validate()?;

        let mut tables: Vec<TableId> = versions.iter().map(|(page, _)| page.table).collect();
        tables.sort_unstable();
        tables.dedup();

        for table in tables {
            match self.get(table) {
                Some(index) => index.validate(versions)?,
                None => {
                    if let Some((page, recorded)) =
                        versions.iter().find(|(page, _)| page.table == table)
                    {
                        return Err(VersionConflict {
                            page,
                            recorded,
                            observed: Version::MAX,
                        });
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, clippy::expect_used, reason = "fail fast in tests")]
mod tests {
    use super::*;
    use crate::handle::PageRef;
    use crate::tree::PageTree;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_index_is_created_once() {
        let registry: IndexRegistry<PageTree<u64>> = IndexRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get(TableId(1)).is_none());

        let a = registry.index(TableId(1));
        let b = registry.index(TableId(1));

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
        assert_eq!(a.table(), TableId(1));
    }

    #[test]
    fn test_concurrent_first_access_creates_one_index() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let registry: Arc<IndexRegistry<PageTree<u64>>> =
            Arc::new(IndexRegistry::with_factory(move |_| {
                counter.fetch_add(1, Ordering::Relaxed);
                PageTree::new()
            }));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.index(TableId(7)))
            })
            .collect();

        let indexes: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().expect("thread panicked"))
            .collect();

        assert_eq!(built.load(Ordering::Relaxed), 1);
        for index in &indexes[1..] {
            assert!(Arc::ptr_eq(&indexes[0], index));
        }
    }

    #[test]
    fn test_tables_are_independent() {
        let registry: IndexRegistry<PageTree<&str>> = IndexRegistry::new();
        let mut txn = NodeVersionSet::new();

        registry.insert(TableId(1), 1, "t1", &mut txn).unwrap();
        registry.insert(TableId(2), 1, "t2", &mut txn).unwrap();

        assert_eq!(registry.find(TableId(1), 1, &mut txn), Ok("t1"));
        assert_eq!(registry.find(TableId(2), 1, &mut txn), Ok("t2"));
        assert_eq!(registry.table_ids(), vec![TableId(1), TableId(2)]);

        // Both tables' first page share a NodeId but are tracked apart
        assert_eq!(txn.len(), 2);
        assert!(registry.validate(&txn).is_ok());
    }

    #[test]
    fn test_validate_across_tables() {
        let registry: IndexRegistry<PageTree<u64>> = IndexRegistry::new();
        let mut txn = NodeVersionSet::new();

        let _ = registry.find(TableId(1), 1, &mut txn);
        let _ = registry.find(TableId(2), 1, &mut txn);
        assert!(registry.validate(&txn).is_ok());

        let _ = registry.index(TableId(2)).insert(2, 2);

        let conflict = registry.validate(&txn).unwrap_err();
        assert_eq!(conflict.page.table, TableId(2));
    }

    #[test]
    fn test_validate_unknown_table() {
        let registry: IndexRegistry<PageTree<u64>> = IndexRegistry::new();
        let mut txn = NodeVersionSet::new();
        txn.observe(PageRef::new(TableId(9), NodeId::new(0)), 0)
            .unwrap();

        let conflict = registry.validate(&txn).unwrap_err();
        assert_eq!(conflict.observed, Version::MAX);
    }

    #[test]
    fn test_version_value_does_not_create_index() {
        let registry: IndexRegistry<PageTree<u64>> = IndexRegistry::new();
        assert_eq!(registry.get_version_value(TableId(3), NodeId::new(0)), None);
        assert!(registry.is_empty());

        let index = registry.index(TableId(3));
        let node = index.tree().page_of(0);
        assert_eq!(registry.get_version_value(TableId(3), node), Some(0));
    }
}
