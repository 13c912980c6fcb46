//! `PageTree` - the built-in concurrent sorted collaborator.
//!
//! A directory of leaf pages ordered by low fence key. Each page holds up to
//! `WIDTH` sorted entries and a [`NodeVersion`](crate::nodeversion::NodeVersion).
//!
//! # Locking
//!
//! ```text
//! read / scan     directory.read -> page.read
//! insert / delete directory.read -> page.write
//! split           directory.write -> page.write
//! ```
//!
//! Locks are always taken in this order, so there is no deadlock. Versions
//! only move under the page's write lock, so a reader holding the read lock
//! sees the version that matches the page's content. A scan holds the
//! directory read lock while it walks siblings.
//!
//! # Versions
//!
//! - Insert or delete in place bumps the page's version once.
//! - A split bumps the left page's version once. The right half becomes a new
//!   page with a fresh [`NodeId`] at version zero.
//! - Pages are never merged or retired, so every issued [`NodeId`] resolves
//!   for the lifetime of the tree.

use std::fmt as StdFmt;
use std::ops::ControlFlow;
use std::sync::atomic::AtomicUsize;

use parking_lot::RwLock;

use crate::handle::{Key, NodeId, NodeObservation, Version};
use crate::ordering::RELAXED;
use crate::sorted::{DeleteOutcome, InsertOutcome, ReadOutcome, ScanDirection, SortedIndex};
use crate::tracing_helpers::{debug_log, trace_log};

mod directory;
mod page;

use directory::Directory;
use page::{Page, locate, search};

/// Default number of entries per page.
pub const DEFAULT_WIDTH: usize = 15;

/// Concurrent paged sorted map from [`Key`] to `V`.
///
/// # Type Parameters
///
/// - `V` - Value handle, cloned out on read
/// - `WIDTH` - Maximum entries per page (at least 2)
///
/// # Example
///
/// ```rust
/// use occ_index::{PageTree, SortedIndex};
///
/// let tree: PageTree<u64> = PageTree::new();
/// tree.try_insert(7, 70);
///
/// assert_eq!(tree.optimistic_read(7).value, Some(70));
/// assert_eq!(tree.len(), 1);
/// ```
pub struct PageTree<V, const WIDTH: usize = DEFAULT_WIDTH> {
    directory: RwLock<Directory<V>>,

    /// Number of stored keys.
    count: AtomicUsize,
}

impl<V, const WIDTH: usize> StdFmt::Debug for PageTree<V, WIDTH> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("PageTree")
            .field("pages", &self.directory.read().len())
            .field("count", &self.count.load(RELAXED))
            .field("width", &WIDTH)
            .finish_non_exhaustive()
    }
}

impl<V, const WIDTH: usize> PageTree<V, WIDTH> {
    const VALID_WIDTH: () = assert!(WIDTH >= 2, "page width must be at least 2");

    /// Create an empty tree with a single page covering every key.
    #[must_use]
    pub fn new() -> Self {
        let () = Self::VALID_WIDTH;

        Self {
            directory: RwLock::new(Directory::new()),
            count: AtomicUsize::new(0),
        }
    }

    /// Number of pages.
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.directory.read().len()
    }

    /// Identity of the page currently covering `key`.
    #[must_use]
    pub fn page_of(&self, key: Key) -> NodeId {
        let directory = self.directory.read();
        directory[locate(&directory, key)].id()
    }

    /// Insert path for a full page: split under the directory write lock.
    fn insert_splitting(&self, key: Key, value: V) -> InsertOutcome<V>
    where
        V: Clone,
    {
        let mut directory = self.directory.write();
        let idx: usize = locate(&directory, key);
        let page: &Page<V> = &directory[idx];
        let mut entries = page.entries().write();

        let pos: usize = match search(&entries, key) {
            Ok(pos) => {
                return InsertOutcome::Exists {
                    existing: entries[pos].1.clone(),
                    observed: page.observe(),
                };
            }
            Err(pos) => pos,
        };

        let node: NodeId = page.id();
        let prior: Version = page.version().current();

        // Another writer split this page while we waited for the lock
        if entries.len() < WIDTH {
            entries.insert(pos, (key, value));
            let new: Version = page.version().bump();
            self.count.fetch_add(1, RELAXED);

            return InsertOutcome::Inserted { node, prior, new };
        }

        let mid: usize = entries.len() / 2;
        let upper: Vec<(Key, V)> = entries.split_off(mid);
        let right_low: Key = upper[0].0;
        let mut right: Page<V> = Page::new(directory.next_id(), right_low, upper);

        if key < right_low {
            entries.insert(pos, (key, value));
        } else {
            right.entries_mut().insert(pos - mid, (key, value));
        }

        let new: Version = page.version().bump();
        drop(entries);

        debug_log!(
            node = %node,
            right = %right.id(),
            right_low,
            "page split"
        );

        directory.insert_after(idx, right);
        self.count.fetch_add(1, RELAXED);

        InsertOutcome::Inserted { node, prior, new }
    }
}

impl<V, const WIDTH: usize> Default for PageTree<V, WIDTH> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, const WIDTH: usize> SortedIndex for PageTree<V, WIDTH>
where
    V: Clone + Send + Sync,
{
    type Value = V;

    fn optimistic_read(&self, key: Key) -> ReadOutcome<V> {
        let directory = self.directory.read();
        let page: &Page<V> = &directory[locate(&directory, key)];
        let entries = page.entries().read();

        let value: Option<V> = search(&entries, key).ok().map(|pos| entries[pos].1.clone());

        ReadOutcome {
            value,
            touched: vec![page.observe()],
        }
    }

    fn try_insert(&self, key: Key, value: V) -> InsertOutcome<V> {
        {
            let directory = self.directory.read();
            let page: &Page<V> = &directory[locate(&directory, key)];
            let mut entries = page.entries().write();

            match search(&entries, key) {
                Ok(pos) => {
                    return InsertOutcome::Exists {
                        existing: entries[pos].1.clone(),
                        observed: page.observe(),
                    };
                }

                Err(pos) if entries.len() < WIDTH => {
                    let prior: Version = page.version().current();
                    entries.insert(pos, (key, value));
                    let new: Version = page.version().bump();
                    self.count.fetch_add(1, RELAXED);

                    return InsertOutcome::Inserted {
                        node: page.id(),
                        prior,
                        new,
                    };
                }

                Err(_) => {}
            }
        }

        trace_log!(key, "page full, retrying insert with split");
        self.insert_splitting(key, value)
    }

    fn optimistic_scan<F>(
        &self,
        low: Key,
        high: Key,
        direction: ScanDirection,
        mut visit: F,
    ) -> Vec<NodeObservation>
    where
        F: FnMut(Key, &V) -> ControlFlow<()>,
    {
        let mut touched: Vec<NodeObservation> = Vec::new();
        if low > high {
            return touched;
        }

        let directory = self.directory.read();

        match direction {
            ScanDirection::Forward => {
                let start: usize = locate(&directory, low);

                'pages: for page in &directory[start..] {
                    if page.low() > high {
                        break;
                    }

                    let entries = page.entries().read();
                    touched.push(page.observe());

                    let from: usize = entries.partition_point(|(k, _)| *k < low);
                    for (k, v) in &entries[from..] {
                        if *k > high || visit(*k, v).is_break() {
                            break 'pages;
                        }
                    }
                }
            }

            ScanDirection::Reverse => {
                let end: usize = locate(&directory, high);

                'pages: for page in directory[..=end].iter().rev() {
                    let entries = page.entries().read();
                    touched.push(page.observe());

                    let to: usize = entries.partition_point(|(k, _)| *k <= high);
                    for (k, v) in entries[..to].iter().rev() {
                        if *k < low || visit(*k, v).is_break() {
                            break 'pages;
                        }
                    }

                    if page.low() <= low {
                        break;
                    }
                }
            }
        }

        touched
    }

    fn delete(&self, key: Key) -> DeleteOutcome {
        let directory = self.directory.read();
        let page: &Page<V> = &directory[locate(&directory, key)];
        let mut entries = page.entries().write();

        let Ok(pos) = search(&entries, key) else {
            return DeleteOutcome::Absent;
        };

        let prior: Version = page.version().current();
        entries.remove(pos);
        let new: Version = page.version().bump();
        self.count.fetch_sub(1, RELAXED);

        DeleteOutcome::Deleted {
            node: page.id(),
            prior,
            new,
        }
    }

    fn node_version(&self, node: NodeId) -> Option<Version> {
        self.directory
            .read()
            .get(node)
            .map(|page| page.version().current())
    }

    fn len(&self) -> usize {
        self.count.load(RELAXED)
    }
}
