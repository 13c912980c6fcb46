//! Page directory of [`PageTree`](super::PageTree).

use std::ops::Deref;

use crate::handle::{Key, NodeId};

use super::page::{Page, locate};

/// Pages ordered by low fence, plus the low fence of every issued [`NodeId`].
///
/// Identities are handed out sequentially from zero and pages are never
/// retired, so `fences[id]` always names the page with that identity and
/// [`Directory::get`] is a binary search instead of a walk.
pub(crate) struct Directory<V> {
    pages: Vec<Page<V>>,

    /// Low fence of each page, indexed by `NodeId`.
    fences: Vec<Key>,
}

impl<V> Directory<V> {
    /// A directory with one empty page covering every key.
    pub(crate) fn new() -> Self {
        Self {
            pages: vec![Page::new(NodeId::new(0), Key::MIN, Vec::new())],
            fences: vec![Key::MIN],
        }
    }

    /// Identity the next published page must carry.
    #[inline]
    pub(crate) fn next_id(&self) -> NodeId {
        NodeId::new(self.fences.len() as u64)
    }

    /// Publish `page` directly after position `idx`.
    pub(crate) fn insert_after(&mut self, idx: usize, page: Page<V>) {
        debug_assert_eq!(page.id(), self.next_id());
        debug_assert!(page.low() > self.pages[idx].low());
        debug_assert!(self.pages.get(idx + 1).is_none_or(|next| page.low() < next.low()));

        self.fences.push(page.low());
        self.pages.insert(idx + 1, page);
    }

    /// The page with identity `node`, if it was ever issued.
    pub(crate) fn get(&self, node: NodeId) -> Option<&Page<V>> {
        let slot: usize = usize::try_from(node.get()).ok()?;
        let low: Key = *self.fences.get(slot)?;
        let page: &Page<V> = &self.pages[locate(&self.pages, low)];

        debug_assert_eq!(page.id(), node);
        (page.id() == node).then_some(page)
    }
}

impl<V> Deref for Directory<V> {
    type Target = [Page<V>];

    #[inline]
    fn deref(&self) -> &[Page<V>] {
        &self.pages
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "fail fast in tests")]
mod tests {
    use super::*;

    #[test]
    fn test_new_has_one_page() {
        let directory: Directory<()> = Directory::new();

        assert_eq!(directory.len(), 1);
        assert_eq!(directory.next_id(), NodeId::new(1));
        assert_eq!(directory.get(NodeId::new(0)).unwrap().low(), Key::MIN);
    }

    #[test]
    fn test_get_finds_pages_out_of_id_order() {
        let mut directory: Directory<()> = Directory::new();

        // Fences 0, 10, 20 published as ids 0, 2, 1
        let id = directory.next_id();
        directory.insert_after(0, Page::new(id, 20, Vec::new()));
        let id = directory.next_id();
        directory.insert_after(0, Page::new(id, 10, Vec::new()));

        let lows: Vec<Key> = directory.iter().map(Page::low).collect();
        assert_eq!(lows, vec![0, 10, 20]);

        assert_eq!(directory.get(NodeId::new(1)).unwrap().low(), 20);
        assert_eq!(directory.get(NodeId::new(2)).unwrap().low(), 10);
        assert_eq!(directory[locate(&directory, 15)].id(), NodeId::new(2));
    }

    #[test]
    fn test_get_unknown_id() {
        let directory: Directory<()> = Directory::new();

        assert!(directory.get(NodeId::new(1)).is_none());
        assert!(directory.get(NodeId::new(u64::MAX)).is_none());
    }
}
