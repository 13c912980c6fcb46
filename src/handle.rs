//! Opaque identities for tables and index pages.
//!
//! A [`NodeId`] names a page of a collaborator's sorted structure. It is only
//! ever hashed and compared; nothing in this crate resolves it back to page
//! memory. Because one [`NodeVersionSet`](crate::NodeVersionSet) spans every
//! table a transaction touches, pages are recorded as [`PageRef`]s qualified by
//! their table.

use std::fmt as StdFmt;

/// Index key. Fixed-width and totally ordered.
pub type Key = u64;

/// Structural version of a page as reported by its collaborator.
pub type Version = u64;

/// Identifier of a table; used only to select an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableId(pub u64);

impl From<u64> for TableId {
    #[inline]
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl StdFmt::Display for TableId {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        write!(f, "table#{}", self.0)
    }
}

/// Stable identity of a collaborator page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Wrap a collaborator-assigned page number.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw page number.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl StdFmt::Display for NodeId {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// A page qualified by the table whose index owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageRef {
    /// Owning table.
    pub table: TableId,

    /// Page within that table's index.
    pub node: NodeId,
}

impl PageRef {
    /// Qualify `node` with `table`.
    #[inline]
    #[must_use]
    pub const fn new(table: TableId, node: NodeId) -> Self {
        Self { table, node }
    }
}

impl StdFmt::Display for PageRef {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        write!(f, "{}/{}", self.table, self.node)
    }
}

/// One page a collaborator call touched, and the version it saw there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeObservation {
    /// Page touched.
    pub node: NodeId,

    /// Stable version observed on it.
    pub version: Version,
}

impl NodeObservation {
    /// Create an observation.
    #[inline]
    #[must_use]
    pub const fn new(node: NodeId, version: Version) -> Self {
        Self { node, version }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_refs_differ_across_tables() {
        let node = NodeId::new(7);
        let a = PageRef::new(TableId(1), node);
        let b = PageRef::new(TableId(2), node);

        assert_ne!(a, b);
        assert_eq!(a.node, b.node);
    }

    #[test]
    fn test_display() {
        let page = PageRef::new(TableId::from(3), NodeId::new(9));
        assert_eq!(page.to_string(), "table#3/node#9");
    }
}
