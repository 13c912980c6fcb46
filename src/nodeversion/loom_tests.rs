//! Loom tests for the page version protocol.
//!
//! Models one page the way the page tree uses it: an entry run behind a
//! reader-writer lock and a version counter bumped inside the write lock.
//!
//! Run with: `RUSTFLAGS="--cfg loom" cargo test --lib nodeversion::loom_tests`
//!
//! NOTE: Loom tests use loom's own atomic types, so the counter is mirrored
//! here rather than reusing [`NodeVersion`](super::NodeVersion).

#![expect(clippy::unwrap_used, reason = "fail fast in tests")]

use loom::sync::atomic::{AtomicU64, Ordering};
use loom::sync::{Arc, RwLock};
use loom::thread;

struct LoomPage {
    entries: RwLock<Vec<u64>>,
    version: AtomicU64,
}

impl LoomPage {
    fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            version: AtomicU64::new(0),
        }
    }

    fn insert(&self, key: u64) -> (u64, u64) {
        let mut entries = self.entries.write().unwrap();
        let prior = self.version.load(Ordering::Acquire);
        entries.push(key);
        let new = self.version.fetch_add(1, Ordering::Release) + 1;
        (prior, new)
    }
}

#[test]
fn loom_version_matches_content_under_read_lock() {
    loom::model(|| {
        let page = Arc::new(LoomPage::new());

        let writer = {
            let page = Arc::clone(&page);
            thread::spawn(move || {
                let _ = page.insert(1);
                let _ = page.insert(2);
            })
        };

        {
            let entries = page.entries.read().unwrap();
            let version = page.version.load(Ordering::Acquire);
            assert_eq!(version, entries.len() as u64);
        }

        writer.join().unwrap();
        assert_eq!(page.version.load(Ordering::Acquire), 2);
    });
}

#[test]
fn loom_concurrent_writers_get_consecutive_versions() {
    loom::model(|| {
        let page = Arc::new(LoomPage::new());

        let handles: Vec<_> = (0..2)
            .map(|t| {
                let page = Arc::clone(&page);
                thread::spawn(move || page.insert(t))
            })
            .collect();

        let mut bumps: Vec<(u64, u64)> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        bumps.sort_unstable();

        assert_eq!(bumps, vec![(0, 1), (1, 2)]);
    });
}
