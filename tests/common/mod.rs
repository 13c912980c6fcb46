//! Common test utilities: tracing setup and a scripted collaborator.
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//!
//! #[test]
//! fn my_test() {
//!     common::init_tracing();
//!     let tree = common::ScriptedIndex::new(10);
//!     // ...
//! }
//! ```
//!
//! # Configuration
//!
//! Environment variables:
//! - `RUST_LOG`: Filter directives (e.g., `occ_index=debug`)
//! - `OCC_INDEX_LOG_DIR`: Log directory (default: `logs/`)
//! - `OCC_INDEX_LOG_CONSOLE`: Set to "0" to disable console output
//!
//! Library events only reach the subscriber when the crate is built with
//! `--features tracing`.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fs::OpenOptions;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Once;

use occ_index::{
    DeleteOutcome, InsertOutcome, Key, NodeId, NodeObservation, ReadOutcome, ScanDirection,
    SortedIndex, Version,
};
use parking_lot::Mutex;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

// ============================================================================
//  Tracing
// ============================================================================

/// Ensures tracing is only initialized once across all tests.
static INIT: Once = Once::new();

/// Initialize the tracing subscriber with file and console logging.
///
/// Safe to call multiple times - only the first call takes effect.
pub fn init_tracing() {
    INIT.call_once(setup_tracing);
}

/// Configuration for tracing setup.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Directory for log files.
    pub log_dir: PathBuf,
    /// Log file name.
    pub log_file: String,
    /// Enable console output.
    pub console_enabled: bool,
    /// Default log level if RUST_LOG is not set.
    pub default_level: Level,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            log_file: "occ_index.jsonl".to_string(),
            console_enabled: true,
            default_level: Level::INFO,
        }
    }
}

impl TracingConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = env::var("OCC_INDEX_LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }

        if env::var("OCC_INDEX_LOG_CONSOLE").is_ok_and(|v| v == "0") {
            config.console_enabled = false;
        }

        config
    }
}

/// Create an EnvFilter from RUST_LOG or use default level.
fn make_filter(default_level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("{default_level}")))
}

#[expect(clippy::expect_used)]
fn setup_tracing() {
    let config = TracingConfig::from_env();

    std::fs::create_dir_all(&config.log_dir).expect("Failed to create log directory");

    let log_path = config.log_dir.join(&config.log_file);

    // Append mode: nextest runs tests in separate processes
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .expect("Failed to open log file");

    let console_layer = config.console_enabled.then(|| {
        tracing_subscriber::fmt::layer()
            .with_thread_ids(true)
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .compact()
            .with_filter(make_filter(config.default_level))
    });

    // One JSON object per line
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::sync::Mutex::new(file))
        .with_thread_ids(true)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .json()
        .with_filter(make_filter(config.default_level));

    let _ = Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

// ============================================================================
//  ScriptedIndex
// ============================================================================

/// Deterministic collaborator with fixed page boundaries.
///
/// Key `k` lives on page `k / span`. Every page starts at version 0; each
/// insert or delete bumps its page by 1. Tests can bump pages by hand to
/// simulate foreign structural changes, and script the next insert to fail.
pub struct ScriptedIndex {
    span: u64,
    state: Mutex<ScriptedState>,
}

#[derive(Default)]
struct ScriptedState {
    entries: BTreeMap<Key, &'static str>,
    versions: HashMap<NodeId, Version>,
    next_insert: Option<ScriptedInsert>,
}

#[derive(Debug, Clone, Copy)]
enum ScriptedInsert {
    Conflict,
    Rejected,
}

impl ScriptedState {
    fn version(&self, node: NodeId) -> Version {
        self.versions.get(&node).copied().unwrap_or(0)
    }

    fn bump(&mut self, node: NodeId) -> (Version, Version) {
        let slot = self.versions.entry(node).or_insert(0);
        let prior = *slot;
        *slot += 1;
        (prior, *slot)
    }
}

impl ScriptedIndex {
    /// Pages of `span` consecutive keys each.
    pub fn new(span: u64) -> Self {
        assert!(span > 0);
        Self {
            span,
            state: Mutex::new(ScriptedState::default()),
        }
    }

    /// Page holding `key`.
    pub fn page_of(&self, key: Key) -> NodeId {
        NodeId::new(key / self.span)
    }

    /// Simulate a foreign structural change of `node`.
    pub fn bump(&self, node: NodeId) {
        self.state.lock().bump(node);
    }

    /// Make the next insert fail as a structural conflict.
    pub fn fail_next_insert(&self) {
        self.state.lock().next_insert = Some(ScriptedInsert::Conflict);
    }

    /// Make the next insert be refused.
    pub fn reject_next_insert(&self) {
        self.state.lock().next_insert = Some(ScriptedInsert::Rejected);
    }
}

impl SortedIndex for ScriptedIndex {
    type Value = &'static str;

    fn optimistic_read(&self, key: Key) -> ReadOutcome<&'static str> {
        let state = self.state.lock();
        let node = self.page_of(key);

        ReadOutcome {
            value: state.entries.get(&key).copied(),
            touched: vec![NodeObservation::new(node, state.version(node))],
        }
    }

    fn try_insert(&self, key: Key, value: &'static str) -> InsertOutcome<&'static str> {
        let mut state = self.state.lock();
        let node = self.page_of(key);

        match state.next_insert.take() {
            Some(ScriptedInsert::Conflict) => return InsertOutcome::Conflict { node },
            Some(ScriptedInsert::Rejected) => return InsertOutcome::Rejected,
            None => {}
        }

        if let Some(existing) = state.entries.get(&key).copied() {
            return InsertOutcome::Exists {
                existing,
                observed: NodeObservation::new(node, state.version(node)),
            };
        }

        state.entries.insert(key, value);
        let (prior, new) = state.bump(node);
        InsertOutcome::Inserted { node, prior, new }
    }

    fn optimistic_scan<F>(
        &self,
        low: Key,
        high: Key,
        direction: ScanDirection,
        mut visit: F,
    ) -> Vec<NodeObservation>
    where
        F: FnMut(Key, &&'static str) -> ControlFlow<()>,
    {
        let state = self.state.lock();
        let mut touched: Vec<NodeObservation> = Vec::new();
        if low > high {
            return touched;
        }

        let touch = |node: NodeId, touched: &mut Vec<NodeObservation>| {
            if touched.last().is_none_or(|obs| obs.node != node) {
                touched.push(NodeObservation::new(node, state.version(node)));
            }
        };

        let start = match direction {
            ScanDirection::Forward => low,
            ScanDirection::Reverse => high,
        };
        touch(self.page_of(start), &mut touched);

        let range = state.entries.range(low..=high);
        let ordered: Box<dyn Iterator<Item = (&Key, &&'static str)>> = match direction {
            ScanDirection::Forward => Box::new(range),
            ScanDirection::Reverse => Box::new(range.rev()),
        };

        for (k, v) in ordered {
            touch(self.page_of(*k), &mut touched);
            if visit(*k, v).is_break() {
                break;
            }
        }

        touched
    }

    fn delete(&self, key: Key) -> DeleteOutcome {
        let mut state = self.state.lock();
        let node = self.page_of(key);

        if state.entries.remove(&key).is_none() {
            return DeleteOutcome::Absent;
        }

        let (prior, new) = state.bump(node);
        DeleteOutcome::Deleted { node, prior, new }
    }

    fn node_version(&self, node: NodeId) -> Option<Version> {
        Some(self.state.lock().version(node))
    }

    fn len(&self) -> usize {
        self.state.lock().entries.len()
    }
}
