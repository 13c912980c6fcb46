//! Standard memory orderings for page version access.
//!
//! These constants keep ordering usage consistent across the crate and make
//! the intent clear at each access point.

use std::sync::atomic::Ordering;

/// Ordering for reading a page version.
/// Pairs with the writer's `BUMP_ORD` increment.
pub const VERSION_ORD: Ordering = Ordering::Acquire;

/// Ordering for bumping a page version after a content change.
/// The page write lock already orders writers against each other.
pub const BUMP_ORD: Ordering = Ordering::Release;

/// Ordering for plain counters with no data to publish.
pub const RELAXED: Ordering = Ordering::Relaxed;
