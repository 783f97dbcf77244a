//! Priority-aware batching of transfer work.
//!
//! # Design
//! - Batch size shrinks as the workload grows so a single batch stays bounded.
//! - High-priority items are emitted in their own batches, all before any
//!   regular batch. Relative order is preserved on both sides of the split.

use std::path::Path;
use std::vec;

use tracing::info;

/// Suffixes of assets needed before first paint.
const PRIORITY_SUFFIXES: [&str; 2] = [".html", ".css"];
/// Path fragments marking core bundle entry points.
const PRIORITY_MARKERS: [&str; 3] = ["main-", "chunks/pages/", "chunks/app/"];

/// Batch size for a workload of `total` items.
#[must_use]
pub const fn batch_size(total: usize) -> usize {
    if total > 1000 {
        50
    } else if total > 500 {
        100
    } else {
        200
    }
}

/// Whether a relative asset path belongs on the critical rendering path.
///
/// Matching is case-insensitive and uses `/` separators on every platform.
#[must_use]
pub fn is_priority_asset(relative: &Path) -> bool {
    let lower = relative.to_string_lossy().replace('\\', "/").to_lowercase();
    PRIORITY_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
        || PRIORITY_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// A group of items processed concurrently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch<T> {
    /// Items in this batch.
    pub items: Vec<T>,
    /// Whether every item satisfied the priority predicate.
    pub high_priority: bool,
}

impl<T> Batch<T> {
    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the batch holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Lazily yields batches: priority items first, then the rest.
#[derive(Debug)]
pub struct BatchPlan<T> {
    priority: vec::IntoIter<T>,
    rest: vec::IntoIter<T>,
    batch_size: usize,
}

impl<T> BatchPlan<T> {
    /// Configured batch size.
    #[must_use]
    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Items not yet emitted.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.priority.len() + self.rest.len()
    }
}

impl<T> Iterator for BatchPlan<T> {
    type Item = Batch<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let items: Vec<T> = self.priority.by_ref().take(self.batch_size).collect();
        if !items.is_empty() {
            return Some(Batch {
                items,
                high_priority: true,
            });
        }
        let items: Vec<T> = self.rest.by_ref().take(self.batch_size).collect();
        (!items.is_empty()).then_some(Batch {
            items,
            high_priority: false,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let batches = self.priority.len().div_ceil(self.batch_size)
            + self.rest.len().div_ceil(self.batch_size);
        (batches, Some(batches))
    }
}

/// Plan batches using the workload-derived [`batch_size`].
pub fn plan<T>(items: Vec<T>, is_priority: Option<&dyn Fn(&T) -> bool>) -> BatchPlan<T> {
    let size = batch_size(items.len());
    plan_with_size(items, size, is_priority)
}

/// Plan batches of at most `size` items (a size of zero is treated as one).
pub fn plan_with_size<T>(
    items: Vec<T>,
    size: usize,
    is_priority: Option<&dyn Fn(&T) -> bool>,
) -> BatchPlan<T> {
    let total = items.len();
    let (priority, rest) = match is_priority {
        Some(predicate) => {
            let (priority, rest): (Vec<T>, Vec<T>) =
                items.into_iter().partition(|item| predicate(item));
            info!(
                high_priority = priority.len(),
                total, "prioritized high priority files"
            );
            (priority, rest)
        }
        None => (Vec::new(), items),
    };
    BatchPlan {
        priority: priority.into_iter(),
        rest: rest.into_iter(),
        batch_size: size.max(1),
    }
}
