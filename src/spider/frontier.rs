//! Visited set and pending-link queue.
//!
//! The frontier is owned by the crawl loop: one task holds the map, so
//! membership checks and inserts need no lock. Discovered links go through a
//! queue rather than spawned tasks, which keeps task growth bounded on large
//! site graphs.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use rustc_hash::FxHashSet;
use tokio::sync::mpsc;
use tokio::time::timeout_at;
use tracing::trace;

// ============================================================================
// Dequeue
// ============================================================================

/// Outcome of one frontier dequeue attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dequeue {
    /// An unvisited link, now marked visited.
    Link(String),
    /// No new link arrived within the idle window.
    Idle,
}

// ============================================================================
// Frontier
// ============================================================================

/// The crawler's visited set and pending-link queue.
///
/// Membership is write-once: a link already marked visited is dropped on
/// dequeue, not re-added, so every unique link is visited at most once no
/// matter how many times it is discovered.
pub struct Frontier {
    visited: FxHashSet<String>,
    queue_tx: mpsc::UnboundedSender<String>,
    queue_rx: mpsc::UnboundedReceiver<String>,
}

impl Frontier {
    /// Creates an empty frontier.
    #[must_use]
    pub fn new() -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            visited: FxHashSet::default(),
            queue_tx,
            queue_rx,
        }
    }

    /// Enqueues a link for future exploration.
    ///
    /// Duplicates are allowed here; they are filtered on dequeue.
    pub fn enqueue(&self, link: impl Into<String>) {
        // Cannot fail: the receiver lives in self.
        let _ = self.queue_tx.send(link.into());
    }

    /// Dequeues the next unvisited link, waiting up to `idle` for one.
    ///
    /// Already-visited links are discarded without resetting the idle
    /// window: a duplicate is not a new link.
    pub async fn next(&mut self, idle: Duration) -> Dequeue {
        let deadline = tokio::time::Instant::now() + idle;

        loop {
            match timeout_at(deadline, self.queue_rx.recv()).await {
                Ok(Some(link)) => {
                    if self.visited.contains(&link) {
                        trace!(link = %link, "already visited");
                        continue;
                    }
                    self.visited.insert(link.clone());
                    return Dequeue::Link(link);
                }
                // The sender lives in self, so the channel cannot close;
                // treat it like exhaustion anyway.
                Ok(None) => return Dequeue::Idle,
                Err(_) => return Dequeue::Idle,
            }
        }
    }

    /// Number of links visited so far.
    #[inline]
    #[must_use]
    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    /// Returns `true` if `link` has been visited.
    #[inline]
    #[must_use]
    pub fn is_visited(&self, link: &str) -> bool {
        self.visited.contains(link)
    }
}

impl Default for Frontier {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
