//! Link-following crawler.
//!
//! The spider drives one dedicated tab across a site's listing pages,
//! discovers child links and posts through an externally supplied
//! [`Extractor`], and decides when the crawl is over.
//!
//! # Termination
//!
//! The crawl runs through the states
//! `Exploring → (Exhausted | CutoffReached | MaxReached | Cancelled)`:
//!
//! - **Exhausted**: no new link was dequeued within the idle window. A
//!   heuristic stand-in for "no page references unseen links" that tolerates
//!   transient stalls, at the cost of waiting out the window once near
//!   genuine completion.
//! - **CutoffReached**: a post older than the configured cutoff was found.
//!   Listing pages present posts newest-first, so the first too-old post is
//!   a safe stopping point for the whole crawl, not just its page. If a site
//!   does not honor that ordering, the crawl ends early.
//! - **MaxReached**: the configured maximum post count was hit.
//! - **Cancelled**: the external cancellation signal fired.
//!
//! Jobs already handed to the worker pool run to completion in every case.

// ============================================================================
// Submodules
// ============================================================================

/// Visited set and pending-link queue.
pub mod frontier;

pub use frontier::{Dequeue, Frontier};

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::browser::Tab;
use crate::error::Result;
use crate::pool::Job;

// ============================================================================
// Post
// ============================================================================

/// One content item discovered on a listing page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    /// Permalink of the post.
    pub link: String,
    /// Display name of the author (used as the grouping key when saving).
    #[serde(default)]
    pub author: String,
    /// Post title.
    #[serde(default)]
    pub title: String,
    /// Publication timestamp.
    pub posted_at: DateTime<Utc>,
}

// ============================================================================
// PageExtraction
// ============================================================================

/// What one listing page yields: links to further pages plus the posts on it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageExtraction {
    /// Links to sibling/next listing pages, fed back into the frontier.
    #[serde(default)]
    pub pages: Vec<String>,
    /// Posts found on this page, newest first.
    #[serde(default)]
    pub posts: Vec<Post>,
}

// ============================================================================
// Extractor
// ============================================================================

/// Extracts child links and posts from a rendered page.
///
/// The crawler treats this purely as a data source; the only assumption it
/// makes is the newest-first ordering of `posts` used by the cutoff rule.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extracts from the page the tab is currently on.
    async fn extract(&self, tab: &Tab) -> Result<PageExtraction>;
}

/// Extractor that evaluates a site-specific script and decodes its JSON
/// result.
///
/// The script must return (stringified) JSON of the shape
/// `{"pages": [url], "posts": [{"link", "author", "title", "posted_at"}]}`.
pub struct ScriptExtractor {
    script: String,
}

impl ScriptExtractor {
    /// Creates an extractor around a listing-page script.
    #[inline]
    #[must_use]
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
        }
    }
}

#[async_trait]
impl Extractor for ScriptExtractor {
    async fn extract(&self, tab: &Tab) -> Result<PageExtraction> {
        tab.evaluate_json(&self.script).await
    }
}

// ============================================================================
// CrawlEnd / CrawlOutcome
// ============================================================================

/// Why the crawl stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlEnd {
    /// No new links within the idle window.
    Exhausted,
    /// A post older than the cutoff was found.
    CutoffReached,
    /// The maximum post count was reached.
    MaxReached,
    /// The external cancellation signal fired.
    Cancelled,
}

/// What the crawl did before it stopped.
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    /// Listing pages fetched and extracted.
    pub pages_visited: usize,
    /// Listing pages skipped after a navigation/extraction failure.
    pub pages_skipped: usize,
    /// Posts emitted as jobs.
    pub posts_emitted: usize,
    /// Why the crawl stopped.
    pub end: CrawlEnd,
}

// ============================================================================
// Spider
// ============================================================================

/// The crawl loop configuration.
#[derive(Debug, Clone)]
pub struct Spider {
    /// Idle window after which the frontier counts as exhausted.
    pub idle_timeout: Duration,
    /// Cutoff: posts older than this are treated as already archived.
    pub since: Option<DateTime<Utc>>,
    /// Maximum number of posts to emit.
    pub max_posts: usize,
    /// Per-page quiescence window.
    pub load_wait: Duration,
}

impl Spider {
    /// Creates a spider with the given idle window and no cutoff or cap.
    #[must_use]
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            idle_timeout,
            since: None,
            max_posts: usize::MAX,
            load_wait: Duration::from_secs(5),
        }
    }

    /// Sets the cutoff timestamp.
    #[inline]
    #[must_use]
    pub fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Sets the maximum number of posts to emit.
    #[inline]
    #[must_use]
    pub fn with_max_posts(mut self, max_posts: usize) -> Self {
        self.max_posts = max_posts;
        self
    }

    /// Sets the per-page quiescence window.
    #[inline]
    #[must_use]
    pub fn with_load_wait(mut self, load_wait: Duration) -> Self {
        self.load_wait = load_wait;
        self
    }

    /// Crawls from `root`, emitting discovered posts into `jobs`.
    ///
    /// Runs until one of the termination conditions hits; see the module
    /// docs. The jobs channel applies backpressure: while the consumer is
    /// saturated the crawl pauses instead of piling up work.
    pub async fn run(
        &self,
        tab: &Tab,
        root: &str,
        extractor: &dyn Extractor,
        jobs: mpsc::Sender<Job>,
        cancel: &CancellationToken,
    ) -> CrawlOutcome {
        let mut frontier = Frontier::new();
        frontier.enqueue(root);

        let mut outcome = CrawlOutcome {
            pages_visited: 0,
            pages_skipped: 0,
            posts_emitted: 0,
            end: CrawlEnd::Exhausted,
        };

        let end = 'crawl: loop {
            let link = tokio::select! {
                _ = cancel.cancelled() => break CrawlEnd::Cancelled,
                dequeued = frontier.next(self.idle_timeout) => match dequeued {
                    Dequeue::Link(link) => link,
                    Dequeue::Idle => {
                        info!("no new links within the idle window");
                        break CrawlEnd::Exhausted;
                    }
                },
            };

            info!(link = %link, "visiting");
            outcome.pages_visited += 1;

            let extraction = match self.visit(tab, &link, extractor).await {
                Ok(extraction) => extraction,
                Err(e) => {
                    warn!(link = %link, error = %e, "page skipped");
                    outcome.pages_skipped += 1;
                    continue;
                }
            };

            debug!(
                link = %link,
                pages = extraction.pages.len(),
                posts = extraction.posts.len(),
                "extracted"
            );

            for post in extraction.posts {
                if outcome.posts_emitted >= self.max_posts {
                    info!(max = self.max_posts, "reached maximum post count");
                    break 'crawl CrawlEnd::MaxReached;
                }

                if let Some(since) = self.since
                    && post.posted_at < since
                {
                    // Posts arrive newest-first; the first too-old post ends
                    // the whole crawl.
                    info!(link = %post.link, at = %post.posted_at, "found post older than cutoff");
                    break 'crawl CrawlEnd::CutoffReached;
                }

                let sent = tokio::select! {
                    _ = cancel.cancelled() => Err(()),
                    sent = jobs.send(Job::new(post)) => sent.map_err(|_| ()),
                };
                match sent {
                    Ok(()) => outcome.posts_emitted += 1,
                    // The pool is gone; nothing left to emit to.
                    Err(()) => break 'crawl CrawlEnd::Cancelled,
                }
            }

            for page in extraction.pages {
                frontier.enqueue(page);
            }
        };

        outcome.end = end;
        info!(
            pages = outcome.pages_visited,
            skipped = outcome.pages_skipped,
            posts = outcome.posts_emitted,
            end = ?outcome.end,
            "crawl finished"
        );
        outcome
    }

    /// Fetches and extracts one listing page.
    async fn visit(
        &self,
        tab: &Tab,
        link: &str,
        extractor: &dyn Extractor,
    ) -> Result<PageExtraction> {
        tab.navigate(link).await?;
        tab.wait_until_loaded(self.load_wait).await?;
        extractor.extract(tab).await
    }
}

// ============================================================================
// Tests
// ============================================================================
