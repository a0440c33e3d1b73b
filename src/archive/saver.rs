//! The job handler that archives one post.
//!
//! Navigates a worker tab to the post, renders it to PDF, then asks the page
//! for its image URLs and downloads each one directly.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::archive::sink::ArtifactSink;
use crate::browser::Tab;
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::pool::{Job, JobHandler};
use crate::spider::Post;

// ============================================================================
// SaveStats
// ============================================================================

/// Shared counters for the final summary.
#[derive(Debug, Default)]
pub struct SaveStats {
    saved: AtomicUsize,
    failed: AtomicUsize,
    images: AtomicUsize,
}

impl SaveStats {
    /// Returns `(saved, failed, images)` so far.
    #[must_use]
    pub fn snapshot(&self) -> (usize, usize, usize) {
        (
            self.saved.load(Ordering::SeqCst),
            self.failed.load(Ordering::SeqCst),
            self.images.load(Ordering::SeqCst),
        )
    }
}

// ============================================================================
// PostSaver
// ============================================================================

/// Archives one post per job: document first, then its images.
///
/// An image failure is logged and skipped; the job only fails when the
/// document itself cannot be produced.
pub struct PostSaver {
    sink: Arc<dyn ArtifactSink>,
    fetcher: Fetcher,
    /// Site-specific script returning the page's image URLs as one
    /// comma-separated string.
    image_script: String,
    load_wait: Duration,
    stats: Arc<SaveStats>,
}

impl PostSaver {
    /// Creates a saver.
    #[must_use]
    pub fn new(
        sink: Arc<dyn ArtifactSink>,
        fetcher: Fetcher,
        image_script: impl Into<String>,
        load_wait: Duration,
        stats: Arc<SaveStats>,
    ) -> Self {
        Self {
            sink,
            fetcher,
            image_script: image_script.into(),
            load_wait,
            stats,
        }
    }

    /// Renders and saves the post document.
    async fn save_document(&self, tab: &Tab, post: &Post) -> Result<()> {
        tab.navigate(&post.link).await?;
        tab.wait_until_loaded(self.load_wait).await?;

        let bytes = tab.print_to_pdf().await?;
        self.sink.save_document(post, &bytes).await?;
        Ok(())
    }

    /// Downloads and saves the post's images.
    ///
    /// The page reports image URLs as one comma-separated string (the
    /// `Array.toString()` convention); empty entries are skipped.
    async fn save_images(&self, tab: &Tab, post: &Post) {
        let listing = match tab.evaluate(&self.image_script).await {
            Ok(listing) => listing,
            Err(e) => {
                warn!(link = %post.link, error = %e, "image listing failed");
                return;
            }
        };

        for link in listing.split(',').filter(|link| !link.is_empty()) {
            let bytes = match self.fetcher.get_bytes(link).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(image = %link, error = %e, "image fetch failed");
                    continue;
                }
            };

            match self.sink.save_image(post, link, &bytes).await {
                Ok(_) => {
                    self.stats.images.fetch_add(1, Ordering::SeqCst);
                }
                Err(e) => warn!(image = %link, error = %e, "image save failed"),
            }
        }
    }
}

#[async_trait]
impl JobHandler for PostSaver {
    async fn run(&self, tab: &Tab, job: Job) -> Result<()> {
        let post = job.post;
        info!(link = %post.link, "saving post");

        if let Err(e) = self.save_document(tab, &post).await {
            self.stats.failed.fetch_add(1, Ordering::SeqCst);
            return Err(e);
        }

        self.save_images(tab, &post).await;
        self.stats.saved.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
