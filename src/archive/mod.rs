//! Orchestrator wiring the crawler to the worker pool.
//!
//! [`Archiver::archive`] seeds the spider with a root URL, forwards every
//! post it emits into the pool, and returns once both the frontier is done
//! and every submitted job has completed.

// ============================================================================
// Submodules
// ============================================================================

/// Artifact sink seam and filesystem implementation.
pub mod sink;

/// The job handler archiving one post.
pub mod saver;

pub use saver::{PostSaver, SaveStats};
pub use sink::{ArtifactSink, FsSink};

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::browser::TabOpener;
use crate::config::ArchiveConfig;
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::pool::{Job, WorkerPool};
use crate::spider::{CrawlEnd, Extractor, ScriptExtractor, Spider};

// ============================================================================
// ArchiveSummary
// ============================================================================

/// Final report of one archive run.
#[derive(Debug, Clone)]
pub struct ArchiveSummary {
    /// Listing pages fetched.
    pub pages_visited: usize,
    /// Listing pages skipped after a failure.
    pub pages_skipped: usize,
    /// Posts handed to the worker pool.
    pub posts_attempted: usize,
    /// Posts whose document was saved.
    pub posts_saved: usize,
    /// Posts whose document could not be produced.
    pub posts_failed: usize,
    /// Images saved alongside the documents.
    pub images_saved: usize,
    /// Why the crawl stopped.
    pub end: CrawlEnd,
}

// ============================================================================
// Archiver
// ============================================================================

/// Wires crawler output to worker-pool input for one site.
pub struct Archiver {
    config: ArchiveConfig,
    opener: Arc<dyn TabOpener>,
    extractor: Arc<dyn Extractor>,
    sink: Arc<dyn ArtifactSink>,
    image_script: String,
}

impl Archiver {
    /// Creates an archiver from explicit collaborators.
    #[must_use]
    pub fn new(
        config: ArchiveConfig,
        opener: Arc<dyn TabOpener>,
        extractor: Arc<dyn Extractor>,
        sink: Arc<dyn ArtifactSink>,
        image_script: impl Into<String>,
    ) -> Self {
        Self {
            config,
            opener,
            extractor,
            sink,
            image_script: image_script.into(),
        }
    }

    /// Creates an archiver with the default collaborators: a
    /// [`ScriptExtractor`] around `list_script` and an [`FsSink`] under the
    /// configured save root.
    #[must_use]
    pub fn with_scripts(
        config: ArchiveConfig,
        opener: Arc<dyn TabOpener>,
        list_script: impl Into<String>,
        image_script: impl Into<String>,
    ) -> Self {
        let sink = Arc::new(FsSink::new(config.save_root.clone()));
        Self::new(
            config,
            opener,
            Arc::new(ScriptExtractor::new(list_script)),
            sink,
            image_script,
        )
    }

    /// Archives everything reachable from `root`.
    ///
    /// Returns once the crawl has ended and every submitted job has
    /// completed. Cancellation stops new dispatch; jobs already running are
    /// not forcibly aborted, but the pool is still shut down before
    /// returning.
    pub async fn archive(&self, root: &str, cancel: &CancellationToken) -> Result<ArchiveSummary> {
        self.config.validate()?;

        let stats = Arc::new(SaveStats::default());
        let handler = Arc::new(PostSaver::new(
            Arc::clone(&self.sink),
            Fetcher::new()?,
            self.image_script.clone(),
            self.config.load_wait,
            Arc::clone(&stats),
        ));

        // The spider gets its own dedicated tab.
        let spider_tab = self.opener.open_tab().await?;
        if let Err(e) = spider_tab.enable_lifecycle_events().await {
            warn!(error = %e, "lifecycle events unavailable, falling back to fixed waits");
        }

        let pool = WorkerPool::start(
            self.opener.as_ref(),
            self.config.pool_size,
            self.config.worker_delay,
            handler,
            cancel,
        )
        .await?;

        let mut spider = Spider::new(self.config.idle_timeout)
            .with_max_posts(self.config.max_posts)
            .with_load_wait(self.config.load_wait);
        if let Some(since) = self.config.since {
            spider = spider.with_since(since);
        }

        let (jobs_tx, mut jobs_rx) = mpsc::channel::<Job>(1);
        let extractor = Arc::clone(&self.extractor);
        let crawl_cancel = cancel.clone();
        let root = root.to_string();
        let crawl = tokio::spawn(async move {
            let outcome = spider
                .run(&spider_tab, &root, extractor.as_ref(), jobs_tx, &crawl_cancel)
                .await;
            spider_tab.close().await;
            outcome
        });

        // Forward emitted posts into the pool; `add` blocking while the pool
        // is saturated is what pauses the crawl.
        while let Some(job) = jobs_rx.recv().await {
            if pool.add(job).await.is_err() {
                break;
            }
        }

        let outcome = crawl
            .await
            .map_err(|e| Error::job(format!("crawl task failed: {e}")))?;

        // Let outstanding jobs finish, unless we are being torn down.
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = pool.wait() => {}
        }
        pool.stop().await;

        let (saved, failed, images) = stats.snapshot();
        let summary = ArchiveSummary {
            pages_visited: outcome.pages_visited,
            pages_skipped: outcome.pages_skipped,
            posts_attempted: outcome.posts_emitted,
            posts_saved: saved,
            posts_failed: failed,
            images_saved: images,
            end: outcome.end,
        };

        info!(
            saved = summary.posts_saved,
            attempted = summary.posts_attempted,
            failed = summary.posts_failed,
            images = summary.images_saved,
            pages = summary.pages_visited,
            skipped = summary.pages_skipped,
            end = ?summary.end,
            "archive finished"
        );
        Ok(summary)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::Tab;
    use crate::spider::Post;
    use crate::testutil::{MockFrame, MockTarget, evaluate_result};

    use std::path::PathBuf;
    use std::time::Duration;

    use async_trait::async_trait;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD as Base64Standard;
    use parking_lot::Mutex;
    use serde_json::json;

    struct MockOpener {
        ws_url: String,
        cancel: CancellationToken,
    }

    #[async_trait]
    impl TabOpener for MockOpener {
        async fn open_tab(&self) -> Result<Tab> {
            Tab::connect(&self.ws_url, &self.cancel).await
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        documents: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ArtifactSink for RecordingSink {
        async fn save_document(&self, post: &Post, _bytes: &[u8]) -> Result<PathBuf> {
            self.documents.lock().push(post.link.clone());
            Ok(PathBuf::from("doc.pdf"))
        }

        async fn save_image(&self, _post: &Post, _link: &str, _bytes: &[u8]) -> Result<PathBuf> {
            Ok(PathBuf::from("img"))
        }
    }

    /// A one-page site with three fresh posts and an older fourth.
    fn site_responder() -> crate::testutil::Responder {
        let pdf = Base64Standard.encode(b"%PDF");
        let mut current = String::new();
        Box::new(move |method, params| match method {
            "Page.navigate" => {
                current = params["url"].as_str().unwrap_or_default().to_string();
                vec![
                    MockFrame::Reply(json!({"frameId": "F1"})),
                    MockFrame::Event {
                        method: "Page.lifecycleEvent",
                        params: json!({"name": "networkIdle", "frameId": "F1"}),
                    },
                ]
            }
            "Runtime.evaluate" => {
                let script_is_listing = params["expression"]
                    .as_str()
                    .is_some_and(|s| s.contains("list"));
                if script_is_listing && current == "https://a.test/list" {
                    let extraction = json!({
                        "pages": [],
                        "posts": [
                            {"link": "https://a.test/p/3", "author": "ayu", "title": "3", "posted_at": "2026-03-03T00:00:00Z"},
                            {"link": "https://a.test/p/2", "author": "ayu", "title": "2", "posted_at": "2026-03-02T00:00:00Z"},
                            {"link": "https://a.test/p/1", "author": "ayu", "title": "1", "posted_at": "2026-03-01T00:00:00Z"},
                            {"link": "https://a.test/p/0", "author": "ayu", "title": "0", "posted_at": "2026-01-01T00:00:00Z"},
                        ]
                    });
                    vec![MockFrame::Reply(evaluate_result(&extraction.to_string()))]
                } else {
                    // Image-listing script on a post page: no images.
                    vec![MockFrame::Reply(evaluate_result(""))]
                }
            }
            "Page.printToPDF" => vec![MockFrame::Reply(json!({"data": pdf}))],
            _ => vec![MockFrame::Reply(json!({}))],
        })
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    #[tokio::test]
    async fn test_end_to_end_archive_with_cutoff() {
        init_tracing();
        let target = MockTarget::spawn(site_responder).await;
        let cancel = CancellationToken::new();
        let opener = Arc::new(MockOpener {
            ws_url: target.ws_url(),
            cancel: cancel.clone(),
        });
        let sink = Arc::new(RecordingSink::default());

        let config = ArchiveConfig::new("./unused")
            .with_pool_size(2)
            .with_worker_delay(Duration::ZERO)
            .with_idle_timeout(Duration::from_millis(300))
            .with_load_wait(Duration::from_millis(200))
            .with_since(chrono::DateTime::parse_from_rfc3339("2026-02-01T00:00:00Z").unwrap().to_utc());

        let archiver = Archiver::new(
            config,
            opener,
            Arc::new(ScriptExtractor::new("list()")),
            Arc::clone(&sink) as Arc<dyn ArtifactSink>,
            "images()",
        );

        let summary = archiver
            .archive("https://a.test/list", &cancel)
            .await
            .expect("archive");

        assert_eq!(summary.end, CrawlEnd::CutoffReached);
        assert_eq!(summary.posts_attempted, 3);
        assert_eq!(summary.posts_saved, 3);
        assert_eq!(summary.posts_failed, 0);

        let mut documents = sink.documents.lock().clone();
        documents.sort();
        assert_eq!(
            documents,
            [
                "https://a.test/p/1",
                "https://a.test/p/2",
                "https://a.test/p/3"
            ]
        );
    }

    #[tokio::test]
    async fn test_archive_rejects_invalid_config() {
        let target = MockTarget::spawn(site_responder).await;
        let cancel = CancellationToken::new();
        let opener = Arc::new(MockOpener {
            ws_url: target.ws_url(),
            cancel: cancel.clone(),
        });

        let config = ArchiveConfig::new("./unused").with_pool_size(0);
        let archiver = Archiver::with_scripts(config, opener, "list()", "images()");

        let err = archiver
            .archive("https://a.test/list", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }), "got {err}");
    }
}
