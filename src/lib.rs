//! blogvault - Headless-Chrome blog archiver.
//!
//! This library drives a headless Chromium browser over the DevTools
//! protocol to enumerate paginated blog posts and archive each one as a PDF
//! plus its embedded images.
//!
//! # Architecture
//!
//! Data flows through four cooperating pieces:
//!
//! - A [`Spider`](spider::Spider) drives one dedicated tab across listing
//!   pages, deduplicating discovered links and deciding when the crawl ends
//!   (idle timeout, timestamp cutoff, max count).
//! - Each discovered post becomes a [`Job`](pool::Job) for a fixed-size
//!   [`WorkerPool`](pool::WorkerPool) of tabs; submitting blocks while every
//!   tab is busy, which is the pipeline's backpressure point.
//! - Every tab is a [`Tab`](browser::Tab) facade over one
//!   [`Connection`](transport::Connection): a dispatch loop that turns the
//!   raw duplex frame stream into correlated call/result pairs and routes
//!   unsolicited events.
//! - The [`Archiver`](archive::Archiver) wires the pieces together and
//!   reports a final [`ArchiveSummary`](archive::ArchiveSummary).
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use blogvault::{ArchiveConfig, Archiver, Browser, Result};
//! use tokio_util::sync::CancellationToken;
//!
//! # const LIST_SCRIPT: &str = "";
//! # const IMAGE_SCRIPT: &str = "";
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let cancel = CancellationToken::new();
//!
//!     // A headless browser must already be listening on this port.
//!     let browser =
//!         Browser::connect("localhost:9222", std::time::Duration::from_secs(5), &cancel).await?;
//!
//!     let config = ArchiveConfig::new("./archive").with_pool_size(4);
//!     let archiver =
//!         Archiver::with_scripts(config, Arc::new(browser), LIST_SCRIPT, IMAGE_SCRIPT);
//!
//!     let summary = archiver.archive("https://blog.example/posts", &cancel).await?;
//!     println!("saved {} of {} posts", summary.posts_saved, summary.posts_attempted);
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`archive`] | Orchestrator, artifact sink, post saver |
//! | [`browser`] | Page discovery and the [`Tab`] command facade |
//! | [`config`] | [`ArchiveConfig`] and its defaults |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`fetch`] | Direct HTTP fetching for images |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`pool`] | Bounded worker pool of tabs |
//! | [`protocol`] | DevTools message types (internal) |
//! | [`spider`] | Crawler, frontier, extraction seam |
//! | [`transport`] | WebSocket transport layer (internal) |

// ============================================================================
// Modules
// ============================================================================

/// Orchestrator, artifact sink and post saver.
pub mod archive;

/// Browser entities: page discovery and the tab command facade.
pub mod browser;

/// Archiver configuration.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Direct HTTP fetching for artifacts the browser does not render.
pub mod fetch;

/// Type-safe identifiers for protocol entities.
pub mod identifiers;

/// Worker pool executing jobs with bounded concurrency.
pub mod pool;

/// DevTools protocol message types.
///
/// Internal module defining command/result/event structures.
pub mod protocol;

/// Link-following crawler.
pub mod spider;

/// WebSocket transport layer.
///
/// Internal module handling the connection dispatch loop.
pub mod transport;

#[cfg(test)]
pub(crate) mod testutil;

// ============================================================================
// Re-exports
// ============================================================================

// Orchestration types
pub use archive::{ArchiveSummary, Archiver, ArtifactSink, FsSink, PostSaver, SaveStats};

// Browser types
pub use browser::{Browser, Tab, TabOpener, TargetInfo};

// Configuration
pub use config::ArchiveConfig;

// Error types
pub use error::{Error, Result};

// Fetching
pub use fetch::Fetcher;

// Identifier types
pub use identifiers::{CommandId, CommandSequence, TargetId};

// Pool types
pub use pool::{Job, JobHandler, WorkerPool};

// Crawler types
pub use spider::{
    CrawlEnd, CrawlOutcome, Dequeue, Extractor, Frontier, PageExtraction, Post, ScriptExtractor,
    Spider,
};

// Transport types
pub use transport::Connection;
