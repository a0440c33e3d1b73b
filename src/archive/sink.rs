//! Artifact sink: where fetched bytes end up.
//!
//! The core only needs a deterministic naming scheme so re-runs and
//! concurrent slots never collide; everything else about persistence sits
//! behind the [`ArtifactSink`] trait.

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::info;
use url::Url;

use crate::error::Result;
use crate::spider::Post;

// ============================================================================
// ArtifactSink
// ============================================================================

/// Decides destination paths and writes fetched artifacts.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Saves the rendered document for a post.
    async fn save_document(&self, post: &Post, bytes: &[u8]) -> Result<PathBuf>;

    /// Saves one image belonging to a post.
    async fn save_image(&self, post: &Post, link: &str, bytes: &[u8]) -> Result<PathBuf>;
}

// ============================================================================
// FsSink
// ============================================================================

/// Filesystem sink with metadata-addressed naming.
///
/// Layout: `<root>/<author>/<YYYY-MM-DD>/<digest>.pdf`, with the post's
/// images alongside it named by their URL file name. The digest is derived
/// from the post link, so saving the same post twice overwrites rather than
/// duplicates.
pub struct FsSink {
    root: PathBuf,
}

impl FsSink {
    /// Creates a sink rooted at `root`.
    #[inline]
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory all of a post's artifacts go into.
    fn post_dir(&self, post: &Post) -> PathBuf {
        let author = if post.author.is_empty() {
            "unknown"
        } else {
            &post.author
        };
        self.root
            .join(sanitize_component(author))
            .join(post.posted_at.format("%Y-%m-%d").to_string())
    }

    /// Stable 16-hex-char digest of a link.
    fn link_digest(link: &str) -> String {
        let digest = Sha256::digest(link.as_bytes());
        hex::encode(&digest[..8])
    }

    /// File name for an image URL: its path's final segment, or the digest
    /// when the URL yields nothing usable.
    fn image_file_name(link: &str) -> String {
        Url::parse(link)
            .ok()
            .and_then(|url| {
                url.path_segments()
                    .and_then(|mut segments| segments.next_back().map(str::to_string))
            })
            .filter(|name| !name.is_empty())
            .map(|name| sanitize_component(&name))
            .unwrap_or_else(|| Self::link_digest(link))
    }
}

#[async_trait]
impl ArtifactSink for FsSink {
    async fn save_document(&self, post: &Post, bytes: &[u8]) -> Result<PathBuf> {
        let dir = self.post_dir(post);
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(format!("{}.pdf", Self::link_digest(&post.link)));
        tokio::fs::write(&path, bytes).await?;

        info!(path = %path.display(), "saved document");
        Ok(path)
    }

    async fn save_image(&self, post: &Post, link: &str, bytes: &[u8]) -> Result<PathBuf> {
        let dir = self.post_dir(post);
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(Self::image_file_name(link));
        tokio::fs::write(&path, bytes).await?;

        info!(path = %path.display(), "saved image");
        Ok(path)
    }
}

/// Keeps scraped strings from escaping their directory.
fn sanitize_component(component: &str) -> String {
    component
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect::<String>()
        .replace("..", "_")
}

// ============================================================================
// Tests
// ============================================================================
