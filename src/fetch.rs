//! Direct HTTP fetching for artifacts the browser does not render.
//!
//! Image downloads bypass the browser: once the page has told us an image's
//! URL, plain HTTP with browser-like headers is cheaper than driving a tab.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderValue};
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// User agent presented on direct fetches.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/71.0.3578.98 Safari/537.36";

/// Timeout for one fetch.
const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// Fetcher
// ============================================================================

/// HTTP client with desktop-browser request headers.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    /// Creates a fetcher with default headers and a 60 s timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the client cannot be constructed.
    pub fn new() -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.5"),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert("DNT", HeaderValue::from_static("1"));
        headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(FETCH_TIMEOUT)
            .build()?;

        Ok(Self { client })
    }

    /// Fetches a URL and returns the response body.
    ///
    /// # Errors
    ///
    /// - [`Error::Job`] if the URL does not parse
    /// - [`Error::Http`] on request failure or a non-success status
    pub async fn get_bytes(&self, link: &str) -> Result<Vec<u8>> {
        let url = Url::parse(link).map_err(|e| Error::job(format!("invalid url {link}: {e}")))?;

        debug!(url = %url, "fetching");
        let response = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.bytes().await?.to_vec())
    }
}

// ============================================================================
// Tests
// ============================================================================
