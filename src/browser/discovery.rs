//! DevTools discovery endpoint client.
//!
//! A running browser exposes an HTTP endpoint listing its open pages, each
//! with a WebSocket debugger URL to attach to. This module consumes exactly
//! two operations of it: open a new page handle (`/json/new`) and list the
//! existing ones (`/json`). Launching the browser process itself is the
//! embedding application's concern.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::browser::Tab;
use crate::error::{Error, Result};
use crate::identifiers::TargetId;

// ============================================================================
// Constants
// ============================================================================

/// Delay between reachability probes while waiting for the browser.
const PROBE_INTERVAL: Duration = Duration::from_millis(500);

/// Timeout for individual discovery requests.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// TargetInfo
// ============================================================================

/// One page target as reported by the discovery endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetInfo {
    /// Target id.
    #[serde(default)]
    pub id: Option<TargetId>,

    /// Human-readable description.
    #[serde(default)]
    pub description: String,

    /// Frontend URL for interactive debugging.
    #[serde(rename = "devtoolsFrontendUrl", default)]
    pub devtools_frontend_url: String,

    /// Page title.
    #[serde(default)]
    pub title: String,

    /// Target type (`page`, `background_page`, ...).
    #[serde(rename = "type", default)]
    pub target_type: String,

    /// Current page URL.
    #[serde(default)]
    pub url: String,

    /// WebSocket URL to attach to this target.
    #[serde(rename = "webSocketDebuggerUrl", default)]
    pub web_socket_debugger_url: String,
}

// ============================================================================
// TabOpener
// ============================================================================

/// Seam for opening page handles.
///
/// The crawler and the worker pool only ever ask for "a new tab"; where that
/// tab comes from (a real browser, a test double) is this trait's business.
#[async_trait]
pub trait TabOpener: Send + Sync {
    /// Opens a new page and attaches to it.
    async fn open_tab(&self) -> Result<Tab>;
}

// ============================================================================
// Browser
// ============================================================================

/// Client for a running browser's DevTools discovery endpoint.
pub struct Browser {
    endpoint: String,
    http: reqwest::Client,
    cancel: CancellationToken,
}

impl Browser {
    /// Connects to the discovery endpoint at `addr` (e.g. `localhost:9222`).
    ///
    /// Polls until the endpoint answers, since the browser may still be
    /// starting up.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if the endpoint stays unreachable
    /// - [`Error::Connection`] if cancelled while waiting
    pub async fn connect(
        addr: impl Into<String>,
        wait_for: Duration,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let endpoint = format!("http://{}", addr.into());
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;

        debug!(endpoint = %endpoint, "waiting for browser");
        let deadline = tokio::time::Instant::now() + wait_for;
        loop {
            if cancel.is_cancelled() {
                return Err(Error::connection("cancelled while waiting for browser"));
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::connection_timeout(wait_for.as_millis() as u64));
            }

            if let Ok(response) = http.get(&endpoint).send().await
                && response.status().is_success()
            {
                break;
            }

            tokio::time::sleep(PROBE_INTERVAL).await;
        }

        info!(endpoint = %endpoint, "browser reachable");
        Ok(Self {
            endpoint,
            http,
            cancel: cancel.clone(),
        })
    }

    /// Returns the discovery endpoint URL.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Lists the currently open page targets (`/json`).
    pub async fn targets(&self) -> Result<Vec<TargetInfo>> {
        self.get_json("/json").await
    }

    /// Opens a new page target (`/json/new`).
    pub async fn new_target(&self) -> Result<TargetInfo> {
        self.get_json("/json/new").await
    }

    /// Attaches to a specific target.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the target has no debugger URL
    /// (another client is already attached).
    pub async fn connect_to_target(&self, target: &TargetInfo) -> Result<Tab> {
        if target.web_socket_debugger_url.is_empty() {
            return Err(Error::connection(format!(
                "target {} has no debugger URL",
                target.url
            )));
        }
        Tab::connect(&target.web_socket_debugger_url, &self.cancel).await
    }

    /// Attaches to the first open page target.
    pub async fn connect_to_first(&self) -> Result<Tab> {
        let targets = self.targets().await?;
        let target = targets
            .iter()
            .find(|t| !t.web_socket_debugger_url.is_empty())
            .ok_or_else(|| Error::connection("no attachable page targets"))?;
        self.connect_to_target(target).await
    }

    /// Fetches and decodes one discovery endpoint resource.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.endpoint, path);
        let response = self.http.get(&url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl TabOpener for Browser {
    async fn open_tab(&self) -> Result<Tab> {
        let target = self.new_target().await?;
        debug!(url = %target.url, "opened new page target");
        self.connect_to_target(&target).await
    }
}

// ============================================================================
// Tests
// ============================================================================
