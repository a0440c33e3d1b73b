//! Typed command facade over one connection.
//!
//! Each operation builds a command, sends it, blocks for the matching result
//! and decodes the one field it cares about. Errors say which step failed
//! (send, await, decode).

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;
use serde::de::DeserializeOwned;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::Command;
use crate::transport::Connection;

// ============================================================================
// Constants
// ============================================================================

/// Time given to the writer to flush `Page.close` before the socket drops.
const CLOSE_FLUSH: Duration = Duration::from_millis(50);

/// Lifecycle phases accepted as "the page has settled".
const QUIESCENT_PHASES: [&str; 3] = ["load", "networkIdle", "networkAlmostIdle"];

// ============================================================================
// Tab
// ============================================================================

/// A handle to one browser page.
///
/// Owns the page's [`Connection`]. Operations follow the connection's
/// single-outstanding-call discipline: a tab is driven by one logical caller
/// at a time.
pub struct Tab {
    connection: Connection,
}

impl Tab {
    /// Connects to a page by its WebSocket debugger URL.
    pub async fn connect(ws_url: &str, cancel: &CancellationToken) -> Result<Self> {
        let connection = Connection::connect(ws_url, cancel).await?;
        Ok(Self { connection })
    }

    /// Wraps an existing connection.
    #[inline]
    #[must_use]
    pub fn from_connection(connection: Connection) -> Self {
        Self { connection }
    }

    /// Returns the underlying connection.
    #[inline]
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Returns `true` once the underlying connection has closed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }
}

// ============================================================================
// Tab - Navigation
// ============================================================================

impl Tab {
    /// Enables page lifecycle event reporting.
    ///
    /// Without this, [`Tab::wait_until_loaded`] falls back to waiting out its
    /// full window.
    pub async fn enable_lifecycle_events(&self) -> Result<()> {
        self.connection.call(Command::page_enable()).await?;
        self.connection
            .call(Command::set_lifecycle_events(true))
            .await?;
        Ok(())
    }

    /// Navigates to a URL.
    pub async fn navigate(&self, url: &str) -> Result<()> {
        debug!(url = %url, "navigating");
        // Reset before the command goes out: any lifecycle event observed
        // afterwards belongs to this navigation.
        self.connection.clear_lifecycle();
        self.connection.call(Command::navigate(url)).await?;
        Ok(())
    }

    /// Waits for the page to settle, up to `wait`.
    ///
    /// Returns as soon as a quiescence lifecycle event (`load`,
    /// `networkIdle`, `networkAlmostIdle`) arrives. Elapsing the window
    /// without a signal is not an error: readiness is a heuristic and some
    /// pages simply never go idle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the connection dies while
    /// waiting.
    pub async fn wait_until_loaded(&self, wait: Duration) -> Result<()> {
        let mut lifecycle = self.connection.lifecycle();

        let quiescent = async {
            loop {
                // The watch was reset when the navigation went out, so a
                // quiescent value here cannot be a stale event from the
                // previous page.
                let name = lifecycle.borrow_and_update().clone();
                if let Some(name) = name.as_deref()
                    && QUIESCENT_PHASES.contains(&name)
                {
                    return Ok(());
                }
                if lifecycle.changed().await.is_err() {
                    return Err(Error::ConnectionClosed);
                }
            }
        };

        match timeout(wait, quiescent).await {
            Ok(outcome) => outcome,
            Err(_) => Ok(()),
        }
    }
}

// ============================================================================
// Tab - Script Evaluation
// ============================================================================

impl Tab {
    /// Evaluates a script expression and returns its string result.
    ///
    /// The script's return value is funnelled through the protocol's one
    /// scalar result field; scripts are expected to stringify anything
    /// structured themselves.
    ///
    /// # Errors
    ///
    /// - [`Error::Script`] if the page threw or the result is not a string
    pub async fn evaluate(&self, expression: &str) -> Result<String> {
        debug!(script_len = expression.len(), "evaluating script");

        let value = self.connection.call(Command::evaluate(expression)).await?;

        if let Some(details) = value.get("exceptionDetails") {
            let text = details
                .get("text")
                .and_then(|v| v.as_str())
                .unwrap_or("script threw an exception");
            return Err(Error::script(text.to_string()));
        }

        value
            .get("result")
            .and_then(|v| v.get("value"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::script("evaluation result is not a string"))
    }

    /// Evaluates a script expression and decodes its result as JSON.
    ///
    /// A decode failure is reported, not swallowed: it usually means the
    /// target page's structure does not match what the script expects.
    ///
    /// # Errors
    ///
    /// - [`Error::Extraction`] if the result does not decode into `T`
    pub async fn evaluate_json<T: DeserializeOwned>(&self, expression: &str) -> Result<T> {
        let raw = self.evaluate(expression).await?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::extraction(format!("failed to decode script result: {e}")))
    }
}

// ============================================================================
// Tab - Rendering
// ============================================================================

impl Tab {
    /// Renders the page to a PDF document.
    pub async fn print_to_pdf(&self) -> Result<Vec<u8>> {
        let value = self.connection.call(Command::print_to_pdf()).await?;
        Self::decode_data_field(&value)
    }

    /// Captures a screenshot of the visible viewport.
    pub async fn capture_screenshot(&self) -> Result<Vec<u8>> {
        let value = self.connection.call(Command::capture_screenshot()).await?;
        Self::decode_data_field(&value)
    }

    /// Decodes the base64 `data` field rendering commands reply with.
    fn decode_data_field(value: &serde_json::Value) -> Result<Vec<u8>> {
        let data = value
            .get("data")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::protocol("rendering result missing data field"))?;

        Base64Standard
            .decode(data)
            .map_err(|e| Error::protocol(format!("failed to decode base64 payload: {e}")))
    }
}

// ============================================================================
// Tab - Lifecycle
// ============================================================================

impl Tab {
    /// Closes the page and shuts the connection down.
    ///
    /// `Page.close` is fire-and-forget; the browser answers with a
    /// detachment event rather than a result.
    pub async fn close(&self) {
        if self.connection.send(Command::close_page()).is_ok() {
            tokio::time::sleep(CLOSE_FLUSH).await;
        }
        self.connection.close();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MockFrame, MockTarget, evaluate_result, quiet_page};

    use serde::Deserialize;
    use serde_json::json;

    async fn connect(target: &MockTarget) -> Tab {
        let cancel = CancellationToken::new();
        Tab::connect(&target.ws_url(), &cancel)
            .await
            .expect("connect")
    }

    #[tokio::test]
    async fn test_navigate_and_wait() {
        let target = MockTarget::spawn(quiet_page).await;
        let tab = connect(&target).await;

        tab.navigate("https://a.test/list").await.expect("navigate");

        // The mock emits networkIdle right after the navigate reply, so the
        // wait should return well before its window elapses.
        let started = tokio::time::Instant::now();
        tab.wait_until_loaded(Duration::from_secs(5))
            .await
            .expect("wait");
        assert!(started.elapsed() < Duration::from_secs(2));

        tab.close().await;
    }

    #[tokio::test]
    async fn test_evaluate_funnels_through_string_value() {
        let target = MockTarget::spawn(|| {
            Box::new(|method, params| match method {
                "Runtime.evaluate" => {
                    assert_eq!(params["expression"], "document.title");
                    vec![MockFrame::Reply(evaluate_result("Hello"))]
                }
                _ => vec![MockFrame::Reply(json!({}))],
            })
        })
        .await;
        let tab = connect(&target).await;

        let title = tab.evaluate("document.title").await.expect("evaluate");
        assert_eq!(title, "Hello");

        tab.close().await;
    }

    #[tokio::test]
    async fn test_evaluate_reports_page_exception() {
        let target = MockTarget::spawn(|| {
            Box::new(|_, _| {
                vec![MockFrame::Reply(json!({
                    "result": {"type": "object"},
                    "exceptionDetails": {"text": "Uncaught ReferenceError"}
                }))]
            })
        })
        .await;
        let tab = connect(&target).await;

        let err = tab.evaluate("nope()").await.unwrap_err();
        assert!(matches!(err, Error::Script { .. }), "got {err}");

        tab.close().await;
    }

    #[tokio::test]
    async fn test_evaluate_json_decode_failure_is_reported() {
        #[derive(Debug, Deserialize)]
        struct Shape {
            #[allow(dead_code)]
            pages: Vec<String>,
        }

        let target = MockTarget::spawn(|| {
            Box::new(|_, _| vec![MockFrame::Reply(evaluate_result("not json at all"))])
        })
        .await;
        let tab = connect(&target).await;

        let err = tab.evaluate_json::<Shape>("whatever()").await.unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }), "got {err}");

        tab.close().await;
    }

    #[tokio::test]
    async fn test_print_to_pdf_decodes_base64() {
        let payload = Base64Standard.encode(b"%PDF-1.4 fake");
        let target = MockTarget::spawn(move || {
            let payload = payload.clone();
            Box::new(move |method, _| match method {
                "Page.printToPDF" => vec![MockFrame::Reply(json!({"data": payload}))],
                _ => vec![MockFrame::Reply(json!({}))],
            })
        })
        .await;
        let tab = connect(&target).await;

        let bytes = tab.print_to_pdf().await.expect("print");
        assert_eq!(bytes, b"%PDF-1.4 fake");

        tab.close().await;
    }

    #[tokio::test]
    async fn test_close_sends_page_close() {
        let target = MockTarget::spawn(quiet_page).await;
        let tab = connect(&target).await;

        tab.close().await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(target.closed_pages(), 1);
        assert!(tab.is_closed());
    }
}
