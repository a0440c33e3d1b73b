//! Error types for the archiver.
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use blogvault::{Result, Error};
//!
//! async fn example(tab: &Tab) -> Result<()> {
//!     tab.navigate("https://example.com").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Transport | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::ResponseTimeout`] |
//! | Protocol | [`Error::Protocol`] |
//! | Extraction | [`Error::Script`], [`Error::Extraction`] |
//! | Jobs | [`Error::Job`] |
//! | External | [`Error::Http`], [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |
//!
//! Transport errors are terminal for the connection that raised them.
//! Protocol, extraction and job errors are local to one call or one page and
//! never abort the crawl as a whole.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::CommandId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when archiver configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Connection to the browser failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Timed out waiting for the browser to become reachable.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Connection closed while an operation was in progress.
    ///
    /// Also raised when the remote target detaches; detachment is an event,
    /// not a call result, but it is terminal for the connection.
    #[error("Connection closed")]
    ConnectionClosed,

    /// No call result arrived within the response window.
    ///
    /// The call must be treated as failed; it is not retried here.
    #[error("Command {id} timed out after {timeout_ms}ms")]
    ResponseTimeout {
        /// The command id that timed out.
        id: CommandId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Malformed or unexpected message shape.
    ///
    /// The call fails; the connection stays open.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Extraction Errors
    // ========================================================================
    /// Script evaluation failed or returned an unexpected shape.
    #[error("Script error: {message}")]
    Script {
        /// Error message from script execution.
        message: String,
    },

    /// The extraction result could not be decoded.
    ///
    /// Usually means the target page's structure does not match what the
    /// extraction script expects. The page is skipped; the crawl continues.
    #[error("Extraction error: {message}")]
    Extraction {
        /// Description of the decode failure.
        message: String,
    },

    // ========================================================================
    // Job Errors
    // ========================================================================
    /// A worker-pool job failed.
    ///
    /// The job is reported as failed and the slot is recycled.
    #[error("Job error: {message}")]
    Job {
        /// Description of the job failure.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// HTTP error from the discovery endpoint or an artifact fetch.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a response timeout error.
    #[inline]
    pub fn response_timeout(id: CommandId, timeout_ms: u64) -> Self {
        Self::ResponseTimeout { id, timeout_ms }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a script error.
    #[inline]
    pub fn script(message: impl Into<String>) -> Self {
        Self::Script {
            message: message.into(),
        }
    }

    /// Creates an extraction error.
    #[inline]
    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction {
            message: message.into(),
        }
    }

    /// Creates a job error.
    #[inline]
    pub fn job(message: impl Into<String>) -> Self {
        Self::Job {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::ResponseTimeout { .. }
        )
    }

    /// Returns `true` if this is a transport-level error.
    ///
    /// Transport errors mean the connection that raised them is unusable.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error is local to one page or call.
    ///
    /// Local errors are reported and skipped; the crawl continues.
    #[inline]
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::Protocol { .. }
                | Self::Script { .. }
                | Self::Extraction { .. }
                | Self::Job { .. }
                | Self::ResponseTimeout { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
