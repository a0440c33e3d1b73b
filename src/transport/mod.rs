//! WebSocket transport layer.
//!
//! One [`Connection`] per browser page target. The connection turns the raw
//! duplex frame stream into correlated call/response pairs and routes
//! unsolicited events.

// ============================================================================
// Submodules
// ============================================================================

/// Duplex connection with request/result correlation and event routing.
pub mod connection;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::Connection;
