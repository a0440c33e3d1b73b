//! DevTools protocol message types.
//!
//! This module defines the wire format for communication between the
//! archiver (local end) and a browser page target (remote end).
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | [`Envelope`] | Local → Remote | Command with correlation id |
//! | [`CallResult`] | Remote → Local | Result for a prior command |
//! | [`PageEvent`] | Remote → Local | Unsolicited browser notification |
//!
//! Commands follow the `Domain.methodName` format:
//!
//! - `Page.navigate`
//! - `Runtime.evaluate`
//! - `Page.printToPDF`
//!
//! Inbound frames carry either a `method` field (an event) or an `id` field
//! (a call result); [`InboundMessage::classify`] makes that distinction
//! explicit at decode time.

// ============================================================================
// Submodules
// ============================================================================

/// Command definitions organized by domain.
pub mod command;

/// Wire envelopes and inbound message classification.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{Command, PageCommand, RuntimeCommand};
pub use message::{CallResult, Envelope, Inbound, InboundMessage, PageEvent, WireError};
