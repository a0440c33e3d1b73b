//! Wire envelopes and inbound message classification.
//!
//! Outbound commands are wrapped in an [`Envelope`] carrying the correlation
//! id. Inbound frames are decoded into [`InboundMessage`] and then classified
//! as either a [`CallResult`] (correlates to a pending command) or a
//! [`PageEvent`] (unsolicited notification, no correlation).
//!
//! # Classification
//!
//! A frame with a `method` field is an event; a frame with an `id` field is a
//! call result. Frames with neither are protocol violations and are reported
//! to the caller for logging, never delivered.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::CommandId;

use super::Command;

// ============================================================================
// Envelope
// ============================================================================

/// An outbound command with its correlation id.
///
/// # Format
///
/// ```json
/// { "id": 7, "method": "Page.navigate", "params": { "url": "..." } }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    /// Unique identifier for command/result correlation.
    pub id: CommandId,

    /// Command with method and params.
    #[serde(flatten)]
    pub command: Command,
}

impl Envelope {
    /// Creates a new envelope.
    #[inline]
    #[must_use]
    pub fn new(id: CommandId, command: Command) -> Self {
        Self { id, command }
    }
}

// ============================================================================
// InboundMessage
// ============================================================================

/// Raw decode of one inbound frame, before classification.
///
/// # Format
///
/// Call result:
/// ```json
/// { "id": 7, "result": { ... } }
/// ```
///
/// Event:
/// ```json
/// { "method": "Page.lifecycleEvent", "params": { ... } }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    /// Correlation id (call results only).
    #[serde(default)]
    pub id: Option<CommandId>,

    /// Event name (events only).
    #[serde(default)]
    pub method: Option<String>,

    /// Event payload.
    #[serde(default)]
    pub params: Option<Value>,

    /// Result payload (successful call results).
    #[serde(default)]
    pub result: Option<Value>,

    /// Error payload (failed call results).
    #[serde(default)]
    pub error: Option<WireError>,
}

impl InboundMessage {
    /// Classifies this frame as a call result or an event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] when the frame carries neither a `method`
    /// nor an `id` field.
    pub fn classify(self) -> Result<Inbound> {
        if let Some(method) = self.method {
            return Ok(Inbound::Event(PageEvent::parse(&method, self.params)));
        }

        if let Some(id) = self.id {
            return Ok(Inbound::CallResult(CallResult {
                id,
                result: self.result,
                error: self.error,
            }));
        }

        Err(Error::protocol(
            "inbound frame has neither method nor id field",
        ))
    }
}

/// A classified inbound message.
#[derive(Debug, Clone)]
pub enum Inbound {
    /// Result for a previously sent command.
    CallResult(CallResult),
    /// Unsolicited browser notification.
    Event(PageEvent),
}

// ============================================================================
// WireError
// ============================================================================

/// Error payload attached to a failed call result.
#[derive(Debug, Clone, Deserialize)]
pub struct WireError {
    /// Protocol error code.
    #[serde(default)]
    pub code: i64,
    /// Human-readable error message.
    #[serde(default)]
    pub message: String,
}

// ============================================================================
// CallResult
// ============================================================================

/// The result of a previously sent command.
#[derive(Debug, Clone)]
pub struct CallResult {
    /// Matches the command id.
    pub id: CommandId,
    /// Result data (if success).
    pub result: Option<Value>,
    /// Error data (if the command failed remotely).
    pub error: Option<WireError>,
}

impl CallResult {
    /// Extracts the result value, returning an error if the call failed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] when the remote end reported a failure.
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            None => Ok(self.result.unwrap_or(Value::Null)),
            Some(err) => Err(Error::protocol(format!(
                "{} (code {})",
                err.message, err.code
            ))),
        }
    }
}

// ============================================================================
// PageEvent
// ============================================================================

/// Parsed event types for type-safe handling.
///
/// Only the events the dispatch loop acts on are parsed into dedicated
/// variants; everything else lands in [`PageEvent::Unknown`] and is logged
/// and dropped, never treated as an error.
#[derive(Debug, Clone)]
pub enum PageEvent {
    /// Page lifecycle transition (`Page.lifecycleEvent`).
    Lifecycle {
        /// Lifecycle phase name (`load`, `networkIdle`, ...).
        name: String,
        /// Frame the event belongs to.
        frame_id: String,
    },

    /// The remote side detached from the target (`Inspector.detached`).
    ///
    /// Functionally terminal: no further frames will arrive.
    Detached {
        /// Reason reported by the browser.
        reason: String,
    },

    /// Any event without a dedicated handler.
    Unknown {
        /// The event's method name.
        method: String,
    },
}

/// `Page.lifecycleEvent` parameters.
#[derive(Debug, Clone, Deserialize)]
struct LifecycleParams {
    #[serde(default)]
    name: String,
    #[serde(rename = "frameId", default)]
    frame_id: String,
}

/// `Inspector.detached` parameters.
#[derive(Debug, Clone, Deserialize)]
struct DetachedParams {
    #[serde(default)]
    reason: String,
}

impl PageEvent {
    /// Parses an event from its method name and payload.
    #[must_use]
    pub fn parse(method: &str, params: Option<Value>) -> Self {
        let params = params.unwrap_or(Value::Null);
        match method {
            "Page.lifecycleEvent" => {
                match serde_json::from_value::<LifecycleParams>(params) {
                    Ok(p) => Self::Lifecycle {
                        name: p.name,
                        frame_id: p.frame_id,
                    },
                    Err(_) => Self::Unknown {
                        method: method.to_string(),
                    },
                }
            }
            "Inspector.detached" => match serde_json::from_value::<DetachedParams>(params) {
                Ok(p) => Self::Detached { reason: p.reason },
                Err(_) => Self::Detached {
                    reason: String::new(),
                },
            },
            _ => Self::Unknown {
                method: method.to_string(),
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_serialization() {
        let envelope = Envelope::new(CommandId::from_u64(3), Command::navigate("https://a.test"));
        let value = serde_json::to_value(&envelope).expect("serialize");

        assert_eq!(value["id"], 3);
        assert_eq!(value["method"], "Page.navigate");
        assert_eq!(value["params"]["url"], "https://a.test");
    }

    #[test]
    fn test_classify_call_result() {
        let json = r#"{"id":5,"result":{"frameId":"F1"}}"#;
        let msg: InboundMessage = serde_json::from_str(json).expect("parse");

        match msg.classify().expect("classify") {
            Inbound::CallResult(res) => {
                assert_eq!(res.id, CommandId::from_u64(5));
                let value = res.into_result().expect("success");
                assert_eq!(value["frameId"], "F1");
            }
            Inbound::Event(_) => panic!("expected call result"),
        }
    }

    #[test]
    fn test_classify_error_result() {
        let json = r#"{"id":5,"error":{"code":-32000,"message":"Cannot navigate"}}"#;
        let msg: InboundMessage = serde_json::from_str(json).expect("parse");

        match msg.classify().expect("classify") {
            Inbound::CallResult(res) => {
                let err = res.into_result().unwrap_err();
                assert!(err.to_string().contains("Cannot navigate"));
            }
            Inbound::Event(_) => panic!("expected call result"),
        }
    }

    #[test]
    fn test_classify_lifecycle_event() {
        let json = r#"{"method":"Page.lifecycleEvent","params":{"name":"networkIdle","frameId":"F1","loaderId":"L1","timestamp":12.5}}"#;
        let msg: InboundMessage = serde_json::from_str(json).expect("parse");

        match msg.classify().expect("classify") {
            Inbound::Event(PageEvent::Lifecycle { name, frame_id }) => {
                assert_eq!(name, "networkIdle");
                assert_eq!(frame_id, "F1");
            }
            other => panic!("expected lifecycle event, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_detached_event() {
        let json = r#"{"method":"Inspector.detached","params":{"reason":"target_closed"}}"#;
        let msg: InboundMessage = serde_json::from_str(json).expect("parse");

        match msg.classify().expect("classify") {
            Inbound::Event(PageEvent::Detached { reason }) => {
                assert_eq!(reason, "target_closed");
            }
            other => panic!("expected detached event, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_unknown_event() {
        let json = r#"{"method":"Network.requestWillBeSent","params":{}}"#;
        let msg: InboundMessage = serde_json::from_str(json).expect("parse");

        match msg.classify().expect("classify") {
            Inbound::Event(PageEvent::Unknown { method }) => {
                assert_eq!(method, "Network.requestWillBeSent");
            }
            other => panic!("expected unknown event, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_rejects_shapeless_frame() {
        let json = r#"{"banana":1}"#;
        let msg: InboundMessage = serde_json::from_str(json).expect("parse");
        assert!(msg.classify().is_err());
    }
}
