//! Duplex connection and dispatch loop.
//!
//! This module handles the WebSocket connection to one browser page target,
//! including command/result correlation and event routing.
//!
//! # Dispatch Loop
//!
//! The connection spawns a tokio task that handles:
//!
//! - Incoming frames from the target (call results, events)
//! - Outgoing commands from the Rust API
//! - Lifecycle event routing into a watch channel
//! - Termination on detachment, read error or cancellation
//!
//! # Usage Contract
//!
//! Commands are not pipelined: at most one caller should be awaiting a
//! result at a time (single-outstanding-call discipline). This is a
//! documented contract, not enforced by locking; [`Connection::call`] is the
//! safe way to honor it. Results whose id does not match the awaited command
//! are discarded, so a late result from a timed-out call can never be
//! returned to a later caller.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, from_str, to_string};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{CommandId, CommandSequence};
use crate::protocol::{CallResult, Command, Envelope, Inbound, InboundMessage, PageEvent};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for awaiting a call result.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Grace window for handing a call result to the awaiting caller.
///
/// If nobody is awaiting within this window the result is dropped with a
/// warning; results must not pile up.
const RESULT_GRACE: Duration = Duration::from_millis(500);

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// Connection
// ============================================================================

/// WebSocket connection to one browser page target.
///
/// Handles command/result correlation and event routing. The connection
/// spawns an internal dispatch loop task; when the loop ends (remote close,
/// read error, detachment event or cancellation) the connection is Closed and
/// any caller blocked in [`Connection::await_result`] is released with an
/// error.
pub struct Connection {
    /// Channel feeding the dispatch loop's writer side.
    outbound_tx: mpsc::UnboundedSender<Envelope>,
    /// Call results handed over by the dispatch loop.
    results: tokio::sync::Mutex<mpsc::Receiver<CallResult>>,
    /// Per-connection command id generator.
    sequence: CommandSequence,
    /// Latest lifecycle event name observed by the dispatch loop.
    lifecycle_tx: Arc<watch::Sender<Option<String>>>,
    /// Set once the dispatch loop has terminated.
    closed: Arc<AtomicBool>,
    /// Cancels the dispatch loop.
    cancel: CancellationToken,
}

impl Connection {
    /// Connects to a page target by its WebSocket debugger URL.
    ///
    /// Spawns the dispatch loop task internally. The loop observes `cancel`
    /// and terminates promptly when it fires.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WebSocket`] if the connection cannot be established.
    pub async fn connect(ws_url: &str, cancel: &CancellationToken) -> Result<Self> {
        let (ws_stream, _) = connect_async(ws_url).await?;
        debug!(url = %ws_url, "connected to page target");
        Ok(Self::new(ws_stream, cancel))
    }

    /// Creates a connection from an established WebSocket stream.
    pub(crate) fn new(ws_stream: WsStream, cancel: &CancellationToken) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = mpsc::channel(1);
        let lifecycle_tx = Arc::new(watch::channel(None).0);
        let closed = Arc::new(AtomicBool::new(false));
        let cancel = cancel.child_token();

        tokio::spawn(Self::run_dispatch_loop(
            ws_stream,
            outbound_rx,
            result_tx,
            Arc::clone(&lifecycle_tx),
            Arc::clone(&closed),
            cancel.clone(),
        ));

        Self {
            outbound_tx,
            results: tokio::sync::Mutex::new(result_rx),
            sequence: CommandSequence::new(),
            lifecycle_tx,
            closed,
            cancel,
        }
    }

    /// Serializes and sends a command, returning its correlation id.
    ///
    /// Fire-and-forget apart from transport backpressure; pair with
    /// [`Connection::await_result`] to get the result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the dispatch loop has ended.
    pub fn send(&self, command: Command) -> Result<CommandId> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        let id = self.sequence.next();
        self.outbound_tx
            .send(Envelope::new(id, command))
            .map_err(|_| Error::ConnectionClosed)?;
        Ok(id)
    }

    /// Blocks until the result for `id` arrives.
    ///
    /// Bounded by a 5 s response timeout. Results for any other id are logged
    /// and discarded; with the single-outstanding-call discipline those can
    /// only be stale leftovers of calls that already timed out.
    ///
    /// # Errors
    ///
    /// - [`Error::ResponseTimeout`] if no matching result arrives in time
    /// - [`Error::ConnectionClosed`] if the connection dies while waiting
    /// - [`Error::Protocol`] if the remote end reported a call failure
    pub async fn await_result(&self, id: CommandId) -> Result<Value> {
        let mut results = self.results.lock().await;
        let deadline = tokio::time::Instant::now() + RESPONSE_TIMEOUT;

        loop {
            match tokio::time::timeout_at(deadline, results.recv()).await {
                Ok(Some(res)) if res.id == id => return res.into_result(),
                Ok(Some(res)) => {
                    warn!(got = %res.id, want = %id, "discarding stale call result");
                }
                Ok(None) => return Err(Error::ConnectionClosed),
                Err(_) => {
                    return Err(Error::response_timeout(
                        id,
                        RESPONSE_TIMEOUT.as_millis() as u64,
                    ));
                }
            }
        }
    }

    /// Sends a command and waits for its result.
    ///
    /// This is the single-outstanding-call helper: the next call on this
    /// connection should only start after this one returns.
    pub async fn call(&self, command: Command) -> Result<Value> {
        let id = self.send(command)?;
        self.await_result(id).await
    }

    /// Returns a watch over the latest lifecycle event name.
    #[must_use]
    pub fn lifecycle(&self) -> watch::Receiver<Option<String>> {
        self.lifecycle_tx.subscribe()
    }

    /// Resets the lifecycle watch.
    ///
    /// Called before a navigation command goes out, so that only events
    /// caused by that navigation can satisfy a quiescence wait.
    pub(crate) fn clear_lifecycle(&self) {
        self.lifecycle_tx.send_replace(None);
    }

    /// Returns `true` once the dispatch loop has terminated.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Shuts the connection down.
    ///
    /// The dispatch loop closes the socket and releases any blocked caller.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

// ============================================================================
// Connection - Dispatch Loop
// ============================================================================

impl Connection {
    /// Dispatch loop that owns the WebSocket I/O.
    async fn run_dispatch_loop(
        ws_stream: WsStream,
        mut outbound_rx: mpsc::UnboundedReceiver<Envelope>,
        result_tx: mpsc::Sender<CallResult>,
        lifecycle_tx: Arc<watch::Sender<Option<String>>>,
        closed: Arc<AtomicBool>,
        cancel: CancellationToken,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("dispatch loop cancelled");
                    let _ = ws_write.close().await;
                    break;
                }

                // Incoming frames from the target
                frame = ws_read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            let detached = Self::handle_incoming_frame(
                                &text,
                                &result_tx,
                                &lifecycle_tx,
                            ).await;

                            if detached {
                                break;
                            }
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "websocket read error");
                            break;
                        }

                        None => {
                            debug!("websocket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                // Commands from the Rust API
                envelope = outbound_rx.recv() => {
                    match envelope {
                        Some(envelope) => {
                            let id = envelope.id;
                            match to_string(&envelope) {
                                Ok(json) => {
                                    trace!(%id, "sending command");
                                    if let Err(e) = ws_write.send(Message::Text(json.into())).await {
                                        error!(error = %e, %id, "websocket write error");
                                        break;
                                    }
                                }
                                Err(e) => {
                                    // The caller's await times out; treat as a failed call.
                                    error!(error = %e, %id, "failed to serialize command");
                                }
                            }
                        }

                        None => {
                            debug!("command channel closed");
                            let _ = ws_write.close().await;
                            break;
                        }
                    }
                }
            }
        }

        closed.store(true, Ordering::SeqCst);
        // Dropping result_tx releases a blocked await_result with an error.
        debug!("dispatch loop terminated");
    }

    /// Decodes and routes one inbound text frame.
    ///
    /// Returns `true` if the frame was a detachment event, which is terminal
    /// for the connection.
    async fn handle_incoming_frame(
        text: &str,
        result_tx: &mpsc::Sender<CallResult>,
        lifecycle_tx: &watch::Sender<Option<String>>,
    ) -> bool {
        let message = match from_str::<InboundMessage>(text) {
            Ok(message) => message,
            Err(e) => {
                // Malformed frame: the connection stays open, the pending
                // call (if any) is left to time out.
                warn!(error = %e, "failed to decode inbound frame");
                return false;
            }
        };

        match message.classify() {
            Ok(Inbound::CallResult(res)) => {
                let id = res.id;
                if result_tx.send_timeout(res, RESULT_GRACE).await.is_err() {
                    warn!(%id, "no caller awaiting, dropping call result");
                }
                false
            }

            Ok(Inbound::Event(PageEvent::Lifecycle { name, frame_id })) => {
                trace!(%name, %frame_id, "lifecycle event");
                let _ = lifecycle_tx.send(Some(name));
                false
            }

            Ok(Inbound::Event(PageEvent::Detached { reason })) => {
                warn!(%reason, "target detached");
                true
            }

            Ok(Inbound::Event(PageEvent::Unknown { method })) => {
                debug!(%method, "ignoring unrecognized event");
                false
            }

            Err(e) => {
                warn!(error = %e, "unclassifiable inbound frame");
                false
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MockFrame, MockTarget};

    use serde_json::json;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_call_roundtrip() {
        let target = MockTarget::spawn(|| {
            Box::new(|method, params| match method {
                "Page.navigate" => {
                    assert_eq!(params["url"], "https://a.test/");
                    vec![MockFrame::Reply(json!({"frameId": "F1"}))]
                }
                _ => vec![MockFrame::Reply(json!({}))],
            })
        })
        .await;

        let cancel = CancellationToken::new();
        let conn = Connection::connect(&target.ws_url(), &cancel)
            .await
            .expect("connect");

        let value = conn
            .call(Command::navigate("https://a.test/"))
            .await
            .expect("call");
        assert_eq!(value["frameId"], "F1");

        conn.close();
    }

    #[tokio::test]
    async fn test_sequential_calls_use_fresh_ids() {
        let target = MockTarget::spawn(|| {
            Box::new(|_, _| vec![MockFrame::Reply(json!({"ok": true}))])
        })
        .await;

        let cancel = CancellationToken::new();
        let conn = Connection::connect(&target.ws_url(), &cancel)
            .await
            .expect("connect");

        let a = conn.send(Command::page_enable()).expect("send");
        conn.await_result(a).await.expect("first result");

        let b = conn.send(Command::page_enable()).expect("send");
        assert!(b > a);
        conn.await_result(b).await.expect("second result");

        conn.close();
    }

    #[tokio::test]
    async fn test_stale_result_is_not_returned() {
        // The target replies to the first command with a bogus correlation id
        // before the real one; await_result must skip the stale frame.
        let target = MockTarget::spawn(|| {
            Box::new(|_, _| {
                vec![
                    MockFrame::Raw(json!({"id": 9999, "result": {"stale": true}})),
                    MockFrame::Reply(json!({"fresh": true})),
                ]
            })
        })
        .await;

        let cancel = CancellationToken::new();
        let conn = Connection::connect(&target.ws_url(), &cancel)
            .await
            .expect("connect");

        let value = conn.call(Command::page_enable()).await.expect("call");
        assert_eq!(value["fresh"], true);

        conn.close();
    }

    #[tokio::test]
    async fn test_await_times_out_when_target_is_silent() {
        let target = MockTarget::spawn(|| Box::new(|_, _| vec![MockFrame::Silent])).await;

        let cancel = CancellationToken::new();
        let conn = Connection::connect(&target.ws_url(), &cancel)
            .await
            .expect("connect");

        let err = conn.call(Command::page_enable()).await.unwrap_err();
        assert!(err.is_timeout(), "expected timeout, got {err}");

        conn.close();
    }

    #[tokio::test]
    async fn test_detachment_releases_pending_call() {
        // Scenario: the remote sends a detachment event mid-call. The pending
        // await must return an error promptly, not block until the timeout.
        let target = MockTarget::spawn(|| {
            Box::new(|_, _| {
                vec![MockFrame::Event {
                    method: "Inspector.detached",
                    params: json!({"reason": "target_closed"}),
                }]
            })
        })
        .await;

        let cancel = CancellationToken::new();
        let conn = Connection::connect(&target.ws_url(), &cancel)
            .await
            .expect("connect");

        let started = tokio::time::Instant::now();
        let err = conn.call(Command::page_enable()).await.unwrap_err();
        assert!(err.is_connection_error(), "expected closed, got {err}");
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn test_remote_close_releases_pending_call() {
        let target = MockTarget::spawn(|| Box::new(|_, _| vec![MockFrame::Close])).await;

        let cancel = CancellationToken::new();
        let conn = Connection::connect(&target.ws_url(), &cancel)
            .await
            .expect("connect");

        let err = conn.call(Command::page_enable()).await.unwrap_err();
        assert!(err.is_connection_error(), "expected closed, got {err}");
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn test_close_fails_future_sends() {
        let target = MockTarget::spawn(|| Box::new(|_, _| vec![MockFrame::Silent])).await;

        let cancel = CancellationToken::new();
        let conn = Connection::connect(&target.ws_url(), &cancel)
            .await
            .expect("connect");

        conn.close();
        // Give the dispatch loop a moment to observe cancellation.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = conn.send(Command::page_enable()).unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_malformed_frame_keeps_connection_open() {
        let target = MockTarget::spawn(|| {
            let mut first = true;
            Box::new(move |_, _| {
                if first {
                    first = false;
                    vec![
                        MockFrame::Text("this is not json".to_string()),
                        MockFrame::Reply(json!({"ok": true})),
                    ]
                } else {
                    vec![MockFrame::Reply(json!({"ok": true}))]
                }
            })
        })
        .await;

        let cancel = CancellationToken::new();
        let conn = Connection::connect(&target.ws_url(), &cancel)
            .await
            .expect("connect");

        let value = conn.call(Command::page_enable()).await.expect("first call");
        assert_eq!(value["ok"], true);

        let value = conn.call(Command::page_enable()).await.expect("second call");
        assert_eq!(value["ok"], true);
        assert!(!conn.is_closed());

        conn.close();
    }

    #[tokio::test]
    async fn test_lifecycle_events_reach_the_watch() {
        let target = MockTarget::spawn(|| {
            Box::new(|_, _| {
                vec![
                    MockFrame::Reply(json!({})),
                    MockFrame::Event {
                        method: "Page.lifecycleEvent",
                        params: json!({"name": "networkIdle", "frameId": "F1"}),
                    },
                ]
            })
        })
        .await;

        let cancel = CancellationToken::new();
        let conn = Connection::connect(&target.ws_url(), &cancel)
            .await
            .expect("connect");

        let mut lifecycle = conn.lifecycle();
        conn.call(Command::page_enable()).await.expect("call");

        timeout(Duration::from_secs(2), async {
            loop {
                if lifecycle.borrow_and_update().as_deref() == Some("networkIdle") {
                    break;
                }
                lifecycle.changed().await.expect("watch alive");
            }
        })
        .await
        .expect("lifecycle event observed");

        conn.close();
    }
}
