//! In-process mock page target for tests.
//!
//! Speaks just enough of the wire protocol to exercise the transport, the
//! command facade, the worker pool and the crawler without a real browser:
//! it accepts WebSocket connections, decodes command envelopes and answers
//! through a per-connection responder closure.

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

// ============================================================================
// MockFrame
// ============================================================================

/// One frame the mock target emits in reaction to an incoming command.
pub(crate) enum MockFrame {
    /// A call result correlated to the incoming command's id.
    Reply(Value),
    /// A failed call result correlated to the incoming command's id.
    Error { code: i64, message: String },
    /// An unsolicited event frame.
    Event {
        method: &'static str,
        params: Value,
    },
    /// A verbatim JSON frame (for wire-level edge cases).
    Raw(Value),
    /// A verbatim text frame (for malformed payloads).
    Text(String),
    /// No reaction at all.
    Silent,
    /// Close the WebSocket.
    Close,
}

/// Per-connection reaction to incoming commands: `(method, params) -> frames`.
pub(crate) type Responder = Box<dyn FnMut(&str, &Value) -> Vec<MockFrame> + Send>;

// ============================================================================
// MockTarget
// ============================================================================

/// A listening mock page target.
///
/// Every accepted connection gets its own responder from the factory, so
/// pool tests with several tabs keep independent per-connection state.
pub(crate) struct MockTarget {
    addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    closed_pages: Arc<AtomicUsize>,
    accept_task: JoinHandle<()>,
}

impl MockTarget {
    /// Binds to an ephemeral port and starts accepting connections.
    pub(crate) async fn spawn<F>(factory: F) -> Self
    where
        F: Fn() -> Responder + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let accepted = Arc::new(AtomicUsize::new(0));
        let closed_pages = Arc::new(AtomicUsize::new(0));

        let factory = Arc::new(factory);
        let accepted_clone = Arc::clone(&accepted);
        let closed_clone = Arc::clone(&closed_pages);

        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                accepted_clone.fetch_add(1, Ordering::SeqCst);

                let responder = factory();
                let closed = Arc::clone(&closed_clone);
                tokio::spawn(async move {
                    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                        return;
                    };
                    serve_connection(ws, responder, closed).await;
                });
            }
        });

        Self {
            addr,
            accepted,
            closed_pages,
            accept_task,
        }
    }

    /// WebSocket debugger URL of this target.
    pub(crate) fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Number of connections accepted so far.
    pub(crate) fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Number of `Page.close` commands received across all connections.
    pub(crate) fn closed_pages(&self) -> usize {
        self.closed_pages.load(Ordering::SeqCst)
    }
}

impl Drop for MockTarget {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

// ============================================================================
// Connection serving
// ============================================================================

async fn serve_connection(
    ws: WebSocketStream<TcpStream>,
    mut responder: Responder,
    closed_pages: Arc<AtomicUsize>,
) {
    let (mut write, mut read) = ws.split();

    'serve: while let Some(Ok(msg)) = read.next().await {
        let Message::Text(text) = msg else {
            continue;
        };
        let Ok(incoming) = serde_json::from_str::<Value>(&text) else {
            continue;
        };

        let id = incoming["id"].as_u64().unwrap_or(0);
        let method = incoming["method"].as_str().unwrap_or_default().to_string();
        let params = incoming
            .get("params")
            .cloned()
            .unwrap_or(Value::Object(Default::default()));

        if method == "Page.close" {
            closed_pages.fetch_add(1, Ordering::SeqCst);
        }

        for frame in responder(&method, &params) {
            let text = match frame {
                MockFrame::Reply(result) => json!({"id": id, "result": result}).to_string(),
                MockFrame::Error { code, message } => {
                    json!({"id": id, "error": {"code": code, "message": message}}).to_string()
                }
                MockFrame::Event { method, params } => {
                    json!({"method": method, "params": params}).to_string()
                }
                MockFrame::Raw(value) => value.to_string(),
                MockFrame::Text(text) => text,
                MockFrame::Silent => continue,
                MockFrame::Close => {
                    let _ = write.close().await;
                    break 'serve;
                }
            };

            if write.send(Message::Text(text.into())).await.is_err() {
                break 'serve;
            }
        }
    }
}

// ============================================================================
// Canned responders
// ============================================================================

/// Responder that answers every command with an empty result and follows each
/// navigation with a `networkIdle` lifecycle event.
pub(crate) fn quiet_page() -> Responder {
    Box::new(|method, _| match method {
        "Page.navigate" => vec![
            MockFrame::Reply(json!({"frameId": "F1", "loaderId": "L1"})),
            MockFrame::Event {
                method: "Page.lifecycleEvent",
                params: json!({"name": "networkIdle", "frameId": "F1"}),
            },
        ],
        _ => vec![MockFrame::Reply(json!({}))],
    })
}

/// Wraps a string value the way `Runtime.evaluate` reports script results.
pub(crate) fn evaluate_result(value: &str) -> Value {
    json!({"result": {"type": "string", "value": value}})
}
