//! Transport clients for tool server connections.
//!
//! Two implementations move bytes: [`StdioClient`] (spawned subprocess,
//! newline-delimited JSON on stdin/stdout) and [`SocketClient`] (WebSocket,
//! one JSON document per text frame). Their external behavior is identical:
//! requests are correlated to replies by a strictly increasing id, any id
//! unresolved after [`REQUEST_TIMEOUT`](crate::protocol::REQUEST_TIMEOUT)
//! fails with a timeout error, and a detected disconnect fails every
//! in-flight request immediately.

mod stdio;
mod socket;

pub use socket::SocketClient;
pub use stdio::StdioClient;

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::protocol::{RpcResponse, ServerHandshake};

/// Errors that can occur during transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to spawn tool server process: {0}")]
    SpawnFailed(String),

    #[error("Failed to connect to tool server: {0}")]
    ConnectFailed(String),

    #[error("Failed to communicate with tool server: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Socket error: {0}")]
    Socket(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Timeout waiting for tool server response")]
    Timeout,

    #[error("Connection to tool server lost")]
    Disconnected,

    #[error("Tool server returned error: code={code}, message={message}")]
    ServerError { code: i64, message: String },

    #[error("Server not connected")]
    NotConnected,
}

/// Pending-request correlation state shared by both transports.
///
/// Issues strictly increasing ids and holds one resolver per outstanding
/// request. Invariant: no two live entries share an id, and each entry is
/// resolved at most once — resolution, timeout, and drain all remove it.
pub(crate) struct RequestTracker {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<Result<Value, TransportError>>>>,
}

impl RequestTracker {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate an id and register its resolver.
    pub(crate) fn register(&self) -> (u64, oneshot::Receiver<Result<Value, TransportError>>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();

        let mut pending = self.pending.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        pending.insert(id, tx);

        (id, rx)
    }

    /// Resolve one pending entry. Returns false when the id is unknown
    /// (already resolved, timed out, or never issued).
    pub(crate) fn resolve(&self, id: u64, result: Result<Value, TransportError>) -> bool {
        let sender = {
            let mut pending = self
                .pending
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            pending.remove(&id)
        };

        sender.is_some_and(|tx| tx.send(result).is_ok())
    }

    /// Drop one pending entry without resolving it (timeout path).
    pub(crate) fn discard(&self, id: u64) {
        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        pending.remove(&id);
    }

    /// Fail every in-flight request, used on detected disconnect.
    pub(crate) fn fail_all(&self, make_error: impl Fn() -> TransportError) {
        let drained: Vec<_> = {
            let mut pending = self
                .pending
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            pending.drain().collect()
        };

        for (_, tx) in drained {
            let _ = tx.send(Err(make_error()));
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

/// Parse one incoming frame (a stdout line or a socket text frame) and
/// route it to the pending entry whose id matches.
///
/// Malformed frames and replies with no/unknown id are logged and dropped;
/// they never tear down the connection.
pub(crate) fn dispatch_frame(tracker: &RequestTracker, frame: &str) {
    let trimmed = frame.trim();
    if trimmed.is_empty() {
        return;
    }

    let response: RpcResponse = match serde_json::from_str(trimmed) {
        Ok(response) => response,
        Err(error) => {
            tracing::warn!(%error, "Discarding malformed frame from tool server");
            return;
        }
    };

    let Some(id) = response.id else {
        tracing::debug!("Ignoring server notification frame");
        return;
    };

    let result = match response.error {
        Some(error) => Err(TransportError::ServerError {
            code: error.code,
            message: error.message,
        }),
        None => Ok(response.result.unwrap_or(Value::Null)),
    };

    if !tracker.resolve(id, result) {
        tracing::debug!(id, "Reply for unknown request id, dropping");
    }
}

/// Uniform contract for one connection to a tool server.
///
/// `connect` performs the `initialize` handshake; only after it succeeds
/// is the client considered connected. The tool/resource operations are
/// provided on top of `request` so both transports behave identically.
#[async_trait]
pub trait TransportClient: Send + Sync {
    /// Open the connection and perform the handshake.
    async fn connect(&mut self) -> Result<ServerHandshake, TransportError>;

    /// Tear down the connection. Idempotent.
    async fn disconnect(&mut self);

    /// Whether the handshake has completed and the connection is live.
    fn is_connected(&self) -> bool;

    /// Server info cached from the handshake.
    fn handshake(&self) -> Option<&ServerHandshake>;

    /// Send one request and await its correlated reply.
    async fn request(&self, method: &str, params: Option<Value>)
        -> Result<Value, TransportError>;

    /// Send a notification (no reply expected).
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), TransportError>;

    /// Fetch the raw tool listing.
    async fn list_tools(&self) -> Result<Value, TransportError> {
        self.request("tools/list", None).await
    }

    /// Invoke one tool and return the raw reply payload.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, TransportError> {
        let params = json!({
            "name": name,
            "arguments": arguments
        });
        self.request("tools/call", Some(params)).await
    }

    /// Fetch the raw resource listing.
    async fn list_resources(&self) -> Result<Value, TransportError> {
        self.request("resources/list", None).await
    }

    /// Read one resource by URI.
    async fn read_resource(&self, uri: &str) -> Result<Value, TransportError> {
        let params = json!({ "uri": uri });
        self.request("resources/read", Some(params)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_strictly_increasing() {
        let tracker = RequestTracker::new();
        let (a, _rx_a) = tracker.register();
        let (b, _rx_b) = tracker.register();
        let (c, _rx_c) = tracker.register();
        assert!(a < b && b < c);
    }

    #[tokio::test]
    async fn each_reply_resolves_exactly_its_own_entry() {
        let tracker = RequestTracker::new();
        let (id_a, rx_a) = tracker.register();
        let (id_b, rx_b) = tracker.register();

        dispatch_frame(
            &tracker,
            &format!(r#"{{"version":"2.0","id":{id_b},"result":"for-b"}}"#),
        );
        dispatch_frame(
            &tracker,
            &format!(r#"{{"version":"2.0","id":{id_a},"result":"for-a"}}"#),
        );

        assert_eq!(rx_a.await.unwrap().unwrap(), Value::from("for-a"));
        assert_eq!(rx_b.await.unwrap().unwrap(), Value::from("for-b"));
        assert_eq!(tracker.pending_count(), 0);
    }

    #[test]
    fn no_entry_is_resolved_twice() {
        let tracker = RequestTracker::new();
        let (id, _rx) = tracker.register();

        assert!(tracker.resolve(id, Ok(Value::Null)));
        assert!(!tracker.resolve(id, Ok(Value::Null)));
    }

    #[test]
    fn malformed_frame_is_discarded_without_resolving() {
        let tracker = RequestTracker::new();
        let (_id, mut rx) = tracker.register();

        dispatch_frame(&tracker, "this is not json");
        dispatch_frame(&tracker, "");

        assert!(rx.try_recv().is_err());
        assert_eq!(tracker.pending_count(), 1);
    }

    #[tokio::test]
    async fn error_reply_resolves_to_server_error() {
        let tracker = RequestTracker::new();
        let (id, rx) = tracker.register();

        dispatch_frame(
            &tracker,
            &format!(
                r#"{{"version":"2.0","id":{id},"error":{{"code":-32601,"message":"no such method"}}}}"#
            ),
        );

        let result = rx.await.unwrap();
        assert!(matches!(
            result,
            Err(TransportError::ServerError { code: -32601, .. })
        ));
    }

    #[tokio::test]
    async fn fail_all_drains_every_pending_entry() {
        let tracker = RequestTracker::new();
        let (_a, rx_a) = tracker.register();
        let (_b, rx_b) = tracker.register();

        tracker.fail_all(|| TransportError::Disconnected);

        assert!(matches!(
            rx_a.await.unwrap(),
            Err(TransportError::Disconnected)
        ));
        assert!(matches!(
            rx_b.await.unwrap(),
            Err(TransportError::Disconnected)
        ));
        assert_eq!(tracker.pending_count(), 0);
    }

    #[test]
    fn reply_with_unknown_id_is_dropped() {
        let tracker = RequestTracker::new();
        // No entry registered for id 42; must not panic.
        dispatch_frame(&tracker, r#"{"version":"2.0","id":42,"result":null}"#);
    }
}
