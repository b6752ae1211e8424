//! Socket transport: one JSON document per WebSocket text frame.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::{RequestTracker, TransportClient, TransportError, dispatch_frame};
use crate::protocol::{
    REQUEST_TIMEOUT, RpcNotification, RpcRequest, ServerHandshake, initialize_params,
};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Transport client for socket-based tool servers.
///
/// Request/response semantics are identical to [`super::StdioClient`];
/// only the framing differs: each outgoing request is one text frame and
/// each incoming text frame is parsed as exactly one reply.
pub struct SocketClient {
    url: String,

    sink: Option<Arc<Mutex<WsSink>>>,
    tracker: Arc<RequestTracker>,
    alive: Arc<AtomicBool>,
    handshake: Option<ServerHandshake>,
    reader_task: Option<JoinHandle<()>>,
}

impl SocketClient {
    /// Create a client for the declared URL (not yet connected).
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            sink: None,
            tracker: Arc::new(RequestTracker::new()),
            alive: Arc::new(AtomicBool::new(false)),
            handshake: None,
            reader_task: None,
        }
    }

    async fn open_socket(&mut self) -> Result<(), TransportError> {
        let (stream, _) = connect_async(&self.url)
            .await
            .map_err(|e| TransportError::ConnectFailed(format!("{}: {e}", self.url)))?;

        let (sink, mut source) = stream.split();
        self.alive.store(true, Ordering::SeqCst);

        let tracker = Arc::clone(&self.tracker);
        let alive = Arc::clone(&self.alive);
        let url = self.url.clone();
        self.reader_task = Some(tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(frame)) => dispatch_frame(&tracker, &frame),
                    Ok(Message::Close(_)) => {
                        tracing::info!(url = %url, "Tool server closed socket");
                        break;
                    }
                    // Ping/pong handled by the library; binary frames are
                    // not part of the protocol
                    Ok(_) => {}
                    Err(error) => {
                        tracing::warn!(url = %url, %error, "Socket read failed");
                        break;
                    }
                }
            }
            alive.store(false, Ordering::SeqCst);
            tracker.fail_all(|| TransportError::Disconnected);
        }));

        self.sink = Some(Arc::new(Mutex::new(sink)));
        Ok(())
    }

    async fn write_frame(&self, frame: String) -> Result<(), TransportError> {
        let sink = self.sink.as_ref().ok_or(TransportError::NotConnected)?;

        let mut guard = sink.lock().await;
        guard
            .send(Message::Text(frame))
            .await
            .map_err(|e| TransportError::Socket(e.to_string()))
    }

    async fn teardown(&mut self) {
        self.alive.store(false, Ordering::SeqCst);

        if let Some(task) = self.reader_task.take() {
            task.abort();
        }

        if let Some(sink) = self.sink.take() {
            let mut guard = sink.lock().await;
            let _ = guard.send(Message::Close(None)).await;
        }

        self.tracker.fail_all(|| TransportError::Disconnected);
        self.handshake = None;
    }
}

#[async_trait]
impl TransportClient for SocketClient {
    async fn connect(&mut self) -> Result<ServerHandshake, TransportError> {
        if self.is_connected() {
            return Err(TransportError::Protocol("Already connected".to_string()));
        }

        self.open_socket().await?;

        let result = self.request("initialize", Some(initialize_params())).await;
        let handshake = match result.and_then(|value| {
            serde_json::from_value::<ServerHandshake>(value).map_err(TransportError::from)
        }) {
            Ok(handshake) => handshake,
            Err(error) => {
                self.teardown().await;
                return Err(error);
            }
        };

        self.notify("notifications/initialized", None).await?;
        self.handshake = Some(handshake.clone());

        tracing::info!(
            url = %self.url,
            server = %handshake.server_info.name,
            "Tool server connected"
        );

        Ok(handshake)
    }

    async fn disconnect(&mut self) {
        self.teardown().await;
    }

    fn is_connected(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && self.handshake.is_some()
    }

    fn handshake(&self) -> Option<&ServerHandshake> {
        self.handshake.as_ref()
    }

    async fn request(&self, method: &str, params: Option<Value>)
        -> Result<Value, TransportError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }

        let (id, rx) = self.tracker.register();
        let frame = serde_json::to_string(&RpcRequest::new(id, method, params))?;

        if let Err(error) = self.write_frame(frame).await {
            self.tracker.discard(id);
            return Err(error);
        }

        match timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TransportError::Disconnected),
            Err(_) => {
                self.tracker.discard(id);
                Err(TransportError::Timeout)
            }
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), TransportError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }

        let frame = serde_json::to_string(&RpcNotification::new(method, params))?;
        self.write_frame(frame).await
    }
}

impl Drop for SocketClient {
    fn drop(&mut self) {
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
    }
}
