//! Subprocess transport: newline-delimited JSON over stdin/stdout.

use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::{RequestTracker, TransportClient, TransportError, dispatch_frame};
use crate::protocol::{
    REQUEST_TIMEOUT, RpcNotification, RpcRequest, ServerHandshake, initialize_params,
};

/// Transport client that spawns the tool server as a child process.
///
/// Outgoing requests are one JSON line on stdin; incoming stdout bytes are
/// buffered and split on newline boundaries, each complete line parsed as
/// one reply and matched by id. Stderr is logged, never parsed.
pub struct StdioClient {
    command: String,
    args: Vec<String>,
    working_dir: Option<String>,
    env: Vec<(String, String)>,

    child: Option<Child>,
    stdin: Option<Arc<Mutex<ChildStdin>>>,
    tracker: Arc<RequestTracker>,
    /// True while the process streams are up; flips off on exit or EOF.
    alive: Arc<AtomicBool>,
    handshake: Option<ServerHandshake>,
    reader_task: Option<JoinHandle<()>>,
    stderr_task: Option<JoinHandle<()>>,
}

impl StdioClient {
    /// Create a client for the declared command (not yet connected).
    #[must_use]
    pub fn new(
        command: impl Into<String>,
        args: Vec<String>,
        working_dir: Option<String>,
        env: Vec<(String, String)>,
    ) -> Self {
        Self {
            command: command.into(),
            args,
            working_dir,
            env,
            child: None,
            stdin: None,
            tracker: Arc::new(RequestTracker::new()),
            alive: Arc::new(AtomicBool::new(false)),
            handshake: None,
            reader_task: None,
            stderr_task: None,
        }
    }

    fn spawn_process(&mut self) -> Result<(), TransportError> {
        let mut command = Command::new(&self.command);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref working_dir) = self.working_dir {
            command.current_dir(working_dir);
        }

        // Declared variables overlay the inherited environment
        for (key, value) in &self.env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|e| {
            TransportError::SpawnFailed(format!(
                "Failed to spawn '{}': {e}\nArgs: {:?}\nCwd: {:?}",
                self.command, self.args, self.working_dir
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::SpawnFailed("Failed to get stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::SpawnFailed("Failed to get stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TransportError::SpawnFailed("Failed to get stderr".to_string()))?;

        self.alive.store(true, Ordering::SeqCst);

        // Reader task: split stdout on newlines, dispatch each line by id.
        // On EOF or read error every in-flight request fails immediately
        // instead of waiting out its timeout.
        let tracker = Arc::clone(&self.tracker);
        let alive = Arc::clone(&self.alive);
        let server_command = self.command.clone();
        self.reader_task = Some(tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => dispatch_frame(&tracker, &line),
                    Ok(None) => {
                        tracing::info!(command = %server_command, "Tool server closed stdout");
                        break;
                    }
                    Err(error) => {
                        tracing::warn!(command = %server_command, %error, "Stdout read failed");
                        break;
                    }
                }
            }
            alive.store(false, Ordering::SeqCst);
            tracker.fail_all(|| TransportError::Disconnected);
        }));

        // Stderr is diagnostics only
        self.stderr_task = Some(tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(line = %line, "Tool server stderr");
            }
        }));

        self.child = Some(child);
        self.stdin = Some(Arc::new(Mutex::new(stdin)));
        Ok(())
    }

    async fn write_frame(&self, frame: String) -> Result<(), TransportError> {
        let stdin = self.stdin.as_ref().ok_or(TransportError::NotConnected)?;

        let mut guard = stdin.lock().await;
        guard.write_all(frame.as_bytes()).await?;
        guard.write_all(b"\n").await?;
        guard.flush().await?;
        Ok(())
    }

    async fn teardown(&mut self) {
        self.alive.store(false, Ordering::SeqCst);

        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }

        // Dropping stdin signals EOF to well-behaved servers
        self.stdin = None;

        if let Some(mut child) = self.child.take() {
            let _ = child.kill().await;
        }

        self.tracker.fail_all(|| TransportError::Disconnected);
        self.handshake = None;
    }
}

#[async_trait]
impl TransportClient for StdioClient {
    async fn connect(&mut self) -> Result<ServerHandshake, TransportError> {
        if self.is_connected() {
            return Err(TransportError::Protocol("Already connected".to_string()));
        }

        self.spawn_process()?;

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
            command = %self.command,
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

impl Drop for StdioClient {
    fn drop(&mut self) {
        // kill_on_drop reaps the child; just stop the background tasks
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}
