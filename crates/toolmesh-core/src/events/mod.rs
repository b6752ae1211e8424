//! Server lifecycle events emitted by the manager.
//!
//! Events are serialized with a `type` tag so host applications can fan
//! them out to UI listeners or logs without knowing the variant set:
//!
//! ```json
//! { "type": "server_connected", "serverId": "mail-a", "toolCount": 12 }
//! ```

use serde::{Deserialize, Serialize};

/// Lifecycle events for tool servers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubEvent {
    /// A server configuration was added.
    ServerAdded {
        /// Server identifier.
        #[serde(rename = "serverId")]
        server_id: String,
        /// User-friendly server name.
        name: String,
    },

    /// A server configuration was removed.
    ServerRemoved {
        /// Server identifier.
        #[serde(rename = "serverId")]
        server_id: String,
    },

    /// A server connected and its tools were discovered.
    ServerConnected {
        /// Server identifier.
        #[serde(rename = "serverId")]
        server_id: String,
        /// Number of tools the server exposes.
        #[serde(rename = "toolCount")]
        tool_count: usize,
    },

    /// A server was disconnected (disable, remove, or shutdown).
    ServerDisconnected {
        /// Server identifier.
        #[serde(rename = "serverId")]
        server_id: String,
    },

    /// A server operation failed.
    ServerError {
        /// Server identifier, when known.
        #[serde(rename = "serverId")]
        server_id: Option<String>,
        /// User-friendly server name.
        name: String,
        /// Error description.
        error: String,
    },
}

/// Port for emitting hub events to the host application.
///
/// Implementations should not block; buffer or forward asynchronously.
pub trait EventEmitter: Send + Sync {
    /// Emit a lifecycle event.
    fn emit(&self, event: HubEvent);
}

/// A no-op event emitter for tests and headless contexts.
#[derive(Debug, Clone, Default)]
pub struct NoopEmitter;

impl NoopEmitter {
    /// Create a new no-op emitter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl EventEmitter for NoopEmitter {
    fn emit(&self, _event: HubEvent) {
        // Intentionally do nothing
    }
}
