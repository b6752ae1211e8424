//! Tool server configuration types.

use serde::{Deserialize, Serialize};

use super::credential::AuthRequirement;

/// How a tool server is reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// Spawned subprocess, JSON-RPC over stdin/stdout
    #[default]
    Stdio,
    /// Socket endpoint, JSON-RPC over text frames
    Socket,
    /// In-memory module, plain function calls
    InProcess,
}

/// Environment variable entry for spawned tool servers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvEntry {
    /// Environment variable key
    pub key: String,
    /// Environment variable value
    pub value: String,
}

impl EnvEntry {
    /// Create a new environment variable entry.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Declared configuration for one tool server.
///
/// Created by an add-server call, mutated by enable/disable, deleted on
/// remove. Owned by the manager and persisted through an injected store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Stable identifier. When empty, the name stands in as the identity.
    pub id: String,

    /// User-friendly name for the server.
    pub name: String,

    /// Registry key selecting the adapter implementation for this server.
    /// Unregistered keys fall back to the generic subprocess adapter.
    #[serde(default)]
    pub server_key: String,

    /// Identity of the owning tenant/user, handed to adapter setup hooks.
    #[serde(default)]
    pub owner_id: String,

    /// Connection type (stdio, socket, or in-process).
    pub transport_kind: TransportKind,

    // --- Stdio server fields ---
    /// Command to execute. Required for stdio servers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Arguments to pass to the executable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,

    /// Working directory for the process
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,

    /// Environment variables overlaid on the inherited environment.
    #[serde(default)]
    pub env: Vec<EnvEntry>,

    // --- Socket server fields ---
    /// URL for the socket connection (e.g. `ws://localhost:3001`).
    /// Required for socket servers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Whether this server participates in the merged tool surface.
    /// Enabled servers are connected at manager initialization.
    pub enabled: bool,

    /// Hidden servers are always-on internals: auto-started at
    /// initialization and excluded from server listings.
    #[serde(default)]
    pub hidden: bool,

    /// Declared auth requirement. When present, add-server must be given
    /// a credential or it fails fast.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthRequirement>,
}

impl ServerConfig {
    /// Create a stdio server configuration.
    #[must_use]
    pub fn stdio(
        id: impl Into<String>,
        name: impl Into<String>,
        command: impl Into<String>,
        args: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            transport_kind: TransportKind::Stdio,
            command: Some(command.into()),
            args: Some(args),
            enabled: true,
            ..Self::default()
        }
    }

    /// Create a socket server configuration.
    #[must_use]
    pub fn socket(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            transport_kind: TransportKind::Socket,
            url: Some(url.into()),
            enabled: true,
            ..Self::default()
        }
    }

    /// Create an in-process server configuration for a registered module key.
    #[must_use]
    pub fn in_process(
        id: impl Into<String>,
        name: impl Into<String>,
        server_key: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            server_key: server_key.into(),
            transport_kind: TransportKind::InProcess,
            enabled: true,
            ..Self::default()
        }
    }

    /// Set the registry key.
    #[must_use]
    pub fn with_server_key(mut self, key: impl Into<String>) -> Self {
        self.server_key = key.into();
        self
    }

    /// Set the owning tenant/user id.
    #[must_use]
    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = owner_id.into();
        self
    }

    /// Add an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push(EnvEntry::new(key, value));
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set enabled status.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Mark the server as a hidden, always-on internal.
    #[must_use]
    pub const fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    /// Set the declared auth requirement.
    #[must_use]
    pub fn with_auth(mut self, requirement: AuthRequirement) -> Self {
        self.auth = Some(requirement);
        self
    }

    /// The identity used for duplicate checks and adapter maps: the id,
    /// or the name when no id was given.
    #[must_use]
    pub fn effective_id(&self) -> &str {
        if self.id.is_empty() {
            &self.name
        } else {
            &self.id
        }
    }

    /// Validate configuration based on transport kind.
    ///
    /// Returns an error if required fields are missing or invalid for the
    /// declared transport.
    pub fn validate(&self) -> Result<(), String> {
        if self.effective_id().is_empty() {
            return Err("Server requires an id or a name".to_string());
        }

        match self.transport_kind {
            TransportKind::Stdio => {
                let command = self
                    .command
                    .as_ref()
                    .ok_or_else(|| "Stdio server requires command".to_string())?;

                if command.is_empty() {
                    return Err("Stdio server command cannot be empty".to_string());
                }

                // working_dir MUST be absolute if specified
                if let Some(ref cwd) = self.working_dir {
                    if !cwd.is_empty() && !std::path::Path::new(cwd).is_absolute() {
                        return Err(format!("Stdio server working_dir must be absolute: {cwd}"));
                    }
                }

                Ok(())
            }
            TransportKind::Socket => {
                let url = self
                    .url
                    .as_ref()
                    .ok_or_else(|| "Socket server requires url".to_string())?;

                if url.is_empty() {
                    return Err("Socket server url cannot be empty".to_string());
                }

                Ok(())
            }
            TransportKind::InProcess => {
                if self.server_key.is_empty() {
                    return Err("In-process server requires a server_key".to_string());
                }

                Ok(())
            }
        }
    }
}

/// One row of a server listing: the declared config plus its live state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerEntry {
    /// Declared configuration.
    pub config: ServerConfig,
    /// Whether a live adapter currently backs this server.
    pub connected: bool,
}
