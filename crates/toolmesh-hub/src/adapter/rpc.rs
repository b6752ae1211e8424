//! Base adapter over a transport client, with a pre-connect setup hook.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use toolmesh_core::{Credential, ResourceDef, ServerConfig, ToolCallResult, ToolDef, TransportKind};

use super::{
    AdapterError, ToolAdapter, normalize_call_reply, parse_resource_defs, parse_tool_defs,
};
use crate::transport::{SocketClient, StdioClient, TransportClient};

/// Mutable launch environment handed to a setup hook before the transport
/// is constructed. Changes made here (extra env vars, a different working
/// directory) are what the spawned process actually sees.
pub struct SetupContext {
    /// Identity of the owning tenant/user.
    pub owner_id: String,
    /// Credential supplied at add time, if the server declared one.
    pub credential: Option<Credential>,
    /// Environment overlay for the spawned process.
    pub env: Vec<(String, String)>,
    /// Working directory for the spawned process.
    pub working_dir: Option<String>,
}

/// Provider-specific preparation run before every connect.
///
/// Typical hooks write a credential file with owner-only permissions or
/// derive per-tenant env vars; they live next to the adapter registration
/// rather than inside the manager.
#[async_trait]
pub trait AdapterSetup: Send + Sync {
    /// Prepare the launch environment. Failure aborts the connect.
    async fn prepare(&self, ctx: &mut SetupContext) -> Result<(), AdapterError>;
}

/// Adapter backed by a subprocess or socket transport.
pub struct RpcAdapter {
    id: String,
    owner_id: String,
    server_key: String,
    config: ServerConfig,
    credential: Option<Credential>,
    setup: Option<Arc<dyn AdapterSetup>>,
    client: RwLock<Option<Box<dyn TransportClient>>>,
}

impl RpcAdapter {
    /// Create an adapter bound to one server config (not yet connected).
    #[must_use]
    pub fn new(
        config: ServerConfig,
        credential: Option<Credential>,
        setup: Option<Arc<dyn AdapterSetup>>,
    ) -> Self {
        Self {
            id: config.effective_id().to_string(),
            owner_id: config.owner_id.clone(),
            server_key: config.server_key.clone(),
            config,
            credential,
            setup,
            client: RwLock::new(None),
        }
    }

    async fn build_client(&self) -> Result<Box<dyn TransportClient>, AdapterError> {
        let mut ctx = SetupContext {
            owner_id: self.owner_id.clone(),
            credential: self.credential.clone(),
            env: self
                .config
                .env
                .iter()
                .map(|e| (e.key.clone(), e.value.clone()))
                .collect(),
            working_dir: self.config.working_dir.clone(),
        };

        if let Some(ref setup) = self.setup {
            setup.prepare(&mut ctx).await?;
        }

        // The transport is constructed only after the hook ran, so it
        // picks up any environment the hook mutated
        match self.config.transport_kind {
            TransportKind::Stdio => {
                let command = self
                    .config
                    .command
                    .clone()
                    .ok_or_else(|| AdapterError::Setup("Missing command".to_string()))?;
                Ok(Box::new(StdioClient::new(
                    command,
                    self.config.args.clone().unwrap_or_default(),
                    ctx.working_dir,
                    ctx.env,
                )))
            }
            TransportKind::Socket => {
                let url = self
                    .config
                    .url
                    .clone()
                    .ok_or_else(|| AdapterError::Setup("Missing url".to_string()))?;
                Ok(Box::new(SocketClient::new(url)))
            }
            TransportKind::InProcess => Err(AdapterError::Unsupported(
                "In-process servers use the module adapter".to_string(),
            )),
        }
    }
}

#[async_trait]
impl ToolAdapter for RpcAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> &str {
        &self.owner_id
    }

    fn server_key(&self) -> &str {
        &self.server_key
    }

    async fn connect(&self) -> Result<(), AdapterError> {
        let mut client = self.build_client().await?;
        client.connect().await?;

        let mut slot = self.client.write().await;
        *slot = Some(client);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        let slot = self.client.read().await;
        slot.as_ref().is_some_and(|c| c.is_connected())
    }

    async fn list_tools(&self) -> Result<Vec<ToolDef>, AdapterError> {
        let slot = self.client.read().await;
        let client = slot.as_ref().ok_or(AdapterError::NotConnected)?;

        let raw = client.list_tools().await?;
        Ok(parse_tool_defs(&raw))
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> ToolCallResult {
        let slot = self.client.read().await;
        let Some(client) = slot.as_ref() else {
            return ToolCallResult::error(format!("Server '{}' is not connected", self.id));
        };

        match client.call_tool(name, arguments).await {
            Ok(raw) => normalize_call_reply(&raw),
            Err(error) => ToolCallResult::error(error.to_string()),
        }
    }

    async fn list_resources(&self) -> Result<Vec<ResourceDef>, AdapterError> {
        let slot = self.client.read().await;
        let client = slot.as_ref().ok_or(AdapterError::NotConnected)?;

        let raw = client.list_resources().await?;
        Ok(parse_resource_defs(&raw))
    }

    async fn read_resource(&self, uri: &str) -> Result<Value, AdapterError> {
        let slot = self.client.read().await;
        let client = slot.as_ref().ok_or(AdapterError::NotConnected)?;

        Ok(client.read_resource(uri).await?)
    }

    async fn reconnect(&self) -> Result<(), AdapterError> {
        // Best-effort close of the old transport, errors swallowed
        self.close().await;
        self.connect().await
    }

    async fn close(&self) {
        let mut slot = self.client.write().await;
        if let Some(mut client) = slot.take() {
            client.disconnect().await;
        }
    }
}
