//! In-process module adapter: tool calls with zero transport overhead.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use toolmesh_core::{ResourceDef, ToolCallResult, ToolDef};

use super::{AdapterError, ToolAdapter, empty_input_schema, normalize_value};

/// An in-memory tool module: a table of callable tools with no process
/// or socket behind it. Used when per-call latency matters more than
/// isolation.
#[async_trait]
pub trait ToolModule: Send + Sync {
    /// The tools this module exposes.
    fn tools(&self) -> Vec<ToolDef>;

    /// Invoke one tool. The returned value is normalized exactly like a
    /// remote reply; `Err` carries a short human-readable message.
    async fn invoke(&self, name: &str, arguments: Value) -> Result<Value, String>;
}

/// Adapter wrapping a [`ToolModule`] behind the uniform capability set.
pub struct InProcessAdapter {
    id: String,
    owner_id: String,
    server_key: String,
    module: Arc<dyn ToolModule>,
    connected: AtomicBool,
}

impl InProcessAdapter {
    /// Create an adapter around a module instance.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        owner_id: impl Into<String>,
        server_key: impl Into<String>,
        module: Arc<dyn ToolModule>,
    ) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            server_key: server_key.into(),
            module,
            connected: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ToolAdapter for InProcessAdapter {
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
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn list_tools(&self) -> Result<Vec<ToolDef>, AdapterError> {
        Ok(self
            .module
            .tools()
            .into_iter()
            .map(|mut tool| {
                if tool.input_schema.is_none() {
                    tool.input_schema = Some(empty_input_schema());
                }
                tool
            })
            .collect())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> ToolCallResult {
        let known = self.module.tools().iter().any(|t| t.name == name);
        if !known {
            return ToolCallResult::error(format!(
                "Module '{}' has no tool named '{name}'",
                self.id
            ));
        }

        match self.module.invoke(name, arguments).await {
            Ok(value) => normalize_value(&value),
            Err(message) => ToolCallResult::error(message),
        }
    }

    async fn list_resources(&self) -> Result<Vec<ResourceDef>, AdapterError> {
        Ok(Vec::new())
    }

    async fn read_resource(&self, _uri: &str) -> Result<Value, AdapterError> {
        Err(AdapterError::Unsupported(
            "In-process modules expose no resources".to_string(),
        ))
    }

    async fn reconnect(&self) -> Result<(), AdapterError> {
        self.connect().await
    }

    async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}
