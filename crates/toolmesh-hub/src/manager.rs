//! Central orchestration of tool servers.
//!
//! The manager owns the declared configurations, the live adapters, and
//! the tool-name cache. Everything the host application does with tool
//! servers goes through here: registering, connecting, listing the merged
//! tool surface, and routing calls.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;

use toolmesh_core::{
    ConfigStore, Credential, EventEmitter, HubEvent, NoopEmitter, ResourceDef, ServerConfig,
    ServerEntry, StoreError, ToolCallResult, ToolDef,
};

use crate::adapter::{AdapterError, ToolAdapter};
use crate::cache::ToolCache;
use crate::registry::{AdapterRegistry, RegistryError};

/// Store namespace for server configurations.
const CONFIG_KIND: &str = "tool_servers";

/// Errors surfaced by manager operations.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Server '{0}' already exists")]
    Duplicate(String),

    #[error("Server '{id}' requires a credential for provider '{provider}'")]
    MissingCredential { id: String, provider: String },

    #[error("Invalid server config: {0}")]
    InvalidConfig(String),

    #[error("Unknown server: {0}")]
    UnknownServer(String),

    #[error("No connected server exposes tool '{0}'")]
    UnknownTool(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

/// Manages the full lifecycle of tool servers and routes tool calls.
pub struct ToolManager {
    store: Arc<dyn ConfigStore>,
    registry: AdapterRegistry,
    emitter: Arc<dyn EventEmitter>,
    configs: RwLock<HashMap<String, ServerConfig>>,
    adapters: RwLock<HashMap<String, Arc<dyn ToolAdapter>>>,
    cache: ToolCache,
    builtins: Vec<ServerConfig>,
}

impl ToolManager {
    /// Create a manager with no event listener and the default cache TTL.
    #[must_use]
    pub fn new(store: Arc<dyn ConfigStore>, registry: AdapterRegistry) -> Self {
        Self {
            store,
            registry,
            emitter: Arc::new(NoopEmitter::new()),
            configs: RwLock::new(HashMap::new()),
            adapters: RwLock::new(HashMap::new()),
            cache: ToolCache::new(),
            builtins: Vec::new(),
        }
    }

    /// Set the event emitter.
    #[must_use]
    pub fn with_emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    /// Set the tool cache TTL.
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache = ToolCache::with_ttl(ttl);
        self
    }

    /// Declare always-on internal servers. They are forced hidden, started
    /// at every [`Self::initialize`], and never persisted.
    #[must_use]
    pub fn with_builtins(mut self, configs: Vec<ServerConfig>) -> Self {
        self.builtins = configs
            .into_iter()
            .map(|config| ServerConfig {
                hidden: true,
                enabled: true,
                ..config
            })
            .collect();
        self
    }

    /// Load persisted configurations, connect every enabled server, then
    /// bring up the declared builtin servers not already running.
    ///
    /// Individual failures are logged and reported as events; one broken
    /// server never blocks the rest from starting.
    pub async fn initialize(&self) -> Result<(), ManagerError> {
        let records = self.store.get_all(CONFIG_KIND).await?;

        let mut loaded = Vec::new();
        for (id, value) in records {
            match serde_json::from_value::<ServerConfig>(value) {
                Ok(config) => loaded.push(config),
                Err(error) => {
                    tracing::warn!(server_id = %id, %error, "Skipping unreadable server config");
                }
            }
        }

        {
            let mut configs = self.configs.write().await;
            for config in &loaded {
                configs.insert(config.effective_id().to_string(), config.clone());
            }
        }

        for config in loaded {
            if config.enabled {
                self.connect_server(&config, None).await;
            }
        }

        for builtin in &self.builtins {
            let id = builtin.effective_id().to_string();
            if self.adapters.read().await.contains_key(&id) {
                continue;
            }
            self.configs
                .write()
                .await
                .insert(id, builtin.clone());
            self.connect_server(builtin, None).await;
        }

        tracing::info!(
            server_count = self.configs.read().await.len(),
            "Tool manager initialized"
        );
        Ok(())
    }

    /// Register a new server.
    ///
    /// The config is validated and persisted first; if the server is
    /// enabled, a connection attempt follows. A failed connection leaves
    /// the server registered (it can be retried via enable/disable), but
    /// validation and persistence errors fail the whole call.
    pub async fn add_server(
        &self,
        config: ServerConfig,
        credential: Option<Credential>,
    ) -> Result<(), ManagerError> {
        config.validate().map_err(ManagerError::InvalidConfig)?;
        let id = config.effective_id().to_string();

        if let Some(ref auth) = config.auth {
            if credential.is_none() {
                return Err(ManagerError::MissingCredential {
                    id,
                    provider: auth.provider.clone(),
                });
            }
        }

        // The duplicate check and the insert must happen under one write
        // lock: with a check-then-insert split, two concurrent adds of
        // the same id could both pass the check while one is suspended
        // on the store write.
        {
            let mut configs = self.configs.write().await;
            if configs.contains_key(&id) || self.adapters.read().await.contains_key(&id) {
                return Err(ManagerError::Duplicate(id));
            }
            configs.insert(id.clone(), config.clone());
        }

        let record = match serde_json::to_value(&config) {
            Ok(record) => record,
            Err(error) => {
                self.configs.write().await.remove(&id);
                return Err(ManagerError::InvalidConfig(error.to_string()));
            }
        };
        if let Err(error) = self.store.set(CONFIG_KIND, &id, record).await {
            // Roll back the reservation so a retry can succeed
            self.configs.write().await.remove(&id);
            return Err(error.into());
        }

        self.emitter.emit(HubEvent::ServerAdded {
            server_id: id,
            name: config.name.clone(),
        });

        if config.enabled {
            self.connect_server(&config, credential).await;
        }

        Ok(())
    }

    /// Remove a server: disconnect, forget its tools, delete the stored
    /// config. Removing an unknown server is a no-op.
    pub async fn remove_server(&self, server_id: &str) -> Result<(), ManagerError> {
        let existed = self.configs.write().await.remove(server_id).is_some();

        if let Some(adapter) = self.adapters.write().await.remove(server_id) {
            adapter.close().await;
        }
        self.cache.clear_server_tools(server_id).await;

        if existed {
            self.store.delete(CONFIG_KIND, server_id).await?;
            self.emitter.emit(HubEvent::ServerRemoved {
                server_id: server_id.to_string(),
            });
            tracing::info!(server_id = %server_id, "Tool server removed");
        }

        Ok(())
    }

    /// Enable or disable a server. Disabling disconnects it and drops its
    /// tools from the merged surface; enabling connects it.
    pub async fn set_server_enabled(
        &self,
        server_id: &str,
        enabled: bool,
    ) -> Result<(), ManagerError> {
        let config = {
            let mut configs = self.configs.write().await;
            let config = configs
                .get_mut(server_id)
                .ok_or_else(|| ManagerError::UnknownServer(server_id.to_string()))?;
            config.enabled = enabled;
            config.clone()
        };

        let record = serde_json::to_value(&config)
            .map_err(|e| ManagerError::InvalidConfig(e.to_string()))?;
        self.store.set(CONFIG_KIND, server_id, record).await?;

        if enabled {
            self.connect_server(&config, None).await;
        } else {
            if let Some(adapter) = self.adapters.write().await.remove(server_id) {
                adapter.close().await;
            }
            self.cache.clear_server_tools(server_id).await;
            self.emitter.emit(HubEvent::ServerDisconnected {
                server_id: server_id.to_string(),
            });
        }

        Ok(())
    }

    /// List the declared servers with their live connection state. Hidden
    /// servers are excluded.
    pub async fn list_servers(&self) -> Vec<ServerEntry> {
        let configs = self.configs.read().await;
        let adapters = self.adapters.read().await;

        let mut entries = Vec::new();
        for (id, config) in configs.iter() {
            if config.hidden {
                continue;
            }
            let connected = match adapters.get(id) {
                Some(adapter) => adapter.is_connected().await,
                None => false,
            };
            entries.push(ServerEntry {
                config: config.clone(),
                connected,
            });
        }
        entries.sort_by(|a, b| a.config.effective_id().cmp(b.config.effective_id()));
        entries
    }

    /// List one connected server's tools, refreshing the cache.
    pub async fn list_tools(&self, server_id: &str) -> Result<Vec<ToolDef>, ManagerError> {
        let adapter = self.adapter(server_id).await?;
        let tools = adapter.list_tools().await?;
        self.cache.update_server_tools(server_id, tools.clone()).await;
        Ok(tools)
    }

    /// The merged tool surface: every connected server's tools, keyed by
    /// server id. Servers that fail to list are logged and skipped.
    pub async fn list_all_tools(&self) -> Vec<(String, Vec<ToolDef>)> {
        let adapters = self.snapshot_adapters().await;

        let mut all = Vec::new();
        for (id, adapter) in adapters {
            match adapter.list_tools().await {
                Ok(tools) => {
                    self.cache.update_server_tools(&id, tools.clone()).await;
                    all.push((id, tools));
                }
                Err(error) => {
                    tracing::warn!(server_id = %id, %error, "Failed to list tools");
                }
            }
        }
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Call a tool on a specific server.
    pub async fn call_tool(
        &self,
        server_id: &str,
        tool_name: &str,
        arguments: Value,
    ) -> Result<ToolCallResult, ManagerError> {
        let adapter = self.adapter(server_id).await?;
        Ok(adapter.call_tool(tool_name, arguments).await)
    }

    /// Call a tool by name alone, resolving the owning server through the
    /// cache. A cache miss triggers a full re-list of every connected
    /// server before giving up.
    pub async fn call_tool_by_name(
        &self,
        tool_name: &str,
        arguments: Value,
    ) -> Result<ToolCallResult, ManagerError> {
        if let Some(hit) = self.cache.find_tool_server(tool_name).await {
            if let Some(adapter) = self.adapters.read().await.get(&hit.server_id) {
                return Ok(adapter.call_tool(tool_name, arguments).await);
            }
            // Cached owner is gone; fall through to a fresh scan
            self.cache.clear_server_tools(&hit.server_id).await;
        }

        for (id, adapter) in self.snapshot_adapters().await {
            let Ok(tools) = adapter.list_tools().await else {
                continue;
            };
            let owns = tools.iter().any(|t| t.name == tool_name);
            self.cache.update_server_tools(&id, tools).await;
            if owns {
                return Ok(adapter.call_tool(tool_name, arguments).await);
            }
        }

        Err(ManagerError::UnknownTool(tool_name.to_string()))
    }

    /// Infallible tool call for host surfaces that want a result either
    /// way: routing errors come back as the error variant.
    pub async fn execute_tool_call(&self, tool_name: &str, arguments: Value) -> ToolCallResult {
        match self.call_tool_by_name(tool_name, arguments).await {
            Ok(result) => result,
            Err(error) => ToolCallResult::error(error.to_string()),
        }
    }

    /// List one connected server's resources.
    pub async fn list_resources(
        &self,
        server_id: &str,
    ) -> Result<Vec<ResourceDef>, ManagerError> {
        let adapter = self.adapter(server_id).await?;
        Ok(adapter.list_resources().await?)
    }

    /// Every connected server's resources, keyed by server id.
    pub async fn list_all_resources(&self) -> Vec<(String, Vec<ResourceDef>)> {
        let adapters = self.snapshot_adapters().await;

        let mut all = Vec::new();
        for (id, adapter) in adapters {
            match adapter.list_resources().await {
                Ok(resources) if !resources.is_empty() => all.push((id, resources)),
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(server_id = %id, %error, "Failed to list resources");
                }
            }
        }
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Read a resource from a specific server.
    pub async fn read_resource(
        &self,
        server_id: &str,
        uri: &str,
    ) -> Result<Value, ManagerError> {
        let adapter = self.adapter(server_id).await?;
        Ok(adapter.read_resource(uri).await?)
    }

    /// Re-list tools for every server whose cache entries aged out.
    pub async fn refresh_stale_servers(&self) {
        for server_id in self.cache.servers_needing_refresh().await {
            let Some(adapter) = self.adapters.read().await.get(&server_id).cloned() else {
                self.cache.clear_server_tools(&server_id).await;
                continue;
            };
            match adapter.list_tools().await {
                Ok(tools) => self.cache.update_server_tools(&server_id, tools).await,
                Err(error) => {
                    tracing::warn!(server_id = %server_id, %error, "Stale refresh failed");
                    self.cache.clear_server_tools(&server_id).await;
                }
            }
        }
    }

    /// Disconnect every server and drop the cache. Configurations stay
    /// persisted; a later [`Self::initialize`] brings everything back.
    pub async fn shutdown(&self) {
        let adapters: Vec<(String, Arc<dyn ToolAdapter>)> =
            self.adapters.write().await.drain().collect();

        for (id, adapter) in adapters {
            adapter.close().await;
            self.emitter.emit(HubEvent::ServerDisconnected {
                server_id: id.clone(),
            });
            tracing::info!(server_id = %id, "Tool server disconnected");
        }

        self.cache.clear_all().await;
    }

    async fn adapter(&self, server_id: &str) -> Result<Arc<dyn ToolAdapter>, ManagerError> {
        self.adapters
            .read()
            .await
            .get(server_id)
            .cloned()
            .ok_or_else(|| ManagerError::UnknownServer(server_id.to_string()))
    }

    async fn snapshot_adapters(&self) -> Vec<(String, Arc<dyn ToolAdapter>)> {
        self.adapters
            .read()
            .await
            .iter()
            .map(|(id, adapter)| (id.clone(), Arc::clone(adapter)))
            .collect()
    }

    /// Create and connect the adapter for a config. Failures are logged
    /// and emitted, never returned: the server stays registered and can
    /// be retried.
    async fn connect_server(&self, config: &ServerConfig, credential: Option<Credential>) {
        let id = config.effective_id().to_string();

        let adapter = match self.registry.create_adapter(config, credential) {
            Ok(adapter) => adapter,
            Err(error) => {
                tracing::error!(server_id = %id, %error, "Failed to create adapter");
                self.emitter.emit(HubEvent::ServerError {
                    server_id: Some(id),
                    name: config.name.clone(),
                    error: error.to_string(),
                });
                return;
            }
        };

        if let Err(error) = adapter.connect().await {
            tracing::error!(server_id = %id, %error, "Failed to connect tool server");
            self.emitter.emit(HubEvent::ServerError {
                server_id: Some(id),
                name: config.name.clone(),
                error: error.to_string(),
            });
            return;
        }

        let tool_count = match adapter.list_tools().await {
            Ok(tools) => {
                let count = tools.len();
                self.cache.update_server_tools(&id, tools).await;
                count
            }
            Err(error) => {
                tracing::warn!(server_id = %id, %error, "Connected but tool listing failed");
                0
            }
        };

        self.adapters
            .write()
            .await
            .insert(id.clone(), adapter);

        tracing::info!(server_id = %id, tool_count, "Tool server connected");
        self.emitter.emit(HubEvent::ServerConnected {
            server_id: id,
            tool_count,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use toolmesh_core::{AuthRequirement, MemoryConfigStore, ToolDef};

    use crate::adapter::ToolModule;

    struct EchoModule {
        tool_name: &'static str,
        invocations: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ToolModule for EchoModule {
        fn tools(&self) -> Vec<ToolDef> {
            vec![ToolDef::new(self.tool_name)]
        }

        async fn invoke(&self, _name: &str, arguments: Value) -> Result<Value, String> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            Ok(arguments)
        }
    }

    #[derive(Default)]
    struct RecordingEmitter {
        events: Mutex<Vec<HubEvent>>,
    }

    impl EventEmitter for RecordingEmitter {
        fn emit(&self, event: HubEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl RecordingEmitter {
        fn tags(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|e| {
                    serde_json::to_value(e).unwrap()["type"]
                        .as_str()
                        .unwrap()
                        .to_string()
                })
                .collect()
        }
    }

    fn registry_with(keys: &[&'static str]) -> (AdapterRegistry, Arc<AtomicUsize>) {
        let invocations = Arc::new(AtomicUsize::new(0));
        let mut registry = AdapterRegistry::new();
        for &key in keys {
            let invocations = Arc::clone(&invocations);
            registry.register_module(
                key,
                Box::new(move |_, _| {
                    Arc::new(EchoModule {
                        tool_name: key,
                        invocations: Arc::clone(&invocations),
                    }) as Arc<dyn ToolModule>
                }),
            );
        }
        (registry, invocations)
    }

    fn manager_with(keys: &[&'static str]) -> (ToolManager, Arc<RecordingEmitter>) {
        let (registry, _) = registry_with(keys);
        let emitter = Arc::new(RecordingEmitter::default());
        let manager = ToolManager::new(Arc::new(MemoryConfigStore::new()), registry)
            .with_emitter(emitter.clone());
        (manager, emitter)
    }

    fn module_config(id: &str, key: &'static str) -> ServerConfig {
        ServerConfig::in_process(id, id, key)
    }

    #[tokio::test]
    async fn add_server_connects_and_exposes_tools() {
        let (manager, emitter) = manager_with(&["echo"]);

        manager
            .add_server(module_config("e1", "echo"), None)
            .await
            .unwrap();

        let servers = manager.list_servers().await;
        assert_eq!(servers.len(), 1);
        assert!(servers[0].connected);

        let tools = manager.list_tools("e1").await.unwrap();
        assert_eq!(tools[0].name, "echo");

        assert_eq!(emitter.tags(), vec!["server_added", "server_connected"]);
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected() {
        let (manager, _) = manager_with(&["echo"]);
        manager
            .add_server(module_config("e1", "echo"), None)
            .await
            .unwrap();

        let result = manager.add_server(module_config("e1", "echo"), None).await;
        assert!(matches!(result, Err(ManagerError::Duplicate(_))));
    }

    #[tokio::test]
    async fn declared_auth_requires_a_credential() {
        let (manager, _) = manager_with(&["echo"]);
        let config = module_config("e1", "echo").with_auth(AuthRequirement {
            provider: "oauth-mail".to_string(),
        });

        let result = manager.add_server(config, None).await;
        assert!(matches!(
            result,
            Err(ManagerError::MissingCredential { .. })
        ));
        assert!(manager.list_servers().await.is_empty());
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_before_persisting() {
        let (manager, emitter) = manager_with(&[]);
        let config = ServerConfig::default();

        let result = manager.add_server(config, None).await;
        assert!(matches!(result, Err(ManagerError::InvalidConfig(_))));
        assert!(emitter.tags().is_empty());
    }

    #[tokio::test]
    async fn connect_failure_keeps_the_server_registered() {
        // No module registered under this key, so connection setup fails
        let (manager, emitter) = manager_with(&[]);
        let config = module_config("m1", "memory");

        manager.add_server(config, None).await.unwrap();

        let servers = manager.list_servers().await;
        assert_eq!(servers.len(), 1);
        assert!(!servers[0].connected);
        assert_eq!(emitter.tags(), vec!["server_added", "server_error"]);
    }

    #[tokio::test]
    async fn remove_server_is_a_noop_for_unknown_ids() {
        let (manager, emitter) = manager_with(&[]);
        manager.remove_server("ghost").await.unwrap();
        assert!(emitter.tags().is_empty());
    }

    #[tokio::test]
    async fn removed_server_disappears_from_surface_and_store() {
        let (manager, emitter) = manager_with(&["echo"]);
        manager
            .add_server(module_config("e1", "echo"), None)
            .await
            .unwrap();

        manager.remove_server("e1").await.unwrap();
        assert!(manager.list_servers().await.is_empty());
        assert!(matches!(
            manager.call_tool_by_name("echo", json!({})).await,
            Err(ManagerError::UnknownTool(_))
        ));

        // The id is free again
        manager
            .add_server(module_config("e1", "echo"), None)
            .await
            .unwrap();
        assert!(emitter.tags().contains(&"server_removed".to_string()));
    }

    #[tokio::test]
    async fn disable_drops_tools_and_enable_restores_them() {
        let (manager, _) = manager_with(&["echo"]);
        manager
            .add_server(module_config("e1", "echo"), None)
            .await
            .unwrap();

        manager.set_server_enabled("e1", false).await.unwrap();
        assert!(!manager.list_servers().await[0].connected);
        assert!(matches!(
            manager.call_tool_by_name("echo", json!({})).await,
            Err(ManagerError::UnknownTool(_))
        ));

        manager.set_server_enabled("e1", true).await.unwrap();
        assert!(manager.list_servers().await[0].connected);
        assert!(manager.call_tool_by_name("echo", json!({})).await.is_ok());
    }

    #[tokio::test]
    async fn enabling_an_unknown_server_fails() {
        let (manager, _) = manager_with(&[]);
        assert!(matches!(
            manager.set_server_enabled("ghost", true).await,
            Err(ManagerError::UnknownServer(_))
        ));
    }

    #[tokio::test]
    async fn hidden_servers_are_callable_but_not_listed() {
        let (manager, _) = manager_with(&["echo"]);
        let config = ServerConfig {
            hidden: true,
            ..module_config("builtin", "echo")
        };
        manager.add_server(config, None).await.unwrap();

        assert!(manager.list_servers().await.is_empty());
        let result = manager
            .call_tool("builtin", "echo", json!({ "q": 1 }))
            .await
            .unwrap();
        assert_eq!(result.text_value(), Some(r#"{"q":1}"#));
    }

    #[tokio::test]
    async fn call_by_name_routes_to_the_owning_server() {
        let emitter = Arc::new(RecordingEmitter::default());
        let (registry, invocations) = registry_with(&["alpha", "beta"]);
        let manager = ToolManager::new(Arc::new(MemoryConfigStore::new()), registry)
            .with_emitter(emitter.clone());

        manager
            .add_server(module_config("a", "alpha"), None)
            .await
            .unwrap();
        manager
            .add_server(module_config("b", "beta"), None)
            .await
            .unwrap();

        let result = manager.call_tool_by_name("beta", json!({})).await.unwrap();
        assert!(!result.is_error());
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_after_a_full_scan() {
        let (manager, _) = manager_with(&["echo"]);
        manager
            .add_server(module_config("e1", "echo"), None)
            .await
            .unwrap();

        assert!(matches!(
            manager.call_tool_by_name("no-such-tool", json!({})).await,
            Err(ManagerError::UnknownTool(_))
        ));
    }

    #[tokio::test]
    async fn execute_tool_call_never_errors() {
        let (manager, _) = manager_with(&[]);
        let result = manager.execute_tool_call("no-such-tool", json!({})).await;
        assert!(result.is_error());
    }

    #[tokio::test]
    async fn initialize_reconnects_enabled_servers_only() {
        let store = Arc::new(MemoryConfigStore::new());

        {
            let (registry, _) = registry_with(&["echo"]);
            let manager = ToolManager::new(Arc::clone(&store) as Arc<dyn ConfigStore>, registry);
            manager
                .add_server(module_config("e1", "echo"), None)
                .await
                .unwrap();
            manager
                .add_server(module_config("e2", "echo").with_enabled(false), None)
                .await
                .unwrap();
            manager.shutdown().await;
        }

        let (registry, _) = registry_with(&["echo"]);
        let manager = ToolManager::new(store, registry);
        manager.initialize().await.unwrap();

        let servers = manager.list_servers().await;
        assert_eq!(servers.len(), 2);
        let by_id: HashMap<&str, bool> = servers
            .iter()
            .map(|entry| (entry.config.effective_id(), entry.connected))
            .collect();
        assert!(by_id["e1"]);
        assert!(!by_id["e2"]);
    }

    #[tokio::test]
    async fn disabled_server_is_listed_but_not_live() {
        let (manager, _) = manager_with(&["echo"]);
        manager
            .add_server(module_config("e1", "echo").with_enabled(false), None)
            .await
            .unwrap();

        let servers = manager.list_servers().await;
        assert_eq!(servers.len(), 1);
        assert!(!servers[0].connected);
        assert!(matches!(
            manager.call_tool("e1", "echo", json!({})).await,
            Err(ManagerError::UnknownServer(_))
        ));
    }

    #[tokio::test]
    async fn builtins_start_at_initialize_and_stay_unlisted() {
        let (registry, _) = registry_with(&["echo"]);
        let manager = ToolManager::new(Arc::new(MemoryConfigStore::new()), registry)
            .with_builtins(vec![module_config("builtin", "echo")]);

        manager.initialize().await.unwrap();

        assert!(manager.list_servers().await.is_empty());
        assert!(manager
            .call_tool("builtin", "echo", json!({}))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn initialize_skips_unreadable_records() {
        let store = Arc::new(MemoryConfigStore::new());
        store
            .set(CONFIG_KIND, "junk", json!("not a config"))
            .await
            .unwrap();

        let (manager, _) = manager_with(&[]);
        // Fresh manager over the polluted store
        let manager = ToolManager {
            store,
            ..manager
        };
        manager.initialize().await.unwrap();
        assert!(manager.list_servers().await.is_empty());
    }

    #[tokio::test]
    async fn shutdown_disconnects_everything_but_keeps_configs() {
        let (manager, emitter) = manager_with(&["echo"]);
        manager
            .add_server(module_config("e1", "echo"), None)
            .await
            .unwrap();

        manager.shutdown().await;

        let servers = manager.list_servers().await;
        assert_eq!(servers.len(), 1);
        assert!(!servers[0].connected);
        assert!(emitter.tags().contains(&"server_disconnected".to_string()));
    }

    /// Store whose writes park long enough for another task to run.
    struct SlowStore(MemoryConfigStore);

    #[async_trait]
    impl ConfigStore for SlowStore {
        async fn get_all(&self, kind: &str) -> Result<Vec<(String, Value)>, StoreError> {
            self.0.get_all(kind).await
        }

        async fn set(&self, kind: &str, id: &str, value: Value) -> Result<(), StoreError> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.0.set(kind, id, value).await
        }

        async fn delete(&self, kind: &str, id: &str) -> Result<(), StoreError> {
            self.0.delete(kind, id).await
        }
    }

    #[tokio::test]
    async fn concurrent_adds_of_one_id_accept_exactly_one() {
        let (registry, _) = registry_with(&["echo"]);
        let manager = Arc::new(ToolManager::new(
            Arc::new(SlowStore(MemoryConfigStore::new())),
            registry,
        ));

        let first = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.add_server(module_config("e1", "echo"), None).await }
        });
        let second = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.add_server(module_config("e1", "echo"), None).await }
        });

        let results = [first.await.unwrap(), second.await.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(ManagerError::Duplicate(_)))));
        assert_eq!(manager.list_servers().await.len(), 1);
    }

    struct ListCountingModule {
        listings: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ToolModule for ListCountingModule {
        fn tools(&self) -> Vec<ToolDef> {
            self.listings.fetch_add(1, Ordering::SeqCst);
            vec![ToolDef::new("findme")]
        }

        async fn invoke(&self, _name: &str, _arguments: Value) -> Result<Value, String> {
            Ok(json!("ok"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn by_name_miss_scans_once_then_serves_from_cache() {
        let listings = Arc::new(AtomicUsize::new(0));
        let mut registry = AdapterRegistry::new();
        {
            let listings = Arc::clone(&listings);
            registry.register_module(
                "counting",
                Box::new(move |_, _| {
                    Arc::new(ListCountingModule {
                        listings: Arc::clone(&listings),
                    }) as Arc<dyn ToolModule>
                }),
            );
        }
        let manager = ToolManager::new(Arc::new(MemoryConfigStore::new()), registry)
            .with_cache_ttl(Duration::from_secs(60));

        manager
            .add_server(module_config("c1", "counting"), None)
            .await
            .unwrap();
        let after_setup = listings.load(Ordering::SeqCst);

        tokio::time::advance(Duration::from_secs(60)).await;

        // Stale name: one full scan re-lists the server, plus the
        // adapter's own known-tool check on dispatch
        manager
            .call_tool_by_name("findme", json!({}))
            .await
            .unwrap();
        let after_first = listings.load(Ordering::SeqCst);
        assert_eq!(after_first, after_setup + 2);

        // Fresh cache: no re-scan, only the dispatch-time check
        manager
            .call_tool_by_name("findme", json!({}))
            .await
            .unwrap();
        assert_eq!(listings.load(Ordering::SeqCst), after_first + 1);
    }

    #[tokio::test]
    async fn list_all_tools_covers_every_connected_server() {
        let (manager, _) = manager_with(&["alpha", "beta"]);
        manager
            .add_server(module_config("a", "alpha"), None)
            .await
            .unwrap();
        manager
            .add_server(module_config("b", "beta"), None)
            .await
            .unwrap();

        let all = manager.list_all_tools().await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].0, "a");
        assert_eq!(all[0].1[0].name, "alpha");
        assert_eq!(all[1].1[0].name, "beta");
    }
}
