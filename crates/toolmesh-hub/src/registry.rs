//! Keyed adapter registry.
//!
//! Embedders register provider-specific behavior under a server key:
//! either an in-process module factory or a setup hook for subprocess
//! servers. The manager resolves a key at connect time; unregistered keys
//! fall back to the generic transport adapter so unknown servers still
//! work with no registration at all.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use toolmesh_core::{Credential, ServerConfig, TransportKind};

use crate::adapter::{
    AdapterSetup, InProcessAdapter, RpcAdapter, ToolAdapter, ToolModule,
};

/// Builds a module instance for one server, given its config and the
/// credential supplied at add time.
pub type ModuleFactory =
    Box<dyn Fn(&ServerConfig, Option<&Credential>) -> Arc<dyn ToolModule> + Send + Sync>;

enum Registration {
    Module(ModuleFactory),
    Setup(Arc<dyn AdapterSetup>),
}

/// Errors from adapter construction.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// An in-process server named a key with no registered module.
    #[error("No module registered under key '{0}'")]
    UnknownModule(String),

    /// A registered module key was used with a transport config.
    #[error("Key '{0}' is registered as a module; use the in-process transport")]
    NotATransport(String),
}

/// Registry mapping server keys to adapter construction strategies.
#[derive(Default)]
pub struct AdapterRegistry {
    registrations: HashMap<String, Registration>,
}

impl AdapterRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an in-process module factory under a key.
    pub fn register_module(
        &mut self,
        key: impl Into<String>,
        factory: ModuleFactory,
    ) {
        self.registrations
            .insert(key.into(), Registration::Module(factory));
    }

    /// Register a pre-connect setup hook for subprocess/socket servers
    /// under a key.
    pub fn register_setup(&mut self, key: impl Into<String>, setup: Arc<dyn AdapterSetup>) {
        self.registrations
            .insert(key.into(), Registration::Setup(setup));
    }

    /// Whether anything is registered under the key.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.registrations.contains_key(key)
    }

    /// Construct the adapter for a server config.
    ///
    /// The returned adapter is not yet connected.
    pub fn create_adapter(
        &self,
        config: &ServerConfig,
        credential: Option<Credential>,
    ) -> Result<Arc<dyn ToolAdapter>, RegistryError> {
        match (self.registrations.get(&config.server_key), config.transport_kind) {
            (Some(Registration::Module(factory)), TransportKind::InProcess) => {
                let module = factory(config, credential.as_ref());
                Ok(Arc::new(InProcessAdapter::new(
                    config.effective_id(),
                    config.owner_id.clone(),
                    config.server_key.clone(),
                    module,
                )))
            }
            (Some(Registration::Module(_)), _) => {
                Err(RegistryError::NotATransport(config.server_key.clone()))
            }
            (_, TransportKind::InProcess) => {
                Err(RegistryError::UnknownModule(config.server_key.clone()))
            }
            (Some(Registration::Setup(setup)), _) => Ok(Arc::new(RpcAdapter::new(
                config.clone(),
                credential,
                Some(Arc::clone(setup)),
            ))),
            (None, _) => Ok(Arc::new(RpcAdapter::new(config.clone(), credential, None))),
        }
    }
}
