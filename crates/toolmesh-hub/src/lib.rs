//! Tool server orchestration: transports, adapters, and the manager.
//!
//! Host applications construct a [`ToolManager`] over a config store and
//! an [`AdapterRegistry`], then talk to every tool server through it. The
//! layering, bottom up:
//!
//! - [`protocol`]: the JSON-RPC wire types and handshake constants.
//! - [`transport`]: stdio subprocess and socket clients with correlated
//!   request/response handling.
//! - [`adapter`]: the uniform capability wrapper over a server, plus the
//!   in-process and multi-account compositions.
//! - [`cache`]: tool-name to server lookup with a per-server TTL.
//! - [`registry`] and [`manager`]: keyed adapter construction and the
//!   lifecycle/routing layer on top.

#![deny(unsafe_code)]

pub mod adapter;
pub mod cache;
pub mod manager;
pub mod protocol;
pub mod registry;
pub mod transport;

pub use adapter::{
    ACCOUNT_PARAM, AdapterError, AdapterSetup, InProcessAdapter, LEGACY_ACCOUNT_PARAM,
    MultiAccountAdapter, RpcAdapter, SetupContext, ToolAdapter, ToolModule,
};
pub use cache::{CachedTool, DEFAULT_TTL, ToolCache};
pub use manager::{ManagerError, ToolManager};
pub use registry::{AdapterRegistry, ModuleFactory, RegistryError};
pub use transport::{SocketClient, StdioClient, TransportClient, TransportError};
