//! Core domain types and port definitions for toolmesh.
//!
//! This crate carries no transports and spawns no processes; it defines
//! the vocabulary the orchestration layer (`toolmesh-hub`) and host
//! applications share: server configurations, tool/resource definitions,
//! normalized call results, and the persistence/event ports.

#![deny(unsafe_code)]

pub mod domain;
pub mod events;
pub mod ports;

// Re-export commonly used types for convenience
pub use domain::{
    AuthRequirement, Credential, EnvEntry, ResourceDef, ServerConfig, ServerEntry, ToolCallResult,
    ToolDef, TransportKind,
};
pub use events::{EventEmitter, HubEvent, NoopEmitter};
pub use ports::{ConfigStore, MemoryConfigStore, StoreError};
