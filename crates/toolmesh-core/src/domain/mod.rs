//! Tool-server domain types.
//!
//! These types describe tool servers and their call surface independent of
//! any infrastructure concerns (transports, process management, storage).
//!
//! # Design
//!
//! - `ServerConfig` - Declared configuration for one tool server
//! - `TransportKind` - How the server is reached (stdio, socket, in-process)
//! - `EnvEntry` - Environment variable entry for spawned servers
//! - `AuthRequirement` / `Credential` - Opaque auth plumbing
//! - `ToolDef` / `ResourceDef` - Discoverable surface of a server
//! - `ToolCallResult` - Normalized result of a tool invocation

mod credential;
mod server;
mod tool;

pub use credential::{AuthRequirement, Credential};
pub use server::{EnvEntry, ServerConfig, ServerEntry, TransportKind};
pub use tool::{ResourceDef, ToolCallResult, ToolDef};
