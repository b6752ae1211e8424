//! Port (trait) definitions consumed by the orchestration layer.
//!
//! Ports isolate the manager from infrastructure choices: where configs
//! are persisted and how lifecycle events reach the host application.

mod config_store;

pub use config_store::{ConfigStore, MemoryConfigStore, StoreError};
