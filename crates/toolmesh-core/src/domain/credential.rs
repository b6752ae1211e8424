//! Opaque credential plumbing.
//!
//! The orchestration layer never interprets credential contents; it only
//! checks that a credential was supplied when a server declares one, and
//! hands it to the adapter's setup hook.

use serde::{Deserialize, Serialize};

/// Declares that a server needs a credential at add time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequirement {
    /// Provider key (e.g. "google", "imap") matched by the credential.
    pub provider: String,
}

impl AuthRequirement {
    /// Create a new auth requirement for the given provider.
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
        }
    }
}

/// Opaque token-bearing structure passed into add-server.
///
/// `values` is carried verbatim to the adapter setup hook; nothing in the
/// orchestration layer reads individual fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    /// Provider key this credential belongs to.
    pub provider: String,
    /// Provider-specific payload (tokens, account ids, file contents).
    pub values: serde_json::Value,
}

impl Credential {
    /// Create a new credential.
    pub fn new(provider: impl Into<String>, values: serde_json::Value) -> Self {
        Self {
            provider: provider.into(),
            values,
        }
    }
}
