//! Multi-account fan-out/merge adapter.
//!
//! Composes N adapters of the same tool surface (e.g. two mailboxes of
//! one provider) into one logical adapter. Callers pick an account with
//! the injected `accountEmail` parameter, or omit it to query every
//! account concurrently and get one merged result.
//!
//! The merge is heuristic by design: accounts whose result text parses as
//! a JSON array are concatenated (each element tagged with its source
//! account); when no account returns an array the first non-error result
//! is passed through verbatim so single-item lookup tools keep working.
//! Registered tools were authored against this behavior, so it must not
//! be tightened without re-auditing every tool's response shape.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::{Map, Value, json};
use tokio::sync::RwLock;

use toolmesh_core::{ResourceDef, ToolCallResult, ToolDef};

use super::{AdapterError, ToolAdapter, empty_input_schema};

/// Input-schema parameter injected into every tool for account selection.
pub const ACCOUNT_PARAM: &str = "accountEmail";

/// Older tools send the selector under this name; still honored.
pub const LEGACY_ACCOUNT_PARAM: &str = "account";

/// One logical adapter over several same-surface accounts.
///
/// Account order is registration order; "the first account" in the merge
/// rules below always means the earliest registered one.
pub struct MultiAccountAdapter {
    id: String,
    owner_id: String,
    server_key: String,
    accounts: RwLock<Vec<(String, Arc<dyn ToolAdapter>)>>,
}

impl MultiAccountAdapter {
    /// Create an empty composite adapter.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        owner_id: impl Into<String>,
        server_key: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            server_key: server_key.into(),
            accounts: RwLock::new(Vec::new()),
        }
    }

    /// Register an account. Re-registering an existing account replaces
    /// its adapter in place, keeping its position.
    pub async fn add_account(&self, account: impl Into<String>, adapter: Arc<dyn ToolAdapter>) {
        let account = account.into();
        let mut accounts = self.accounts.write().await;

        if let Some(slot) = accounts.iter_mut().find(|(a, _)| *a == account) {
            slot.1 = adapter;
        } else {
            accounts.push((account, adapter));
        }
    }

    /// Remove an account. Returns false when it was not registered.
    pub async fn remove_account(&self, account: &str) -> bool {
        let mut accounts = self.accounts.write().await;
        let before = accounts.len();
        accounts.retain(|(a, _)| a != account);
        accounts.len() < before
    }

    /// Registered account identifiers, in registration order.
    pub async fn account_ids(&self) -> Vec<String> {
        self.accounts
            .read()
            .await
            .iter()
            .map(|(a, _)| a.clone())
            .collect()
    }

    async fn snapshot(&self) -> Vec<(String, Arc<dyn ToolAdapter>)> {
        self.accounts.read().await.clone()
    }
}

/// Pull the account selector out of the arguments, if present.
fn strip_selector(arguments: &mut Value) -> Option<String> {
    let object = arguments.as_object_mut()?;
    object
        .remove(ACCOUNT_PARAM)
        .or_else(|| object.remove(LEGACY_ACCOUNT_PARAM))
        .and_then(|v| v.as_str().map(ToString::to_string))
}

/// Tag one merged array element with the account it came from.
fn tag_element(element: Value, account: &str) -> Value {
    match element {
        Value::Object(mut map) => {
            map.insert(ACCOUNT_PARAM.to_string(), Value::String(account.to_string()));
            Value::Object(map)
        }
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map.insert(ACCOUNT_PARAM.to_string(), Value::String(account.to_string()));
            Value::Object(map)
        }
    }
}

fn merge_results(results: Vec<(String, ToolCallResult)>) -> ToolCallResult {
    let total = results.len();
    let mut arrays: Vec<(String, Vec<Value>)> = Vec::new();
    let mut errors: Vec<(String, String)> = Vec::new();
    let mut plain: Vec<ToolCallResult> = Vec::new();

    for (account, result) in results {
        match result {
            ToolCallResult::Error { message } => errors.push((account, message)),
            ToolCallResult::Text { value } => match serde_json::from_str::<Value>(&value) {
                Ok(Value::Array(items)) => arrays.push((account, items)),
                _ => plain.push(ToolCallResult::Text { value }),
            },
            other => plain.push(other),
        }
    }

    if errors.len() == total {
        let combined: Vec<String> = errors
            .iter()
            .map(|(account, message)| format!("{account}: {message}"))
            .collect();
        return ToolCallResult::error(format!(
            "All accounts failed: {}",
            combined.join("; ")
        ));
    }

    if arrays.is_empty() {
        // No account returned an array (single-item lookup tools land
        // here): pass the first non-error result through verbatim
        return plain
            .into_iter()
            .next()
            .unwrap_or_else(|| ToolCallResult::text(""));
    }

    let all_arrays = arrays.len() == total;
    let merged: Vec<Value> = arrays
        .into_iter()
        .flat_map(|(account, items)| {
            items
                .into_iter()
                .map(move |item| tag_element(item, &account))
                .collect::<Vec<_>>()
        })
        .collect();
    let body = serde_json::to_string(&merged).unwrap_or_default();

    if all_arrays || errors.is_empty() {
        // Non-array successes alongside arrays are dropped; the merge is
        // intentionally lossy in that direction
        return ToolCallResult::text(body);
    }

    let failed: Vec<String> = errors
        .iter()
        .map(|(account, message)| format!("{account} ({message})"))
        .collect();
    ToolCallResult::text(format!(
        "{body}\n\nNote: some accounts failed: {}",
        failed.join("; ")
    ))
}

#[async_trait]
impl ToolAdapter for MultiAccountAdapter {
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
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        !self.accounts.read().await.is_empty()
    }

    async fn list_tools(&self) -> Result<Vec<ToolDef>, AdapterError> {
        let accounts = self.snapshot().await;
        let Some((_, first)) = accounts.first() else {
            return Ok(Vec::new());
        };

        let mut tools = first.list_tools().await?;
        let ids: Vec<String> = accounts.iter().map(|(a, _)| a.clone()).collect();

        for tool in &mut tools {
            let schema = tool.input_schema.get_or_insert_with(empty_input_schema);
            let Some(object) = schema.as_object_mut() else {
                continue;
            };
            let properties = object
                .entry("properties")
                .or_insert_with(|| json!({}));
            if let Some(properties) = properties.as_object_mut() {
                properties.insert(
                    ACCOUNT_PARAM.to_string(),
                    json!({
                        "type": "string",
                        "enum": ids,
                        "description": "Account to target; omit to query every account"
                    }),
                );
            }
        }

        Ok(tools)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> ToolCallResult {
        let mut arguments = arguments;
        let selector = strip_selector(&mut arguments);

        let accounts = self.snapshot().await;
        if accounts.is_empty() {
            return ToolCallResult::error(format!(
                "No accounts registered for '{}'",
                self.id
            ));
        }

        if let Some(selector) = selector {
            // Unknown selector falls back to the first registered account
            let (_, adapter) = accounts
                .iter()
                .find(|(account, _)| *account == selector)
                .unwrap_or(&accounts[0]);
            return adapter.call_tool(name, arguments).await;
        }

        // Fan out to every account concurrently; one failure must not
        // block the others' results from being merged
        let calls = accounts.into_iter().map(|(account, adapter)| {
            let arguments = arguments.clone();
            let name = name.to_string();
            async move {
                let result = adapter.call_tool(&name, arguments).await;
                (account, result)
            }
        });

        merge_results(join_all(calls).await)
    }

    async fn list_resources(&self) -> Result<Vec<ResourceDef>, AdapterError> {
        // Resource identity is not meaningfully mergeable across accounts
        Ok(Vec::new())
    }

    async fn read_resource(&self, _uri: &str) -> Result<Value, AdapterError> {
        Err(AdapterError::Unsupported(
            "Resources are not available on multi-account servers".to_string(),
        ))
    }

    async fn reconnect(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn close(&self) {
        let accounts = self.snapshot().await;
        for (_, adapter) in accounts {
            adapter.close().await;
        }
    }
}
