//! Tool-name lookup cache with per-server TTL.
//!
//! Maps tool names to the server that owns them so call-by-name does not
//! have to query every connected server. Entries for a server are
//! replaced wholesale on refresh and expire together: staleness is
//! tracked per server, not per tool.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use toolmesh_core::ToolDef;

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// A cache hit: the owning server and the tool definition.
#[derive(Debug, Clone)]
pub struct CachedTool {
    /// Server the tool belongs to.
    pub server_id: String,
    /// The tool definition as last listed.
    pub tool: ToolDef,
}

#[derive(Debug, Default)]
struct CacheInner {
    by_name: HashMap<String, CachedTool>,
    server_stamp: HashMap<String, Instant>,
}

/// Tool-name lookup cache.
#[derive(Debug)]
pub struct ToolCache {
    inner: RwLock<CacheInner>,
    ttl: Duration,
}

impl Default for ToolCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolCache {
    /// Create a cache with the default TTL.
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    /// Create a cache with a custom TTL.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            inner: RwLock::new(CacheInner::default()),
            ttl,
        }
    }

    /// Replace a server's cached tools with a fresh listing and restart
    /// its TTL clock.
    pub async fn update_server_tools(&self, server_id: &str, tools: Vec<ToolDef>) {
        let mut inner = self.inner.write().await;

        // Replace, never merge: tools the server no longer lists must not
        // survive a refresh
        inner
            .by_name
            .retain(|_, cached| cached.server_id != server_id);

        for tool in tools {
            inner.by_name.insert(
                tool.name.clone(),
                CachedTool {
                    server_id: server_id.to_string(),
                    tool,
                },
            );
        }

        inner
            .server_stamp
            .insert(server_id.to_string(), Instant::now());
    }

    /// Look up which server owns a tool name.
    ///
    /// A hit whose server stamp has aged past the TTL is reported as a
    /// miss and that one name is evicted; the caller is expected to
    /// re-list and repopulate. The server's stamp stays in place so the
    /// refresh queries keep seeing the server as stale.
    pub async fn find_tool_server(&self, tool_name: &str) -> Option<CachedTool> {
        {
            let inner = self.inner.read().await;
            let cached = inner.by_name.get(tool_name)?;
            if !self.is_stale(&inner, &cached.server_id) {
                return Some(cached.clone());
            }
        }

        // Stale: lazily drop just this name under the write lock
        let mut inner = self.inner.write().await;
        let cached = inner.by_name.get(tool_name)?.clone();
        if self.is_stale(&inner, &cached.server_id) {
            inner.by_name.remove(tool_name);
            return None;
        }
        Some(cached)
    }

    /// All cached tools for one server, regardless of staleness.
    pub async fn get_server_tools(&self, server_id: &str) -> Vec<ToolDef> {
        let inner = self.inner.read().await;
        inner
            .by_name
            .values()
            .filter(|cached| cached.server_id == server_id)
            .map(|cached| cached.tool.clone())
            .collect()
    }

    /// Drop a server's entries (disconnect, removal).
    pub async fn clear_server_tools(&self, server_id: &str) {
        let mut inner = self.inner.write().await;
        inner.by_name.retain(|_, c| c.server_id != server_id);
        inner.server_stamp.remove(server_id);
    }

    /// Drop everything.
    pub async fn clear_all(&self) {
        let mut inner = self.inner.write().await;
        inner.by_name.clear();
        inner.server_stamp.clear();
    }

    /// Whether a server's entries are absent or past their TTL.
    pub async fn needs_refresh(&self, server_id: &str) -> bool {
        let inner = self.inner.read().await;
        self.is_stale(&inner, server_id)
    }

    /// Servers whose entries are past their TTL.
    pub async fn servers_needing_refresh(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        inner
            .server_stamp
            .iter()
            .filter(|(_, stamp)| stamp.elapsed() >= self.ttl)
            .map(|(server_id, _)| server_id.clone())
            .collect()
    }

    fn is_stale(&self, inner: &CacheInner, server_id: &str) -> bool {
        inner
            .server_stamp
            .get(server_id)
            .is_none_or(|stamp| stamp.elapsed() >= self.ttl)
    }
}
