//! MCP client pool: one live client per server id, capped pool with idle
//! eviction, coalesced initialisation, and a short unhealthy cooldown after a
//! failed connect.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::McpError;
use crate::mcp::client::McpClient;
use crate::settings::{McpRoute, McpServerConfig};

#[derive(Debug, Clone)]
pub struct McpManagerConfig {
    pub max_pool_size: usize,
    pub idle_timeout: Duration,
    pub unhealthy_cooldown: Duration,
}

impl Default for McpManagerConfig {
    fn default() -> Self {
        Self {
            max_pool_size: 10,
            idle_timeout: Duration::from_secs(300),
            unhealthy_cooldown: Duration::from_secs(30),
        }
    }
}

pub struct McpManager {
    servers: HashMap<String, McpServerConfig>,
    clients: DashMap<String, Arc<McpClient>>,
    init_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    unhealthy_until: DashMap<String, Instant>,
    config: McpManagerConfig,
}

impl McpManager {
    pub fn new(servers: HashMap<String, McpServerConfig>, config: McpManagerConfig) -> Self {
        Self {
            servers,
            clients: DashMap::new(),
            init_locks: DashMap::new(),
            unhealthy_until: DashMap::new(),
            config,
        }
    }

    pub fn known_servers(&self) -> Vec<String> {
        self.servers.keys().cloned().collect()
    }

    /// Returns the live client for a server, connecting if needed. Concurrent
    /// callers for the same unconnected server coalesce on one initialisation.
    pub async fn client(&self, server_id: &str) -> Result<Arc<McpClient>, McpError> {
        if let Some(until) = self.unhealthy_until.get(server_id) {
            if Instant::now() < *until {
                return Err(McpError::Unhealthy(server_id.to_string()));
            }
        }
        if let Some(client) = self.clients.get(server_id) {
            return Ok(Arc::clone(&client));
        }

        let config = self
            .servers
            .get(server_id)
            .ok_or_else(|| McpError::Transport(format!("unknown mcp server: {server_id}")))?
            .clone();

        let lock = self
            .init_locks
            .entry(server_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // A coalesced caller may have connected while we waited.
        if let Some(client) = self.clients.get(server_id) {
            return Ok(Arc::clone(&client));
        }

        self.evict_idle().await;
        self.make_room().await;

        match McpClient::connect(server_id, &config).await {
            Ok(client) => {
                self.unhealthy_until.remove(server_id);
                let client = Arc::new(client);
                self.clients
                    .insert(server_id.to_string(), Arc::clone(&client));
                info!(server = %server_id, "mcp client connected");
                Ok(client)
            }
            Err(e) => {
                self.unhealthy_until.insert(
                    server_id.to_string(),
                    Instant::now() + self.config.unhealthy_cooldown,
                );
                warn!(server = %server_id, error = %e, "mcp connect failed; cooling down");
                Err(e)
            }
        }
    }

    /// `tools/call` on the routed server.
    pub async fn call(
        &self,
        server_id: &str,
        tool_name: &str,
        arguments: Value,
        timeout: Duration,
    ) -> Result<Value, McpError> {
        let client = self.client(server_id).await?;
        client.call_tool(tool_name, arguments, timeout).await
    }

    /// Closes clients idle past the configured timeout.
    pub async fn evict_idle(&self) {
        let idle: Vec<(String, Arc<McpClient>)> = self
            .clients
            .iter()
            .filter(|e| e.value().idle_for() > self.config.idle_timeout)
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();
        for (id, client) in idle {
            self.clients.remove(&id);
            client.close().await;
            info!(server = %id, "idle mcp client evicted");
        }
    }

    /// When the pool is full, closes the most idle client to make room.
    async fn make_room(&self) {
        while self.clients.len() >= self.config.max_pool_size {
            let most_idle = self
                .clients
                .iter()
                .max_by_key(|e| e.value().idle_for())
                .map(|e| (e.key().clone(), Arc::clone(e.value())));
            match most_idle {
                Some((id, client)) => {
                    self.clients.remove(&id);
                    client.close().await;
                    info!(server = %id, "mcp client evicted for pool space");
                }
                None => break,
            }
        }
    }

    /// Startup validation: for each route, ask the server whether it actually
    /// lists the mapped tool. Purely diagnostic; the static table stays
    /// authoritative.
    pub async fn validate_routes(&self, routes: &HashMap<String, McpRoute>) {
        for (tool, route) in routes {
            match self.client(&route.server_id).await {
                Ok(client) => match client.list_tools().await {
                    Ok(tools) => {
                        if !tools.iter().any(|t| t.name == route.remote_name) {
                            warn!(
                                tool = %tool,
                                server = %route.server_id,
                                remote = %route.remote_name,
                                "route points at a tool the server does not list"
                            );
                        }
                    }
                    Err(e) => warn!(server = %route.server_id, error = %e, "tools/list failed"),
                },
                Err(e) => {
                    warn!(server = %route.server_id, error = %e, "route server unreachable")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_with_broken_server(cooldown: Duration) -> McpManager {
        let servers = HashMap::from([(
            "broken".to_string(),
            McpServerConfig::Stdio {
                command: "definitely-not-a-command-xyz".into(),
                args: vec![],
                env: HashMap::new(),
            },
        )]);
        McpManager::new(
            servers,
            McpManagerConfig {
                unhealthy_cooldown: cooldown,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn unknown_server_is_transport_error() {
        let manager = McpManager::new(HashMap::new(), McpManagerConfig::default());
        let err = manager.client("ghost").await.unwrap_err();
        assert!(matches!(err, McpError::Transport(_)));
    }

    #[tokio::test]
    async fn failed_connect_enters_cooldown() {
        let manager = manager_with_broken_server(Duration::from_secs(30));
        let first = manager.client("broken").await.unwrap_err();
        assert!(matches!(first, McpError::Transport(_)));
        // Second attempt inside the cooldown window is refused without a spawn.
        let second = manager.client("broken").await.unwrap_err();
        assert!(matches!(second, McpError::Unhealthy(_)));
    }

    #[tokio::test]
    async fn cooldown_expires_and_reattempts() {
        let manager = manager_with_broken_server(Duration::from_millis(20));
        let _ = manager.client("broken").await.unwrap_err();
        tokio::time::sleep(Duration::from_millis(40)).await;
        // Past cooldown: a fresh connect attempt runs (and fails as transport).
        let err = manager.client("broken").await.unwrap_err();
        assert!(matches!(err, McpError::Transport(_)));
    }
}
