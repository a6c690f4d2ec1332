//! Server directory abstract Trait

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::types::{RemoteInfo, Server, ServerId};

/// Server directory Trait
///
/// The directory owns the persisted server list; the core only looks servers up and
/// records the login state the web content reports.
#[async_trait]
pub trait ServerDirectory: Send + Sync {
    /// Get a server
    ///
    /// # Arguments
    /// * `id` - Server ID
    async fn get_server(&self, id: &ServerId) -> Option<Server>;

    /// Get what the remote reported about itself
    ///
    /// # Arguments
    /// * `id` - Server ID
    async fn get_remote_info(&self, id: &ServerId) -> Option<RemoteInfo>;

    /// All configured servers, in configuration order
    async fn list_servers(&self) -> Vec<Server>;

    /// Record the login state reported by the server's content
    async fn set_logged_in(&self, id: &ServerId, logged_in: bool);
}

#[derive(Default)]
struct DirectoryState {
    order: Vec<ServerId>,
    servers: HashMap<ServerId, Server>,
    remote_info: HashMap<ServerId, RemoteInfo>,
}

/// In-memory server directory
///
/// Default implementation, available on all platforms.
#[derive(Clone, Default)]
pub struct InMemoryServerDirectory {
    state: Arc<RwLock<DirectoryState>>,
}

impl InMemoryServerDirectory {
    /// Create an empty directory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a server, keeping its position if it already exists
    pub async fn upsert(&self, server: Server) {
        let mut state = self.state.write().await;
        if !state.servers.contains_key(&server.id) {
            state.order.push(server.id.clone());
        }
        state.servers.insert(server.id.clone(), server);
    }

    /// Remove a server and its remote info
    pub async fn remove(&self, id: &ServerId) -> Option<Server> {
        let mut state = self.state.write().await;
        state.order.retain(|s| s != id);
        state.remote_info.remove(id);
        state.servers.remove(id)
    }

    /// Store the remote info for a server
    pub async fn set_remote_info(&self, id: &ServerId, info: RemoteInfo) {
        self.state
            .write()
            .await
            .remote_info
            .insert(id.clone(), info);
    }
}

#[async_trait]
impl ServerDirectory for InMemoryServerDirectory {
    async fn get_server(&self, id: &ServerId) -> Option<Server> {
        self.state.read().await.servers.get(id).cloned()
    }

    async fn get_remote_info(&self, id: &ServerId) -> Option<RemoteInfo> {
        self.state.read().await.remote_info.get(id).cloned()
    }

    async fn list_servers(&self) -> Vec<Server> {
        let state = self.state.read().await;
        state
            .order
            .iter()
            .filter_map(|id| state.servers.get(id).cloned())
            .collect()
    }

    async fn set_logged_in(&self, id: &ServerId, logged_in: bool) {
        if let Some(server) = self.state.write().await.servers.get_mut(id) {
            server.is_logged_in = logged_in;
        }
    }
}
