use async_trait::async_trait;
use poise::serenity_prelude::{ChannelId, GuildId, RoleId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::repository::PurgeRepository;
use crate::error::{BotError, Result};
use crate::models::{GuildGrants, RolePermission, Task, UserPermission};

const STATE_VERSION: u32 = 1;

/// Persisted tasks and grants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeState {
    /// Schema version for migrations
    pub version: u32,

    /// Last update timestamp
    pub last_updated: u64,

    /// Channel ID -> task
    pub tasks: HashMap<String, Task>,

    /// "guild:user" -> grant
    #[serde(default)]
    pub user_permissions: HashMap<String, UserPermission>,

    /// "guild:role" -> grant
    #[serde(default)]
    pub role_permissions: HashMap<String, RolePermission>,
}

impl Default for PurgeState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            last_updated: current_timestamp(),
            tasks: HashMap::new(),
            user_permissions: HashMap::new(),
            role_permissions: HashMap::new(),
        }
    }
}

impl PurgeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON file, or create new if not exists
    pub async fn load(path: &str) -> Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let state: Self =
                    serde_json::from_str(&content).map_err(|e| BotError::StateParse {
                        path: path.to_string(),
                        source: e,
                    })?;
                if state.version > STATE_VERSION {
                    return Err(BotError::Config {
                        message: format!(
                            "state file '{}' has version {}, newest supported is {}",
                            path, state.version, STATE_VERSION
                        ),
                    });
                }
                Ok(state)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(BotError::StateLoad {
                path: path.to_string(),
                source: e,
            }),
        }
    }

    /// Save to a JSON file atomically
    pub async fn save(&self, path: &str) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;

        // Write to temp file first, then rename for atomicity
        let temp_path = format!("{}.tmp", path);
        tokio::fs::write(&temp_path, &content)
            .await
            .map_err(|e| BotError::StateSave {
                path: path.to_string(),
                source: e,
            })?;

        tokio::fs::rename(&temp_path, path)
            .await
            .map_err(|e| BotError::StateSave {
                path: path.to_string(),
                source: e,
            })?;

        Ok(())
    }

    fn touch(&mut self) {
        self.last_updated = current_timestamp();
    }
}

/// JSON-file backed [`PurgeRepository`].
///
/// The in-memory copy is updated before the file is written, so a failed
/// save still leaves the change visible for the rest of the process.
pub struct PurgeStore {
    path: Option<PathBuf>,
    state: RwLock<PurgeState>,
}

impl PurgeStore {
    /// Open the store at `path`, loading whatever is already there
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = PurgeState::load(&path.to_string_lossy()).await?;
        info!(
            "Loaded {} purge task(s), {} user grant(s), {} role grant(s) from {}",
            state.tasks.len(),
            state.user_permissions.len(),
            state.role_permissions.len(),
            path.display()
        );
        Ok(Self {
            path: Some(path),
            state: RwLock::new(state),
        })
    }

    /// A store that never touches the filesystem
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(PurgeState::new()),
        }
    }

    /// Apply `change` and persist the result
    async fn mutate<T>(&self, change: impl FnOnce(&mut PurgeState) -> T) -> Result<T> {
        let mut state = self.state.write().await;
        let out = change(&mut state);
        state.touch();

        if let Some(path) = &self.path {
            state.save(&path.to_string_lossy()).await?;
            debug!("Saved purge state to {}", path.display());
        }
        Ok(out)
    }
}

#[async_trait]
impl PurgeRepository for PurgeStore {
    async fn upsert_task(&self, task: Task) -> Result<()> {
        self.mutate(|s| {
            s.tasks.insert(task.channel_id.to_string(), task);
        })
        .await
    }

    async fn delete_task(&self, channel_id: ChannelId) -> Result<()> {
        let key = channel_id.to_string();
        if !self.state.read().await.tasks.contains_key(&key) {
            return Ok(());
        }
        self.mutate(|s| {
            s.tasks.remove(&key);
        })
        .await
    }

    async fn find_tasks(&self) -> Result<Vec<Task>> {
        let state = self.state.read().await;
        let mut tasks: Vec<Task> = state.tasks.values().cloned().collect();
        tasks.sort_by_key(|t| t.channel_id);
        Ok(tasks)
    }

    async fn upsert_user_grant(&self, grant: UserPermission) -> Result<()> {
        self.mutate(|s| {
            s.user_permissions
                .insert(grant_key(grant.guild_id, grant.user_id.get()), grant);
        })
        .await
    }

    async fn delete_user_grant(&self, guild_id: GuildId, user_id: UserId) -> Result<bool> {
        let key = grant_key(guild_id, user_id.get());
        if !self.state.read().await.user_permissions.contains_key(&key) {
            return Ok(false);
        }
        self.mutate(|s| s.user_permissions.remove(&key).is_some())
            .await
    }

    async fn upsert_role_grant(&self, grant: RolePermission) -> Result<()> {
        self.mutate(|s| {
            s.role_permissions
                .insert(grant_key(grant.guild_id, grant.role_id.get()), grant);
        })
        .await
    }

    async fn delete_role_grant(&self, guild_id: GuildId, role_id: RoleId) -> Result<bool> {
        let key = grant_key(guild_id, role_id.get());
        if !self.state.read().await.role_permissions.contains_key(&key) {
            return Ok(false);
        }
        self.mutate(|s| s.role_permissions.remove(&key).is_some())
            .await
    }

    async fn find_grants(&self, guild_id: GuildId) -> Result<GuildGrants> {
        let state = self.state.read().await;

        let mut users: Vec<UserPermission> = state
            .user_permissions
            .values()
            .filter(|p| p.guild_id == guild_id)
            .cloned()
            .collect();
        users.sort_by_key(|p| p.user_id);

        let mut roles: Vec<RolePermission> = state
            .role_permissions
            .values()
            .filter(|p| p.guild_id == guild_id)
            .cloned()
            .collect();
        roles.sort_by_key(|p| p.role_id);

        Ok(GuildGrants { users, roles })
    }
}

fn grant_key(guild_id: GuildId, id: u64) -> String {
    format!("{}:{}", guild_id, id)
}

/// Open the store at `path` and wrap it for sharing
pub async fn create_shared_purge_store(path: impl Into<PathBuf>) -> Result<Arc<PurgeStore>> {
    Ok(Arc::new(PurgeStore::open(path).await?))
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
