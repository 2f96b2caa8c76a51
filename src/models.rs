// src/models.rs
use poise::serenity_prelude as serenity;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A channel under active purge management
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub channel_id: serenity::ChannelId,
    /// Messages older than this many seconds are deleted
    pub retention_secs: u64,
}

impl Task {
    pub fn new(channel_id: serenity::ChannelId, retention: Duration) -> Self {
        Self {
            channel_id,
            retention_secs: retention.as_secs(),
        }
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

/// Grants or denies one user the right to manage purge tasks in a guild
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPermission {
    pub guild_id: serenity::GuildId,
    pub user_id: serenity::UserId,
    pub can_purge: bool,
}

/// Same as [`UserPermission`], for everyone holding a role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePermission {
    pub guild_id: serenity::GuildId,
    pub role_id: serenity::RoleId,
    pub can_purge: bool,
}

/// All grants stored for one guild
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuildGrants {
    pub users: Vec<UserPermission>,
    pub roles: Vec<RolePermission>,
}

impl GuildGrants {
    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.roles.is_empty()
    }

    pub fn user(&self, user_id: serenity::UserId) -> Option<&UserPermission> {
        self.users.iter().find(|p| p.user_id == user_id)
    }
}
