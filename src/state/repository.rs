use async_trait::async_trait;
use poise::serenity_prelude::{ChannelId, GuildId, RoleId, UserId};
use std::sync::Arc;

use crate::error::Result;
use crate::models::{GuildGrants, RolePermission, Task, UserPermission};

/// Durable storage for purge tasks and permission grants.
///
/// Every call is an independent read or write; callers treat failures as
/// non-fatal and keep their in-memory view.
#[async_trait]
pub trait PurgeRepository: Send + Sync {
    /// Insert or replace the task for `task.channel_id`
    async fn upsert_task(&self, task: Task) -> Result<()>;

    /// Delete the task for a channel. Deleting a missing task is not an error.
    async fn delete_task(&self, channel_id: ChannelId) -> Result<()>;

    async fn find_tasks(&self) -> Result<Vec<Task>>;

    async fn upsert_user_grant(&self, grant: UserPermission) -> Result<()>;

    /// Returns whether a grant existed
    async fn delete_user_grant(&self, guild_id: GuildId, user_id: UserId) -> Result<bool>;

    async fn upsert_role_grant(&self, grant: RolePermission) -> Result<()>;

    /// Returns whether a grant existed
    async fn delete_role_grant(&self, guild_id: GuildId, role_id: RoleId) -> Result<bool>;

    /// All user and role grants stored for a guild
    async fn find_grants(&self, guild_id: GuildId) -> Result<GuildGrants>;
}

/// Shared repository handle injected into the scheduler and command handlers
pub type SharedRepository = Arc<dyn PurgeRepository>;
