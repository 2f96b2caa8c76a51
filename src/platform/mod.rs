//! Chat platform abstraction.
//!
//! The scheduler, purge walk and permission checks only talk to Discord
//! through [`ChatPlatform`], so they can run against the live HTTP client or
//! an in-memory fake.

mod discord;
#[cfg(test)]
pub mod fake;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use poise::serenity_prelude::{ChannelId, GuildId, MessageId, RoleId, UserId};
use std::sync::Arc;

use crate::error::Result;

pub use discord::DiscordPlatform;

/// Resolved channel metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub guild_id: Option<GuildId>,
    /// Guild text channel (the only kind purge tasks may run on)
    pub is_text: bool,
}

/// The parts of a message the purge walk needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageInfo {
    pub id: MessageId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleInfo {
    pub id: RoleId,
    pub name: String,
    /// Role carries the platform's administrator capability
    pub is_admin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub user_id: UserId,
    pub username: String,
    pub global_name: Option<String>,
    pub nick: Option<String>,
    pub role_ids: Vec<RoleId>,
}

impl MemberInfo {
    /// Guild nickname, then global display name, then username
    pub fn display_name(&self) -> &str {
        self.nick
            .as_deref()
            .or(self.global_name.as_deref())
            .unwrap_or(&self.username)
    }

    /// Whether `name` matches any of the member's names, ignoring case
    pub fn answers_to(&self, name: &str) -> bool {
        self.username.eq_ignore_ascii_case(name)
            || self
                .global_name
                .as_deref()
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
            || self
                .nick
                .as_deref()
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
    }
}

#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn channel(&self, channel_id: ChannelId) -> Result<ChannelInfo>;

    /// Up to `limit` messages, newest first, strictly before `before` when set
    async fn messages_before(
        &self,
        channel_id: ChannelId,
        before: Option<MessageId>,
        limit: u8,
    ) -> Result<Vec<MessageInfo>>;

    async fn delete_message(&self, channel_id: ChannelId, message_id: MessageId) -> Result<()>;

    async fn send_message(&self, channel_id: ChannelId, content: &str) -> Result<()>;

    async fn guild_owner(&self, guild_id: GuildId) -> Result<UserId>;

    async fn guild_roles(&self, guild_id: GuildId) -> Result<Vec<RoleInfo>>;

    async fn member(&self, guild_id: GuildId, user_id: UserId) -> Result<MemberInfo>;

    /// Every member of the guild
    async fn members(&self, guild_id: GuildId) -> Result<Vec<MemberInfo>>;
}

pub type SharedPlatform = Arc<dyn ChatPlatform>;
