use async_trait::async_trait;
use chrono::{DateTime, Utc};
use poise::serenity_prelude::{
    self as serenity, ChannelId, ChannelType, GuildId, Http, MessageId, UserId,
};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{ChannelInfo, ChatPlatform, MemberInfo, MessageInfo, RoleInfo};
use crate::error::{BotError, Result};

/// Discord's hard cap for one member list request
const MEMBER_PAGE_SIZE: u64 = 1000;

/// [`ChatPlatform`] backed by serenity's HTTP client
pub struct DiscordPlatform {
    http: Arc<Http>,
}

impl DiscordPlatform {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

fn member_info(member: &serenity::Member) -> MemberInfo {
    MemberInfo {
        user_id: member.user.id,
        username: member.user.name.clone(),
        global_name: member.user.global_name.clone(),
        nick: member.nick.clone(),
        role_ids: member.roles.clone(),
    }
}

/// `None` when the timestamp has no `DateTime` equivalent; such a message is
/// left alone rather than treated as ancient
fn message_info(id: MessageId, unix_secs: i64) -> Option<MessageInfo> {
    match DateTime::<Utc>::from_timestamp(unix_secs, 0) {
        Some(created_at) => Some(MessageInfo { id, created_at }),
        None => {
            warn!("Skipping message {} with unusable timestamp {}", id, unix_secs);
            None
        }
    }
}

#[async_trait]
impl ChatPlatform for DiscordPlatform {
    async fn channel(&self, channel_id: ChannelId) -> Result<ChannelInfo> {
        let channel = channel_id.to_channel(self.http.as_ref()).await.map_err(|e| {
            debug!("Failed to fetch channel {}: {}", channel_id, e);
            BotError::ChannelNotFound {
                id: channel_id.to_string(),
            }
        })?;

        Ok(match channel {
            serenity::Channel::Guild(gc) => ChannelInfo {
                guild_id: Some(gc.guild_id),
                is_text: gc.kind == ChannelType::Text,
            },
            _ => ChannelInfo {
                guild_id: None,
                is_text: false,
            },
        })
    }

    async fn messages_before(
        &self,
        channel_id: ChannelId,
        before: Option<MessageId>,
        limit: u8,
    ) -> Result<Vec<MessageInfo>> {
        let mut request = serenity::GetMessages::new().limit(limit);
        if let Some(before) = before {
            request = request.before(before);
        }

        let messages = channel_id.messages(self.http.as_ref(), request).await?;
        Ok(messages
            .iter()
            .filter_map(|m| message_info(m.id, m.timestamp.unix_timestamp()))
            .collect())
    }

    async fn delete_message(&self, channel_id: ChannelId, message_id: MessageId) -> Result<()> {
        channel_id
            .delete_message(self.http.as_ref(), message_id)
            .await?;
        Ok(())
    }

    async fn send_message(&self, channel_id: ChannelId, content: &str) -> Result<()> {
        channel_id.say(self.http.as_ref(), content).await?;
        Ok(())
    }

    async fn guild_owner(&self, guild_id: GuildId) -> Result<UserId> {
        let guild = guild_id
            .to_partial_guild(self.http.as_ref())
            .await
            .map_err(|e| {
                debug!("Failed to fetch guild {}: {}", guild_id, e);
                BotError::GuildNotFound {
                    id: guild_id.to_string(),
                }
            })?;
        Ok(guild.owner_id)
    }

    async fn guild_roles(&self, guild_id: GuildId) -> Result<Vec<RoleInfo>> {
        let roles = guild_id.roles(self.http.as_ref()).await?;

        // Highest role first, so name lookups see the same order as Discord's role list
        let mut roles: Vec<_> = roles.into_values().collect();
        roles.sort_by(|a, b| b.position.cmp(&a.position).then(a.id.cmp(&b.id)));

        Ok(roles
            .into_iter()
            .map(|role| RoleInfo {
                id: role.id,
                is_admin: role.permissions.administrator(),
                name: role.name,
            })
            .collect())
    }

    async fn member(&self, guild_id: GuildId, user_id: UserId) -> Result<MemberInfo> {
        let member = guild_id
            .member(self.http.as_ref(), user_id)
            .await
            .map_err(|e| {
                debug!("Failed to fetch member {} in {}: {}", user_id, guild_id, e);
                BotError::UserNotFound {
                    name: user_id.to_string(),
                }
            })?;
        Ok(member_info(&member))
    }

    async fn members(&self, guild_id: GuildId) -> Result<Vec<MemberInfo>> {
        let mut all = Vec::new();
        let mut after: Option<UserId> = None;

        loop {
            let page = guild_id
                .members(self.http.as_ref(), Some(MEMBER_PAGE_SIZE), after)
                .await?;
            let full_page = page.len() as u64 == MEMBER_PAGE_SIZE;
            after = page.last().map(|m| m.user.id);
            all.extend(page.iter().map(member_info));

            if !full_page || after.is_none() {
                break;
            }
        }

        Ok(all)
    }
}
