//! In-memory [`ChatPlatform`] used by unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use poise::serenity_prelude::{ChannelId, GuildId, MessageId, RoleId, UserId};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use super::{ChannelInfo, ChatPlatform, MemberInfo, MessageInfo, RoleInfo};
use crate::error::{BotError, Result};

#[derive(Default)]
struct FakeState {
    channels: HashMap<ChannelId, ChannelInfo>,
    messages: HashMap<ChannelId, Vec<MessageInfo>>,
    owners: HashMap<GuildId, UserId>,
    roles: HashMap<GuildId, Vec<RoleInfo>>,
    members: HashMap<GuildId, Vec<MemberInfo>>,
    sent: Vec<(ChannelId, String)>,
    deleted: Vec<MessageId>,
    failing_deletes: HashSet<MessageId>,
    fail_fetch: bool,
    fetch_delay: Option<Duration>,
    fetch_calls: usize,
}

#[derive(Default)]
pub struct FakePlatform {
    state: Mutex<FakeState>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_channel(&self, guild_id: GuildId, channel_id: ChannelId, is_text: bool) {
        self.state.lock().channels.insert(
            channel_id,
            ChannelInfo {
                guild_id: Some(guild_id),
                is_text,
            },
        );
    }

    /// Message IDs grow with time, like snowflakes
    pub fn add_message(&self, channel_id: ChannelId, id: u64, created_at: DateTime<Utc>) {
        let mut state = self.state.lock();
        let messages = state.messages.entry(channel_id).or_default();
        messages.push(MessageInfo {
            id: MessageId::new(id),
            created_at,
        });
        messages.sort_by(|a, b| b.id.cmp(&a.id));
    }

    pub fn set_owner(&self, guild_id: GuildId, user_id: UserId) {
        self.state.lock().owners.insert(guild_id, user_id);
    }

    pub fn add_role(&self, guild_id: GuildId, role_id: u64, name: &str, is_admin: bool) {
        self.state.lock().roles.entry(guild_id).or_default().push(RoleInfo {
            id: RoleId::new(role_id),
            name: name.to_string(),
            is_admin,
        });
    }

    pub fn add_member(&self, guild_id: GuildId, user_id: u64, username: &str, roles: &[u64]) {
        self.state
            .lock()
            .members
            .entry(guild_id)
            .or_default()
            .push(MemberInfo {
                user_id: UserId::new(user_id),
                username: username.to_string(),
                global_name: None,
                nick: None,
                role_ids: roles.iter().map(|r| RoleId::new(*r)).collect(),
            });
    }

    pub fn fail_delete_of(&self, id: u64) {
        self.state.lock().failing_deletes.insert(MessageId::new(id));
    }

    pub fn set_fetch_failure(&self, fail: bool) {
        self.state.lock().fail_fetch = fail;
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        self.state.lock().fetch_delay = Some(delay);
    }

    pub fn sent(&self) -> Vec<(ChannelId, String)> {
        self.state.lock().sent.clone()
    }

    pub fn deleted(&self) -> Vec<MessageId> {
        self.state.lock().deleted.clone()
    }

    pub fn remaining(&self, channel_id: ChannelId) -> Vec<MessageId> {
        self.state
            .lock()
            .messages
            .get(&channel_id)
            .map(|m| m.iter().map(|m| m.id).collect())
            .unwrap_or_default()
    }

    pub fn fetch_calls(&self) -> usize {
        self.state.lock().fetch_calls
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn channel(&self, channel_id: ChannelId) -> Result<ChannelInfo> {
        self.state
            .lock()
            .channels
            .get(&channel_id)
            .cloned()
            .ok_or(BotError::ChannelNotFound {
                id: channel_id.to_string(),
            })
    }

    async fn messages_before(
        &self,
        channel_id: ChannelId,
        before: Option<MessageId>,
        limit: u8,
    ) -> Result<Vec<MessageInfo>> {
        let delay = {
            let mut state = self.state.lock();
            state.fetch_calls += 1;
            state.fetch_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.lock();
        if state.fail_fetch {
            return Err(BotError::Discord {
                message: "fetch failed".to_string(),
            });
        }

        Ok(state
            .messages
            .get(&channel_id)
            .map(|messages| {
                messages
                    .iter()
                    .filter(|m| before.map_or(true, |b| m.id < b))
                    .take(limit as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_message(&self, channel_id: ChannelId, message_id: MessageId) -> Result<()> {
        let mut state = self.state.lock();
        if state.failing_deletes.contains(&message_id) {
            return Err(BotError::Discord {
                message: "Missing Permissions".to_string(),
            });
        }
        if let Some(messages) = state.messages.get_mut(&channel_id) {
            messages.retain(|m| m.id != message_id);
        }
        state.deleted.push(message_id);
        Ok(())
    }

    async fn send_message(&self, channel_id: ChannelId, content: &str) -> Result<()> {
        self.state
            .lock()
            .sent
            .push((channel_id, content.to_string()));
        Ok(())
    }

    async fn guild_owner(&self, guild_id: GuildId) -> Result<UserId> {
        self.state
            .lock()
            .owners
            .get(&guild_id)
            .copied()
            .ok_or(BotError::GuildNotFound {
                id: guild_id.to_string(),
            })
    }

    async fn guild_roles(&self, guild_id: GuildId) -> Result<Vec<RoleInfo>> {
        Ok(self
            .state
            .lock()
            .roles
            .get(&guild_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn member(&self, guild_id: GuildId, user_id: UserId) -> Result<MemberInfo> {
        self.state
            .lock()
            .members
            .get(&guild_id)
            .and_then(|members| members.iter().find(|m| m.user_id == user_id))
            .cloned()
            .ok_or(BotError::UserNotFound {
                name: user_id.to_string(),
            })
    }

    async fn members(&self, guild_id: GuildId) -> Result<Vec<MemberInfo>> {
        Ok(self
            .state
            .lock()
            .members
            .get(&guild_id)
            .cloned()
            .unwrap_or_default())
    }
}
