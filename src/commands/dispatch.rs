use poise::serenity_prelude::{ChannelId, GuildId, RoleId, UserId};
use tracing::{debug, error, info, warn};

use super::parse::{parse_command, Command};
use crate::error::{BotError, Result};
use crate::messages;
use crate::permissions::{Decision, Identity};
use crate::Data;

/// Where a command came from and who sent it
#[derive(Debug, Clone, Copy)]
pub struct CommandRequest {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub author_id: UserId,
    pub bot_id: UserId,
}

impl CommandRequest {
    fn mention(&self) -> String {
        format!("<@{}>", self.bot_id)
    }
}

/// Answer a mention command in the channel it came from
pub async fn handle_mention(data: &Data, request: &CommandRequest, args: &[&str]) -> Result<()> {
    let reply = respond(data, request, args).await;
    data.platform.send_message(request.channel_id, &reply).await
}

/// Authorize, parse and run a command, returning the reply text
pub async fn respond(data: &Data, request: &CommandRequest, args: &[&str]) -> String {
    let mention = request.mention();

    let decision = data
        .permissions
        .decide(request.guild_id, request.author_id)
        .await;
    if !decision.allowed() {
        info!(
            "User {} denied in guild {} ({:?})",
            request.author_id, request.guild_id, decision
        );
        return messages::not_authorized();
    }
    if let Decision::RoleGranted(role_id) = decision {
        debug!("User {} allowed through role {}", request.author_id, role_id);
    }

    if args.is_empty() {
        return messages::help_hint(&mention);
    }

    let command = match parse_command(args) {
        Ok(command) => command,
        Err(BotError::InvalidDuration { input }) => {
            warn!("Invalid duration '{}' from user {}", input, request.author_id);
            return messages::invalid_duration(&mention);
        }
        Err(BotError::MissingArgument { command }) => {
            return messages::missing_argument(&command, &mention)
        }
        Err(BotError::UnknownId { input }) => return messages::invalid_id(&input),
        Err(e) => {
            error!("Failed to parse command: {}", e);
            return messages::internal_error();
        }
    };

    if command.manages_grants() && !decision.is_authority() {
        return messages::grants_reserved();
    }

    match execute(data, request, command).await {
        Ok(reply) => reply,
        Err(e) if e.is_not_found() => messages::not_found(&e),
        Err(e) => {
            error!("Command from user {} failed: {}", request.author_id, e);
            messages::internal_error()
        }
    }
}

async fn execute(data: &Data, request: &CommandRequest, command: Command) -> Result<String> {
    let guild_id = request.guild_id;
    let channel_id = request.channel_id;

    let reply = match command {
        Command::Help => messages::help_message(&request.mention()),
        Command::Stop => {
            let was_running = data.scheduler.stop(channel_id).await;
            messages::purge_stopped(was_running)
        }
        Command::List => {
            let tasks = data.scheduler.tasks_in_guild(guild_id).await;
            messages::task_list(&tasks)
        }
        Command::ListPermissions => {
            let lines = data.permissions.list_grants(guild_id).await?;
            messages::grant_list(&lines)
        }
        Command::AddUser(identity) => set_user_grant(data, guild_id, &identity, true).await?,
        Command::DenyUser(identity) => set_user_grant(data, guild_id, &identity, false).await?,
        Command::RemoveUser(identity) => {
            // Grants by ID stay removable after the user has left the guild
            let (user_id, label) = match identity {
                Identity::Id(id) => (UserId::new(id), id.to_string()),
                Identity::Name(_) => {
                    let member = data.permissions.resolve_user(guild_id, &identity).await?;
                    (member.user_id, member.display_name().to_string())
                }
            };
            let removed = data.permissions.revoke_user(guild_id, user_id).await?;
            messages::grant_removed(&label, removed)
        }
        Command::AddRole(identity) => {
            let role = data.permissions.resolve_role(guild_id, &identity).await?;
            data.permissions.grant_role(guild_id, role.id, true).await?;
            messages::role_granted(&role.name)
        }
        Command::RemoveRole(identity) => {
            let (role_id, label) = match identity {
                Identity::Id(id) => (RoleId::new(id), id.to_string()),
                Identity::Name(_) => {
                    let role = data.permissions.resolve_role(guild_id, &identity).await?;
                    (role.id, role.name)
                }
            };
            let removed = data.permissions.revoke_role(guild_id, role_id).await?;
            messages::grant_removed(&label, removed)
        }
        Command::Purge(requested) => {
            let channel = data.platform.channel(channel_id).await?;
            if !channel.is_text {
                return Err(BotError::NotTextChannel {
                    id: channel_id.to_string(),
                });
            }
            let retention = data.scheduler.start_or_replace(channel_id, requested).await;
            messages::purge_started(retention)
        }
    };

    Ok(reply)
}

async fn set_user_grant(
    data: &Data,
    guild_id: GuildId,
    identity: &Identity,
    can_purge: bool,
) -> Result<String> {
    let member = data.permissions.resolve_user(guild_id, identity).await?;
    data.permissions
        .grant_user(guild_id, member.user_id, can_purge)
        .await?;
    Ok(messages::user_granted(member.display_name(), can_purge))
}
