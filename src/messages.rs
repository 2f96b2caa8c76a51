// src/messages.rs
use std::time::Duration;

use crate::commands::parse::format_duration;
use crate::error::BotError;
use crate::models::Task;
use crate::permissions::GrantLine;

pub fn help_message(mention: &str) -> String {
    format!(
        "**AVAILABLE COMMANDS**\n\n\
        purge old messages:\n\
        {m} 30s\n\
        {m} 5m\n\
        {m} 24h\n\
        {m} 2d\n\
        or any custom duration\n\n\
        stop purge task:\n\
        {m} stop\n\n\
        list purge tasks:\n\
        {m} list\n\n\
        manage who can use the bot (owner and administrators only):\n\
        {m} adduser <name> / {m} adduserid <id>\n\
        {m} denyuser <name> / {m} denyuserid <id>\n\
        {m} removeuser <name> / {m} removeuserid <id>\n\
        {m} addrole <name> / {m} addroleid <id>\n\
        {m} removerole <name> / {m} removeroleid <id>\n\
        {m} listpermissions\n\n\
        get help:\n\
        {m} help",
        m = mention
    )
}

pub fn help_hint(mention: &str) -> String {
    format!("Type {} help for available commands.", mention)
}

pub fn not_authorized() -> String {
    "You need to be the owner of the guild, an administrator, or have been granted purge access to use this bot."
        .to_string()
}

pub fn grants_reserved() -> String {
    "Only the owner of the guild or an administrator can change who may use this bot.".to_string()
}

pub fn invalid_duration(mention: &str) -> String {
    format!("Invalid duration. {}", help_hint(mention))
}

pub fn missing_argument(command: &str, mention: &str) -> String {
    format!("`{}` needs an argument. {}", command, help_hint(mention))
}

pub fn invalid_id(input: &str) -> String {
    format!("`{}` is not a valid ID.", input)
}

pub fn not_found(error: &BotError) -> String {
    match error {
        BotError::UserNotFound { name } => format!("User `{}` not found.", name),
        BotError::RoleNotFound { name } => format!("Role `{}` not found.", name),
        BotError::NotTextChannel { .. } => "Purge tasks can only run in text channels.".to_string(),
        _ => "Not found.".to_string(),
    }
}

pub fn internal_error() -> String {
    "Something went wrong, please try again later.".to_string()
}

pub fn purge_started(retention: Duration) -> String {
    format!(
        "Messages older than {} will be deleted on a rolling basis in this channel.",
        format_duration(retention)
    )
}

pub fn purge_stopped(was_running: bool) -> String {
    if was_running {
        "Purging stopped.".to_string()
    } else {
        "No purge task is running in this channel.".to_string()
    }
}

pub fn task_list(tasks: &[Task]) -> String {
    if tasks.is_empty() {
        return "No purge tasks found for this guild.".to_string();
    }
    tasks
        .iter()
        .map(|t| {
            format!(
                "<#{}>, duration: {}",
                t.channel_id,
                format_duration(t.retention())
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn grant_list(lines: &[GrantLine]) -> String {
    if lines.is_empty() {
        return "No permissions granted in this guild.".to_string();
    }
    lines
        .iter()
        .map(|l| l.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn user_granted(name: &str, can_purge: bool) -> String {
    if can_purge {
        format!("**{}** can now manage purge tasks.", name)
    } else {
        format!("**{}** is now denied from managing purge tasks.", name)
    }
}

pub fn role_granted(name: &str) -> String {
    format!("Members with role **{}** can now manage purge tasks.", name)
}

pub fn grant_removed(subject: &str, removed: bool) -> String {
    if removed {
        format!("Removed purge permission for **{}**.", subject)
    } else {
        format!("**{}** had no purge permission.", subject)
    }
}
