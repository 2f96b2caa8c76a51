use once_cell::sync::Lazy;
use poise::serenity_prelude::UserId;
use regex::Regex;
use std::time::Duration;

use crate::error::{BotError, Result};
use crate::permissions::Identity;

static DURATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)([smhd])$").expect("duration pattern is valid"));

/// A parsed mention command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Stop,
    List,
    ListPermissions,
    AddUser(Identity),
    DenyUser(Identity),
    RemoveUser(Identity),
    AddRole(Identity),
    RemoveRole(Identity),
    /// Start or replace the purge task for the current channel
    Purge(Duration),
}

impl Command {
    /// Grant management is reserved for the guild owner and administrators
    pub fn manages_grants(&self) -> bool {
        matches!(
            self,
            Command::AddUser(_)
                | Command::DenyUser(_)
                | Command::RemoveUser(_)
                | Command::AddRole(_)
                | Command::RemoveRole(_)
        )
    }
}

/// Tokens following the bot mention, if the message starts with one
pub fn mention_args(content: &str, bot_id: UserId) -> Option<Vec<&str>> {
    let mut tokens = content.split_whitespace();
    let first = tokens.next()?;

    let plain = format!("<@{}>", bot_id);
    let nick = format!("<@!{}>", bot_id);
    if first == plain || first == nick {
        Some(tokens.collect())
    } else {
        None
    }
}

/// Parse the tokens after the mention; the first token is the subcommand
pub fn parse_command(args: &[&str]) -> Result<Command> {
    let (subcommand, rest) = args.split_first().ok_or_else(|| BotError::MissingArgument {
        command: "command".to_string(),
    })?;
    let subcommand = subcommand.to_lowercase();

    let name = |command: &str| -> Result<Identity> {
        if rest.is_empty() {
            return Err(BotError::MissingArgument {
                command: command.to_string(),
            });
        }
        Ok(Identity::name(&rest.join(" ")))
    };
    let id = |command: &str| -> Result<Identity> {
        let raw = rest.first().ok_or_else(|| BotError::MissingArgument {
            command: command.to_string(),
        })?;
        Identity::parse_id(raw)
    };

    let command = match subcommand.as_str() {
        "help" => Command::Help,
        "stop" => Command::Stop,
        "list" => Command::List,
        "listpermissions" => Command::ListPermissions,
        "adduser" => Command::AddUser(name("adduser")?),
        "adduserid" => Command::AddUser(id("adduserid")?),
        "denyuser" => Command::DenyUser(name("denyuser")?),
        "denyuserid" => Command::DenyUser(id("denyuserid")?),
        "removeuser" => Command::RemoveUser(name("removeuser")?),
        "removeuserid" => Command::RemoveUser(id("removeuserid")?),
        "addrole" => Command::AddRole(name("addrole")?),
        "addroleid" => Command::AddRole(id("addroleid")?),
        "removerole" => Command::RemoveRole(name("removerole")?),
        "removeroleid" => Command::RemoveRole(id("removeroleid")?),
        other => Command::Purge(parse_duration(other)?),
    };
    Ok(command)
}

/// Parse `<number><s|m|h|d>`, e.g. `30s`, `5m`, `24h`, `2d`
pub fn parse_duration(input: &str) -> Result<Duration> {
    let invalid = || BotError::InvalidDuration {
        input: input.to_string(),
    };

    let captures = DURATION_RE.captures(input).ok_or_else(invalid)?;
    let amount: u64 = captures[1].parse().map_err(|_| invalid())?;
    let unit_secs: u64 = match &captures[2] {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => return Err(invalid()),
    };

    // Overflowing amounts end up clamped to the maximum retention anyway
    Ok(Duration::from_secs(amount.saturating_mul(unit_secs)))
}

/// Render a duration in its largest whole unit, e.g. `2 days`, `90 seconds`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (amount, unit) = if secs % 86_400 == 0 && secs > 0 {
        (secs / 86_400, "day")
    } else if secs % 3_600 == 0 && secs > 0 {
        (secs / 3_600, "hour")
    } else if secs % 60 == 0 && secs > 0 {
        (secs / 60, "minute")
    } else {
        (secs, "second")
    };

    if amount == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", amount, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("24h").unwrap(), Duration::from_secs(86_400));
        assert_eq!(parse_duration("2d").unwrap(), Duration::from_secs(172_800));
    }

    #[test]
    fn test_parse_duration_rejects_bad_tokens() {
        for input in ["10x", "h", "10", "-5m", "1.5h", "5 m", "5M", "", "m5"] {
            assert!(
                matches!(parse_duration(input), Err(BotError::InvalidDuration { .. })),
                "{} should be rejected",
                input
            );
        }
    }

    #[test]
    fn test_parse_duration_saturates_huge_values() {
        assert_eq!(
            parse_duration("18446744073709551615d").unwrap(),
            Duration::from_secs(u64::MAX)
        );
        assert!(parse_duration("99999999999999999999999d").is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(1)), "1 second");
        assert_eq!(format_duration(Duration::from_secs(90)), "90 seconds");
        assert_eq!(format_duration(Duration::from_secs(300)), "5 minutes");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1 hour");
        assert_eq!(format_duration(Duration::from_secs(86_400)), "1 day");
        assert_eq!(format_duration(Duration::from_secs(172_800)), "2 days");
    }

    #[test]
    fn test_mention_args() {
        let bot = UserId::new(42);
        assert_eq!(mention_args("<@42> 1h", bot), Some(vec!["1h"]));
        assert_eq!(mention_args("<@!42>   stop ", bot), Some(vec!["stop"]));
        assert_eq!(mention_args("<@42>", bot), Some(vec![]));
        assert_eq!(mention_args("<@43> 1h", bot), None);
        assert_eq!(mention_args("hello <@42> 1h", bot), None);
    }

    #[test]
    fn test_parse_subcommands() {
        assert_eq!(parse_command(&["HELP"]).unwrap(), Command::Help);
        assert_eq!(parse_command(&["stop"]).unwrap(), Command::Stop);
        assert_eq!(
            parse_command(&["listpermissions"]).unwrap(),
            Command::ListPermissions
        );
        assert_eq!(
            parse_command(&["adduser", "Big", "Bob"]).unwrap(),
            Command::AddUser(Identity::Name("Big Bob".to_string()))
        );
        assert_eq!(
            parse_command(&["addroleid", "<@&77>"]).unwrap(),
            Command::AddRole(Identity::Id(77))
        );
        assert_eq!(
            parse_command(&["removeuserid", "12"]).unwrap(),
            Command::RemoveUser(Identity::Id(12))
        );
        assert_eq!(
            parse_command(&["2d"]).unwrap(),
            Command::Purge(Duration::from_secs(172_800))
        );
    }

    #[test]
    fn test_parse_missing_arguments() {
        assert!(matches!(
            parse_command(&["adduser"]),
            Err(BotError::MissingArgument { .. })
        ));
        assert!(matches!(
            parse_command(&["removeroleid"]),
            Err(BotError::MissingArgument { .. })
        ));
        assert!(matches!(
            parse_command(&["adduserid", "bob"]),
            Err(BotError::UnknownId { .. })
        ));
        assert!(matches!(
            parse_command(&[]),
            Err(BotError::MissingArgument { .. })
        ));
    }
}
