// src/permissions/types.rs
use std::fmt;

use poise::serenity_prelude::RoleId;

use crate::error::{BotError, Result};

/// Which rule decided an authorization check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Owner,
    Administrator,
    /// Explicit user grant with `can_purge = true`
    UserGranted,
    /// Explicit user grant with `can_purge = false`; never falls through to roles
    UserDenied,
    RoleGranted(RoleId),
    NoGrant,
    /// Guild or member could not be looked up
    Unresolved,
}

impl Decision {
    pub fn allowed(self) -> bool {
        matches!(
            self,
            Decision::Owner
                | Decision::Administrator
                | Decision::UserGranted
                | Decision::RoleGranted(_)
        )
    }

    /// Owner and administrator may also manage grants
    pub fn is_authority(self) -> bool {
        matches!(self, Decision::Owner | Decision::Administrator)
    }
}

/// How a command names a user or role
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Id(u64),
    Name(String),
}

impl Identity {
    /// Parse a raw ID or a mention (`<@1>`, `<@!1>`, `<@&1>`)
    pub fn parse_id(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let digits = trimmed
            .strip_prefix("<@")
            .and_then(|rest| rest.strip_suffix('>'))
            .map(|inner| inner.trim_start_matches(&['!', '&'][..]))
            .unwrap_or(trimmed);

        match digits.parse::<u64>() {
            Ok(id) if id > 0 => Ok(Identity::Id(id)),
            _ => Err(BotError::UnknownId {
                input: input.to_string(),
            }),
        }
    }

    pub fn name(input: &str) -> Self {
        Identity::Name(input.trim().to_string())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Id(id) => write!(f, "{}", id),
            Identity::Name(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantKind {
    User,
    Role,
}

/// One stored grant with a human-readable label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantLine {
    pub kind: GrantKind,
    pub label: String,
    pub can_purge: bool,
}

impl fmt::Display for GrantLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            GrantKind::User => "user",
            GrantKind::Role => "role",
        };
        let access = if self.can_purge { "allowed" } else { "denied" };
        write!(f, "{}: {}, purge: {}", kind, self.label, access)
    }
}
