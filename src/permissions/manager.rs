use poise::serenity_prelude::{GuildId, RoleId, UserId};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::types::{Decision, GrantKind, GrantLine, Identity};
use crate::error::{BotError, Result};
use crate::models::{GuildGrants, RolePermission, UserPermission};
use crate::platform::{MemberInfo, RoleInfo, SharedPlatform};
use crate::state::SharedRepository;

/// Decides who may manage purge tasks and stores the grants that feed
/// those decisions
pub struct PermissionManager {
    platform: SharedPlatform,
    repository: SharedRepository,
}

impl PermissionManager {
    pub fn new(platform: SharedPlatform, repository: SharedRepository) -> Self {
        Self {
            platform,
            repository,
        }
    }

    /// Run the authorization ladder for `user_id` in `guild_id`.
    ///
    /// Order: guild owner, administrator role, explicit user grant (an
    /// explicit deny stops here), role grant, otherwise no grant.
    pub async fn decide(&self, guild_id: GuildId, user_id: UserId) -> Decision {
        let owner = match self.platform.guild_owner(guild_id).await {
            Ok(owner) => owner,
            Err(e) => {
                warn!("Error fetching guild {}: {}", guild_id, e);
                return Decision::Unresolved;
            }
        };
        if owner == user_id {
            return Decision::Owner;
        }

        let member = match self.platform.member(guild_id, user_id).await {
            Ok(member) => member,
            Err(e) => {
                warn!("Error fetching member {} in guild {}: {}", user_id, guild_id, e);
                return Decision::Unresolved;
            }
        };
        let held = held_roles(guild_id, &member);

        match self.platform.guild_roles(guild_id).await {
            Ok(roles) => {
                if roles.iter().any(|r| r.is_admin && held.contains(&r.id)) {
                    return Decision::Administrator;
                }
            }
            Err(e) => warn!(
                "Error fetching roles for guild {}, skipping administrator check: {}",
                guild_id, e
            ),
        }

        let grants = match self.repository.find_grants(guild_id).await {
            Ok(grants) => grants,
            Err(e) => {
                error!("Error loading grants for guild {}: {}", guild_id, e);
                GuildGrants::default()
            }
        };

        if let Some(grant) = grants.user(user_id) {
            return if grant.can_purge {
                Decision::UserGranted
            } else {
                Decision::UserDenied
            };
        }

        grants
            .roles
            .iter()
            .find(|g| g.can_purge && held.contains(&g.role_id))
            .map(|g| Decision::RoleGranted(g.role_id))
            .unwrap_or(Decision::NoGrant)
    }

    /// Resolve a user by ID or by name. Names match username, display name or
    /// nickname; the first matching member wins.
    pub async fn resolve_user(&self, guild_id: GuildId, identity: &Identity) -> Result<MemberInfo> {
        match identity {
            Identity::Id(id) => self
                .platform
                .member(guild_id, UserId::new(*id))
                .await
                .map_err(|_| BotError::UserNotFound {
                    name: id.to_string(),
                }),
            Identity::Name(name) => self
                .platform
                .members(guild_id)
                .await?
                .into_iter()
                .find(|m| m.answers_to(name))
                .ok_or_else(|| BotError::UserNotFound { name: name.clone() }),
        }
    }

    /// Resolve a role by ID or by case-insensitive name; first match wins
    pub async fn resolve_role(&self, guild_id: GuildId, identity: &Identity) -> Result<RoleInfo> {
        let roles = self.platform.guild_roles(guild_id).await?;
        let found = match identity {
            Identity::Id(id) => roles.into_iter().find(|r| r.id.get() == *id),
            Identity::Name(name) => roles
                .into_iter()
                .find(|r| r.name.eq_ignore_ascii_case(name)),
        };
        found.ok_or_else(|| BotError::RoleNotFound {
            name: identity.to_string(),
        })
    }

    pub async fn grant_user(&self, guild_id: GuildId, user_id: UserId, can_purge: bool) -> Result<()> {
        let result = self
            .repository
            .upsert_user_grant(UserPermission {
                guild_id,
                user_id,
                can_purge,
            })
            .await;
        persisted(result, (), "user grant")?;
        info!(
            "Set purge permission for user {} in guild {} to {}",
            user_id, guild_id, can_purge
        );
        Ok(())
    }

    pub async fn revoke_user(&self, guild_id: GuildId, user_id: UserId) -> Result<bool> {
        let result = self.repository.delete_user_grant(guild_id, user_id).await;
        let removed = persisted(result, true, "user grant removal")?;
        if removed {
            info!("Removed purge permission for user {} in guild {}", user_id, guild_id);
        }
        Ok(removed)
    }

    pub async fn grant_role(&self, guild_id: GuildId, role_id: RoleId, can_purge: bool) -> Result<()> {
        let result = self
            .repository
            .upsert_role_grant(RolePermission {
                guild_id,
                role_id,
                can_purge,
            })
            .await;
        persisted(result, (), "role grant")?;
        info!(
            "Set purge permission for role {} in guild {} to {}",
            role_id, guild_id, can_purge
        );
        Ok(())
    }

    pub async fn revoke_role(&self, guild_id: GuildId, role_id: RoleId) -> Result<bool> {
        let result = self.repository.delete_role_grant(guild_id, role_id).await;
        let removed = persisted(result, true, "role grant removal")?;
        if removed {
            info!("Removed purge permission for role {} in guild {}", role_id, guild_id);
        }
        Ok(removed)
    }

    /// Every grant in the guild, labelled with a display name where possible
    pub async fn list_grants(&self, guild_id: GuildId) -> Result<Vec<GrantLine>> {
        let grants = self.repository.find_grants(guild_id).await?;
        if grants.is_empty() {
            return Ok(Vec::new());
        }

        let mut lines = Vec::with_capacity(grants.users.len() + grants.roles.len());

        for grant in &grants.users {
            let id = grant.user_id.get();
            let label = match self.platform.member(guild_id, grant.user_id).await {
                Ok(member) => format!("{} ({})", member.display_name(), id),
                Err(_) => unknown_label(id),
            };
            lines.push(GrantLine {
                kind: GrantKind::User,
                label,
                can_purge: grant.can_purge,
            });
        }

        let roles = if grants.roles.is_empty() {
            Vec::new()
        } else {
            self.platform
                .guild_roles(guild_id)
                .await
                .unwrap_or_else(|e| {
                    warn!("Error fetching roles for guild {}: {}", guild_id, e);
                    Vec::new()
                })
        };

        for grant in &grants.roles {
            let id = grant.role_id.get();
            let label = roles
                .iter()
                .find(|r| r.id == grant.role_id)
                .map(|r| format!("{} ({})", r.name, id))
                .unwrap_or_else(|| unknown_label(id));
            lines.push(GrantLine {
                kind: GrantKind::Role,
                label,
                can_purge: grant.can_purge,
            });
        }

        Ok(lines)
    }
}

/// Roles a member holds, including the implicit @everyone role
fn held_roles(guild_id: GuildId, member: &MemberInfo) -> Vec<RoleId> {
    let mut held = member.role_ids.clone();
    held.push(RoleId::new(guild_id.get()));
    held
}

/// A failed save still leaves the change in memory, so it only gets logged
fn persisted<T>(result: Result<T>, applied: T, what: &str) -> Result<T> {
    match result {
        Err(e @ BotError::StateSave { .. }) => {
            error!("Failed to persist {}: {}", what, e);
            Ok(applied)
        }
        other => other,
    }
}

fn unknown_label(id: u64) -> String {
    format!("{} (unknown name)", id)
}

/// Shared permission manager type
pub type SharedPermissionManager = Arc<PermissionManager>;
