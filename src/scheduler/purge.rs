//! One purge walk over a channel's history.
//!
//! The walk pages backward from the newest message and always runs until the
//! platform returns an empty page, even after it reaches messages newer than
//! the threshold, so every tick rescans the full history.

use chrono::{DateTime, Utc};
use poise::serenity_prelude::{ChannelId, MessageId};
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::error::{BotError, Result};
use crate::platform::ChatPlatform;

/// Messages requested per history page
pub const PAGE_SIZE: u8 = 100;

/// Outcome of a single walk
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PurgeReport {
    pub pages: usize,
    pub scanned: usize,
    pub deleted: usize,
    pub failed: usize,
}

/// Delete every message in `channel_id` older than `now - retention`
pub async fn purge_channel(
    platform: &dyn ChatPlatform,
    channel_id: ChannelId,
    retention: Duration,
) -> Result<PurgeReport> {
    let threshold = chrono::Duration::from_std(retention)
        .ok()
        .and_then(|retention| Utc::now().checked_sub_signed(retention))
        .ok_or_else(|| BotError::Internal {
            message: format!("retention {:?} is out of range", retention),
        })?;
    purge_before(platform, channel_id, threshold).await
}

/// Delete every message in `channel_id` created strictly before `threshold`
pub async fn purge_before(
    platform: &dyn ChatPlatform,
    channel_id: ChannelId,
    threshold: DateTime<Utc>,
) -> Result<PurgeReport> {
    let mut report = PurgeReport::default();
    let mut cursor: Option<MessageId> = None;

    loop {
        let page = platform
            .messages_before(channel_id, cursor, PAGE_SIZE)
            .await
            .map_err(|e| {
                error!("Error fetching messages in channel {}: {}", channel_id, e);
                e
            })?;

        if page.is_empty() {
            break;
        }
        report.pages += 1;

        for message in &page {
            report.scanned += 1;
            if message.created_at >= threshold {
                continue;
            }

            match platform.delete_message(channel_id, message.id).await {
                Ok(()) => {
                    debug!("Deleted message {} in channel {}", message.id, channel_id);
                    report.deleted += 1;
                }
                Err(e) => {
                    warn!("Error deleting message {}: {}", message.id, e);
                    report.failed += 1;
                }
            }
        }

        cursor = page.iter().map(|m| m.id).min();
    }

    Ok(report)
}
