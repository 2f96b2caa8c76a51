use poise::serenity_prelude as serenity;
use tracing::debug;

use crate::commands::{handle_mention, mention_args, CommandRequest};
use crate::{Data, Error};

/// Handle incoming messages
pub async fn handle_message(
    msg: &serenity::Message,
    bot_id: serenity::UserId,
    data: &Data,
) -> Result<(), Error> {
    // Ignore bot messages
    if msg.author.bot {
        return Ok(());
    }

    // Commands only make sense inside a guild
    let Some(guild_id) = msg.guild_id else {
        return Ok(());
    };

    let Some(args) = mention_args(&msg.content, bot_id) else {
        return Ok(());
    };

    debug!(
        "Command from {} (ID: {}) in channel {}: {:?}",
        msg.author.name, msg.author.id, msg.channel_id, args
    );

    let request = CommandRequest {
        guild_id,
        channel_id: msg.channel_id,
        author_id: msg.author.id,
        bot_id,
    };
    handle_mention(data, &request, &args).await?;
    Ok(())
}
