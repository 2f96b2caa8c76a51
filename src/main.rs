use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use once_cell::sync::OnceCell;
use poise::serenity_prelude as serenity;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Discord bot that deletes old messages from channels on a rolling basis
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding purge_state.json (overrides STATE_PATH)
    #[arg(long)]
    state_path: Option<PathBuf>,

    /// Seconds between purge walks per channel (overrides PURGE_POLL_INTERVAL_SECS)
    #[arg(long)]
    poll_interval: Option<u64>,
}

mod commands;
mod config;
mod error;
mod events;
mod messages;
mod models;
mod permissions;
mod platform;
mod scheduler;
mod state;

use config::BotConfig;
use events::handle_message;
use permissions::{PermissionManager, SharedPermissionManager};
use platform::{DiscordPlatform, SharedPlatform};
use scheduler::{Scheduler, SharedScheduler};
use state::create_shared_purge_store;

type Error = Box<dyn std::error::Error + Send + Sync>;

/// Shared application state
pub struct Data {
    pub scheduler: SharedScheduler,
    pub permissions: SharedPermissionManager,
    pub platform: SharedPlatform,
}

async fn event_handler(
    _ctx: &serenity::Context,
    event: &serenity::FullEvent,
    framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    if let serenity::FullEvent::Message { new_message } = event {
        if let Err(e) = handle_message(new_message, framework.bot_id, data).await {
            error!("Failed to handle message: {}", e);
        }
    }
    Ok(())
}

/// Log the application ID encoded in the first token segment
fn log_bot_id(token: &str) {
    let Some(bot_id_b64) = token.split('.').next() else {
        return;
    };

    // Discord tokens use URL-safe base64 without padding
    use base64::Engine;
    let decoded = base64::engine::general_purpose::STANDARD_NO_PAD
        .decode(bot_id_b64)
        .or_else(|_| base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(bot_id_b64));
    if let Some(id_str) = decoded.ok().and_then(|bytes| String::from_utf8(bytes).ok()) {
        info!(
            "Bot ID: {} (configure intents at https://discord.com/developers/applications/{}/bot)",
            id_str, id_str
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = BotConfig::from_env()?.with_overrides(args.state_path, args.poll_interval)?;
    info!(
        "Purge settings: poll every {:?}, retention between {:?} and {:?}",
        config.purge.poll_interval, config.purge.min_retention, config.purge.max_retention
    );

    log_bot_id(&config.token);

    // Ensure state directory exists
    tokio::fs::create_dir_all(&config.state_path).await?;

    // A state file that cannot be read is fatal so it never gets overwritten
    info!("Loading purge state...");
    let store = create_shared_purge_store(config.state_file()).await?;

    let scheduler_slot: Arc<OnceCell<SharedScheduler>> = Arc::new(OnceCell::new());
    let setup_slot = scheduler_slot.clone();
    let settings = config.purge;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![],
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, _framework| {
            let store = store.clone();
            let setup_slot = setup_slot.clone();

            Box::pin(async move {
                info!("Bot logged in as: {}", ready.user.name);
                if ready.guilds.is_empty() {
                    warn!("Bot is not in any guilds yet");
                }

                let platform: SharedPlatform = Arc::new(DiscordPlatform::new(ctx.http.clone()));
                let scheduler: SharedScheduler =
                    Arc::new(Scheduler::new(platform.clone(), store.clone(), settings));
                let permissions: SharedPermissionManager =
                    Arc::new(PermissionManager::new(platform.clone(), store));

                match scheduler.reconcile().await {
                    Ok(summary) => info!(
                        "Resumed {} purge task(s), dropped {} stale task(s)",
                        summary.resumed, summary.removed
                    ),
                    Err(e) => error!("Failed to restore purge tasks: {}", e),
                }

                if setup_slot.set(scheduler.clone()).is_err() {
                    warn!("Setup ran twice; keeping the first scheduler for shutdown");
                }

                Ok(Data {
                    scheduler,
                    permissions,
                    platform,
                })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_MEMBERS;

    // Log which privileged intents we're requesting
    let privileged_intents: Vec<&str> = [
        (serenity::GatewayIntents::MESSAGE_CONTENT, "MESSAGE_CONTENT"),
        (serenity::GatewayIntents::GUILD_MEMBERS, "GUILD_MEMBERS"),
    ]
    .into_iter()
    .filter(|(intent, _)| intents.contains(*intent))
    .map(|(_, name)| name)
    .collect();

    info!("Requesting privileged intents: {:?}", privileged_intents);

    let mut client = serenity::ClientBuilder::new(&config.token, intents)
        .framework(framework)
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutdown requested");
        if let Some(scheduler) = scheduler_slot.get() {
            scheduler.shutdown();
        }
        shard_manager.shutdown_all().await;
    });

    info!("Starting bot...");
    if let Err(e) = client.start().await {
        // Check if it's a disallowed intents error
        let err_str = e.to_string();
        if err_str.contains("Disallowed") || err_str.contains("intents") {
            error!("Failed to start bot: {}", e);
            error!("The following privileged intents need to be enabled in the Discord Developer Portal:");
            for intent in &privileged_intents {
                error!("  - {}", intent);
            }
            error!("Go to https://discord.com/developers/applications -> Your App -> Bot -> Privileged Gateway Intents");
            return Err(anyhow::anyhow!(
                "Disallowed gateway intents. Enable these in Discord Developer Portal: {:?}",
                privileged_intents
            ));
        }
        return Err(e.into());
    }
    warn!("Bot ended.");

    Ok(())
}
