use flarebot::cache::SettingsCache;
use flarebot::db::Store;
use flarebot::perms::{discord, Authorizer};
use flarebot::{backup, commands, config::Config, Data, Error};
use poise::serenity_prelude as serenity;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = Config::from_env()?;
    let discord_token = config.discord_token.clone();

    let owners = config
        .owner_id
        .map(serenity::UserId::new)
        .into_iter()
        .collect();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            owners,
            command_check: Some(|ctx| Box::pin(discord::check_command(ctx))),
            prefix_options: poise::PrefixFrameworkOptions {
                dynamic_prefix: Some(|ctx| {
                    Box::pin(async move {
                        let prefix = ctx
                            .guild_id
                            .and_then(|guild_id| ctx.data.cache.prefix(guild_id.get()))
                            .unwrap_or_else(|| ctx.data.config.default_prefix.clone());
                        Ok(Some(prefix))
                    })
                }),
                case_insensitive_commands: true,
                ..Default::default()
            },
            event_handler: |ctx, event, _framework, data| {
                Box::pin(async move {
                    handle_event(ctx, event, data).await
                })
            },
            ..Default::default()
        })
        .setup(|ctx, ready, framework| {
            Box::pin(async move {
                info!("Bot is ready in {} server(s)", ready.guilds.len());
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                // Set bot status
                ctx.set_activity(Some(serenity::ActivityData::custom(&config.status_message)));

                let store = Store::new(&config.database_dir);
                store.discover()?;

                let cache = SettingsCache::new(store.clone());
                cache.init()?;
                cache.load_all("permissions")?;
                cache.load_all(commands::karma::FEATURE)?;

                let sleeping = Arc::new(AtomicBool::new(false));
                let perms = Authorizer::new(cache.clone(), sleeping.clone());

                if config.backup_enabled {
                    tokio::spawn(backup::start_backup_task(
                        config.database_dir.clone(),
                        config.backup_dir.clone(),
                        config.backup_hour_utc,
                    ));
                }

                Ok(Data {
                    config,
                    store,
                    cache,
                    perms,
                    sleeping,
                })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::GUILD_MESSAGE_REACTIONS;

    let mut client = serenity::ClientBuilder::new(&discord_token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    info!("Starting bot...");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}

async fn handle_event(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::GuildCreate { guild, .. } => {
            data.cache.on_guild_join(guild.id.get())?;
        }
        serenity::FullEvent::GuildDelete { incomplete, .. } => {
            // Unavailable means an outage, not a removal; keep the guild
            // loaded for when it comes back.
            if !incomplete.unavailable {
                info!("Left guild {}", incomplete.id);
                data.cache.on_guild_leave(incomplete.id.get());
            }
        }
        serenity::FullEvent::ReactionAdd { add_reaction } => {
            commands::karma::handle_reaction(ctx, data, add_reaction, true).await?;
        }
        serenity::FullEvent::ReactionRemove { removed_reaction } => {
            commands::karma::handle_reaction(ctx, data, removed_reaction, false).await?;
        }
        _ => {}
    }
    Ok(())
}
