use poise::serenity_prelude as serenity;
use std::sync::atomic::Ordering;
use tracing::info;

use crate::{Context, Error};

/// Put the bot into maintenance mode; only the owner can run commands (Owner only)
#[poise::command(prefix_command, slash_command, owners_only, hide_in_help)]
pub async fn sleep(ctx: Context<'_>) -> Result<(), Error> {
    ctx.data().sleeping.store(true, Ordering::Relaxed);
    ctx.serenity_context()
        .set_presence(None, serenity::OnlineStatus::Invisible);
    info!("Sleep mode enabled by owner: {}", ctx.author().name);
    ctx.say("Going to sleep. 😴").await?;
    Ok(())
}

/// Bring the bot out of maintenance mode (Owner only)
#[poise::command(prefix_command, slash_command, owners_only, hide_in_help)]
pub async fn wake(ctx: Context<'_>) -> Result<(), Error> {
    ctx.data().sleeping.store(false, Ordering::Relaxed);
    ctx.serenity_context().set_presence(
        Some(serenity::ActivityData::custom(
            &ctx.data().config.status_message,
        )),
        serenity::OnlineStatus::Online,
    );
    info!("Sleep mode disabled by owner: {}", ctx.author().name);
    ctx.say("Huh? What? Oh... I'm awake. ☕").await?;
    Ok(())
}

/// Shut down the bot (Owner only)
#[poise::command(prefix_command, slash_command, owners_only, hide_in_help)]
pub async fn shutdown(ctx: Context<'_>) -> Result<(), Error> {
    info!("Shutdown command received from owner: {}", ctx.author().name);
    ctx.say("👋 Shutting down...").await?;
    ctx.framework().shard_manager().shutdown_all().await;
    Ok(())
}
