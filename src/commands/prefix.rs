use tracing::info;

use crate::{Context, Error};

/// Show the command prefix used in this server
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn prefix(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let prefix = ctx
        .data()
        .cache
        .prefix(guild_id.get())
        .unwrap_or_else(|| ctx.data().config.default_prefix.clone());
    ctx.say(format!("My prefix here is `{prefix}`")).await?;
    Ok(())
}

/// Change the command prefix for this server (Admin only)
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn changeprefix(
    ctx: Context<'_>,
    #[description = "The new prefix"] new_prefix: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let new_prefix = new_prefix.trim().to_string();
    if new_prefix.is_empty() {
        ctx.say("🚫 The prefix cannot be empty.").await?;
        return Ok(());
    }

    ctx.data().cache.set_prefix(guild_id.get(), &new_prefix)?;
    info!("Prefix for guild {} changed to `{}`", guild_id, new_prefix);
    ctx.say(format!("Command prefix has been updated to `{new_prefix}`"))
        .await?;
    Ok(())
}
