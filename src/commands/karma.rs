//! Reaction-driven karma tallies, one upvote and one downvote counter per
//! member, persisted through the settings cache under the `karma` feature.

use poise::serenity_prelude as serenity;
use std::sync::atomic::Ordering;
use tracing::info;

use crate::cache::{SettingValue, SettingsCache};
use crate::{Context, Data, Error};

pub const FEATURE: &str = "karma";

const DEFAULT_UPVOTE: &str = "👍";
const DEFAULT_DOWNVOTE: &str = "👎";

fn count(cache: &SettingsCache, guild_id: u64, key: &str) -> i64 {
    cache
        .get(FEATURE, guild_id, key)
        .and_then(|v| v.as_i64())
        .unwrap_or(0)
}

fn vote_emoji(cache: &SettingsCache, guild_id: u64, key: &str, default: &str) -> String {
    cache
        .get(FEATURE, guild_id, key)
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_else(|| default.to_string())
}

/// Show a member's karma from message reactions
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn karma(
    ctx: Context<'_>,
    #[description = "Member to look up, defaults to you"] member: Option<serenity::User>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let user = member.as_ref().unwrap_or_else(|| ctx.author());

    let cache = &ctx.data().cache;
    let up = count(cache, guild_id.get(), &format!("up_{}", user.id.get()));
    let down = count(cache, guild_id.get(), &format!("down_{}", user.id.get()));

    ctx.say(format!(
        "**{}** has **{}** karma (▲{} ▼{})",
        user.name,
        up - down,
        up,
        down
    ))
    .await?;
    Ok(())
}

/// Set the emoji counted as upvotes and downvotes (Admin only)
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn karmaemoji(
    ctx: Context<'_>,
    #[description = "Emoji counted as an upvote"] upvote: String,
    #[description = "Emoji counted as a downvote"] downvote: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let cache = &ctx.data().cache;

    cache.set(
        FEATURE,
        guild_id.get(),
        "upvote",
        SettingValue::Text(upvote.trim().to_string()),
    );
    cache.set(
        FEATURE,
        guild_id.get(),
        "downvote",
        SettingValue::Text(downvote.trim().to_string()),
    );
    cache.write(FEATURE, guild_id.get())?;

    ctx.say(format!(
        "Karma emoji updated: {} upvotes, {} downvotes",
        upvote.trim(),
        downvote.trim()
    ))
    .await?;
    Ok(())
}

/// Applies one reaction event to the message author's tally. Ignores DMs,
/// bot voters, self votes, and emoji that are not the configured pair.
pub async fn handle_reaction(
    ctx: &serenity::Context,
    data: &Data,
    reaction: &serenity::Reaction,
    added: bool,
) -> Result<(), Error> {
    let Some(guild_id) = reaction.guild_id else {
        return Ok(());
    };
    if data.sleeping.load(Ordering::Relaxed) {
        return Ok(());
    }
    if !data.cache.enabled(FEATURE, guild_id.get()) {
        return Ok(());
    }
    let Some(voter_id) = reaction.user_id else {
        return Ok(());
    };

    let emoji = reaction.emoji.to_string();
    let key_prefix = if emoji == vote_emoji(&data.cache, guild_id.get(), "upvote", DEFAULT_UPVOTE) {
        "up"
    } else if emoji == vote_emoji(&data.cache, guild_id.get(), "downvote", DEFAULT_DOWNVOTE) {
        "down"
    } else {
        return Ok(());
    };

    let voter = reaction.user(ctx).await?;
    if voter.bot {
        return Ok(());
    }

    let message = reaction.message(ctx).await?;
    // Votes on your own messages don't count.
    if message.author.id == voter_id || message.author.bot {
        return Ok(());
    }

    let key = format!("{}_{}", key_prefix, message.author.id.get());
    let current = count(&data.cache, guild_id.get(), &key);
    let next = if added {
        current + 1
    } else {
        (current - 1).max(0)
    };
    data.cache
        .set(FEATURE, guild_id.get(), &key, SettingValue::Int(next));
    data.cache.write(FEATURE, guild_id.get())?;
    info!(
        "Karma {} for {} in guild {} now {}",
        key_prefix, message.author.id, guild_id, next
    );
    Ok(())
}
