//! Guild-facing management of per-command authorization overrides. These
//! commands carry no policy tag, so by default only the bot owner and guild
//! administrators may run them.

use poise::serenity_prelude as serenity;
use tracing::info;

use crate::error::PermError;
use crate::perms::{PermEntry, RoleEntry, RoleTarget};
use crate::registry::CommandRegistry;
use crate::{Context, Error};

fn registry(ctx: &Context<'_>) -> CommandRegistry {
    CommandRegistry::from_commands(&ctx.framework().options().commands)
}

/// Resolves role input: the pseudo-entries `any`, `none`, and `everyone`, or
/// a role mention, id, or name from the guild's role list.
fn resolve_role_target(ctx: &Context<'_>, input: &str) -> Result<RoleTarget, PermError> {
    let raw = input.trim();
    match raw.to_lowercase().as_str() {
        "any" => return Ok(RoleTarget::Any),
        "none" => return Ok(RoleTarget::None),
        "everyone" | "@everyone" => return Ok(RoleTarget::Everyone),
        _ => {}
    }

    let id = raw
        .strip_prefix("<@&")
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(raw)
        .parse::<u64>()
        .ok()
        .filter(|id| *id != 0);

    let guild = ctx
        .guild()
        .ok_or_else(|| PermError::UnknownRole(raw.to_string()))?;
    if let Some(id) = id {
        if guild.roles.contains_key(&serenity::RoleId::new(id)) {
            return Ok(RoleTarget::Role(id));
        }
    }
    if let Some(role) = guild
        .roles
        .values()
        .find(|role| role.name.eq_ignore_ascii_case(raw))
    {
        return Ok(RoleTarget::Role(role.id.get()));
    }
    Err(PermError::UnknownRole(raw.to_string()))
}

/// Reports bad input back to the invoker; anything else propagates.
async fn say_rejection(ctx: &Context<'_>, err: PermError) -> Result<(), Error> {
    let reply = match &err {
        PermError::InvalidCommand(path) => format!("🚫 `{path}` is not a valid command."),
        PermError::UnknownRole(role) => format!("🚫 Unknown role `{role}`."),
        PermError::UnknownCapability(name) => format!("🚫 Unknown permission `{name}`."),
        PermError::UnknownMember(who) => format!("🚫 Unknown member `{who}`."),
        _ => return Err(err.into()),
    };
    ctx.say(reply).await?;
    Ok(())
}

fn revert_notice(axis: &str, path: &str) -> String {
    format!(
        "\nThe last {axis} for `{path}` has been deleted, reverting to bot default settings. \
         To disable defaults use `permissions add role none {path}`."
    )
}

/// Manage per-command permission overrides for this server (Admin only)
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    subcommands("add", "del", "list")
)]
pub async fn permissions(ctx: Context<'_>) -> Result<(), Error> {
    ctx.say("Use `permissions add`, `permissions del`, or `permissions list`.")
        .await?;
    Ok(())
}

/// Grant a user, role, or permission flag access to a command
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    subcommands("add_user", "add_role", "add_permission")
)]
pub async fn add(ctx: Context<'_>) -> Result<(), Error> {
    ctx.say("Use `permissions add user`, `permissions add role`, or `permissions add permission`.")
        .await?;
    Ok(())
}

/// Revoke a user, role, or permission flag from a command
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    subcommands("del_user", "del_role", "del_permission")
)]
pub async fn del(ctx: Context<'_>) -> Result<(), Error> {
    ctx.say("Use `permissions del user`, `permissions del role`, or `permissions del permission`.")
        .await?;
    Ok(())
}

/// Give a user permission to use a command
#[poise::command(prefix_command, slash_command, guild_only, rename = "user")]
pub async fn add_user(
    ctx: Context<'_>,
    #[description = "Member to grant access"] user: serenity::User,
    #[description = "Full command path, e.g. `permissions list`"]
    #[rest]
    command: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let command = command.trim().to_string();

    match ctx
        .data()
        .perms
        .add_user(&registry(&ctx), guild_id.get(), &command, user.id.get())
    {
        Ok(()) => {
            info!(
                "Guild {}: user {} granted `{}`",
                guild_id, user.id, command
            );
            ctx.say(format!("☑️ **{}** may now use `{command}`.", user.name))
                .await?;
        }
        Err(err) => say_rejection(&ctx, err).await?,
    }
    Ok(())
}

/// Remove a user's permission to use a command
#[poise::command(prefix_command, slash_command, guild_only, rename = "user")]
pub async fn del_user(
    ctx: Context<'_>,
    #[description = "Member to revoke"] user: serenity::User,
    #[description = "Full command path"]
    #[rest]
    command: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let command = command.trim().to_string();

    match ctx
        .data()
        .perms
        .remove_user(&registry(&ctx), guild_id.get(), &command, user.id.get())
    {
        Ok(remaining) => {
            let mut reply = format!("☑️ Removed **{}** from `{command}`.", user.name);
            if remaining == 0 {
                reply.push_str(&revert_notice("user", &command));
            }
            ctx.say(reply).await?;
        }
        Err(err) => say_rejection(&ctx, err).await?,
    }
    Ok(())
}

/// Give a role permission to use a command
#[poise::command(prefix_command, slash_command, guild_only, rename = "role")]
pub async fn add_role(
    ctx: Context<'_>,
    #[description = "Role name, mention, id, or `any`/`everyone`/`none`"] role: String,
    #[description = "Full command path"]
    #[rest]
    command: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let command = command.trim().to_string();

    let outcome = resolve_role_target(&ctx, &role).and_then(|target| {
        ctx.data()
            .perms
            .add_role(&registry(&ctx), guild_id.get(), &command, target)
    });
    match outcome {
        Ok(()) => {
            info!(
                "Guild {}: role `{}` granted `{}`",
                guild_id,
                role.trim(),
                command
            );
            ctx.say(format!(
                "☑️ Role `{}` may now use `{command}`.",
                role.trim()
            ))
            .await?;
        }
        Err(err) => say_rejection(&ctx, err).await?,
    }
    Ok(())
}

/// Remove a role's permission to use a command
#[poise::command(prefix_command, slash_command, guild_only, rename = "role")]
pub async fn del_role(
    ctx: Context<'_>,
    #[description = "Role name, mention, id, or `any`/`everyone`/`none`"] role: String,
    #[description = "Full command path"]
    #[rest]
    command: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let command = command.trim().to_string();

    let outcome = resolve_role_target(&ctx, &role).and_then(|target| {
        ctx.data()
            .perms
            .remove_role(&registry(&ctx), guild_id.get(), &command, target)
    });
    match outcome {
        Ok(remaining) => {
            let mut reply = format!("☑️ Removed role `{}` from `{command}`.", role.trim());
            if remaining == 0 {
                reply.push_str(&revert_notice("role", &command));
            }
            ctx.say(reply).await?;
        }
        Err(err) => say_rejection(&ctx, err).await?,
    }
    Ok(())
}

/// Let holders of a permission flag use a command
#[poise::command(prefix_command, slash_command, guild_only, rename = "permission")]
pub async fn add_permission(
    ctx: Context<'_>,
    #[description = "Permission flag, e.g. `manage_messages`, or `none`"] permission: String,
    #[description = "Full command path"]
    #[rest]
    command: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let command = command.trim().to_string();
    let permission = permission.trim().to_lowercase();

    let outcome = PermEntry::parse(&permission).and_then(|entry| {
        ctx.data()
            .perms
            .add_permission(&registry(&ctx), guild_id.get(), &command, entry)
    });
    match outcome {
        Ok(()) => {
            info!(
                "Guild {}: permission `{}` granted `{}`",
                guild_id, permission, command
            );
            ctx.say(format!(
                "☑️ Members with `{permission}` may now use `{command}`."
            ))
            .await?;
        }
        Err(err) => say_rejection(&ctx, err).await?,
    }
    Ok(())
}

/// Stop a permission flag from granting a command
#[poise::command(prefix_command, slash_command, guild_only, rename = "permission")]
pub async fn del_permission(
    ctx: Context<'_>,
    #[description = "Permission flag or `none`"] permission: String,
    #[description = "Full command path"]
    #[rest]
    command: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let command = command.trim().to_string();
    let permission = permission.trim().to_lowercase();

    let outcome = PermEntry::parse(&permission).and_then(|entry| {
        ctx.data()
            .perms
            .remove_permission(&registry(&ctx), guild_id.get(), &command, entry)
    });
    match outcome {
        Ok(remaining) => {
            let mut reply = format!("☑️ Removed `{permission}` from `{command}`.");
            if remaining == 0 {
                reply.push_str(&revert_notice("permission", &command));
            }
            ctx.say(reply).await?;
        }
        Err(err) => say_rejection(&ctx, err).await?,
    }
    Ok(())
}

/// Show the overrides configured for a command
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn list(
    ctx: Context<'_>,
    #[description = "Full command path"]
    #[rest]
    command: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let command = command.trim().to_string();

    let node = match ctx
        .data()
        .perms
        .rules(&registry(&ctx), guild_id.get(), &command)
    {
        Ok(node) => node,
        Err(err) => return say_rejection(&ctx, err).await,
    };

    if node.users.is_empty() && node.roles.is_empty() && node.permissions.is_empty() {
        ctx.say(format!(
            "No overrides set for `{command}`; bot defaults apply."
        ))
        .await?;
        return Ok(());
    }

    let role_label = |entry: &RoleEntry| match entry {
        RoleEntry::Any => "any".to_string(),
        RoleEntry::None => "none".to_string(),
        RoleEntry::Id(id) if *id == guild_id.get() => "everyone".to_string(),
        RoleEntry::Id(id) => ctx
            .guild()
            .and_then(|guild| guild.roles.get(&serenity::RoleId::new(*id)).cloned())
            .map(|role| role.name.to_string())
            .unwrap_or_else(|| format!("<@&{id}>")),
    };

    let mut lines = vec![format!("Overrides for `{command}`:")];
    if !node.users.is_empty() {
        let users: Vec<String> = node.users.iter().map(|id| format!("<@{id}>")).collect();
        lines.push(format!("Users: {}", users.join(", ")));
    }
    if !node.roles.is_empty() {
        let roles: Vec<String> = node.roles.iter().map(|entry| role_label(entry)).collect();
        lines.push(format!("Roles: {}", roles.join(", ")));
    }
    if !node.permissions.is_empty() {
        let perms: Vec<String> = node
            .permissions
            .iter()
            .map(|entry| format!("`{}`", entry.as_str()))
            .collect();
        lines.push(format!("Permissions: {}", perms.join(", ")));
    }

    ctx.say(lines.join("\n")).await?;
    Ok(())
}
