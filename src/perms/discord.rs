//! Serenity-facing glue for the authorization engine: maps a live member to a
//! [`Principal`] and runs the global command check poise calls before every
//! command body.

use poise::serenity_prelude as serenity;
use std::collections::HashSet;
use tracing::debug;

use super::{Capability, CommandPolicy, DefaultRole, Principal, RoleRef, Verdict};
use crate::{Context, Error};

pub struct MemberPrincipal {
    pub id: u64,
    pub owner: bool,
    pub bot: bool,
    pub admin: bool,
    pub roles: Vec<RoleRef>,
    pub caps: HashSet<Capability>,
}

impl Principal for MemberPrincipal {
    fn id(&self) -> u64 {
        self.id
    }
    fn is_owner(&self) -> bool {
        self.owner
    }
    fn is_bot(&self) -> bool {
        self.bot
    }
    fn is_admin(&self) -> bool {
        self.admin
    }
    fn roles(&self) -> &[RoleRef] {
        &self.roles
    }
    fn held_capabilities(&self) -> HashSet<Capability> {
        self.caps.clone()
    }
}

fn permission_bits(cap: Capability) -> serenity::Permissions {
    use serenity::Permissions as P;
    match cap {
        Capability::Administrator => P::ADMINISTRATOR,
        Capability::CreateInstantInvite => P::CREATE_INSTANT_INVITE,
        Capability::BanMembers => P::BAN_MEMBERS,
        Capability::ManageChannels => P::MANAGE_CHANNELS,
        Capability::ManageGuild => P::MANAGE_GUILD,
        Capability::AddReactions => P::ADD_REACTIONS,
        Capability::ViewAuditLog => P::VIEW_AUDIT_LOG,
        Capability::PrioritySpeaker => P::PRIORITY_SPEAKER,
        Capability::Stream => P::STREAM,
        Capability::ReadMessages => P::VIEW_CHANNEL,
        Capability::SendMessages => P::SEND_MESSAGES,
        Capability::SendTtsMessages => P::SEND_TTS_MESSAGES,
        Capability::ManageMessages => P::MANAGE_MESSAGES,
        Capability::EmbedLinks => P::EMBED_LINKS,
        Capability::AttachFiles => P::ATTACH_FILES,
        Capability::ReadMessageHistory => P::READ_MESSAGE_HISTORY,
        Capability::MentionEveryone => P::MENTION_EVERYONE,
        Capability::ExternalEmojis => P::USE_EXTERNAL_EMOJIS,
        Capability::Connect => P::CONNECT,
        Capability::Speak => P::SPEAK,
        Capability::MuteMembers => P::MUTE_MEMBERS,
        Capability::DeafenMembers => P::DEAFEN_MEMBERS,
        Capability::MoveMembers => P::MOVE_MEMBERS,
        Capability::UseVoiceActivation => P::USE_VAD,
        Capability::ChangeNickname => P::CHANGE_NICKNAME,
        Capability::ManageNicknames => P::MANAGE_NICKNAMES,
        Capability::ManageRoles => P::MANAGE_ROLES,
        Capability::ManageWebhooks => P::MANAGE_WEBHOOKS,
        Capability::ManageEmojis => P::MANAGE_GUILD_EXPRESSIONS,
        Capability::KickMembers => P::KICK_MEMBERS,
    }
}

/// The capability flags present in a serenity permission set.
pub fn capability_set(perms: serenity::Permissions) -> HashSet<Capability> {
    Capability::ALL
        .iter()
        .copied()
        .filter(|cap| perms.contains(permission_bits(*cap)))
        .collect()
}

/// Global command check, installed as poise's `command_check`. Runs the
/// authorization cascade before every command body; returning `Ok(false)`
/// aborts the invocation.
pub async fn check_command(ctx: Context<'_>) -> Result<bool, Error> {
    let policy = ctx
        .command()
        .custom_data
        .downcast_ref::<CommandPolicy>()
        .cloned()
        .unwrap_or_default();

    let author = ctx.author();
    let is_owner = ctx.framework().options().owners.contains(&author.id);

    let Some(guild_id) = ctx.guild_id() else {
        // DMs have no rule tree; only the owner and everyone-default
        // commands run there.
        return Ok(is_owner || policy.role == Some(DefaultRole::Everyone));
    };

    let Some(member) = ctx.author_member().await else {
        return Ok(false);
    };

    let principal = {
        let Some(guild) = ctx.guild() else {
            return Ok(false);
        };

        let perms = guild
            .channels
            .get(&ctx.channel_id())
            .map(|channel| guild.user_permissions_in(channel, &member))
            .unwrap_or_default();

        // The implicit everyone role comes first and shares the guild id,
        // matching how it is stored in role rules.
        let mut roles = vec![RoleRef {
            id: guild_id.get(),
            everyone: true,
        }];
        roles.extend(member.roles.iter().map(|role_id| RoleRef {
            id: role_id.get(),
            everyone: false,
        }));

        MemberPrincipal {
            id: author.id.get(),
            owner: is_owner,
            bot: author.bot,
            admin: perms.administrator() || guild.owner_id == author.id,
            roles,
            caps: capability_set(perms),
        }
    };

    let path = ctx.command().qualified_name.clone();
    match ctx
        .data()
        .perms
        .resolve(guild_id.get(), &principal, &path, &policy)?
    {
        Verdict::Allow => Ok(true),
        Verdict::Deny(reason) => {
            debug!(
                "Denied `{}` for {} in guild {}: {:?}",
                path, author.id, guild_id, reason
            );
            if let Some(message) = reason.message() {
                ctx.say(message).await?;
            }
            Ok(false)
        }
    }
}
