use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// The closed vocabulary of platform permission flags a rule may grant
/// access by. Mutation input is validated against this list; anything else
/// is rejected as [`crate::error::PermError::UnknownCapability`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Administrator,
    CreateInstantInvite,
    BanMembers,
    ManageChannels,
    ManageGuild,
    AddReactions,
    ViewAuditLog,
    PrioritySpeaker,
    Stream,
    ReadMessages,
    SendMessages,
    SendTtsMessages,
    ManageMessages,
    EmbedLinks,
    AttachFiles,
    ReadMessageHistory,
    MentionEveryone,
    ExternalEmojis,
    Connect,
    Speak,
    MuteMembers,
    DeafenMembers,
    MoveMembers,
    UseVoiceActivation,
    ChangeNickname,
    ManageNicknames,
    ManageRoles,
    ManageWebhooks,
    ManageEmojis,
    KickMembers,
}

impl Capability {
    pub const ALL: [Capability; 30] = [
        Capability::Administrator,
        Capability::CreateInstantInvite,
        Capability::BanMembers,
        Capability::ManageChannels,
        Capability::ManageGuild,
        Capability::AddReactions,
        Capability::ViewAuditLog,
        Capability::PrioritySpeaker,
        Capability::Stream,
        Capability::ReadMessages,
        Capability::SendMessages,
        Capability::SendTtsMessages,
        Capability::ManageMessages,
        Capability::EmbedLinks,
        Capability::AttachFiles,
        Capability::ReadMessageHistory,
        Capability::MentionEveryone,
        Capability::ExternalEmojis,
        Capability::Connect,
        Capability::Speak,
        Capability::MuteMembers,
        Capability::DeafenMembers,
        Capability::MoveMembers,
        Capability::UseVoiceActivation,
        Capability::ChangeNickname,
        Capability::ManageNicknames,
        Capability::ManageRoles,
        Capability::ManageWebhooks,
        Capability::ManageEmojis,
        Capability::KickMembers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Administrator => "administrator",
            Capability::CreateInstantInvite => "create_instant_invite",
            Capability::BanMembers => "ban_members",
            Capability::ManageChannels => "manage_channels",
            Capability::ManageGuild => "manage_guild",
            Capability::AddReactions => "add_reactions",
            Capability::ViewAuditLog => "view_audit_log",
            Capability::PrioritySpeaker => "priority_speaker",
            Capability::Stream => "stream",
            Capability::ReadMessages => "read_messages",
            Capability::SendMessages => "send_messages",
            Capability::SendTtsMessages => "send_tts_messages",
            Capability::ManageMessages => "manage_messages",
            Capability::EmbedLinks => "embed_links",
            Capability::AttachFiles => "attach_files",
            Capability::ReadMessageHistory => "read_message_history",
            Capability::MentionEveryone => "mention_everyone",
            Capability::ExternalEmojis => "external_emojis",
            Capability::Connect => "connect",
            Capability::Speak => "speak",
            Capability::MuteMembers => "mute_members",
            Capability::DeafenMembers => "deafen_members",
            Capability::MoveMembers => "move_members",
            Capability::UseVoiceActivation => "use_voice_activation",
            Capability::ChangeNickname => "change_nickname",
            Capability::ManageNicknames => "manage_nicknames",
            Capability::ManageRoles => "manage_roles",
            Capability::ManageWebhooks => "manage_webhooks",
            Capability::ManageEmojis => "manage_emojis",
            Capability::KickMembers => "kick_members",
        }
    }

    pub fn parse(name: &str) -> Option<Capability> {
        Capability::ALL.iter().find(|c| c.as_str() == name).copied()
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Capability {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Capability {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Capability::parse(&name)
            .ok_or_else(|| de::Error::custom(format!("unknown permission `{name}`")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_names() {
        for cap in Capability::ALL {
            assert_eq!(Capability::parse(cap.as_str()), Some(cap));
        }
        assert_eq!(Capability::parse("fly"), None);
        assert_eq!(Capability::parse("none"), None);
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&Capability::ManageRoles).unwrap();
        assert_eq!(json, "\"manage_roles\"");
        let back: Capability = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Capability::ManageRoles);
    }
}
