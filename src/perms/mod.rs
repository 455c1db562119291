//! Command authorization.
//!
//! Every command carries a compiled-in default policy; guild administrators
//! can override it per command path with explicit user, role, and permission
//! allow-lists stored as one JSON rule tree per guild. [`Authorizer::resolve`]
//! evaluates the fixed-order decision cascade fresh on every invocation —
//! role membership and rule sets change between calls, so no decision is ever
//! cached.

pub mod capability;
pub mod discord;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use capability::Capability;

use crate::cache::{SettingsCache, SettingValue};
use crate::error::PermError;
use crate::registry::CommandRegistry;

/// Feature name the rule tree is stored under.
const FEATURE: &str = "permissions";
/// Settings key holding the serialized tree.
const RULES_KEY: &str = "permissions";

/// One entry on the role axis of a rule. The implicit everyone role is
/// encoded as the guild's own id; `Any` grants any role except everyone;
/// `None` is the marker that disables the compiled-in default fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleEntry {
    Id(u64),
    Any,
    None,
}

impl Serialize for RoleEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RoleEntry::Id(id) => serializer.serialize_u64(*id),
            RoleEntry::Any => serializer.serialize_str("any"),
            RoleEntry::None => serializer.serialize_str("none"),
        }
    }
}

impl<'de> Deserialize<'de> for RoleEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntryVisitor;

        impl<'de> Visitor<'de> for EntryVisitor {
            type Value = RoleEntry;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a role id, \"any\", or \"none\"")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<RoleEntry, E> {
                Ok(RoleEntry::Id(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<RoleEntry, E> {
                u64::try_from(v)
                    .map(RoleEntry::Id)
                    .map_err(|_| E::custom("negative role id"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<RoleEntry, E> {
                match v {
                    "any" => Ok(RoleEntry::Any),
                    "none" => Ok(RoleEntry::None),
                    other => other
                        .parse()
                        .map(RoleEntry::Id)
                        .map_err(|_| E::custom(format!("unknown role entry `{other}`"))),
                }
            }
        }

        deserializer.deserialize_any(EntryVisitor)
    }
}

/// One entry on the permission axis: a capability flag, or the `None` marker
/// disabling the compiled-in default fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermEntry {
    Cap(Capability),
    None,
}

impl PermEntry {
    /// Parses mutation input against the closed vocabulary.
    pub fn parse(name: &str) -> Result<PermEntry, PermError> {
        if name == "none" {
            return Ok(PermEntry::None);
        }
        Capability::parse(name)
            .map(PermEntry::Cap)
            .ok_or_else(|| PermError::UnknownCapability(name.to_string()))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PermEntry::Cap(cap) => cap.as_str(),
            PermEntry::None => "none",
        }
    }
}

impl Serialize for PermEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PermEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        PermEntry::parse(&name).map_err(|_| de::Error::custom(format!("unknown permission `{name}`")))
    }
}

/// Override rules for one command path level. Empty axes defer to the
/// command's compiled-in default for that axis, unless the `none` marker is
/// present.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleNode {
    #[serde(rename = "_users", default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<u64>,
    #[serde(rename = "_roles", default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<RoleEntry>,
    #[serde(rename = "_permissions", default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<PermEntry>,
    #[serde(flatten)]
    pub children: BTreeMap<String, RuleNode>,
}

/// The full per-guild mapping from command path to override rules, persisted
/// as one JSON blob. Never partially written: mutations always save the whole
/// tree.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleTree {
    #[serde(flatten)]
    roots: BTreeMap<String, RuleNode>,
}

impl RuleTree {
    /// The normalized rule node for a path; missing levels read as empty.
    /// Paths are matched case-insensitively, like command names.
    pub fn node(&self, path: &str) -> RuleNode {
        let path = path.to_lowercase();
        let mut current: Option<&RuleNode> = None;
        for segment in path.split_whitespace() {
            let children = match current {
                Some(node) => &node.children,
                None => &self.roots,
            };
            match children.get(segment) {
                Some(child) => current = Some(child),
                None => return RuleNode::default(),
            }
        }
        current.cloned().unwrap_or_default()
    }

    /// The mutable node for a path, materializing empty nodes for every
    /// missing level so a leaf mutation never depends on its ancestors having
    /// been configured first.
    pub fn node_mut(&mut self, path: &str) -> &mut RuleNode {
        let path = path.to_lowercase();
        let mut segments = path.split_whitespace();
        let first = segments.next().expect("command path cannot be empty");
        let mut node = self.roots.entry(first.to_string()).or_default();
        for segment in segments {
            node = node.children.entry(segment.to_string()).or_default();
        }
        node
    }
}

/// Compiled-in default role policy for a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultRole {
    /// Any role except the implicit everyone role.
    Any,
    /// Everyone, including members with no role.
    Everyone,
}

/// The authorization policy a command is registered with. Absent any guild
/// override, an all-default policy admits only the bot owner and guild
/// administrators.
#[derive(Debug, Default, Clone)]
pub struct CommandPolicy {
    pub role: Option<DefaultRole>,
    pub permissions: Vec<Capability>,
    /// When set, the command only runs in these guilds (testing aid).
    pub guilds: Option<Vec<u64>>,
}

impl CommandPolicy {
    pub fn admin_only() -> Self {
        Self::default()
    }

    pub fn everyone() -> Self {
        Self {
            role: Some(DefaultRole::Everyone),
            ..Self::default()
        }
    }

    pub fn any_role() -> Self {
        Self {
            role: Some(DefaultRole::Any),
            ..Self::default()
        }
    }

    pub fn with_permissions(caps: &[Capability]) -> Self {
        Self {
            permissions: caps.to_vec(),
            ..Self::default()
        }
    }

    pub fn in_guilds(mut self, guilds: &[u64]) -> Self {
        self.guilds = Some(guilds.to_vec());
        self
    }
}

/// Why a command invocation was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Maintenance flag is set; distinguishable so callers can explain.
    BotSleeping,
    /// Automated accounts never run commands. Mapped to silence.
    BotAccount,
    NotAvailableInThisGuild,
    MissingPermissions,
}

impl DenyReason {
    /// Stable user-facing copy, `None` for denials that stay silent.
    pub fn message(&self) -> Option<&'static str> {
        match self {
            DenyReason::BotSleeping => Some("Bot is currently unavailable for commands."),
            DenyReason::BotAccount => None,
            DenyReason::NotAvailableInThisGuild => {
                Some("This command is guild specific in the bot, and is unavailable here.")
            }
            DenyReason::MissingPermissions => {
                Some("You do not have permissions to use that command.")
            }
        }
    }
}

/// Outcome of an authorization check. Denials are values, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny(DenyReason),
}

/// A role held by a principal, in the order the platform reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleRef {
    pub id: u64,
    /// Whether this is the guild's implicit everyone role.
    pub everyone: bool,
}

/// The acting account, abstracted so the engine runs against both live
/// serenity members and test fakes.
pub trait Principal {
    fn id(&self) -> u64;
    fn is_owner(&self) -> bool;
    fn is_bot(&self) -> bool;
    /// Holds the guild administrator capability.
    fn is_admin(&self) -> bool;
    /// Held roles, including the implicit everyone role.
    fn roles(&self) -> &[RoleRef];
    /// Capability flags held in the channel the command was invoked in.
    fn held_capabilities(&self) -> HashSet<Capability>;
}

/// Target of a role-rule mutation, resolved by the command layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleTarget {
    Any,
    None,
    Everyone,
    Role(u64),
}

impl RoleTarget {
    fn into_entry(self, guild_id: u64) -> RoleEntry {
        match self {
            RoleTarget::Any => RoleEntry::Any,
            RoleTarget::None => RoleEntry::None,
            // The everyone role shares the guild's id.
            RoleTarget::Everyone => RoleEntry::Id(guild_id),
            RoleTarget::Role(id) => RoleEntry::Id(id),
        }
    }
}

/// Resolves whether a principal may invoke a command path in a guild, and
/// mutates the guild's override rules.
#[derive(Clone)]
pub struct Authorizer {
    cache: SettingsCache,
    sleeping: Arc<AtomicBool>,
}

impl Authorizer {
    pub fn new(cache: SettingsCache, sleeping: Arc<AtomicBool>) -> Self {
        Self { cache, sleeping }
    }

    /// The decision cascade, evaluated in fixed order with the first decisive
    /// check winning. Storage failures propagate; every ordinary outcome is a
    /// [`Verdict`].
    pub fn resolve(
        &self,
        guild_id: u64,
        who: &dyn Principal,
        path: &str,
        policy: &CommandPolicy,
    ) -> Result<Verdict, PermError> {
        // Bot owner is permitted all commands, even while sleeping.
        if who.is_owner() {
            return Ok(Verdict::Allow);
        }

        if self.sleeping.load(Ordering::Relaxed) {
            return Ok(Verdict::Deny(DenyReason::BotSleeping));
        }

        // Bots can't run commands, no matter what rules say.
        if who.is_bot() {
            return Ok(Verdict::Deny(DenyReason::BotAccount));
        }

        if who.is_admin() {
            return Ok(Verdict::Allow);
        }

        if let Some(guilds) = &policy.guilds {
            if !guilds.contains(&guild_id) {
                return Ok(Verdict::Deny(DenyReason::NotAvailableInThisGuild));
            }
        }

        let tree = self.load_tree(guild_id)?;
        let node = tree.node(path);

        if node.users.contains(&who.id()) {
            return Ok(Verdict::Allow);
        }

        for role in who.roles() {
            if node.roles.contains(&RoleEntry::Id(role.id)) {
                return Ok(Verdict::Allow);
            }

            // Any role except everyone; an everyone grant is covered above
            // since the everyone role carries the guild id.
            if node.roles.contains(&RoleEntry::Any) && !role.everyone {
                return Ok(Verdict::Allow);
            }

            // No roles set for the command: fall back to the compiled-in
            // default. A lingering `none` marker keeps the list non-empty and
            // blocks this branch.
            if node.roles.is_empty() {
                match policy.role {
                    Some(DefaultRole::Any) if !role.everyone => return Ok(Verdict::Allow),
                    Some(DefaultRole::Everyone) => return Ok(Verdict::Allow),
                    _ => {}
                }
            }
        }

        let held = who.held_capabilities();

        for perm in &node.permissions {
            if let PermEntry::Cap(cap) = perm {
                if held.contains(cap) {
                    return Ok(Verdict::Allow);
                }
            }
        }

        if node.permissions.is_empty() {
            // A default flag missing from the held snapshot counts as not
            // held.
            for cap in &policy.permissions {
                if held.contains(cap) {
                    return Ok(Verdict::Allow);
                }
            }
        }

        Ok(Verdict::Deny(DenyReason::MissingPermissions))
    }

    /// The current rules for a command path. Validates the path first.
    pub fn rules(
        &self,
        registry: &CommandRegistry,
        guild_id: u64,
        path: &str,
    ) -> Result<RuleNode, PermError> {
        registry.ensure_valid(path)?;
        Ok(self.load_tree(guild_id)?.node(path))
    }

    pub fn add_user(
        &self,
        registry: &CommandRegistry,
        guild_id: u64,
        path: &str,
        user_id: u64,
    ) -> Result<(), PermError> {
        registry.ensure_valid(path)?;
        let mut tree = self.load_tree(guild_id)?;
        let node = tree.node_mut(path);
        if !node.users.contains(&user_id) {
            node.users.push(user_id);
        }
        self.save_tree(guild_id, &tree)
    }

    /// Removes a user entry; returns how many user entries remain so the
    /// caller can announce a fallback to the compiled-in default.
    pub fn remove_user(
        &self,
        registry: &CommandRegistry,
        guild_id: u64,
        path: &str,
        user_id: u64,
    ) -> Result<usize, PermError> {
        registry.ensure_valid(path)?;
        let mut tree = self.load_tree(guild_id)?;
        let node = tree.node_mut(path);
        node.users.retain(|id| *id != user_id);
        let remaining = node.users.len();
        self.save_tree(guild_id, &tree)?;
        Ok(remaining)
    }

    pub fn add_role(
        &self,
        registry: &CommandRegistry,
        guild_id: u64,
        path: &str,
        target: RoleTarget,
    ) -> Result<(), PermError> {
        registry.ensure_valid(path)?;
        let entry = target.into_entry(guild_id);
        let mut tree = self.load_tree(guild_id)?;
        let node = tree.node_mut(path);
        if !node.roles.contains(&entry) {
            node.roles.push(entry);
        }
        // A concrete grant replaces a lingering default-disable marker; the
        // two cannot coexist on one axis.
        if entry != RoleEntry::None {
            node.roles.retain(|r| *r != RoleEntry::None);
        }
        self.save_tree(guild_id, &tree)
    }

    pub fn remove_role(
        &self,
        registry: &CommandRegistry,
        guild_id: u64,
        path: &str,
        target: RoleTarget,
    ) -> Result<usize, PermError> {
        registry.ensure_valid(path)?;
        let entry = target.into_entry(guild_id);
        let mut tree = self.load_tree(guild_id)?;
        let node = tree.node_mut(path);
        node.roles.retain(|r| *r != entry);
        let remaining = node.roles.len();
        self.save_tree(guild_id, &tree)?;
        Ok(remaining)
    }

    pub fn add_permission(
        &self,
        registry: &CommandRegistry,
        guild_id: u64,
        path: &str,
        entry: PermEntry,
    ) -> Result<(), PermError> {
        registry.ensure_valid(path)?;
        let mut tree = self.load_tree(guild_id)?;
        let node = tree.node_mut(path);
        if !node.permissions.contains(&entry) {
            node.permissions.push(entry);
        }
        if entry != PermEntry::None {
            node.permissions.retain(|p| *p != PermEntry::None);
        }
        self.save_tree(guild_id, &tree)
    }

    pub fn remove_permission(
        &self,
        registry: &CommandRegistry,
        guild_id: u64,
        path: &str,
        entry: PermEntry,
    ) -> Result<usize, PermError> {
        registry.ensure_valid(path)?;
        let mut tree = self.load_tree(guild_id)?;
        let node = tree.node_mut(path);
        node.permissions.retain(|p| *p != entry);
        let remaining = node.permissions.len();
        self.save_tree(guild_id, &tree)?;
        Ok(remaining)
    }

    /// Re-reads the rule tree from the store. Never served stale: rules may
    /// have been mutated since the last call.
    fn load_tree(&self, guild_id: u64) -> Result<RuleTree, PermError> {
        match self.cache.refresh(FEATURE, guild_id, RULES_KEY)? {
            Some(SettingValue::Text(json)) => Ok(serde_json::from_str(&json)?),
            _ => Ok(RuleTree::default()),
        }
    }

    /// Persists the whole tree as one blob; rule objects are never partially
    /// written.
    fn save_tree(&self, guild_id: u64, tree: &RuleTree) -> Result<(), PermError> {
        let json = serde_json::to_string(tree)?;
        self.cache
            .set(FEATURE, guild_id, RULES_KEY, SettingValue::Text(json));
        self.cache.write(FEATURE, guild_id)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;
    use crate::registry::CommandNode;

    const GUILD: u64 = 1000;

    struct Fake {
        id: u64,
        owner: bool,
        bot: bool,
        admin: bool,
        roles: Vec<RoleRef>,
        caps: HashSet<Capability>,
    }

    impl Fake {
        fn member(id: u64) -> Self {
            Self {
                id,
                owner: false,
                bot: false,
                admin: false,
                roles: vec![RoleRef {
                    id: GUILD,
                    everyone: true,
                }],
                caps: HashSet::new(),
            }
        }

        fn with_role(mut self, role_id: u64) -> Self {
            self.roles.push(RoleRef {
                id: role_id,
                everyone: false,
            });
            self
        }

        fn with_cap(mut self, cap: Capability) -> Self {
            self.caps.insert(cap);
            self
        }
    }

    impl Principal for Fake {
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

    fn registry() -> CommandRegistry {
        fn leaf(name: &str) -> CommandNode {
            CommandNode {
                name: name.to_string(),
                enabled: true,
                children: vec![],
            }
        }
        CommandRegistry::new(vec![
            leaf("ping"),
            CommandNode {
                name: "mod".to_string(),
                enabled: true,
                children: vec![leaf("edit_channel")],
            },
            CommandNode {
                name: "karma".to_string(),
                enabled: true,
                children: vec![leaf("upvote")],
            },
        ])
    }

    fn authorizer() -> (Authorizer, Arc<AtomicBool>) {
        let store = Store::in_memory();
        store.open(GUILD).unwrap();
        let cache = SettingsCache::new(store);
        cache.load_one("permissions", GUILD).unwrap();
        let sleeping = Arc::new(AtomicBool::new(false));
        (Authorizer::new(cache, sleeping.clone()), sleeping)
    }

    #[test]
    fn test_everyone_default_allows_plain_member() {
        let (auth, _) = authorizer();
        let verdict = auth
            .resolve(GUILD, &Fake::member(5), "ping", &CommandPolicy::everyone())
            .unwrap();
        assert_eq!(verdict, Verdict::Allow);
    }

    #[test]
    fn test_admin_only_default_denies_plain_member() {
        let (auth, _) = authorizer();
        let verdict = auth
            .resolve(GUILD, &Fake::member(5), "ping", &CommandPolicy::admin_only())
            .unwrap();
        assert_eq!(verdict, Verdict::Deny(DenyReason::MissingPermissions));
    }

    #[test]
    fn test_owner_allowed_even_while_sleeping() {
        let (auth, sleeping) = authorizer();
        sleeping.store(true, Ordering::Relaxed);

        let mut owner = Fake::member(5);
        owner.owner = true;
        let verdict = auth
            .resolve(GUILD, &owner, "ping", &CommandPolicy::admin_only())
            .unwrap();
        assert_eq!(verdict, Verdict::Allow);

        // Everyone else is turned away with the distinguishable reason.
        let verdict = auth
            .resolve(GUILD, &Fake::member(6), "ping", &CommandPolicy::everyone())
            .unwrap();
        assert_eq!(verdict, Verdict::Deny(DenyReason::BotSleeping));
    }

    #[test]
    fn test_bot_account_denied_despite_explicit_grant() {
        let (auth, _) = authorizer();
        auth.add_user(&registry(), GUILD, "ping", 5).unwrap();

        let mut bot = Fake::member(5);
        bot.bot = true;
        let verdict = auth
            .resolve(GUILD, &bot, "ping", &CommandPolicy::everyone())
            .unwrap();
        assert_eq!(verdict, Verdict::Deny(DenyReason::BotAccount));
    }

    #[test]
    fn test_admin_allowed_unconditionally() {
        let (auth, _) = authorizer();
        let mut admin = Fake::member(5);
        admin.admin = true;
        let verdict = auth
            .resolve(GUILD, &admin, "ping", &CommandPolicy::admin_only())
            .unwrap();
        assert_eq!(verdict, Verdict::Allow);
    }

    #[test]
    fn test_guild_restriction() {
        let (auth, _) = authorizer();
        let policy = CommandPolicy::everyone().in_guilds(&[2000]);
        let verdict = auth
            .resolve(GUILD, &Fake::member(5), "ping", &policy)
            .unwrap();
        assert_eq!(verdict, Verdict::Deny(DenyReason::NotAvailableInThisGuild));

        let policy = CommandPolicy::everyone().in_guilds(&[GUILD]);
        let verdict = auth
            .resolve(GUILD, &Fake::member(5), "ping", &policy)
            .unwrap();
        assert_eq!(verdict, Verdict::Allow);
    }

    #[test]
    fn test_explicit_user_grant() {
        let (auth, _) = authorizer();
        auth.add_user(&registry(), GUILD, "mod edit_channel", 555)
            .unwrap();

        let verdict = auth
            .resolve(
                GUILD,
                &Fake::member(555),
                "mod edit_channel",
                &CommandPolicy::admin_only(),
            )
            .unwrap();
        assert_eq!(verdict, Verdict::Allow);

        // Principal 999 falls through role and permission checks to a deny.
        let verdict = auth
            .resolve(
                GUILD,
                &Fake::member(999),
                "mod edit_channel",
                &CommandPolicy::admin_only(),
            )
            .unwrap();
        assert_eq!(verdict, Verdict::Deny(DenyReason::MissingPermissions));
    }

    #[test]
    fn test_any_role_excludes_everyone() {
        let (auth, _) = authorizer();
        auth.add_role(&registry(), GUILD, "karma upvote", RoleTarget::Any)
            .unwrap();

        // Only the implicit everyone role: denied.
        let verdict = auth
            .resolve(
                GUILD,
                &Fake::member(5),
                "karma upvote",
                &CommandPolicy::admin_only(),
            )
            .unwrap();
        assert_eq!(verdict, Verdict::Deny(DenyReason::MissingPermissions));

        // An additional distinct role: allowed.
        let verdict = auth
            .resolve(
                GUILD,
                &Fake::member(5).with_role(42),
                "karma upvote",
                &CommandPolicy::admin_only(),
            )
            .unwrap();
        assert_eq!(verdict, Verdict::Allow);
    }

    #[test]
    fn test_everyone_grant_uses_guild_id() {
        let (auth, _) = authorizer();
        auth.add_role(&registry(), GUILD, "ping", RoleTarget::Everyone)
            .unwrap();

        let verdict = auth
            .resolve(GUILD, &Fake::member(5), "ping", &CommandPolicy::admin_only())
            .unwrap();
        assert_eq!(verdict, Verdict::Allow);
    }

    #[test]
    fn test_explicit_role_grant() {
        let (auth, _) = authorizer();
        auth.add_role(&registry(), GUILD, "ping", RoleTarget::Role(42))
            .unwrap();

        let verdict = auth
            .resolve(
                GUILD,
                &Fake::member(5).with_role(42),
                "ping",
                &CommandPolicy::admin_only(),
            )
            .unwrap();
        assert_eq!(verdict, Verdict::Allow);

        let verdict = auth
            .resolve(
                GUILD,
                &Fake::member(5).with_role(43),
                "ping",
                &CommandPolicy::admin_only(),
            )
            .unwrap();
        assert_eq!(verdict, Verdict::Deny(DenyReason::MissingPermissions));
    }

    #[test]
    fn test_any_role_default_fallback() {
        let (auth, _) = authorizer();

        // Everyone-only member: the any-role default excludes everyone.
        let verdict = auth
            .resolve(GUILD, &Fake::member(5), "ping", &CommandPolicy::any_role())
            .unwrap();
        assert_eq!(verdict, Verdict::Deny(DenyReason::MissingPermissions));

        let verdict = auth
            .resolve(
                GUILD,
                &Fake::member(5).with_role(42),
                "ping",
                &CommandPolicy::any_role(),
            )
            .unwrap();
        assert_eq!(verdict, Verdict::Allow);
    }

    #[test]
    fn test_none_marker_blocks_role_default() {
        let (auth, _) = authorizer();
        auth.add_role(&registry(), GUILD, "ping", RoleTarget::None)
            .unwrap();

        // Default would allow everyone, but the marker disables the fallback.
        let verdict = auth
            .resolve(GUILD, &Fake::member(5), "ping", &CommandPolicy::everyone())
            .unwrap();
        assert_eq!(verdict, Verdict::Deny(DenyReason::MissingPermissions));
    }

    #[test]
    fn test_adding_concrete_role_strips_none_marker() {
        let (auth, _) = authorizer();
        let reg = registry();
        auth.add_role(&reg, GUILD, "ping", RoleTarget::None).unwrap();
        auth.add_role(&reg, GUILD, "ping", RoleTarget::Role(42))
            .unwrap();

        let node = auth.rules(&reg, GUILD, "ping").unwrap();
        assert_eq!(node.roles, vec![RoleEntry::Id(42)]);
    }

    #[test]
    fn test_permission_grant_and_default() {
        let (auth, _) = authorizer();
        let reg = registry();

        // Explicit grant beats an admin-only default.
        auth.add_permission(&reg, GUILD, "ping", PermEntry::parse("manage_messages").unwrap())
            .unwrap();
        let verdict = auth
            .resolve(
                GUILD,
                &Fake::member(5).with_cap(Capability::ManageMessages),
                "ping",
                &CommandPolicy::admin_only(),
            )
            .unwrap();
        assert_eq!(verdict, Verdict::Allow);

        // Not holding the flag still denies.
        let verdict = auth
            .resolve(GUILD, &Fake::member(5), "ping", &CommandPolicy::admin_only())
            .unwrap();
        assert_eq!(verdict, Verdict::Deny(DenyReason::MissingPermissions));
    }

    #[test]
    fn test_permission_default_fallback() {
        let (auth, _) = authorizer();
        let policy = CommandPolicy::with_permissions(&[Capability::KickMembers]);

        let verdict = auth
            .resolve(
                GUILD,
                &Fake::member(5).with_cap(Capability::KickMembers),
                "ping",
                &policy,
            )
            .unwrap();
        assert_eq!(verdict, Verdict::Allow);

        // Flag absent from the held snapshot counts as not held: deny, not a
        // crash.
        let verdict = auth
            .resolve(GUILD, &Fake::member(5), "ping", &policy)
            .unwrap();
        assert_eq!(verdict, Verdict::Deny(DenyReason::MissingPermissions));
    }

    #[test]
    fn test_none_marker_blocks_permission_default() {
        let (auth, _) = authorizer();
        let reg = registry();
        auth.add_permission(&reg, GUILD, "ping", PermEntry::None)
            .unwrap();

        let policy = CommandPolicy::with_permissions(&[Capability::KickMembers]);
        let verdict = auth
            .resolve(
                GUILD,
                &Fake::member(5).with_cap(Capability::KickMembers),
                "ping",
                &policy,
            )
            .unwrap();
        assert_eq!(verdict, Verdict::Deny(DenyReason::MissingPermissions));
    }

    #[test]
    fn test_add_remove_round_trip() {
        let (auth, _) = authorizer();
        let reg = registry();

        let before = auth.rules(&reg, GUILD, "ping").unwrap();
        auth.add_role(&reg, GUILD, "ping", RoleTarget::Role(42))
            .unwrap();
        let remaining = auth
            .remove_role(&reg, GUILD, "ping", RoleTarget::Role(42))
            .unwrap();
        assert_eq!(remaining, 0);

        let after = auth.rules(&reg, GUILD, "ping").unwrap();
        assert_eq!(before.roles, after.roles);

        // An emptied list reactivates the default exactly like a list that
        // never had entries.
        let verdict = auth
            .resolve(GUILD, &Fake::member(5), "ping", &CommandPolicy::everyone())
            .unwrap();
        assert_eq!(verdict, Verdict::Allow);
    }

    #[test]
    fn test_mutation_rejects_unknown_command() {
        let (auth, _) = authorizer();
        let err = auth
            .add_user(&registry(), GUILD, "no such command", 5)
            .unwrap_err();
        assert!(matches!(err, PermError::InvalidCommand(_)));

        // Nothing was persisted.
        let node = auth.load_tree(GUILD).unwrap().node("no such command");
        assert_eq!(node, RuleNode::default());
    }

    #[test]
    fn test_rules_persist_across_reload() {
        let store = Store::in_memory();
        store.open(GUILD).unwrap();
        let cache = SettingsCache::new(store);
        cache.load_one("permissions", GUILD).unwrap();
        let sleeping = Arc::new(AtomicBool::new(false));
        let auth = Authorizer::new(cache.clone(), sleeping.clone());

        auth.add_user(&registry(), GUILD, "ping", 555).unwrap();

        // A second authorizer over the same cache sees the persisted tree.
        let auth2 = Authorizer::new(cache, sleeping);
        let verdict = auth2
            .resolve(
                GUILD,
                &Fake::member(555),
                "ping",
                &CommandPolicy::admin_only(),
            )
            .unwrap();
        assert_eq!(verdict, Verdict::Allow);
    }

    #[test]
    fn test_legacy_blob_shape() {
        // The on-disk shape written by earlier deployments: scaffolding
        // nodes with explicit empty lists and mixed-type role entries.
        let json = r#"{
            "permissions": {
                "_users": [],
                "_roles": [],
                "_permissions": [],
                "add": {
                    "_users": [555],
                    "_roles": [1000, "any", "none"],
                    "_permissions": ["manage_roles", "none"]
                }
            }
        }"#;
        let tree: RuleTree = serde_json::from_str(json).unwrap();
        let node = tree.node("permissions add");
        assert_eq!(node.users, vec![555]);
        assert_eq!(
            node.roles,
            vec![RoleEntry::Id(1000), RoleEntry::Any, RoleEntry::None]
        );
        assert_eq!(
            node.permissions,
            vec![PermEntry::Cap(Capability::ManageRoles), PermEntry::None]
        );

        // Missing intermediate levels read as empty rather than failing.
        assert_eq!(tree.node("permissions add role"), RuleNode::default());

        let back = serde_json::to_string(&tree).unwrap();
        let reparsed: RuleTree = serde_json::from_str(&back).unwrap();
        assert_eq!(tree, reparsed);
    }
}
