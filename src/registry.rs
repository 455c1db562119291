use crate::error::PermError;
use crate::{Data, Error};

/// One command in the registry snapshot.
#[derive(Debug, Clone)]
pub struct CommandNode {
    pub name: String,
    pub enabled: bool,
    pub children: Vec<CommandNode>,
}

/// A read-only view of every command the bot exposes, flattened into
/// space-joined hierarchical paths.
///
/// A snapshot is rebuilt from the live command list at every call site rather
/// than cached: commands can be hot-loaded or disabled at runtime, and a stale
/// view would validate rules against commands that no longer exist in that
/// state.
pub struct CommandRegistry {
    roots: Vec<CommandNode>,
}

impl CommandRegistry {
    pub fn new(roots: Vec<CommandNode>) -> Self {
        Self { roots }
    }

    /// Builds a snapshot from the framework's registered commands.
    pub fn from_commands(commands: &[poise::Command<Data, Error>]) -> Self {
        fn convert(cmd: &poise::Command<Data, Error>) -> CommandNode {
            CommandNode {
                name: cmd.name.to_lowercase(),
                // poise has no runtime disable toggle; live snapshots are
                // always enabled.
                enabled: true,
                children: cmd.subcommands.iter().map(convert).collect(),
            }
        }
        Self::new(commands.iter().map(convert).collect())
    }

    /// Whether the path names a currently registered, enabled command.
    pub fn is_valid(&self, path: &str) -> bool {
        fn walk(nodes: &[CommandNode], prefix: &str, path: &str, found: &mut bool) {
            for node in nodes {
                let qualified = if prefix.is_empty() {
                    node.name.clone()
                } else {
                    format!("{prefix} {}", node.name)
                };
                if qualified == path && node.enabled {
                    *found = true;
                    return;
                }
                walk(&node.children, &qualified, path, found);
                if *found {
                    return;
                }
            }
        }

        let path = path.trim().to_lowercase();
        if path.is_empty() {
            return false;
        }
        let mut found = false;
        walk(&self.roots, "", &path, &mut found);
        found
    }

    pub fn ensure_valid(&self, path: &str) -> Result<(), PermError> {
        if self.is_valid(path) {
            Ok(())
        } else {
            Err(PermError::InvalidCommand(path.trim().to_string()))
        }
    }
}
