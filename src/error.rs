use thiserror::Error;

/// Failures from the per-guild settings store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable for guild {guild}: {source}")]
    StorageUnavailable {
        guild: u64,
        #[source]
        source: rusqlite::Error,
    },

    /// A migration step failed; the recorded schema version was not advanced
    /// past the last committed step.
    #[error("schema migration to version {version} failed for guild {guild}: {source}")]
    Migration {
        guild: u64,
        version: i64,
        #[source]
        source: rusqlite::Error,
    },

    #[error("guild {0} has no open database handle")]
    UnknownGuild(u64),

    #[error("cannot read database directory {dir}: {source}")]
    Directory {
        dir: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Sql(#[from] rusqlite::Error),
}

/// Failures from permission rule mutations.
///
/// Deny outcomes from `resolve` are not errors; see [`crate::perms::Verdict`].
#[derive(Debug, Error)]
pub enum PermError {
    #[error("`{0}` is not a command I know about")]
    InvalidCommand(String),

    #[error("`{0}` is not a recognized permission")]
    UnknownCapability(String),

    #[error("could not resolve `{0}` to a role in this server")]
    UnknownRole(String),

    #[error("could not resolve `{0}` to a member of this server")]
    UnknownMember(String),

    #[error("corrupt permission rules for this server: {0}")]
    MalformedRules(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] StoreError),
}
