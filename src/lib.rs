pub mod backup;
pub mod cache;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod perms;
pub mod registry;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Custom data passed to all commands
pub struct Data {
    pub config: config::Config,
    pub store: db::Store,
    pub cache: cache::SettingsCache,
    pub perms: perms::Authorizer,
    /// Process-wide maintenance flag, toggled by the owner sleep/wake commands.
    pub sleeping: Arc<AtomicBool>,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
