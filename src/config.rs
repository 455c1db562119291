use dotenvy::dotenv;
use std::env;

#[derive(Clone)]
pub struct Config {
    pub discord_token: String,
    pub owner_id: Option<u64>,
    /// Directory holding one `<guild_id>.db3` file per guild.
    pub database_dir: String,
    pub default_prefix: String,
    pub status_message: String,
    // Nightly backup settings
    pub backup_enabled: bool,
    pub backup_dir: String,
    pub backup_hour_utc: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        Ok(Config {
            discord_token: env::var("DISCORD_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN must be set"))?,
            owner_id: env::var("OWNER_ID").ok().and_then(|id| id.parse().ok()),
            database_dir: env::var("DATABASE_DIR").unwrap_or_else(|_| "db".to_string()),
            default_prefix: env::var("DEFAULT_PREFIX").unwrap_or_else(|_| ".".to_string()),
            status_message: env::var("STATUS_MESSAGE")
                .unwrap_or_else(|_| "Watching the server".to_string()),
            backup_enabled: env::var("BACKUP_ENABLED")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            backup_dir: env::var("BACKUP_DIR").unwrap_or_else(|_| "backups".to_string()),
            backup_hour_utc: env::var("BACKUP_HOUR_UTC")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
        })
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("owner_id", &self.owner_id)
            .field("database_dir", &self.database_dir)
            .field("default_prefix", &self.default_prefix)
            .field("status_message", &self.status_message)
            .field("backup_enabled", &self.backup_enabled)
            .field("backup_dir", &self.backup_dir)
            .field("backup_hour_utc", &self.backup_hour_utc)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_config_logic() {
        // 1. Test missing token
        env::remove_var("DISCORD_TOKEN");
        let result = Config::build();
        assert!(result.is_err(), "Should fail when DISCORD_TOKEN is missing");

        // 2. Test defaults
        env::set_var("DISCORD_TOKEN", "test_token");
        let config = Config::build().unwrap();
        assert_eq!(config.database_dir, "db");
        assert_eq!(config.default_prefix, ".");
        assert_eq!(config.backup_hour_utc, 5);
        assert!(!config.backup_enabled);

        // 3. Test debug redaction
        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("test_token"));
        assert!(debug_output.contains("[REDACTED]"));

        // Cleanup
        env::remove_var("DISCORD_TOKEN");
    }
}
