use dotenvy::dotenv;
use std::env;
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    pub discord_token: String,
    pub database_url: String,
    /// Base URL of the public site linked from solution embeds.
    pub site_url: String,
    pub status_message: String,
    pub dev_guild_id: Option<u64>,
    pub register_commands: bool,
    pub api_timeout_secs: u64,

    // Background channel indexer settings
    pub indexing_enabled: bool,
    pub indexing_interval: Duration,
    pub indexing_max_concurrent_servers: usize,
    pub indexing_message_limit: Option<usize>,
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
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "data/overflow.db".to_string()),
            site_url: env::var("SITE_URL")
                .unwrap_or_else(|_| "https://www.answeroverflow.com".to_string())
                .trim_end_matches('/')
                .to_string(),
            status_message: env::var("STATUS_MESSAGE")
                .unwrap_or_else(|_| "Indexing your help channels".to_string()),
            dev_guild_id: env::var("DEV_GUILD_ID").ok().and_then(|id| id.parse().ok()),
            register_commands: env::var("REGISTER_COMMANDS")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            api_timeout_secs: env::var("API_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),

            indexing_enabled: env::var("INDEXING_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            indexing_interval: humantime::parse_duration(
                &env::var("INDEXING_INTERVAL").unwrap_or_else(|_| "6h".to_string()),
            )
            .map_err(|e| anyhow::anyhow!("INDEXING_INTERVAL must be a duration like `6h`: {}", e))?,
            indexing_max_concurrent_servers: env::var("INDEXING_MAX_CONCURRENT_SERVERS")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .unwrap_or(2),
            indexing_message_limit: env::var("INDEXING_MESSAGE_LIMIT")
                .ok()
                .and_then(|limit| limit.parse().ok()),
        })
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("database_url", &self.database_url)
            .field("site_url", &self.site_url)
            .field("status_message", &self.status_message)
            .field("dev_guild_id", &self.dev_guild_id)
            .field("register_commands", &self.register_commands)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("indexing_enabled", &self.indexing_enabled)
            .field(
                "indexing_interval",
                &humantime::format_duration(self.indexing_interval).to_string(),
            )
            .field(
                "indexing_max_concurrent_servers",
                &self.indexing_max_concurrent_servers,
            )
            .field("indexing_message_limit", &self.indexing_message_limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_config_logic() {
        // 1. Test missing vars
        env::remove_var("DISCORD_TOKEN");
        let result = Config::build();
        assert!(
            result.is_err(),
            "Should fail when required vars are missing"
        );

        // 2. Test defaults
        env::set_var("DISCORD_TOKEN", "test_token");
        env::remove_var("INDEXING_INTERVAL");
        let config = Config::build().unwrap();
        assert_eq!(config.discord_token, "test_token");
        assert_eq!(config.indexing_interval, Duration::from_secs(6 * 3600));
        assert_eq!(config.indexing_max_concurrent_servers, 2);

        // 3. Test interval parsing
        env::set_var("INDEXING_INTERVAL", "15m");
        let config = Config::build().unwrap();
        assert_eq!(config.indexing_interval, Duration::from_secs(900));
        env::set_var("INDEXING_INTERVAL", "soon");
        assert!(Config::build().is_err());

        // 4. Test debug redaction
        env::set_var("INDEXING_INTERVAL", "1h");
        let config_redacted = Config::build().unwrap();
        let debug_output = format!("{:?}", config_redacted);
        assert!(!debug_output.contains("test_token"));
        assert!(debug_output.contains("[REDACTED]"));

        // Cleanup
        env::remove_var("DISCORD_TOKEN");
        env::remove_var("INDEXING_INTERVAL");
    }
}
