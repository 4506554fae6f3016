use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::TimeDelta;
use serde::Deserialize;

use crate::constants::{
    DEFAULT_BAN_DURATION_DAYS, DEFAULT_FILTER_TIMEOUT_MS, MAX_BAN_DURATION_DAYS, MESSAGE_MAX_CHARS,
    OUTBOUND_CHANNEL_SIZE,
};
use crate::errors::ConfigError;
use crate::router::RouterSettings;
use crate::types::Identity;

/// `config.toml`. Every section and key is optional.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub network: NetworkConfig,
    pub limits: LimitsConfig,
    pub moderation: ModerationConfig,
    pub filter: FilterConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub name: String,
    /// Log every inbound chat line at info level instead of debug.
    pub verbose_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            name: "chat".to_owned(),
            verbose_logging: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NetworkConfig {
    pub bind_address: String,
    pub port: u16,
    pub max_connections: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            bind_address: "127.0.0.1".to_owned(),
            port: 7777,
            max_connections: 1024,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_message_length: usize,
    pub outbound_queue: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        LimitsConfig {
            max_message_length: MESSAGE_MAX_CHARS,
            outbound_queue: OUTBOUND_CHANNEL_SIZE,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ModerationConfig {
    pub ban_duration_days: u32,
    /// Identities given the Admin flag at start-up.
    pub admins: Vec<String>,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        ModerationConfig {
            ban_duration_days: DEFAULT_BAN_DURATION_DAYS,
            admins: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FilterConfig {
    pub word_list: Option<PathBuf>,
    pub timeout_ms: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            word_list: None,
            timeout_ms: DEFAULT_FILTER_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON snapshot of the profile store. In-memory only when unset.
    pub path: Option<PathBuf>,
}

impl Config {
    /// Loads and parses the TOML configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Config::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_message_length == 0 {
            return Err(invalid("limits.max_message_length", "must be at least 1"));
        }
        if self.limits.outbound_queue == 0 {
            return Err(invalid("limits.outbound_queue", "must be at least 1"));
        }
        let days = self.moderation.ban_duration_days;
        if !(1..=MAX_BAN_DURATION_DAYS).contains(&days) {
            return Err(invalid(
                "moderation.ban_duration_days",
                format!("must be between 1 and {MAX_BAN_DURATION_DAYS}"),
            ));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.network.bind_address, self.network.port)
    }

    pub fn admins(&self) -> Vec<Identity> {
        self.moderation
            .admins
            .iter()
            .map(|admin| Identity::from(admin.as_str()))
            .collect()
    }

    pub fn router_settings(&self) -> RouterSettings {
        RouterSettings {
            max_message_chars: self.limits.max_message_length,
            filter_timeout: Duration::from_millis(self.filter.timeout_ms),
            ban_duration: TimeDelta::days(i64::from(self.moderation.ban_duration_days)),
            verbose_logging: self.server.verbose_logging,
        }
    }
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:7777");
        assert_eq!(config.limits.max_message_length, 100);
        assert_eq!(config.limits.outbound_queue, 32);
        assert_eq!(config.moderation.ban_duration_days, 3650);
        assert_eq!(config.filter.timeout_ms, 2000);
        assert!(config.store.path.is_none());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::parse(
            r#"
            [network]
            port = 9000

            [moderation]
            admins = ["id-root"]
            ban_duration_days = 7

            [filter]
            word_list = "words.txt"
            "#,
        )
        .unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:9000");
        assert_eq!(config.admins(), vec![Identity::from("id-root")]);
        assert_eq!(config.filter.word_list, Some(PathBuf::from("words.txt")));

        let settings = config.router_settings();
        assert_eq!(settings.ban_duration, TimeDelta::days(7));
        assert_eq!(settings.filter_timeout, Duration::from_millis(2000));
    }

    #[test]
    fn bad_toml_is_a_parse_error() {
        assert!(matches!(
            Config::parse("[network\nport = 1"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            Config::load("/no/such/config.toml"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn out_of_range_limits_are_rejected() {
        for (content, bad_key) in [
            ("[limits]\nmax_message_length = 0", "limits.max_message_length"),
            ("[limits]\noutbound_queue = 0", "limits.outbound_queue"),
            ("[moderation]\nban_duration_days = 0", "moderation.ban_duration_days"),
            ("[moderation]\nban_duration_days = 4000000000", "moderation.ban_duration_days"),
        ] {
            match Config::parse(content) {
                Err(ConfigError::Invalid { key, .. }) => assert_eq!(key, bad_key),
                other => panic!("{content:?} gave {other:?}"),
            }
        }
        assert!(Config::parse("[moderation]\nban_duration_days = 36500").is_ok());
    }
}
