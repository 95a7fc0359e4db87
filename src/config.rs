//! Bot and guild configuration

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::error::UserFacing;
use crate::tcg::DEFAULT_REROLL_LIMIT;

pub const TOKEN_VAR: &str = "DISCORD_TOKEN";
pub const DATA_DIR_VAR: &str = "RENTARA_DATA_DIR";
pub const CHALLENGE_TIMEOUT_VAR: &str = "RENTARA_CHALLENGE_TIMEOUT_SECS";
pub const PICK_TIMEOUT_VAR: &str = "RENTARA_PICK_TIMEOUT_SECS";
pub const BOOSTER_COOLDOWN_VAR: &str = "RENTARA_BOOSTER_COOLDOWN_SECS";
pub const REROLL_LIMIT_VAR: &str = "RENTARA_REROLL_LIMIT";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },

    #[error("Verification is not set up for this server")]
    VerificationNotConfigured,
}

impl UserFacing for ConfigError {
    fn title(&self) -> String {
        "Not configured".to_string()
    }

    fn message(&self) -> String {
        format!("{self}.")
    }

    fn remedy(&self) -> Option<String> {
        matches!(self, Self::VerificationNotConfigured)
            .then(|| "A moderator can run `/verify setup`.".to_string())
    }
}

/// Process-wide settings read from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotConfig {
    pub token: String,
    pub data_dir: PathBuf,
    pub challenge_timeout_secs: u64,
    pub pick_timeout_secs: u64,
    pub booster_cooldown_secs: u64,
    pub reroll_limit: u32,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            data_dir: PathBuf::from("data"),
            challenge_timeout_secs: 300,
            pick_timeout_secs: 120,
            booster_cooldown_secs: 86_400,
            reroll_limit: DEFAULT_REROLL_LIMIT,
        }
    }
}

impl BotConfig {
    /// Read the configuration from the process environment
    ///
    /// # Errors
    /// Returns an error if the token is missing or a number does not parse
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the configuration through a variable lookup
    ///
    /// # Errors
    /// Returns an error if the token is missing or a number does not parse
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let token = lookup(TOKEN_VAR)
            .filter(|token| !token.trim().is_empty())
            .ok_or(ConfigError::Missing(TOKEN_VAR))?;

        Ok(Self {
            token,
            data_dir: lookup(DATA_DIR_VAR).map_or(defaults.data_dir, PathBuf::from),
            challenge_timeout_secs: parse_var(
                &lookup,
                CHALLENGE_TIMEOUT_VAR,
                defaults.challenge_timeout_secs,
            )?,
            pick_timeout_secs: parse_var(&lookup, PICK_TIMEOUT_VAR, defaults.pick_timeout_secs)?,
            booster_cooldown_secs: parse_var(
                &lookup,
                BOOSTER_COOLDOWN_VAR,
                defaults.booster_cooldown_secs,
            )?,
            reroll_limit: parse_var(&lookup, REROLL_LIMIT_VAR, defaults.reroll_limit)?,
        })
    }

    #[must_use]
    pub fn challenge_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.challenge_timeout_secs)
    }

    #[must_use]
    pub fn pick_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.pick_timeout_secs)
    }

    /// Challenge deadline as a chrono duration
    #[must_use]
    pub fn challenge_deadline(&self) -> Duration {
        Duration::seconds(i64::try_from(self.challenge_timeout_secs).unwrap_or(i64::MAX))
    }

    /// Card pick window as a chrono duration
    #[must_use]
    pub fn pick_deadline(&self) -> Duration {
        Duration::seconds(i64::try_from(self.pick_timeout_secs).unwrap_or(i64::MAX))
    }

    #[must_use]
    pub fn booster_cooldown(&self) -> Duration {
        Duration::seconds(i64::try_from(self.booster_cooldown_secs).unwrap_or(i64::MAX))
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

/// Guild configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildConfig {
    pub guild_id: u64,
    /// Role granted on approval
    pub verified_role_id: Option<u64>,
    /// Where verification requests are reviewed
    pub verification_channel_id: Option<u64>,
    #[serde(default = "default_verification_questions")]
    pub verification_questions: Vec<String>,
}

impl GuildConfig {
    #[must_use]
    pub fn new(guild_id: u64) -> Self {
        Self {
            guild_id,
            verified_role_id: None,
            verification_channel_id: None,
            verification_questions: default_verification_questions(),
        }
    }

    /// Role and review channel, once both are set
    ///
    /// # Errors
    /// Returns `ConfigError::VerificationNotConfigured` otherwise
    pub fn verification_target(&self) -> Result<(u64, u64), ConfigError> {
        self.verified_role_id
            .zip(self.verification_channel_id)
            .ok_or(ConfigError::VerificationNotConfigured)
    }
}

fn default_verification_questions() -> Vec<String> {
    vec![
        "How did you find this server?".to_string(),
        "Have you read the rules?".to_string(),
        "Tell us a little about yourself".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = BotConfig::from_lookup(lookup(&[(TOKEN_VAR, "abc")])).unwrap();
        assert_eq!(config.token, "abc");
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.challenge_timeout_secs, 300);
        assert_eq!(config.pick_timeout_secs, 120);
        assert_eq!(config.booster_cooldown(), Duration::hours(24));
        assert_eq!(config.reroll_limit, 100);
    }

    #[test]
    fn test_overrides() {
        let config = BotConfig::from_lookup(lookup(&[
            (TOKEN_VAR, "abc"),
            (DATA_DIR_VAR, "/srv/rentara"),
            (CHALLENGE_TIMEOUT_VAR, " 60 "),
            (REROLL_LIMIT_VAR, "5"),
        ]))
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/rentara"));
        assert_eq!(config.challenge_timeout(), std::time::Duration::from_secs(60));
        assert_eq!(config.reroll_limit, 5);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            BotConfig::from_lookup(lookup(&[])),
            Err(ConfigError::Missing(TOKEN_VAR))
        ));
        assert!(matches!(
            BotConfig::from_lookup(lookup(&[(TOKEN_VAR, "abc"), (PICK_TIMEOUT_VAR, "soon")])),
            Err(ConfigError::Invalid { name: PICK_TIMEOUT_VAR, .. })
        ));
    }

    #[test]
    fn test_guild_config_serialization() {
        let mut config = GuildConfig::new(12345);
        config.verified_role_id = Some(777);
        assert!(matches!(
            config.verification_target(),
            Err(ConfigError::VerificationNotConfigured)
        ));
        config.verification_channel_id = Some(888);
        assert_eq!(config.verification_target().unwrap(), (777, 888));

        let serialized = serde_yaml::to_string(&config).expect("Failed to serialize");
        assert!(serialized.contains("guild_id: 12345"));
        assert!(serialized.contains("verified_role_id: 777"));

        // Older files without questions get the defaults
        let deserialized: GuildConfig = serde_yaml::from_str(
            "guild_id: 1\nverified_role_id: null\nverification_channel_id: null\n",
        )
        .expect("Failed to deserialize");
        assert_eq!(deserialized.verification_questions.len(), 3);
    }
}
