use std::{env, fs, io};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Environment variable holding the deletion-token pepper. Never read from
/// the config file so it cannot end up committed next to the database.
pub const PEPPER_ENV: &str = "ZKPASTE_PEPPER";

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "ZKPASTE_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub pow: PowConfig,
    pub rate_limit: RateLimitConfig,
    pub paste: PasteConfig,
    pub chat: ChatConfig,
    pub storage: StorageConfig,

    /// Process-wide secret prepended to every delete-auth hash. Injected from
    /// the environment at load time, immutable afterwards.
    #[serde(skip)]
    pub pepper: Vec<u8>,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
    pub reaper_interval_seconds: u64,
    /// Trust the leftmost `X-Forwarded-For` entry as the client identity.
    /// Only sound behind the assumed front proxy.
    pub trust_forwarded_for: bool,
    /// Relaxes the pepper requirement for local development.
    pub dev_mode: bool,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct PowConfig {
    pub enabled: bool,
    /// Required leading zero bits in SHA-256(challenge || nonce).
    pub difficulty: u32,
    pub ttl_seconds: i64,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub capacity: u32,
    pub refill_per_minute: u32,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct PasteConfig {
    /// Cap on the decoded ciphertext, not the base64 text.
    pub max_size_bytes: usize,
    pub id_length: usize,
    pub max_expiration_seconds: i64,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub max_messages_per_paste: i64,
    pub max_message_size_bytes: usize,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            pow: PowConfig::default(),
            rate_limit: RateLimitConfig::default(),
            paste: PasteConfig::default(),
            chat: ChatConfig::default(),
            storage: StorageConfig::default(),
            pepper: Vec::new(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8350".to_string(),
            reaper_interval_seconds: 3600,
            trust_forwarded_for: false,
            dev_mode: false,
        }
    }
}

impl Default for PowConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            difficulty: 10,
            ttl_seconds: 180,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 30,
            refill_per_minute: 30,
        }
    }
}

impl Default for PasteConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 1_048_576,
            id_length: 10,
            max_expiration_seconds: 2_592_000,
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_messages_per_paste: 50,
            max_message_size_bytes: 16_384,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "zkpaste.db".to_string(),
        }
    }
}

impl Config {
    /// Load the config file (all defaults when absent), pull the pepper from
    /// the environment and validate the tunables. Called once at startup.
    pub fn load() -> Result<Self> {
        let path = env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = match fs::read_to_string(&path) {
            Ok(raw) => toml::from_str(&raw).with_context(|| format!("parsing {path}"))?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => Config::default(),
            Err(err) => return Err(err).with_context(|| format!("reading {path}")),
        };
        config.pepper = pepper_from(env::var(PEPPER_ENV).ok(), config.server.dev_mode)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.pow.difficulty > 24 {
            bail!("pow.difficulty must be within 0..=24");
        }
        if self.pow.ttl_seconds <= 0 {
            bail!("pow.ttl_seconds must be positive");
        }
        if self.rate_limit.capacity == 0 {
            bail!("rate_limit.capacity must be at least 1");
        }
        if self.paste.id_length < 8 {
            bail!("paste.id_length below 8 makes id collisions likely");
        }
        if self.paste.max_expiration_seconds <= 0 {
            bail!("paste.max_expiration_seconds must be positive");
        }
        if self.chat.max_messages_per_paste <= 0 {
            bail!("chat.max_messages_per_paste must be positive");
        }
        Ok(())
    }
}

fn pepper_from(raw: Option<String>, dev_mode: bool) -> Result<Vec<u8>> {
    let raw = raw.unwrap_or_default();
    let trivial = raw.trim().is_empty() || raw == "change-me";
    if trivial && !dev_mode {
        bail!("{PEPPER_ENV} must be set to a non-trivial secret outside development mode");
    }
    Ok(raw.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.pow.enabled);
        assert_eq!(config.pow.difficulty, 10);
        assert_eq!(config.rate_limit.capacity, 30);
        assert_eq!(config.paste.max_size_bytes, 1_048_576);
        assert_eq!(config.paste.id_length, 10);
        assert_eq!(config.chat.max_messages_per_paste, 50);
        assert_eq!(config.server.reaper_interval_seconds, 3600);
    }

    #[test]
    fn partial_file_overrides_only_named_keys() {
        let config: Config = toml::from_str(
            r#"
[pow]
enabled = false

[paste]
max_size_bytes = 1024
"#,
        )
        .unwrap();
        assert!(!config.pow.enabled);
        assert_eq!(config.paste.max_size_bytes, 1024);
        assert_eq!(config.pow.difficulty, 10);
        assert_eq!(config.paste.id_length, 10);
    }

    #[test]
    fn pepper_required_outside_dev_mode() {
        assert!(pepper_from(None, false).is_err());
        assert!(pepper_from(Some("".to_string()), false).is_err());
        assert!(pepper_from(Some("   ".to_string()), false).is_err());
        assert!(pepper_from(Some("change-me".to_string()), false).is_err());
        assert_eq!(
            pepper_from(Some("s3cret-pepper".to_string()), false).unwrap(),
            b"s3cret-pepper"
        );
    }

    #[test]
    fn dev_mode_allows_missing_pepper() {
        assert_eq!(pepper_from(None, true).unwrap(), b"");
    }

    #[test]
    fn difficulty_range_is_enforced() {
        let mut config = Config::default();
        config.pow.difficulty = 25;
        assert!(config.validate().is_err());
        config.pow.difficulty = 24;
        assert!(config.validate().is_ok());
    }
}
