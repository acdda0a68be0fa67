use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use std::fs;

use crate::credential::KEY_LENGTH;

/// Env var that overrides the config-file credential key.
pub const CREDENTIAL_KEY_ENV: &str = "SWIPESHARE_CREDENTIAL_KEY";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    #[serde(default)]
    pub swipes: SwipeConfig,
    #[serde(default)]
    pub credential: CredentialConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SwipeConfig {
    /// Weekly swipe allotment granted lazily to unseen users.
    pub default_allotment: u32,
    /// Redemption window applied when a transfer has no explicit deadline.
    pub redemption_window_hours: i64,
    /// Match shortlist size handed to the selector.
    pub match_shortlist: usize,
}

impl Default for SwipeConfig {
    fn default() -> Self {
        Self {
            default_allotment: 14,
            redemption_window_hours: 24,
            match_shortlist: 10,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct CredentialConfig {
    /// Hex-encoded 256-bit AES key. There is deliberately no default:
    /// startup fails rather than silently operating insecurely.
    pub secret_key_hex: Option<String>,
}

impl AppConfig {
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read config file: {}", config_path))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(content).context("failed to parse config yaml")
    }

    /// Resolve the credential key. The env var wins over the config file;
    /// a missing, non-hex, or wrong-length key is a startup error.
    pub fn credential_key(&self) -> anyhow::Result<[u8; KEY_LENGTH]> {
        let hex_key = std::env::var(CREDENTIAL_KEY_ENV)
            .ok()
            .or_else(|| self.credential.secret_key_hex.clone());

        let Some(hex_key) = hex_key else {
            bail!(
                "no credential key configured: set {} or credential.secret_key_hex",
                CREDENTIAL_KEY_ENV
            );
        };

        let bytes = hex::decode(hex_key.trim()).context("credential key is not valid hex")?;
        let key: [u8; KEY_LENGTH] = bytes.as_slice().try_into().map_err(|_| {
            anyhow::anyhow!(
                "credential key must be exactly {} bytes ({} hex chars)",
                KEY_LENGTH,
                KEY_LENGTH * 2
            )
        })?;

        Ok(key)
    }
}
