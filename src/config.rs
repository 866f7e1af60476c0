use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use std::fs;

use crate::token::{DEFAULT_TTL_SECONDS, MAX_TTL_SECONDS};
use crate::wallet::DEFAULT_CURRENCY;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    /// PostgreSQL connection URL. Absent means the in-process store.
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub token: TokenConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

/// Pool sizing for the PostgreSQL backend
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DatabaseConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

fn default_max_connections() -> u32 {
    20
}

fn default_acquire_timeout_ms() -> u64 {
    5_000
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone)]
pub struct TokenConfig {
    /// HMAC key for signing QR payloads
    #[serde(default)]
    pub secret: String,
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"<redacted>")
            .field("ttl_seconds", &self.ttl_seconds)
            .finish()
    }
}

fn default_ttl_seconds() -> u64 {
    DEFAULT_TTL_SECONDS
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WalletConfig {
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            currency: default_currency(),
        }
    }
}

impl AppConfig {
    /// Read `config/<env>.yaml`, then apply environment overrides.
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        let mut config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path))?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// `QR_SECRET_KEY`, `QR_EXPIRY_SECONDS` and `DATABASE_URL` win over the file.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<()> {
        if let Some(secret) = lookup("QR_SECRET_KEY") {
            self.token.secret = secret;
        }
        if let Some(ttl) = lookup("QR_EXPIRY_SECONDS") {
            self.token.ttl_seconds = ttl
                .trim()
                .parse()
                .with_context(|| format!("QR_EXPIRY_SECONDS is not a number: {}", ttl))?;
        }
        if let Some(url) = lookup("DATABASE_URL").filter(|u| !u.is_empty()) {
            self.postgres_url = Some(url);
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.token.secret.is_empty() {
            bail!("token.secret is empty; set it in the config file or QR_SECRET_KEY");
        }
        if self.token.ttl_seconds == 0 || self.token.ttl_seconds > MAX_TTL_SECONDS {
            bail!(
                "token.ttl_seconds must be between 1 and {}, got {}",
                MAX_TTL_SECONDS,
                self.token.ttl_seconds
            );
        }
        if self.wallet.currency.trim().is_empty() {
            bail!("wallet.currency is empty");
        }
        if self.database.max_connections == 0 {
            bail!("database.max_connections must be positive");
        }
        Ok(())
    }
}
