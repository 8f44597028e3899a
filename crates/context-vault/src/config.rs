// context-vault/src/config.rs

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::sync::DEFAULT_COMPACTION_SLACK;

#[derive(Debug, Clone)]
pub struct VaultConfig {
    pub db_path: PathBuf,
    pub agents_root: PathBuf,
    pub watch_interval_seconds: u64,
    pub recovery_messages: usize,
    pub busy_timeout_ms: u64,
    pub compaction_slack: usize,
}

impl VaultConfig {
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            warn!("Failed to load .env file: {}. Using system environment variables.", e);
        } else {
            info!("Loaded environment variables from .env file");
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset keys take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));

        let db_path = lookup("VAULT_DB_PATH")
            .map(|p| expand_home(&p, &home))
            .unwrap_or_else(|| home.join(".context-vault").join("vault.db"));
        let agents_root = lookup("VAULT_AGENTS_ROOT")
            .map(|p| expand_home(&p, &home))
            .unwrap_or_else(|| home.join(".openclaw").join("agents"));

        Ok(Self {
            db_path,
            agents_root,
            watch_interval_seconds: parse_or(&lookup, "VAULT_WATCH_INTERVAL_SECONDS", 30)?,
            recovery_messages: parse_or(&lookup, "VAULT_RECOVERY_MESSAGES", 50)?,
            busy_timeout_ms: parse_or(&lookup, "VAULT_BUSY_TIMEOUT_MS", 5000)?,
            compaction_slack: parse_or(&lookup, "VAULT_COMPACTION_SLACK", DEFAULT_COMPACTION_SLACK)?,
        })
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.watch_interval_seconds.max(1))
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn print_config(&self) {
        info!("Current Configuration:");
        info!("- Database: {}", self.db_path.display());
        info!("- Agents Root: {}", self.agents_root.display());
        info!("- Watch Interval: {}s", self.watch_interval_seconds);
        info!("- Recovery Messages: {}", self.recovery_messages);
        info!("- Busy Timeout: {}ms", self.busy_timeout_ms);
        info!("- Compaction Slack: {}", self.compaction_slack);
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        None => Ok(default),
    }
}

fn expand_home(raw: &str, home: &std::path::Path) -> PathBuf {
    match raw.strip_prefix("~/") {
        Some(rest) => home.join(rest),
        None if raw == "~" => home.to_path_buf(),
        None => PathBuf::from(raw),
    }
}
