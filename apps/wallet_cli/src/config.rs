use std::{fs, path::Path, time::Duration};

use anyhow::{bail, Context};
use serde::Deserialize;
use url::Url;
use wallet_core::SessionConfig;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub rpc_url: String,
    pub log_level: String,
    pub connect_timeout_ms: u64,
    pub balance_timeout_ms: u64,
    pub network_timeout_ms: u64,
    pub reconnect_debounce_ms: u64,
    pub detection_interval_ms: u64,
    pub detection_attempts: u32,
    /// How often the JSON-RPC provider is polled for chain/account changes.
    pub watch_interval_ms: u64,
    pub history_len: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".into(),
            log_level: "info".into(),
            connect_timeout_ms: 10_000,
            balance_timeout_ms: 5_000,
            network_timeout_ms: 5_000,
            reconnect_debounce_ms: 100,
            detection_interval_ms: 1_000,
            detection_attempts: 10,
            watch_interval_ms: 4_000,
            history_len: 20,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> anyhow::Result<()> {
        let url = Url::parse(&self.rpc_url)
            .with_context(|| format!("invalid rpc_url '{}'", self.rpc_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("rpc_url must start with http:// or https://, got '{}'", self.rpc_url);
        }
        if self.connect_timeout_ms == 0 || self.balance_timeout_ms == 0 || self.network_timeout_ms == 0 {
            bail!("provider timeouts must be greater than zero");
        }
        if self.detection_interval_ms == 0 || self.watch_interval_ms == 0 {
            bail!("polling intervals must be greater than zero");
        }
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            account_request_timeout: Duration::from_millis(self.connect_timeout_ms),
            balance_timeout: Duration::from_millis(self.balance_timeout_ms),
            network_timeout: Duration::from_millis(self.network_timeout_ms),
            reconnect_debounce: Duration::from_millis(self.reconnect_debounce_ms),
            detection_interval: Duration::from_millis(self.detection_interval_ms),
            detection_attempts: self.detection_attempts,
        }
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms)
    }
}

/// Defaults, then `path` if it exists, then environment overrides.
pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    let mut settings = if path.exists() {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;
        toml::from_str::<Settings>(&raw)
            .with_context(|| format!("failed to parse config file '{}'", path.display()))?
    } else {
        Settings::default()
    };

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn parse_override<T: std::str::FromStr>(key: &str, raw: String) -> Option<T> {
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("ignoring unparseable value for {key}: '{raw}'");
            None
        }
    }
}

pub fn apply_env_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("WALLET_RPC_URL") {
        settings.rpc_url = v;
    }
    if let Some(v) = lookup("APP__RPC_URL") {
        settings.rpc_url = v;
    }

    if let Some(v) = lookup("APP__LOG_LEVEL") {
        settings.log_level = v;
    }

    let numeric: [(&str, &mut u64); 6] = [
        ("APP__CONNECT_TIMEOUT_MS", &mut settings.connect_timeout_ms),
        ("APP__BALANCE_TIMEOUT_MS", &mut settings.balance_timeout_ms),
        ("APP__NETWORK_TIMEOUT_MS", &mut settings.network_timeout_ms),
        ("APP__RECONNECT_DEBOUNCE_MS", &mut settings.reconnect_debounce_ms),
        ("APP__DETECTION_INTERVAL_MS", &mut settings.detection_interval_ms),
        ("APP__WATCH_INTERVAL_MS", &mut settings.watch_interval_ms),
    ];
    for (key, slot) in numeric {
        if let Some(value) = lookup(key).and_then(|raw| parse_override(key, raw)) {
            *slot = value;
        }
    }

    if let Some(value) = lookup("APP__DETECTION_ATTEMPTS")
        .and_then(|raw| parse_override("APP__DETECTION_ATTEMPTS", raw))
    {
        settings.detection_attempts = value;
    }
    if let Some(value) =
        lookup("APP__HISTORY_LEN").and_then(|raw| parse_override("APP__HISTORY_LEN", raw))
    {
        settings.history_len = value;
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
