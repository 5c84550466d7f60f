//! Reconciliation engine configuration file and environment overrides.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

pub const RECONCILE_CONFIG_SCHEMA_VERSION: u32 = 1;
pub const RECONCILE_CONFIG_FILE_NAME: &str = "reconcile.json";
pub const BOT_TOKEN_ENV: &str = "MUSTER_DISCORD_BOT_TOKEN";
pub const DEBOUNCE_MS_ENV: &str = "MUSTER_DEBOUNCE_MS";

const MAX_HISTORY_SCAN_LIMIT: usize = 100;

fn default_schema_version() -> u32 {
    RECONCILE_CONFIG_SCHEMA_VERSION
}

fn default_debounce_ms() -> u64 {
    5_000
}

fn default_history_scan_limit() -> usize {
    50
}

fn default_calendar_window_days() -> u32 {
    14
}

fn default_webhook_name() -> String {
    "muster".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
/// Channels scanned for each kind of rendered view.
pub struct ChannelLayout {
    #[serde(default)]
    pub announcements: Vec<String>,
    #[serde(default)]
    pub calendar: Vec<String>,
    #[serde(default)]
    pub schedule: Vec<String>,
    #[serde(default)]
    pub preparation: Vec<String>,
}

impl ChannelLayout {
    fn all(&self) -> impl Iterator<Item = &String> {
        self.announcements
            .iter()
            .chain(&self.calendar)
            .chain(&self.schedule)
            .chain(&self.preparation)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// REST transport settings for the Discord client.
pub struct DiscordApiConfig {
    #[serde(default = "DiscordApiConfig::default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default = "DiscordApiConfig::default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "DiscordApiConfig::default_retry_max_attempts")]
    pub retry_max_attempts: usize,
    #[serde(default = "DiscordApiConfig::default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

impl DiscordApiConfig {
    fn default_api_base() -> String {
        "https://discord.com/api/v10".to_string()
    }

    fn default_request_timeout_ms() -> u64 {
        10_000
    }

    fn default_retry_max_attempts() -> usize {
        3
    }

    fn default_retry_base_delay_ms() -> u64 {
        500
    }
}

impl Default for DiscordApiConfig {
    fn default() -> Self {
        Self {
            api_base: Self::default_api_base(),
            bot_token: None,
            request_timeout_ms: Self::default_request_timeout_ms(),
            retry_max_attempts: Self::default_retry_max_attempts(),
            retry_base_delay_ms: Self::default_retry_base_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Top-level settings for the reconciliation engine.
pub struct ReconcileConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// Quiet period the scheduler waits after the last invalidation.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Messages scanned per channel when looking for related views.
    #[serde(default = "default_history_scan_limit")]
    pub history_scan_limit: usize,
    #[serde(default = "default_calendar_window_days")]
    pub calendar_window_days: u32,
    /// Name of the per-channel webhook used as the secondary identity.
    #[serde(default = "default_webhook_name")]
    pub webhook_name: String,
    #[serde(default)]
    pub channels: ChannelLayout,
    #[serde(default)]
    pub discord: DiscordApiConfig,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            schema_version: RECONCILE_CONFIG_SCHEMA_VERSION,
            debounce_ms: default_debounce_ms(),
            history_scan_limit: default_history_scan_limit(),
            calendar_window_days: default_calendar_window_days(),
            webhook_name: default_webhook_name(),
            channels: ChannelLayout::default(),
            discord: DiscordApiConfig::default(),
        }
    }
}

impl ReconcileConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.max(1))
    }

    pub fn effective_history_scan_limit(&self) -> usize {
        self.history_scan_limit.clamp(1, MAX_HISTORY_SCAN_LIMIT)
    }

    /// Applies `MUSTER_*` environment overrides on top of file values.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(BOT_TOKEN_ENV)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
        {
            self.discord.bot_token = Some(token);
        }
        if let Some(raw) = lookup(DEBOUNCE_MS_ENV) {
            self.debounce_ms = raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("{DEBOUNCE_MS_ENV} must be an integer, got '{raw}'"))?;
        }
        Ok(())
    }
}

/// Loads the configuration file, falling back to defaults when it is absent.
pub fn load_reconcile_config(path: &Path) -> Result<ReconcileConfig> {
    if !path.exists() {
        return Ok(ReconcileConfig::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read reconcile config {}", path.display()))?;
    let parsed = serde_json::from_str::<ReconcileConfig>(&raw)
        .with_context(|| format!("failed to parse reconcile config {}", path.display()))?;
    validate_reconcile_config(&parsed)?;
    Ok(parsed)
}

fn validate_reconcile_config(config: &ReconcileConfig) -> Result<()> {
    if config.schema_version != RECONCILE_CONFIG_SCHEMA_VERSION {
        bail!(
            "unsupported reconcile config schema_version {} (expected {})",
            config.schema_version,
            RECONCILE_CONFIG_SCHEMA_VERSION
        );
    }
    if config.debounce_ms == 0 {
        bail!("reconcile config debounce_ms must be greater than 0");
    }
    if config.webhook_name.trim().is_empty() {
        bail!("reconcile config webhook_name must not be empty");
    }
    if config.channels.all().any(|channel| channel.trim().is_empty()) {
        bail!("reconcile config channel ids must not be empty");
    }
    Ok(())
}
