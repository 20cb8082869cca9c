//! Runtime configuration loaded from environment variables.
//!
//! `BOT_TOKEN` is required; everything else has a default. Call [`RubikaConfig::validate`]
//! before starting the poller: invalid values are fatal at startup.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use storage::default_offset_path;

use crate::client::DEFAULT_API_URL;
use crate::poller::ExecutionMode;

pub struct RubikaConfig {
    pub bot_token: String,
    pub api_url: String,
    pub log_file: String,
    /// File path, or a `sqlite:` URL.
    pub offset_store: String,
    pub poll_limit: u32,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    pub execution_mode: ExecutionMode,
    pub antispam_threshold: usize,
    pub antispam_window: Duration,
    pub antispam_punish: Duration,
    pub antispam_data_file: Option<PathBuf>,
    pub max_blocking_calls: Option<usize>,
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{name} has an invalid value: {raw}")),
        _ => Ok(default),
    }
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl RubikaConfig {
    /// Loads from the environment: BOT_TOKEN required, the rest optional.
    pub fn from_env() -> Result<Self> {
        let bot_token = env::var("BOT_TOKEN").map_err(|_| anyhow::anyhow!("BOT_TOKEN not set"))?;
        Self::from_env_with_token(bot_token)
    }

    /// Like [`from_env`](Self::from_env) but with an explicit token (e.g. from the CLI).
    pub fn from_env_with_token(bot_token: String) -> Result<Self> {
        let mut config = Self::with_token(bot_token);

        if let Some(url) = optional_var("RUBIKA_API_URL") {
            config.api_url = url;
        }
        if let Some(log_file) = optional_var("LOG_FILE") {
            config.log_file = log_file;
        }
        if let Some(store) = optional_var("OFFSET_STORE") {
            config.offset_store = store;
        }
        config.poll_limit = parse_var("POLL_LIMIT", config.poll_limit)?;
        config.poll_interval =
            Duration::from_millis(parse_var("POLL_INTERVAL_MS", 500u64)?);
        config.request_timeout =
            Duration::from_secs(parse_var("REQUEST_TIMEOUT_SECS", 20u64)?);
        config.backoff_initial =
            Duration::from_millis(parse_var("BACKOFF_INITIAL_MS", 500u64)?);
        config.backoff_max = Duration::from_millis(parse_var("BACKOFF_MAX_MS", 30_000u64)?);
        config.execution_mode = parse_var("EXECUTION_MODE", config.execution_mode)?;
        config.antispam_threshold = parse_var("ANTISPAM_THRESHOLD", config.antispam_threshold)?;
        config.antispam_window =
            Duration::from_secs(parse_var("ANTISPAM_WINDOW_SECS", 10u64)?);
        config.antispam_punish =
            Duration::from_secs(parse_var("ANTISPAM_PUNISH_SECS", 300u64)?);
        config.antispam_data_file = optional_var("ANTISPAM_DATA_FILE").map(PathBuf::from);
        config.max_blocking_calls = optional_var("MAX_BLOCKING_CALLS")
            .map(|raw| {
                raw.trim()
                    .parse::<usize>()
                    .with_context(|| format!("MAX_BLOCKING_CALLS has an invalid value: {raw}"))
            })
            .transpose()?;

        Ok(config)
    }

    /// Defaults for everything but the token.
    pub fn with_token(bot_token: String) -> Self {
        let offset_store = default_offset_path(&bot_token).display().to_string();
        Self {
            bot_token,
            api_url: DEFAULT_API_URL.to_string(),
            log_file: "logs/rbot.log".to_string(),
            offset_store,
            poll_limit: 50,
            poll_interval: Duration::from_millis(500),
            request_timeout: Duration::from_secs(20),
            backoff_initial: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
            execution_mode: ExecutionMode::Cooperative,
            antispam_threshold: 10,
            antispam_window: Duration::from_secs(10),
            antispam_punish: Duration::from_secs(300),
            antispam_data_file: None,
            max_blocking_calls: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.bot_token.trim().is_empty() {
            anyhow::bail!("BOT_TOKEN is empty");
        }
        if reqwest::Url::parse(&self.api_url).is_err() {
            anyhow::bail!("RUBIKA_API_URL is not a valid URL: {}", self.api_url);
        }
        if self.poll_limit == 0 {
            anyhow::bail!("POLL_LIMIT must be at least 1");
        }
        if self.request_timeout.is_zero() {
            anyhow::bail!("REQUEST_TIMEOUT_SECS must be greater than zero");
        }
        if self.backoff_initial.is_zero() || self.backoff_max < self.backoff_initial {
            anyhow::bail!("BACKOFF_INITIAL_MS must be > 0 and not above BACKOFF_MAX_MS");
        }
        if self.antispam_threshold == 0
            || self.antispam_window.is_zero()
            || self.antispam_punish.is_zero()
        {
            anyhow::bail!("ANTISPAM_THRESHOLD, ANTISPAM_WINDOW_SECS and ANTISPAM_PUNISH_SECS must be > 0");
        }
        if self.max_blocking_calls == Some(0) {
            anyhow::bail!("MAX_BLOCKING_CALLS must be at least 1 when set");
        }
        Ok(())
    }
}
