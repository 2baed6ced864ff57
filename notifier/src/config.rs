use anyhow::{bail, Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_SERVER_URLS: [&str; 2] = ["http://localhost:5000", "http://127.0.0.1:5000"];
pub const DEFAULT_WINDOWS: [u32; 3] = [15, 30, 60];

/// How a reminder window is matched against the minutes left before an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowMatch {
    /// Fire only when the whole minutes left equal the window.
    #[default]
    Exact,
    /// Fire anywhere in the poll interval leading up to the window, once.
    Range,
}

impl FromStr for WindowMatch {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(WindowMatch::Exact),
            "range" => Ok(WindowMatch::Range),
            other => bail!("unknown window match mode {:?} (expected exact or range)", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Base URLs tried in order during discovery
    pub server_urls: Vec<String>,
    pub probe_timeout: Duration,
    pub fetch_timeout: Duration,
    /// Lead times in minutes, sorted ascending
    pub windows: Vec<u32>,
    pub poll_interval: Duration,
    pub initial_delay: Duration,
    pub window_match: WindowMatch,
    /// Icon name or path for desktop notifications
    pub icon: Option<String>,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            server_urls: DEFAULT_SERVER_URLS.iter().map(|s| s.to_string()).collect(),
            probe_timeout: Duration::from_millis(5000),
            fetch_timeout: Duration::from_millis(10_000),
            windows: DEFAULT_WINDOWS.to_vec(),
            poll_interval: Duration::from_secs(300), // 5 minutes
            initial_delay: Duration::from_secs(60),
            window_match: WindowMatch::Exact,
            icon: None,
        }
    }
}

impl NotifierConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key lookup, falling back to defaults for
    /// unset keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let server_urls = match get("NOTIFIER_SERVER_URLS") {
            Some(raw) => parse_server_urls(&raw).context("NOTIFIER_SERVER_URLS is invalid")?,
            None => defaults.server_urls,
        };

        let probe_timeout = match get("NOTIFIER_PROBE_TIMEOUT_MS") {
            Some(raw) => Duration::from_millis(
                parse_positive(&raw)
                    .context("NOTIFIER_PROBE_TIMEOUT_MS must be a positive number")?,
            ),
            None => defaults.probe_timeout,
        };

        let fetch_timeout = match get("NOTIFIER_FETCH_TIMEOUT_MS") {
            Some(raw) => Duration::from_millis(
                parse_positive(&raw)
                    .context("NOTIFIER_FETCH_TIMEOUT_MS must be a positive number")?,
            ),
            None => defaults.fetch_timeout,
        };

        let windows = match get("NOTIFIER_WINDOWS") {
            Some(raw) => parse_windows(&raw).context("NOTIFIER_WINDOWS is invalid")?,
            None => defaults.windows,
        };

        let poll_interval = match get("NOTIFIER_POLL_INTERVAL_SECS") {
            Some(raw) => Duration::from_secs(
                parse_positive(&raw)
                    .context("NOTIFIER_POLL_INTERVAL_SECS must be a positive number")?,
            ),
            None => defaults.poll_interval,
        };

        let initial_delay = match get("NOTIFIER_INITIAL_DELAY_SECS") {
            Some(raw) => Duration::from_secs(
                raw.trim()
                    .parse::<u64>()
                    .context("NOTIFIER_INITIAL_DELAY_SECS must be a valid number")?,
            ),
            None => defaults.initial_delay,
        };

        let window_match = match get("NOTIFIER_WINDOW_MATCH") {
            Some(raw) => raw
                .parse::<WindowMatch>()
                .context("NOTIFIER_WINDOW_MATCH is invalid")?,
            None => defaults.window_match,
        };

        Ok(Self {
            server_urls,
            probe_timeout,
            fetch_timeout,
            windows,
            poll_interval,
            initial_delay,
            window_match,
            icon: get("NOTIFIER_ICON").map(|s| s.trim().to_string()),
        })
    }

    /// URL to open when the user asks for the calendar and nothing is active yet
    pub fn default_server_url(&self) -> Option<&str> {
        self.server_urls.first().map(String::as_str)
    }
}

fn parse_positive(raw: &str) -> Result<u64> {
    let value = raw.trim().parse::<u64>()?;
    if value == 0 {
        bail!("value must be greater than zero");
    }
    Ok(value)
}

pub fn normalize_base_url(input: &str) -> Result<String> {
    let trimmed = input.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        bail!("server URL is empty");
    }

    let url = reqwest::Url::parse(trimmed)
        .with_context(|| format!("invalid server URL {:?}", trimmed))?;

    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        bail!("server URL {:?} must start with http:// or https://", trimmed);
    }

    Ok(trimmed.to_string())
}

fn parse_server_urls(raw: &str) -> Result<Vec<String>> {
    let urls = raw
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(normalize_base_url)
        .collect::<Result<Vec<_>>>()?;

    if urls.is_empty() {
        bail!("at least one server URL is required");
    }
    Ok(urls)
}

fn parse_windows(raw: &str) -> Result<Vec<u32>> {
    let mut windows = raw
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| {
            let minutes = part
                .trim()
                .parse::<u32>()
                .with_context(|| format!("{:?} is not a number of minutes", part.trim()))?;
            if minutes == 0 {
                bail!("reminder windows must be greater than zero");
            }
            Ok(minutes)
        })
        .collect::<Result<Vec<_>>>()?;

    if windows.is_empty() {
        bail!("at least one reminder window is required");
    }

    windows.sort_unstable();
    windows.dedup();
    Ok(windows)
}
