use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context};
use serde::Deserialize;
use url::Url;

pub const SETTINGS_FILE: &str = "shiptrack.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_url: String,
    pub token_path: PathBuf,
    pub success_banner_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:5000".into(),
            token_path: default_token_path(),
            success_banner_ms: 3000,
            request_timeout_secs: 30,
        }
    }
}

impl Settings {
    pub fn base_url(&self) -> anyhow::Result<Url> {
        parse_base_url(&self.api_url)
    }

    pub fn success_banner_delay(&self) -> Duration {
        Duration::from_millis(self.success_banner_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    api_url: Option<String>,
    token_path: Option<PathBuf>,
    success_banner_ms: Option<u64>,
    request_timeout_secs: Option<u64>,
}

fn default_token_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("shiptrack")
        .join("token")
}

/// Defaults, then `shiptrack.toml` in the working directory, then the environment.
pub fn load_settings() -> anyhow::Result<Settings> {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

pub fn load_settings_from(
    file: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    if file.exists() {
        let raw = fs::read_to_string(file)
            .with_context(|| format!("failed to read settings file '{}'", file.display()))?;
        let file_cfg: FileSettings = toml::from_str(&raw)
            .with_context(|| format!("invalid settings file '{}'", file.display()))?;
        if let Some(v) = file_cfg.api_url {
            settings.api_url = v;
        }
        if let Some(v) = file_cfg.token_path {
            settings.token_path = v;
        }
        if let Some(v) = file_cfg.success_banner_ms {
            settings.success_banner_ms = v;
        }
        if let Some(v) = file_cfg.request_timeout_secs {
            settings.request_timeout_secs = v;
        }
    }

    if let Some(v) = env("SHIPTRACK_API_URL") {
        settings.api_url = v;
    }
    if let Some(v) = env("APP__API_URL") {
        settings.api_url = v;
    }
    if let Some(v) = env("APP__TOKEN_PATH") {
        settings.token_path = PathBuf::from(v);
    }
    if let Some(v) = env("APP__SUCCESS_BANNER_MS") {
        settings.success_banner_ms = v
            .parse()
            .with_context(|| format!("APP__SUCCESS_BANNER_MS must be an integer, got '{v}'"))?;
    }
    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS") {
        settings.request_timeout_secs = v
            .parse()
            .with_context(|| format!("APP__REQUEST_TIMEOUT_SECS must be an integer, got '{v}'"))?;
    }

    settings.base_url()?;
    Ok(settings)
}

fn parse_base_url(raw: &str) -> anyhow::Result<Url> {
    let url = Url::parse(raw.trim()).with_context(|| format!("invalid api url '{raw}'"))?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        bail!("api url '{raw}' must be an http(s) base url");
    }
    Ok(url)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
