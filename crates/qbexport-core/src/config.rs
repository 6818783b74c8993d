use std::fs;
use std::time::Duration;

use thiserror::Error;
use tracing::error;

use crate::snapshot::SnapshotOptions;

/// Prefix of the variable that points at a secret file holding a value.
pub const FILE_PREFIX: &str = "FILE__";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no host specified, please set QBITTORRENT_HOST")]
    MissingHost,
    #[error("no port specified, please set QBITTORRENT_PORT")]
    MissingPort,
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExporterConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub exporter_port: u16,
    pub log_level: String,
    pub metrics_prefix: String,
    pub log_peers: bool,
    pub log_inactive_peers: bool,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 8080,
            username: "admin".to_string(),
            password: "adminadmin".to_string(),
            exporter_port: 8000,
            log_level: "info".to_string(),
            metrics_prefix: "qbittorrent".to_string(),
            log_peers: false,
            log_inactive_peers: false,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ExporterConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let value = |key: &str| resolve_value(&lookup, key);

        let host = value("QBITTORRENT_HOST").unwrap_or_default();
        if host.is_empty() {
            return Err(ConfigError::MissingHost);
        }

        let port = match value("QBITTORRENT_PORT") {
            Some(raw) => parse_number::<u16>("QBITTORRENT_PORT", &raw)?,
            None => defaults.port,
        };
        if port == 0 {
            return Err(ConfigError::MissingPort);
        }

        let exporter_port = match value("EXPORTER_PORT") {
            Some(raw) => parse_number::<u16>("EXPORTER_PORT", &raw)?,
            None => defaults.exporter_port,
        };

        let request_timeout = match value("QBITTORRENT_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse_number::<u64>("QBITTORRENT_TIMEOUT_SECS", &raw)?),
            None => defaults.request_timeout,
        };

        Ok(Self {
            host,
            port,
            username: value("QBITTORRENT_USER").unwrap_or(defaults.username),
            password: value("QBITTORRENT_PASS").unwrap_or(defaults.password),
            exporter_port,
            log_level: value("EXPORTER_LOG_LEVEL").unwrap_or(defaults.log_level),
            metrics_prefix: value("METRICS_PREFIX").unwrap_or(defaults.metrics_prefix),
            log_peers: value("LOG_PEERS").is_some_and(|v| is_true(&v)),
            log_inactive_peers: value("LOG_INACTIVE_PEERS").is_some_and(|v| is_true(&v)),
            connect_timeout: defaults.connect_timeout,
            request_timeout,
        })
    }

    pub fn snapshot_options(&self) -> SnapshotOptions {
        SnapshotOptions {
            metrics_prefix: self.metrics_prefix.clone(),
            log_peers: self.log_peers,
            log_inactive_peers: self.log_inactive_peers,
        }
    }

    /// Base URL of the remote control API.
    pub fn base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            format!("{host}:{}", self.port)
        } else {
            format!("http://{host}:{}", self.port)
        }
    }
}

/// Reads `FILE__<key>` first, falling back to `<key>` when the file is unreadable.
fn resolve_value<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = lookup(&format!("{FILE_PREFIX}{key}")) {
        match fs::read_to_string(&path) {
            Ok(contents) => return Some(contents.trim().to_string()),
            Err(err) => error!(%key, %path, error = %err, "unable to read secret file"),
        }
    }
    lookup(key)
}

fn parse_number<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
    })
}

fn is_true(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}
