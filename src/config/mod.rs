//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

mod cli;

pub use cli::{CliArgs, Command, CreateArgs, NameArgs, Overrides, ReplaceArgs};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "fequery";
const ENV_PREFIX: &str = "FEQUERY";
const DEFAULT_LOCATION: &str = "http://localhost:8080/";
const DEFAULT_DEV_OVERRIDE_URL: &str = "http://localhost:3010";
const DEFAULT_API_SUFFIX: &str = "/api";
const DEFAULT_AUTH_SUFFIX: &str = "/auth";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub(crate) const DEFAULT_GC_INTERVAL_SECS: u64 = 300;
pub(crate) const DEFAULT_GC_SWEEP_INTERVAL_SECS: u64 = 60;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub transport: TransportSettings,
    pub cache: CacheSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone)]
pub struct TransportSettings {
    /// Page location the base URLs are derived from.
    pub location: Url,
    pub development: bool,
    /// Used instead of the location when running standalone in development.
    pub dev_override_url: Url,
    pub api_suffix: String,
    pub auth_suffix: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub gc_interval: Duration,
    pub gc_sweep_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Parse the process arguments and load settings for them.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let cli = CliArgs::parse();
    let settings = load(&cli)?;
    Ok((cli, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    transport: RawTransportSettings,
    cache: RawCacheSettings,
    logging: RawLoggingSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(location) = overrides.location.as_ref() {
            self.transport.location = Some(location.clone());
        }
        if let Some(development) = overrides.development {
            self.transport.development = Some(development);
        }
        if let Some(url) = overrides.dev_override_url.as_ref() {
            self.transport.dev_override_url = Some(url.clone());
        }
        if let Some(seconds) = overrides.timeout_seconds {
            self.transport.timeout_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            transport,
            cache,
            logging,
        } = raw;

        let transport = build_transport_settings(transport)?;
        let cache = build_cache_settings(cache)?;
        let logging = build_logging_settings(logging)?;

        Ok(Self {
            transport,
            cache,
            logging,
        })
    }
}

fn build_transport_settings(
    transport: RawTransportSettings,
) -> Result<TransportSettings, LoadError> {
    let location = parse_url(
        transport.location.as_deref().unwrap_or(DEFAULT_LOCATION),
        "transport.location",
    )?;
    let dev_override_url = parse_url(
        transport
            .dev_override_url
            .as_deref()
            .unwrap_or(DEFAULT_DEV_OVERRIDE_URL),
        "transport.dev_override_url",
    )?;

    let api_suffix = suffix(transport.api_suffix, DEFAULT_API_SUFFIX, "transport.api_suffix")?;
    let auth_suffix = suffix(
        transport.auth_suffix,
        DEFAULT_AUTH_SUFFIX,
        "transport.auth_suffix",
    )?;

    let timeout_secs = transport.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "transport.timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(TransportSettings {
        location,
        development: transport.development.unwrap_or(false),
        dev_override_url,
        api_suffix,
        auth_suffix,
        timeout: Duration::from_secs(timeout_secs),
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let gc_interval = cache.gc_interval_seconds.unwrap_or(DEFAULT_GC_INTERVAL_SECS);

    let sweep = cache
        .gc_sweep_interval_seconds
        .unwrap_or(DEFAULT_GC_SWEEP_INTERVAL_SECS);
    if sweep == 0 {
        return Err(LoadError::invalid(
            "cache.gc_sweep_interval_seconds",
            "must be greater than zero",
        ));
    }

    Ok(CacheSettings {
        gc_interval: Duration::from_secs(gc_interval),
        gc_sweep_interval: Duration::from_secs(sweep),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn parse_url(value: &str, key: &'static str) -> Result<Url, LoadError> {
    let trimmed = value.trim();
    let url = Url::parse(trimmed)
        .map_err(|err| LoadError::invalid(key, format!("failed to parse `{trimmed}`: {err}")))?;
    if url.cannot_be_a_base() {
        return Err(LoadError::invalid(key, "must be a hierarchical URL"));
    }
    Ok(url)
}

fn suffix(value: Option<String>, default: &str, key: &'static str) -> Result<String, LoadError> {
    let value = value.unwrap_or_else(|| default.to_string());
    let trimmed = value.trim();
    if trimmed.trim_matches('/').is_empty() {
        return Err(LoadError::invalid(key, "path must not be empty"));
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawTransportSettings {
    location: Option<String>,
    development: Option<bool>,
    dev_override_url: Option<String>,
    api_suffix: Option<String>,
    auth_suffix: Option<String>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    gc_interval_seconds: Option<u64>,
    gc_sweep_interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}
