use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Core {
    #[serde(default = "default_core_url")]
    pub url: String,
    #[serde(default = "default_core_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Requests per second allowed against the naming service (unlimited when unset).
    #[serde(default)]
    pub qps_limit: Option<u32>,
}

fn default_core_url() -> String {
    "http://localhost:6264".to_string()
}
fn default_core_timeout_seconds() -> u64 {
    30
}

impl Default for Core {
    fn default() -> Self {
        Self {
            url: default_core_url(),
            timeout_seconds: default_core_timeout_seconds(),
            qps_limit: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Pipeline {
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    #[serde(default = "default_page_fetch_concurrency")]
    pub page_fetch_concurrency: usize,
    #[serde(default = "default_zonefile_workers")]
    pub zonefile_workers: usize,
    #[serde(default = "default_profile_workers")]
    pub profile_workers: usize,
    #[serde(default = "default_persist_workers")]
    pub persist_workers: usize,
    /// Capacity of each hand-off queue between stages.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_stats_interval_seconds")]
    pub stats_interval_seconds: u64,
}

fn default_page_size() -> u64 {
    100
}
fn default_page_fetch_concurrency() -> usize {
    10
}
fn default_zonefile_workers() -> usize {
    4
}
fn default_profile_workers() -> usize {
    8
}
fn default_persist_workers() -> usize {
    4
}
fn default_queue_capacity() -> usize {
    1000
}
fn default_stats_interval_seconds() -> u64 {
    30
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            page_fetch_concurrency: default_page_fetch_concurrency(),
            zonefile_workers: default_zonefile_workers(),
            profile_workers: default_profile_workers(),
            persist_workers: default_persist_workers(),
            queue_capacity: default_queue_capacity(),
            stats_interval_seconds: default_stats_interval_seconds(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    100
}
fn default_max_delay_ms() -> u64 {
    5000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Profiles {
    #[serde(default = "default_profile_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_profile_timeout_seconds() -> u64 {
    10
}

impl Default for Profiles {
    fn default() -> Self {
        Self {
            timeout_seconds: default_profile_timeout_seconds(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Database {
    /// Falls back to `DATABASE_URL`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

impl Default for Database {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub core: Core,
    #[serde(default)]
    pub pipeline: Pipeline,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub profiles: Profiles,
    #[serde(default)]
    pub database: Database,
    #[serde(default)]
    pub log: LogSettings,
}

impl Settings {
    /// Load settings from `path` (optional file) plus `BNS__SECTION__KEY`
    /// environment variables, then apply the shorthand overrides.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(Environment::with_prefix("BNS").separator("__"))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;

        if let Ok(url) = env::var("BNS_CORE_URL") {
            let trimmed = url.trim();
            if !trimmed.is_empty() {
                settings.core.url = trimmed.to_string();
            }
        }
        if let Ok(raw) = env::var("BNS_PAGE_FETCH_CONCURRENCY") {
            match raw.trim().parse::<usize>() {
                Ok(n) => settings.pipeline.page_fetch_concurrency = n,
                Err(e) => eprintln!("Ignoring BNS_PAGE_FETCH_CONCURRENCY={:?}: {}", raw, e),
            }
        }
        if settings.database.url.is_none() {
            settings.database.url = env::var("DATABASE_URL").ok();
        }

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.pipeline;
        let checks = [
            ("pipeline.page_size", p.page_size as usize),
            ("pipeline.page_fetch_concurrency", p.page_fetch_concurrency),
            ("pipeline.zonefile_workers", p.zonefile_workers),
            ("pipeline.profile_workers", p.profile_workers),
            ("pipeline.persist_workers", p.persist_workers),
            ("pipeline.queue_capacity", p.queue_capacity),
            ("retry.max_attempts", self.retry.max_attempts as usize),
        ];
        for (key, value) in checks {
            if value == 0 {
                return Err(ConfigError::Message(format!("{} must be at least 1", key)));
            }
        }
        url::Url::parse(&self.core.url)
            .map_err(|e| ConfigError::Message(format!("core.url is invalid: {}", e)))?;
        Ok(())
    }
}
