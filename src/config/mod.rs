use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::logging::DEFAULT_LOG_BUFFER_CAPACITY;
use crate::submission::{SubmissionLimits, DEFAULT_MAX_BATCH_SIZE, DEFAULT_VALIDITY_MINUTES};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub sweeper: SweeperConfig,
    pub log_sink: LogSinkConfig,
    pub analytics: AnalyticsConfig,
    pub submission: SubmissionConfig,
    /// Base for rendered short links, `<base>/r/<id>`
    pub short_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSinkConfig {
    /// Collector URL; when unset events only go to the local buffer
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub buffer_capacity: usize,
    pub source_label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// "Where am I" endpoint for click geolocation; unset disables lookups
    pub geo_lookup_url: Option<String>,
    pub geo_timeout_ms: u64,
    /// Cap on stored click details per link; unset keeps all of them
    pub click_history_limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionConfig {
    pub max_batch_size: usize,
    pub default_validity_minutes: i64,
}

impl SweeperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl AnalyticsConfig {
    pub fn geo_timeout(&self) -> Duration {
        Duration::from_millis(self.geo_timeout_ms)
    }
}

impl SubmissionConfig {
    pub fn limits(&self) -> SubmissionLimits {
        SubmissionLimits {
            max_batch_size: self.max_batch_size,
            default_validity_minutes: self.default_validity_minutes,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                data_dir: PathBuf::from("./linkbox-data"),
            },
            sweeper: SweeperConfig { interval_secs: 30 },
            log_sink: LogSinkConfig {
                endpoint: None,
                token: None,
                buffer_capacity: DEFAULT_LOG_BUFFER_CAPACITY,
                source_label: "Store".to_string(),
            },
            analytics: AnalyticsConfig {
                geo_lookup_url: None,
                geo_timeout_ms: 1500,
                click_history_limit: None,
            },
            submission: SubmissionConfig {
                max_batch_size: DEFAULT_MAX_BATCH_SIZE,
                default_validity_minutes: DEFAULT_VALIDITY_MINUTES,
            },
            short_base_url: "http://localhost:3000".to_string(),
        }
    }
}

/// Non-empty environment variable
fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env_opt(name)
        .map(|v| v.trim().parse::<T>())
        .transpose()
        .with_context(|| format!("{name} has an invalid value"))
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        let data_dir = env_opt("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.storage.data_dir);

        let interval_secs = env_parse::<u64>("SWEEP_INTERVAL_SECS")?
            .unwrap_or(defaults.sweeper.interval_secs);
        if interval_secs == 0 {
            tracing::warn!("SWEEP_INTERVAL_SECS=0 is not allowed, sweeping every second instead");
        }

        let log_sink = LogSinkConfig {
            endpoint: env_opt("LOG_ENDPOINT"),
            token: env_opt("LOG_TOKEN"),
            buffer_capacity: env_parse("LOG_BUFFER_CAPACITY")?
                .unwrap_or(defaults.log_sink.buffer_capacity),
            source_label: env_opt("LOG_SOURCE_LABEL")
                .unwrap_or(defaults.log_sink.source_label),
        };

        let analytics = AnalyticsConfig {
            geo_lookup_url: env_opt("GEO_LOOKUP_URL"),
            geo_timeout_ms: env_parse("GEO_LOOKUP_TIMEOUT_MS")?
                .unwrap_or(defaults.analytics.geo_timeout_ms),
            click_history_limit: env_parse("CLICK_HISTORY_LIMIT")?,
        };

        let submission = SubmissionConfig {
            max_batch_size: env_parse("MAX_BATCH_SIZE")?
                .unwrap_or(defaults.submission.max_batch_size),
            default_validity_minutes: env_parse("DEFAULT_VALIDITY_MINUTES")?
                .unwrap_or(defaults.submission.default_validity_minutes),
        };
        if submission.default_validity_minutes < 0 {
            anyhow::bail!("DEFAULT_VALIDITY_MINUTES must be >= 0");
        }

        let short_base_url = env_opt("SHORT_BASE_URL").unwrap_or(defaults.short_base_url);

        Ok(Config {
            storage: StorageConfig { data_dir },
            sweeper: SweeperConfig { interval_secs },
            log_sink,
            analytics,
            submission,
            short_base_url,
        })
    }
}
