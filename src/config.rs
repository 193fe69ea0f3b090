//! Engine configuration and logging setup.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub const APP_NAME: &str = "clinic-scheduler";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// File the binary looks for in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "clinic-scheduler.toml";

const MINUTES_PER_DAY: i64 = 24 * 60;
const MAX_NOTICE_HOURS: i64 = 24 * 365;
const MAX_GRACE_MINUTES: i64 = MINUTES_PER_DAY;
const MAX_DUE_DAYS: i64 = 3650;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Slot length and booking granularity.
    pub slot_minutes: i64,
    /// Minimum notice non-admin staff need to cancel.
    pub cancellation_notice_hours: i64,
    /// How long after the slot start a patient counts as a no-show.
    pub no_show_grace_minutes: i64,
    pub invoice_due_days: i64,
    pub max_note_length: usize,
    pub max_reason_length: usize,
    /// SQLite file. In-memory storage when unset.
    pub database_path: Option<PathBuf>,
    pub log_filter: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            slot_minutes: 30,
            cancellation_notice_hours: 24,
            no_show_grace_minutes: 30,
            invoice_due_days: 7,
            max_note_length: 1000,
            max_reason_length: 500,
            database_path: None,
            log_filter: "info".to_string(),
        }
    }
}

impl SchedulerConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: SchedulerConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Loads `path` if it exists, otherwise the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slot_minutes <= 0 || self.slot_minutes > MINUTES_PER_DAY {
            return Err(ConfigError::Invalid {
                field: "slot_minutes",
                reason: format!("{} is not between 1 and {}", self.slot_minutes, MINUTES_PER_DAY),
            });
        }
        for (field, value, max) in [
            ("cancellation_notice_hours", self.cancellation_notice_hours, MAX_NOTICE_HOURS),
            ("no_show_grace_minutes", self.no_show_grace_minutes, MAX_GRACE_MINUTES),
            ("invoice_due_days", self.invoice_due_days, MAX_DUE_DAYS),
        ] {
            if !(0..=max).contains(&value) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("{} is not between 0 and {}", value, max),
                });
            }
        }
        Ok(())
    }
}

/// Install the global fmt subscriber. `RUST_LOG` wins over `fallback`.
pub fn init_tracing(fallback: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    // A second init (tests, embedding apps) keeps the first subscriber.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
