//! Configuration infrastructure
//!
//! Every tuning knob of the sweep lives here. The defaults reproduce the
//! pacing the filter has always used against the job feed; none of them is a
//! protocol requirement, they are empirical values for staying under the
//! host's (undocumented) rate limiter.
//!
//! Loading order: `config/default.toml` → `config/{env}.toml` (optional) →
//! `JOBFEED__SECTION__KEY` environment variables.

#![allow(clippy::struct_excessive_bools)]

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config from file: {source}")]
    FileLoad {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

/// Complete configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub selectors: SelectorConfig,
    pub waiter: WaiterConfig,
    pub throttle: ThrottleConfig,
    pub rounds: RoundConfig,
    pub driver: DriverConfig,
    pub logging: LoggingConfig,
}

/// Host document selectors and marker attributes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Discovery net for card surfaces, tried in order
    pub surface_selectors: Vec<String>,
    /// Attributes carrying the posting id directly
    pub identity_attributes: Vec<String>,
    /// Embedded navigation links the numeric id can be parsed from
    pub link_selectors: Vec<String>,
    /// Surfaces carrying this attribute win the canonical slot
    pub preferred_wrapper_attribute: String,
    pub skeleton_class: String,
    /// Diagnostic tag written on every scanned surface
    pub scan_index_attribute: String,
    /// Title-bearing elements inside a card, tried in order
    pub card_title_selectors: Vec<String>,
    /// Title region of the detail panel, tried in order
    pub panel_title_selectors: Vec<String>,
    /// Descriptive region of the detail panel, tried in order
    pub panel_description_selectors: Vec<String>,
    /// Written as `="true"` on every surface of a flagged item
    pub flag_attribute: String,
    /// Text that marks an item as reposted in the detail panel
    pub flag_marker: String,
    pub applied_state_selectors: Vec<String>,
    pub promoted_selector: String,
}

/// Detail-load polling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaiterConfig {
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
}

/// Pacing, backoff and cooldown
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    pub base_delay_ms: u64,
    /// Upper bound of the random jitter added to `base_delay_ms`
    pub jitter_ms: u64,
    /// Consecutive misses before backing off
    pub miss_threshold: u32,
    /// Backoff per consecutive miss
    pub backoff_step_ms: u64,
    pub max_backoff_ms: u64,
    /// Activations between batch cooldowns
    pub batch_size: u32,
    pub batch_cooldown_ms: u64,
    pub hidden_poll_ms: u64,
}

/// Retry rounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundConfig {
    /// Total rounds including the first pass
    pub max_rounds: u32,
    pub inter_round_delay_ms: u64,
}

/// Trigger sources
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub poll_interval_ms: u64,
    pub feed_wait_attempts: u32,
    pub feed_wait_interval_ms: u64,
    /// Delay after a navigation before looking for the feed
    pub navigation_settle_ms: u64,
    /// Minimum gap between periodic sweeps over the same unverified jobs
    pub retrigger_cooldown_ms: u64,
    /// URL fragment identifying a jobs page
    pub jobs_path_marker: String,
    /// Selectors whose presence means real cards have rendered
    pub loaded_selectors: Vec<String>,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Directory for log files; defaults to `logs/` next to the executable
    pub log_dir: Option<String>,

    /// Log file prefix (daily rotation appends the date)
    pub file_prefix: String,

    /// Module-specific log level filters (e.g., "scraper": "warn")
    pub module_filters: HashMap<String, String>,
}

pub mod defaults {
    /// Detail panel polling interval
    pub const POLL_INTERVAL_MS: u64 = 200;
    /// Detail panel polling ceiling (~2 seconds in total)
    pub const POLL_MAX_ATTEMPTS: u32 = 10;

    pub const BASE_DELAY_MS: u64 = 1200;
    pub const JITTER_MS: u64 = 800;
    pub const MISS_THRESHOLD: u32 = 3;
    pub const BACKOFF_STEP_MS: u64 = 5000;
    pub const MAX_BACKOFF_MS: u64 = 60_000;
    pub const BATCH_SIZE: u32 = 15;
    pub const BATCH_COOLDOWN_MS: u64 = 8000;
    pub const HIDDEN_POLL_MS: u64 = 1000;

    pub const MAX_ROUNDS: u32 = 2;
    pub const INTER_ROUND_DELAY_MS: u64 = 1500;

    pub const DRIVER_POLL_INTERVAL_MS: u64 = 2000;
    pub const FEED_WAIT_ATTEMPTS: u32 = 20;
    pub const FEED_WAIT_INTERVAL_MS: u64 = 1000;
    pub const NAVIGATION_SETTLE_MS: u64 = 1000;
    pub const RETRIGGER_COOLDOWN_MS: u64 = 30_000;

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_FILE_PREFIX: &str = "job-feed-filter.log";
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| (*s).to_string()).collect()
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            surface_selectors: strings(&[
                ".job-card-container",
                ".jobs-search-results__list-item",
                ".scaffold-layout__list-item",
                "li[data-occludable-job-id]",
                ".jobs-search-results-list__list-item",
                "[data-job-id]",
                ".job-card-list__entity-lockup",
                "div.job-card-container",
            ]),
            identity_attributes: strings(&["data-occludable-job-id", "data-job-id"]),
            link_selectors: strings(&["a[href*='/jobs/view/']", "a[href*='currentJobId=']"]),
            preferred_wrapper_attribute: "data-occludable-job-id".to_string(),
            skeleton_class: "jobs-list-skeleton__artdeco-card--no-top-right-radius".to_string(),
            scan_index_attribute: "data-sweep-index".to_string(),
            card_title_selectors: strings(&[
                ".job-card-list__title--link",
                ".job-card-list__title",
                ".job-card-container__link",
                ".artdeco-entity-lockup__title",
            ]),
            panel_title_selectors: strings(&[
                ".job-details-jobs-unified-top-card__job-title",
                ".jobs-unified-top-card__job-title",
                ".jobs-details-top-card__job-title",
                ".t-24.t-bold",
            ]),
            panel_description_selectors: strings(&[
                ".job-details-jobs-unified-top-card__primary-description-container",
                ".job-details-jobs-unified-top-card__tertiary-description-container",
                ".jobs-unified-top-card__subtitle-primary-grouping",
            ]),
            flag_attribute: "data-reposted".to_string(),
            flag_marker: "Reposted".to_string(),
            applied_state_selectors: strings(&[
                ".job-card-container__footer-job-state",
                ".artdeco-inline-feedback",
                "[data-job-state=\"APPLIED\"]",
            ]),
            promoted_selector: "[data-promoted=\"true\"]".to_string(),
        }
    }
}

impl Default for WaiterConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            max_attempts: defaults::POLL_MAX_ATTEMPTS,
        }
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: defaults::BASE_DELAY_MS,
            jitter_ms: defaults::JITTER_MS,
            miss_threshold: defaults::MISS_THRESHOLD,
            backoff_step_ms: defaults::BACKOFF_STEP_MS,
            max_backoff_ms: defaults::MAX_BACKOFF_MS,
            batch_size: defaults::BATCH_SIZE,
            batch_cooldown_ms: defaults::BATCH_COOLDOWN_MS,
            hidden_poll_ms: defaults::HIDDEN_POLL_MS,
        }
    }
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            max_rounds: defaults::MAX_ROUNDS,
            inter_round_delay_ms: defaults::INTER_ROUND_DELAY_MS,
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::DRIVER_POLL_INTERVAL_MS,
            feed_wait_attempts: defaults::FEED_WAIT_ATTEMPTS,
            feed_wait_interval_ms: defaults::FEED_WAIT_INTERVAL_MS,
            navigation_settle_ms: defaults::NAVIGATION_SETTLE_MS,
            retrigger_cooldown_ms: defaults::RETRIGGER_COOLDOWN_MS,
            jobs_path_marker: "/jobs".to_string(),
            loaded_selectors: strings(&["[data-occludable-job-id]", "[class*=\"job-card\"]"]),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let mut module_filters = HashMap::new();
        module_filters.insert("html5ever".to_string(), "warn".to_string());
        module_filters.insert("selectors".to_string(), "warn".to_string());
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            console_output: true,
            file_output: false,
            log_dir: None,
            file_prefix: defaults::LOG_FILE_PREFIX.to_string(),
            module_filters,
        }
    }
}

impl WaiterConfig {
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl ThrottleConfig {
    #[must_use]
    pub const fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    #[must_use]
    pub const fn batch_cooldown(&self) -> Duration {
        Duration::from_millis(self.batch_cooldown_ms)
    }

    #[must_use]
    pub const fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    #[must_use]
    pub const fn hidden_poll(&self) -> Duration {
        Duration::from_millis(self.hidden_poll_ms)
    }
}

impl RoundConfig {
    #[must_use]
    pub const fn inter_round_delay(&self) -> Duration {
        Duration::from_millis(self.inter_round_delay_ms)
    }
}

impl DriverConfig {
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub const fn feed_wait_interval(&self) -> Duration {
        Duration::from_millis(self.feed_wait_interval_ms)
    }

    #[must_use]
    pub const fn navigation_settle(&self) -> Duration {
        Duration::from_millis(self.navigation_settle_ms)
    }

    #[must_use]
    pub const fn retrigger_cooldown(&self) -> Duration {
        Duration::from_millis(self.retrigger_cooldown_ms)
    }
}

impl SweepConfig {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("JOBFEED").separator("__"))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn for_environment(env: &str) -> Result<Self, ConfigError> {
        let base_path = "config/default";
        let env_path = &format!("config/{env}");

        let settings = config::Config::builder()
            .add_source(config::File::with_name(base_path))
            .add_source(config::File::with_name(env_path).required(false))
            .add_source(config::Environment::with_prefix("JOBFEED").separator("__"))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |message: &str| {
            Err(ConfigError::Validation {
                message: message.to_string(),
            })
        };

        if self.selectors.surface_selectors.is_empty() {
            return fail("surface_selectors must not be empty");
        }
        if self.selectors.panel_title_selectors.is_empty() {
            return fail("panel_title_selectors must not be empty");
        }
        if self.selectors.flag_marker.trim().is_empty() {
            return fail("flag_marker must not be blank");
        }
        if self.waiter.max_attempts == 0 {
            return fail("waiter.max_attempts must be greater than 0");
        }
        if self.throttle.batch_size == 0 {
            return fail("throttle.batch_size must be greater than 0");
        }
        if self.throttle.miss_threshold == 0 {
            return fail("throttle.miss_threshold must be greater than 0");
        }
        if self.throttle.backoff_step_ms > self.throttle.max_backoff_ms {
            return fail("throttle.backoff_step_ms cannot exceed max_backoff_ms");
        }
        if self.rounds.max_rounds == 0 {
            return fail("rounds.max_rounds must be at least 1");
        }
        Ok(())
    }
}
