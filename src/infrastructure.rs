//! Infrastructure layer: configuration, logging and settings persistence

pub mod config;
pub mod logging;
pub mod settings_store;

pub use config::{
    ConfigError, DriverConfig, LoggingConfig, RoundConfig, SelectorConfig, SweepConfig,
    ThrottleConfig, WaiterConfig,
};
pub use logging::{get_log_directory, init_logging, init_logging_with_config};
pub use settings_store::{SettingsError, SettingsStore};
