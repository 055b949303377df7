//! Configuration management for Reaction Audio Sync.
//!
//! This module provides:
//! - TOML-based configuration with one table per pipeline stage
//! - Atomic file writes (write to temp, then rename)
//! - Section-level updates (only changed section is modified)
//! - Defaults for every missing field
//!
//! # Example
//!
//! ```no_run
//! use ras_core::config::{ConfigManager, ConfigSection};
//!
//! let mut config = ConfigManager::new(".config/ras.toml");
//! config.load_or_create().unwrap();
//!
//! println!("Cancel alpha: {}", config.settings().cancel.alpha);
//!
//! config.settings_mut().expand.threshold_db = -50.0;
//! config.update_section(ConfigSection::Expand).unwrap();
//! ```

mod manager;
mod settings;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    CancelSettings, CoarseSettings, ConfigSection, ExpandSettings, LoggingSettings,
    PreprocessSettings, RefineSettings, RuntimeSettings, Settings, ShiftSettings,
};
