//! Configuration loading and management.

use std::path::{Path, PathBuf};

use anyhow::{Context, ensure};
use chrono_tz::Tz;
use cs_core::classify::{
    DEFAULT_LOOKBACK_DAYS, DEFAULT_NUM_PREVIOUS_EVENTS, DEFAULT_OUTLIER_THRESHOLD,
};
use cs_core::{ClassifierConfig, ExtractorConfig};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,

    /// IANA zone for the events' local date/time fields.
    pub local_timezone: String,

    /// How far before a zero reading to look for the session start.
    pub session_window_minutes: i64,

    /// Margin beyond the lightest/heaviest cat before an event is an outlier.
    pub outlier_threshold: Decimal,

    /// Recent events averaged into a cat's expected weight.
    pub num_previous_events: usize,

    /// Days of event history scanned when classifying.
    pub lookback_days: u32,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("catscale.db"),
            local_timezone: "America/New_York".to_string(),
            session_window_minutes: 30,
            outlier_threshold: DEFAULT_OUTLIER_THRESHOLD,
            num_previous_events: DEFAULT_NUM_PREVIOUS_EVENTS,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (CS_*)
        figment = figment.merge(Env::prefixed("CS_"));

        figment.extract()
    }

    /// Session extraction settings.
    pub fn extractor_config(&self) -> anyhow::Result<ExtractorConfig> {
        ensure!(
            self.session_window_minutes > 0,
            "session_window_minutes must be positive, got {}",
            self.session_window_minutes
        );
        let local_tz: Tz = self
            .local_timezone
            .parse()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("invalid local_timezone {:?}", self.local_timezone))?;
        Ok(ExtractorConfig {
            window_ms: self.session_window_minutes * 60 * 1000,
            local_tz,
        })
    }

    /// Classification settings.
    pub fn classifier_config(&self) -> anyhow::Result<ClassifierConfig> {
        ensure!(
            self.outlier_threshold >= Decimal::ZERO,
            "outlier_threshold must not be negative, got {}",
            self.outlier_threshold
        );
        ensure!(
            self.num_previous_events > 0,
            "num_previous_events must be at least 1"
        );
        ensure!(self.lookback_days > 0, "lookback_days must be at least 1");
        Ok(ClassifierConfig {
            outlier_threshold: self.outlier_threshold,
            num_previous_events: self.num_previous_events,
            lookback_days: self.lookback_days,
        })
    }
}

/// Returns the platform-specific config directory for catscale.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("catscale"))
}

/// Returns the platform-specific data directory for catscale.
///
/// On Linux: `~/.local/share/catscale`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("catscale"))
}
