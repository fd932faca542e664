//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use vault_gate::{CountdownConfig, GateConfig};
use vault_reconcile::ReconcileOptions;
use vault_source::{ApiConfig, FetchLimits};
use vault_telemetry::LoggingConfig;

use crate::error::{AppError, AppResult};

/// Default config location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Source fetch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Upper bound on pages walked for delivery orders and own listings.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    /// Page size for those walks.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Offset (hours) of timestamps sent without one. Default: +8.
    #[serde(default = "default_source_utc_offset_hours")]
    pub source_utc_offset_hours: i32,
}

fn default_max_pages() -> u32 {
    FetchLimits::default().max_pages
}

fn default_page_size() -> u32 {
    FetchLimits::default().page_size
}

fn default_source_utc_offset_hours() -> i32 {
    8
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            max_pages: default_max_pages(),
            page_size: default_page_size(),
            source_utc_offset_hours: default_source_utc_offset_hours(),
        }
    }
}

impl SourceConfig {
    pub fn limits(&self) -> FetchLimits {
        FetchLimits {
            max_pages: self.max_pages,
            page_size: self.page_size,
        }
    }

    pub fn reconcile_options(&self) -> AppResult<ReconcileOptions> {
        ReconcileOptions::with_offset_hours(self.source_utc_offset_hours).ok_or_else(|| {
            AppError::Config(format!(
                "source_utc_offset_hours out of range: {}",
                self.source_utc_offset_hours
            ))
        })
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub countdown: CountdownConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub telemetry: LoggingConfig,
}

impl AppConfig {
    /// Config path: CLI argument, then `VAULT_CONFIG`, then the default.
    pub fn resolve_path(cli: Option<String>) -> String {
        cli.or_else(|| std::env::var("VAULT_CONFIG").ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
    }

    /// Load from `path`, or defaults if the file does not exist.
    ///
    /// Returns whether the file was found; the caller logs the fallback
    /// once logging is up.
    pub fn load(path: &str) -> AppResult<(Self, bool)> {
        if Path::new(path).exists() {
            Ok((Self::from_file(path)?, true))
        } else {
            Ok((Self::default(), false))
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content).map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// `VAULT_TOKEN` overrides `api.token`.
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("VAULT_TOKEN") {
            if !token.trim().is_empty() {
                self.api.token = Some(token);
            }
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        self.gate.validate()?;
        self.source.reconcile_options()?;
        if self.source.max_pages == 0 || self.source.page_size == 0 {
            return Err(AppError::Config(
                "source.max_pages and source.page_size must be positive".to_string(),
            ));
        }
        if self.countdown.tick_interval_ms == 0 {
            return Err(AppError::Config(
                "countdown.tick_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.gate.holding_period_secs, 48 * 3600);
        assert_eq!(config.countdown.tick_interval_ms, 1000);
        assert_eq!(config.source.source_utc_offset_hours, 8);
        assert_eq!(config.api.token_header, "token");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [api]
            base_url = "https://shop.example.com"
            success_code = 200

            [api.endpoints]
            purchases = "/v2/holdings"

            [source]
            source_utc_offset_hours = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.api.base_url, "https://shop.example.com");
        assert_eq!(config.api.success_code, 200);
        assert_eq!(config.api.endpoints.purchases, "/v2/holdings");
        assert_eq!(config.api.endpoints.submit_delivery, "/api/delivery/submit");
        assert_eq!(config.source.max_pages, 50);
        assert_eq!(config.telemetry.filter, "info,vault=debug");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = AppConfig::default();
        config.source.source_utc_offset_hours = 30;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        let mut config = AppConfig::default();
        config.gate.holding_period_secs = -1;
        assert!(matches!(config.validate(), Err(AppError::Gate(_))));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let (config, found) = AppConfig::load("does/not/exist.toml").unwrap();
        assert!(!found);
        assert_eq!(config.source.page_size, 100);
    }

    #[test]
    fn test_shipped_default_file_parses() {
        let config = AppConfig::from_toml(include_str!("../../../config/default.toml")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.api.endpoints.my_consignments, "/api/consign/mine");
    }

    #[test]
    fn test_config_serialization() {
        let toml_str = toml::to_string(&AppConfig::default()).unwrap();
        assert!(toml_str.contains("holding_period_secs"));
        assert!(toml_str.contains("tick_interval_ms"));
    }
}
