use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::services::sql_analyzer::RuleThresholds;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub analyzer: AnalyzerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), file: None }
    }
}

/// Plan-rule thresholds, overridable per deployment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Fraction of filtered-out rows that flags a Seq Scan as selective.
    pub seq_scan_removed_fraction: f64,
    /// Estimated rows above which a sequential scan is flagged.
    pub large_scan_rows: f64,
    /// Estimated rows above which a nested loop is flagged.
    pub large_loop_rows: f64,
    /// Estimated rows above which a sort is flagged.
    pub large_sort_rows: f64,
    /// Estimated rows above which an aggregate is flagged.
    pub large_aggregate_rows: f64,
    /// actual/estimated ratio above which rows were underestimated.
    pub misestimate_under_ratio: f64,
    /// actual/estimated ratio below which rows were overestimated.
    pub misestimate_over_ratio: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        let t = RuleThresholds::default();
        Self {
            seq_scan_removed_fraction: t.seq_scan_removed_fraction,
            large_scan_rows: t.large_scan_rows,
            large_loop_rows: t.large_loop_rows,
            large_sort_rows: t.large_sort_rows,
            large_aggregate_rows: t.large_aggregate_rows,
            misestimate_under_ratio: t.misestimate_under_ratio,
            misestimate_over_ratio: t.misestimate_over_ratio,
        }
    }
}

impl AnalyzerConfig {
    pub fn thresholds(&self) -> RuleThresholds {
        RuleThresholds {
            seq_scan_removed_fraction: self.seq_scan_removed_fraction,
            large_scan_rows: self.large_scan_rows,
            large_loop_rows: self.large_loop_rows,
            large_sort_rows: self.large_sort_rows,
            large_aggregate_rows: self.large_aggregate_rows,
            misestimate_under_ratio: self.misestimate_under_ratio,
            misestimate_over_ratio: self.misestimate_over_ratio,
        }
    }
}

impl Config {
    /// Load configuration with environment variable override support
    ///
    /// Loading order:
    /// 1. Load from config.toml file
    /// 2. Override with environment variables (prefixed with APP_)
    /// 3. Validate the final configuration
    pub fn load() -> Result<Self, anyhow::Error> {
        let mut config = if let Some(config_path) = Self::find_config_file() {
            Self::from_toml(&config_path)?
        } else {
            tracing::debug!("configuration file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, still honoring environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, anyhow::Error> {
        let mut config = Self::from_toml(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn find_config_file() -> Option<PathBuf> {
        ["conf/config.toml", "config.toml"]
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
    }

    fn from_toml(path: &Path) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
        let config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("APP_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(file) = std::env::var("APP_LOG_FILE") {
            self.logging.file = Some(file);
        }
        if let Ok(rows) = std::env::var("APP_LARGE_SCAN_ROWS") {
            if let Ok(rows) = rows.parse() {
                self.analyzer.large_scan_rows = rows;
            }
        }
        if let Ok(fraction) = std::env::var("APP_SEQ_SCAN_REMOVED_FRACTION") {
            if let Ok(fraction) = fraction.parse() {
                self.analyzer.seq_scan_removed_fraction = fraction;
            }
        }
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        let a = &self.analyzer;
        if !(0.0..=1.0).contains(&a.seq_scan_removed_fraction) {
            anyhow::bail!("seq_scan_removed_fraction must be within [0, 1]");
        }
        if a.misestimate_over_ratio >= a.misestimate_under_ratio {
            anyhow::bail!("misestimate_over_ratio must be below misestimate_under_ratio");
        }
        for (name, value) in [
            ("large_scan_rows", a.large_scan_rows),
            ("large_loop_rows", a.large_loop_rows),
            ("large_sort_rows", a.large_sort_rows),
            ("large_aggregate_rows", a.large_aggregate_rows),
        ] {
            if value <= 0.0 {
                anyhow::bail!("{name} must be positive");
            }
        }
        Ok(())
    }
}
