//! ---
//! cmp_section: "01-core-functionality"
//! cmp_subsection: "module"
//! cmp_type: "source"
//! cmp_scope: "code"
//! cmp_description: "Shared primitives and utilities for the poller runtime."
//! cmp_version: "v0.1.0"
//! cmp_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_community() -> String {
    "public".to_owned()
}

fn default_snmp_timeout() -> Duration {
    Duration::from_secs(7)
}

fn default_snmp_retries() -> u32 {
    1
}

fn default_snmp_port() -> u16 {
    161
}

fn default_initial_table_hint() -> u32 {
    9
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("data/cmpoll.db")
}

fn default_output_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

/// Primary configuration object for a polling run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PollerConfig {
    #[serde(default)]
    pub snmp: SnmpConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metadata describing where a [`PollerConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedPollerConfig {
    pub config: PollerConfig,
    pub source: PathBuf,
}

impl PollerConfig {
    pub const ENV_CONFIG_PATH: &'static str = "CMPOLL_CONFIG";

    /// Load configuration from disk, respecting the `CMPOLL_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedPollerConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedPollerConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedPollerConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<PollerConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Number of targets polled concurrently, falling back to the supplied default.
    pub fn effective_parallelism(&self, available: usize) -> usize {
        self.poll.parallelism.unwrap_or(available).max(1)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.snmp.validate()?;
        if let Some(0) = self.poll.parallelism {
            return Err(anyhow!("poll.parallelism must be at least 1"));
        }
        Ok(())
    }
}

impl std::str::FromStr for PollerConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: PollerConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// SNMP session parameters shared by every target of a run.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnmpConfig {
    #[serde(default = "default_community")]
    pub community: String,
    #[serde(default = "default_snmp_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,
    #[serde(default = "default_snmp_retries")]
    pub retries: u32,
    #[serde(default = "default_snmp_port")]
    pub port: u16,
    /// Max-repetitions used for the first signal table of each modem.
    #[serde(default = "default_initial_table_hint")]
    pub initial_table_hint: u32,
}

impl Default for SnmpConfig {
    fn default() -> Self {
        Self {
            community: default_community(),
            timeout: default_snmp_timeout(),
            retries: default_snmp_retries(),
            port: default_snmp_port(),
            initial_table_hint: default_initial_table_hint(),
        }
    }
}

impl SnmpConfig {
    pub fn validate(&self) -> Result<()> {
        if self.community.trim().is_empty() {
            return Err(anyhow!("snmp.community cannot be empty"));
        }
        if self.timeout.is_zero() {
            return Err(anyhow!("snmp.timeout must be at least one second"));
        }
        if self.initial_table_hint == 0 {
            return Err(anyhow!("snmp.initial_table_hint must be at least 1"));
        }
        Ok(())
    }
}

/// Where the reboot-detection boot marker comes from.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BootMarkerSource {
    /// Estimated boot epoch: poll time minus device uptime.
    #[default]
    Uptime,
    /// Constant zero marker; only counter decreases detect reboots.
    Disabled,
}

impl std::str::FromStr for BootMarkerSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "uptime" => Ok(BootMarkerSource::Uptime),
            "disabled" => Ok(BootMarkerSource::Disabled),
            other => Err(format!("unknown boot marker source: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PollConfig {
    /// Concurrent targets; unset means one per available CPU.
    #[serde(default)]
    pub parallelism: Option<usize>,
    #[serde(default)]
    pub boot_marker: BootMarkerSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            path: default_cache_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_directory")]
    pub directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MetricsConfig {
    /// Prometheus textfile written at the end of each run.
    #[serde(default)]
    pub textfile: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn empty_document_uses_defaults() {
        let config = PollerConfig::from_str("").unwrap();
        assert_eq!(config.snmp.community, "public");
        assert_eq!(config.snmp.timeout, Duration::from_secs(7));
        assert_eq!(config.snmp.retries, 1);
        assert_eq!(config.snmp.initial_table_hint, 9);
        assert_eq!(config.poll.boot_marker, BootMarkerSource::Uptime);
        assert!(config.cache.enabled);
        assert!(config.metrics.textfile.is_none());
    }

    #[test]
    fn parses_full_document() {
        let config = PollerConfig::from_str(
            r#"
            [snmp]
            community = "s3cret"
            timeout = 3
            retries = 0
            port = 1161

            [poll]
            parallelism = 16
            boot_marker = "disabled"

            [cache]
            enabled = false
            path = "/tmp/cm.db"

            [logging]
            format = "structured-json"
            "#,
        )
        .unwrap();
        assert_eq!(config.snmp.community, "s3cret");
        assert_eq!(config.snmp.timeout, Duration::from_secs(3));
        assert_eq!(config.snmp.port, 1161);
        assert_eq!(config.effective_parallelism(4), 16);
        assert_eq!(config.poll.boot_marker, BootMarkerSource::Disabled);
        assert!(!config.cache.enabled);
        assert_eq!(config.logging.format, LogFormat::StructuredJson);
    }

    #[test]
    fn rejects_empty_community_and_zero_parallelism() {
        assert!(PollerConfig::from_str("[snmp]\ncommunity = \"  \"").is_err());
        assert!(PollerConfig::from_str("[poll]\nparallelism = 0").is_err());
    }

    #[test]
    fn parallelism_defaults_to_available_capacity() {
        let config = PollerConfig::default();
        assert_eq!(config.effective_parallelism(6), 6);
        assert_eq!(config.effective_parallelism(0), 1);
    }
}
