//! ---
//! cmp_section: "03-persistence-logging"
//! cmp_subsection: "module"
//! cmp_type: "source"
//! cmp_scope: "code"
//! cmp_description: "Metrics collection and export utilities."
//! cmp_version: "v0.1.0"
//! cmp_owner: "tbd"
//! ---
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use prometheus::{
    Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use tracing::debug;

/// Shared registry type used across the poller.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Encode every metric family in the registry as Prometheus text.
pub fn render(registry: &Registry) -> Result<String> {
    TextEncoder::new()
        .encode_to_string(&registry.gather())
        .context("failed to encode metrics")
}

/// Write the registry to `path` for the node exporter textfile collector.
/// The file is written next to its destination and renamed into place so the
/// collector never reads a partial exposition.
pub fn write_textfile(registry: &Registry, path: &Path) -> Result<()> {
    let body = render(registry)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("unable to create {}", parent.display()))?;
        }
    }
    let staging = staging_path(path);
    {
        let mut file = File::create(&staging)
            .with_context(|| format!("unable to create {}", staging.display()))?;
        file.write_all(body.as_bytes())
            .and_then(|_| file.sync_all())
            .with_context(|| format!("unable to write {}", staging.display()))?;
    }
    fs::rename(&staging, path)
        .with_context(|| format!("unable to move metrics into {}", path.display()))?;
    debug!(path = %path.display(), "metrics textfile written");
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Metrics describing one polling batch.
#[derive(Clone, Debug)]
pub struct PollMetrics {
    registry: SharedRegistry,
    polls_total: IntCounterVec,
    poll_duration: Histogram,
    batch_targets: IntGauge,
    last_run: IntGauge,
}

impl PollMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let polls_total = IntCounterVec::new(
            Opts::new(
                "cmpoll_polls_total",
                "Modem polls finished, by terminal state",
            ),
            &["state"],
        )?;
        registry.register(Box::new(polls_total.clone()))?;

        let buckets = prometheus::exponential_buckets(0.05, 2.0, 12)
            .context("failed to construct histogram buckets")?;
        let poll_duration = Histogram::with_opts(
            HistogramOpts::new(
                "cmpoll_poll_duration_seconds",
                "Wall time spent polling one modem",
            )
            .buckets(buckets),
        )?;
        registry.register(Box::new(poll_duration.clone()))?;

        let batch_targets = IntGauge::with_opts(Opts::new(
            "cmpoll_batch_targets",
            "Targets in the most recent batch",
        ))?;
        registry.register(Box::new(batch_targets.clone()))?;

        let last_run = IntGauge::with_opts(Opts::new(
            "cmpoll_last_run_timestamp_seconds",
            "Unix time the most recent batch finished",
        ))?;
        registry.register(Box::new(last_run.clone()))?;

        Ok(Self {
            registry,
            polls_total,
            poll_duration,
            batch_targets,
            last_run,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn record_poll(&self, state: &str, seconds: f64) {
        self.polls_total.with_label_values(&[state]).inc();
        self.poll_duration.observe(seconds);
    }

    pub fn set_batch_targets(&self, count: usize) {
        self.batch_targets.set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    pub fn mark_run_finished(&self, unix_seconds: i64) {
        self.last_run.set(unix_seconds);
    }

    pub fn polls(&self, state: &str) -> u64 {
        self.polls_total.with_label_values(&[state]).get()
    }
}

pub use prometheus;
