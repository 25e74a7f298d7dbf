//! ---
//! cmp_section: "03-persistence-logging"
//! cmp_subsection: "module"
//! cmp_type: "source"
//! cmp_scope: "code"
//! cmp_description: "Usage-delta cache over a SQLite store."
//! cmp_version: "v0.1.0"
//! cmp_owner: "tbd"
//! ---
use prometheus::{self, Histogram, HistogramOpts, IntCounterVec, Opts, Registry};

use crate::usage::UsageBasis;
use crate::Result;

/// Metrics published by the usage cache.
#[derive(Clone)]
pub struct CacheMetrics {
    deltas: IntCounterVec,
    transaction_duration: Histogram,
}

impl CacheMetrics {
    /// Register all cache metrics with the provided registry.
    pub fn new(registry: &Registry) -> Result<Self> {
        let deltas = IntCounterVec::new(
            Opts::new(
                "cmpoll_usage_deltas_total",
                "Usage deltas computed, by the rule that produced them",
            ),
            &["basis"],
        )?;
        registry.register(Box::new(deltas.clone()))?;

        let histogram_opts = HistogramOpts::new(
            "cmpoll_cache_transaction_seconds",
            "Time spent in one lookup-and-upsert cache transaction",
        )
        .buckets(prometheus::exponential_buckets(0.0001, 2.0, 12)?);
        let transaction_duration = Histogram::with_opts(histogram_opts)?;
        registry.register(Box::new(transaction_duration.clone()))?;

        Ok(Self {
            deltas,
            transaction_duration,
        })
    }

    /// Count one computed delta.
    pub fn record_delta(&self, basis: UsageBasis) {
        self.deltas.with_label_values(&[basis.as_str()]).inc();
    }

    /// Observe the duration of one cache transaction.
    pub fn observe_transaction(&self, seconds: f64) {
        self.transaction_duration.observe(seconds);
    }

    /// Deltas counted so far for `basis`.
    pub fn delta_count(&self, basis: UsageBasis) -> u64 {
        self.deltas.with_label_values(&[basis.as_str()]).get()
    }
}

impl std::fmt::Debug for CacheMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheMetrics").finish_non_exhaustive()
    }
}
