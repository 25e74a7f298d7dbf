//! ---
//! cmp_section: "03-persistence-logging"
//! cmp_subsection: "module"
//! cmp_type: "source"
//! cmp_scope: "code"
//! cmp_description: "Usage-delta cache over a SQLite store."
//! cmp_version: "v0.1.0"
//! cmp_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Turns absolute, device-resident traffic counters into per-cycle usage.
//!
//! One row per hardware id holds the last observation. Each new observation
//! is compared against it, classified, and then replaces it.

/// Result alias used throughout the cache crate.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Error type for the cache subsystem.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failure creating the directory holding the store.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Failure reported by SQLite.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Wrapper for Prometheus metrics registration failures.
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

pub mod metrics;
pub mod store;
pub mod usage;

pub use metrics::CacheMetrics;
pub use store::open_store;
pub use usage::{
    CacheRecord, UsageBasis, UsageCache, UsageDelta, UsageObservation, REBOOT_TOLERANCE_SECS,
    UPTIME_WRAP_CENTISECS,
};
