//! ---
//! cmp_section: "03-persistence-logging"
//! cmp_subsection: "module"
//! cmp_type: "source"
//! cmp_scope: "code"
//! cmp_description: "Usage-delta cache over a SQLite store."
//! cmp_version: "v0.1.0"
//! cmp_owner: "tbd"
//! ---
use std::fmt;
use std::time::Instant;

use cmpoll_logging::{cmp_debug, cmp_info, LogContext};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::metrics::CacheMetrics;
use crate::store::ensure_schema;
use crate::Result;

/// A boot marker more than this many seconds newer than the stored one means
/// the device restarted between polls.
pub const REBOOT_TOLERANCE_SECS: i64 = 600;

/// sysUpTime is a 32-bit TimeTicks counter: it wraps after 2^32 hundredths of
/// a second, about 497 days, and moves an uptime-derived marker by that much.
pub const UPTIME_WRAP_CENTISECS: i64 = 1 << 32;

/// Absolute counters read from a device in one poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageObservation {
    /// Cache key: device MAC as lowercase hex.
    pub hardware_id: String,
    /// Bytes received by the device since it booted.
    pub downstream_bytes: u64,
    /// Bytes sent by the device since it booted.
    pub upstream_bytes: u64,
    /// Poll time, unix seconds.
    pub timestamp: i64,
    /// Estimated boot epoch in seconds, or a constant when disabled.
    pub boot_marker: i64,
}

/// The stored row for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheRecord {
    /// Device MAC as lowercase hex.
    pub hardware_id: String,
    /// Downstream counter at the last poll.
    pub downstream_bytes: u64,
    /// Upstream counter at the last poll.
    pub upstream_bytes: u64,
    /// Time of the last poll, unix seconds.
    pub timestamp: i64,
    /// Boot marker recorded at the last poll.
    pub boot_marker: i64,
}

/// How a delta was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageBasis {
    /// No prior record: the absolute values are the delta.
    FirstSighting,
    /// A counter went backwards or the boot marker jumped.
    Reboot,
    /// Difference against the stored record.
    Incremental,
}

impl UsageBasis {
    /// Stable label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageBasis::FirstSighting => "first_sighting",
            UsageBasis::Reboot => "reboot",
            UsageBasis::Incremental => "incremental",
        }
    }
}

impl fmt::Display for UsageBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Usage attributed to one polling cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageDelta {
    /// Downstream bytes for the cycle.
    pub downstream: u64,
    /// Upstream bytes for the cycle.
    pub upstream: u64,
    /// Rule that produced the figures.
    pub basis: UsageBasis,
}

impl UsageDelta {
    /// Decide the delta for `current` given the stored record, if any.
    pub fn between(previous: Option<&CacheRecord>, current: &UsageObservation) -> Self {
        let absolute = |basis| UsageDelta {
            downstream: current.downstream_bytes,
            upstream: current.upstream_bytes,
            basis,
        };
        let Some(prev) = previous else {
            return absolute(UsageBasis::FirstSighting);
        };
        let rebooted = current.downstream_bytes < prev.downstream_bytes
            || current.upstream_bytes < prev.upstream_bytes
            || marker_jumped(prev.boot_marker, current.boot_marker);
        if rebooted {
            absolute(UsageBasis::Reboot)
        } else {
            UsageDelta {
                downstream: current.downstream_bytes - prev.downstream_bytes,
                upstream: current.upstream_bytes - prev.upstream_bytes,
                basis: UsageBasis::Incremental,
            }
        }
    }
}

/// True when the boot marker moved forward past the tolerance by anything
/// other than whole sysUpTime wraps.
fn marker_jumped(previous: i64, current: i64) -> bool {
    let advance = current.saturating_sub(previous);
    if advance <= REBOOT_TOLERANCE_SECS {
        return false;
    }
    let advance = i128::from(advance) * 100;
    let wrap = i128::from(UPTIME_WRAP_CENTISECS);
    let wraps = (advance + wrap / 2) / wrap;
    wraps == 0 || (advance - wraps * wrap).abs() > i128::from(REBOOT_TOLERANCE_SECS) * 100
}

/// Single-writer usage cache. Owns the connection; every mutation takes
/// `&mut self` and runs in its own transaction.
pub struct UsageCache {
    conn: Connection,
    metrics: Option<CacheMetrics>,
}

impl UsageCache {
    /// Wrap an open connection, creating the table if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        ensure_schema(&conn)?;
        Ok(Self {
            conn,
            metrics: None,
        })
    }

    /// Attach metrics recorded on every computation.
    pub fn with_metrics(mut self, metrics: CacheMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Compare `observation` with the stored record, classify it, then store
    /// it as the new reference. Lookup, decision and upsert commit together.
    pub fn compute_usage(
        &mut self,
        observation: &UsageObservation,
        ctx: &LogContext<'_>,
    ) -> Result<UsageDelta> {
        let started = Instant::now();
        let tx = self.conn.transaction()?;
        let previous = select_record(&tx, &observation.hardware_id)?;
        let delta = UsageDelta::between(previous.as_ref(), observation);
        tx.execute(
            "INSERT OR REPLACE INTO modems \
             (hardware_id, downstream_bytes, upstream_bytes, timestamp, boot_marker) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                observation.hardware_id,
                observation.downstream_bytes,
                observation.upstream_bytes,
                observation.timestamp,
                observation.boot_marker,
            ],
        )?;
        tx.commit()?;

        if let Some(metrics) = &self.metrics {
            metrics.record_delta(delta.basis);
            metrics.observe_transaction(started.elapsed().as_secs_f64());
        }
        match delta.basis {
            UsageBasis::Reboot => cmp_info!(
                context = ctx,
                "counter reset detected, using absolute values ({} / {})",
                delta.downstream,
                delta.upstream
            ),
            basis => cmp_debug!(
                context = ctx,
                "usage {} / {} ({})",
                delta.downstream,
                delta.upstream,
                basis
            ),
        }
        Ok(delta)
    }

    /// Stored record for `hardware_id`, if any.
    pub fn record(&self, hardware_id: &str) -> Result<Option<CacheRecord>> {
        select_record(&self.conn, hardware_id)
    }

    /// Number of devices tracked.
    pub fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM modems", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// True when no device has been recorded yet.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl fmt::Debug for UsageCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsageCache")
            .field("path", &self.conn.path())
            .finish_non_exhaustive()
    }
}

fn select_record(conn: &Connection, hardware_id: &str) -> Result<Option<CacheRecord>> {
    let record = conn
        .query_row(
            "SELECT hardware_id, downstream_bytes, upstream_bytes, timestamp, boot_marker \
             FROM modems WHERE hardware_id = ?1",
            params![hardware_id],
            |row| {
                Ok(CacheRecord {
                    hardware_id: row.get(0)?,
                    downstream_bytes: row.get(1)?,
                    upstream_bytes: row.get(2)?,
                    timestamp: row.get(3)?,
                    boot_marker: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(record)
}
