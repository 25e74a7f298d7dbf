//! ---
//! cmp_section: "01-core-functionality"
//! cmp_subsection: "module"
//! cmp_type: "source"
//! cmp_scope: "code"
//! cmp_description: "Modem polling state machine and result records."
//! cmp_version: "v0.1.0"
//! cmp_owner: "tbd"
//! ---
use std::fmt;

use chrono::{DateTime, Local};
use cmpoll_cache::{UsageDelta, UsageObservation};
use cmpoll_common::config::BootMarkerSource;
use cmpoll_common::time::ticks_to_secs;
use serde::Serialize;

use crate::identity::ModemIdentity;

/// Placeholder for WAN fields that could not be decoded.
pub const NO_WAN: &str = "no_WAN";

/// Lifecycle of one poll. Everything but `Init` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModemState {
    Init,
    Completed,
    Nocounter,
    Timeout,
    Error,
}

impl ModemState {
    pub const ALL: [ModemState; 5] = [
        ModemState::Init,
        ModemState::Completed,
        ModemState::Nocounter,
        ModemState::Timeout,
        ModemState::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModemState::Init => "init",
            ModemState::Completed => "completed",
            ModemState::Nocounter => "nocounter",
            ModemState::Timeout => "timeout",
            ModemState::Error => "error",
        }
    }

    /// States whose snapshot carries metadata and signal tables.
    pub fn has_details(&self) -> bool {
        matches!(self, ModemState::Completed | ModemState::Nocounter)
    }
}

impl fmt::Display for ModemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Absolute counters as read from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrafficCounters {
    /// sysUpTime in hundredths of a second.
    pub uptime_ticks: u64,
    pub downstream_bytes: u64,
    pub upstream_bytes: u64,
}

/// Configuration and firmware scalars.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceMetadata {
    pub config_file: String,
    pub sw_oper_status: String,
    pub boot_status: String,
    pub firmware_version: String,
    pub firmware_filename: String,
    /// Dotted quad, or [`NO_WAN`].
    pub wan_address: String,
    /// Dotted quad, or [`NO_WAN`].
    pub wan_gateway: String,
}

/// One channel measurement in tenths of the unit (dBmV or dB).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SignalReading {
    pub channel: u32,
    pub tenths: i64,
}

/// Per-channel signal tables in agent order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SignalTables {
    pub downstream_power: Vec<SignalReading>,
    pub downstream_snr: Vec<SignalReading>,
    pub upstream_power: Vec<SignalReading>,
}

/// Result of polling one modem. Plain data, safe to move across tasks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModemSnapshot {
    pub identity: ModemIdentity,
    pub state: ModemState,
    pub polled_at: DateTime<Local>,
    /// MAC reported by the device itself.
    pub device_hardware_id: Option<String>,
    pub counters: Option<TrafficCounters>,
    pub usage: Option<UsageDelta>,
    pub metadata: Option<DeviceMetadata>,
    pub signals: Option<SignalTables>,
    /// Why the poll did not complete, for `timeout` and `error`.
    pub failure: Option<String>,
}

impl ModemSnapshot {
    /// A fresh snapshot in `init`.
    pub fn new(identity: ModemIdentity, polled_at: DateTime<Local>) -> Self {
        Self {
            identity,
            state: ModemState::Init,
            polled_at,
            device_hardware_id: None,
            counters: None,
            usage: None,
            metadata: None,
            signals: None,
            failure: None,
        }
    }

    /// A terminal snapshot carrying only identity, timestamp and the reason.
    pub fn failed(
        identity: ModemIdentity,
        polled_at: DateTime<Local>,
        state: ModemState,
        failure: impl Into<String>,
    ) -> Self {
        let mut snapshot = Self::new(identity, polled_at);
        snapshot.state = state;
        snapshot.failure = Some(failure.into());
        snapshot
    }

    /// MAC used for rendering and as cache key: the device's own report when
    /// available, otherwise the target list's.
    pub fn effective_hardware_id(&self) -> &str {
        self.device_hardware_id
            .as_deref()
            .unwrap_or(&self.identity.hardware_id)
    }

    /// Estimated boot time in unix seconds, from the poll time and uptime.
    pub fn boot_marker(&self, source: BootMarkerSource) -> Option<i64> {
        let counters = self.counters?;
        Some(match source {
            BootMarkerSource::Uptime => {
                self.polled_at.timestamp() - ticks_to_secs(counters.uptime_ticks)
            }
            BootMarkerSource::Disabled => 0,
        })
    }

    /// Observation to feed the usage cache. Only completed polls have one.
    pub fn usage_observation(&self, source: BootMarkerSource) -> Option<UsageObservation> {
        if self.state != ModemState::Completed {
            return None;
        }
        let counters = self.counters?;
        Some(UsageObservation {
            hardware_id: self.effective_hardware_id().to_owned(),
            downstream_bytes: counters.downstream_bytes,
            upstream_bytes: counters.upstream_bytes,
            timestamp: self.polled_at.timestamp(),
            boot_marker: self.boot_marker(source)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use cmpoll_cache::{CacheRecord, UsageBasis, REBOOT_TOLERANCE_SECS};

    fn completed() -> ModemSnapshot {
        let at = Local.timestamp_opt(1_457_337_901, 0).unwrap();
        let mut snap = ModemSnapshot::new(
            ModemIdentity::new("bp", "5c353bef6106", "10.0.0.1"),
            at,
        );
        snap.state = ModemState::Completed;
        snap.counters = Some(TrafficCounters {
            uptime_ticks: 360_000,
            downstream_bytes: 1000,
            upstream_bytes: 200,
        });
        snap
    }

    #[test]
    fn boot_marker_follows_uptime() {
        let snap = completed();
        assert_eq!(
            snap.boot_marker(BootMarkerSource::Uptime),
            Some(1_457_337_901 - 3600)
        );
        assert_eq!(snap.boot_marker(BootMarkerSource::Disabled), Some(0));
    }

    #[test]
    fn uptime_wrap_between_polls_stays_incremental() {
        let first = completed_at(1_700_000_000, u64::from(u32::MAX - 100), 9_000_000_000_000);
        let second = completed_at(1_700_000_900, 89_899, 9_000_000_500_000);
        let before = first.usage_observation(BootMarkerSource::Uptime).unwrap();
        let after = second.usage_observation(BootMarkerSource::Uptime).unwrap();
        assert!(after.boot_marker - before.boot_marker > REBOOT_TOLERANCE_SECS);

        let stored = CacheRecord {
            hardware_id: before.hardware_id,
            downstream_bytes: before.downstream_bytes,
            upstream_bytes: before.upstream_bytes,
            timestamp: before.timestamp,
            boot_marker: before.boot_marker,
        };
        let delta = UsageDelta::between(Some(&stored), &after);
        assert_eq!(delta.basis, UsageBasis::Incremental);
        assert_eq!(delta.downstream, 500_000);
    }

    fn completed_at(unix: i64, uptime_ticks: u64, downstream_bytes: u64) -> ModemSnapshot {
        let mut snap = completed();
        snap.polled_at = Local.timestamp_opt(unix, 0).unwrap();
        snap.counters = Some(TrafficCounters {
            uptime_ticks,
            downstream_bytes,
            upstream_bytes: 200,
        });
        snap
    }

    #[test]
    fn only_completed_snapshots_feed_the_cache() {
        let mut snap = completed();
        snap.device_hardware_id = Some("aabbccddeeff".into());
        let obs = snap.usage_observation(BootMarkerSource::Disabled).unwrap();
        assert_eq!(obs.hardware_id, "aabbccddeeff");
        assert_eq!(obs.downstream_bytes, 1000);

        snap.state = ModemState::Nocounter;
        assert!(snap.usage_observation(BootMarkerSource::Uptime).is_none());
    }

    #[test]
    fn failed_snapshot_keeps_identity_only() {
        let at = Local.timestamp_opt(0, 0).unwrap();
        let snap = ModemSnapshot::failed(
            ModemIdentity::new("", "aabbccddeeff", "10.0.0.2"),
            at,
            ModemState::Timeout,
            "request timed out",
        );
        assert_eq!(snap.state, ModemState::Timeout);
        assert!(!snap.state.has_details());
        assert!(snap.counters.is_none() && snap.metadata.is_none() && snap.signals.is_none());
        assert_eq!(snap.effective_hardware_id(), "aabbccddeeff");
    }
}
