//! ---
//! cmp_section: "01-core-functionality"
//! cmp_subsection: "module"
//! cmp_type: "source"
//! cmp_scope: "code"
//! cmp_description: "Modem polling state machine and result records."
//! cmp_version: "v0.1.0"
//! cmp_owner: "tbd"
//! ---
//! Per-modem polling: who to poll, how one poll runs, and what it yields.
//!
//! [`ModemClient`] drives the counters, metadata and signal-table phases
//! against a session and produces a transport-free [`ModemSnapshot`], which
//! renders to one `;`-separated result record.

pub mod identity;
pub mod modem;
pub mod record;
pub mod snapshot;
pub mod targets;

#[cfg(any(test, feature = "testing"))]
pub mod fixtures;

pub use identity::{normalize_hardware_id, ModemIdentity, PollRequest};
pub use modem::{poll_target, ModemClient, PhaseError};
pub use record::{RECORD_FIELDS, RECORD_SEPARATOR};
pub use snapshot::{
    DeviceMetadata, ModemSnapshot, ModemState, SignalReading, SignalTables, TrafficCounters,
    NO_WAN,
};
pub use targets::{parse_targets, read_targets, TargetListError};
