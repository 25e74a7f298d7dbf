//! ---
//! cmp_section: "01-core-functionality"
//! cmp_subsection: "module"
//! cmp_type: "source"
//! cmp_scope: "code"
//! cmp_description: "Shared primitives and utilities for the poller runtime."
//! cmp_version: "v0.1.0"
//! cmp_owner: "tbd"
//! ---
use chrono::{DateTime, Local, TimeZone};

/// Compact timestamp layout used in result records and default output names.
pub const RECORD_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Capture the wall-clock instant a poll starts.
pub fn poll_now() -> DateTime<Local> {
    Local::now()
}

/// Render a timestamp the way result records expect it.
pub fn record_stamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format(RECORD_TIMESTAMP_FORMAT).to_string()
}

/// Default output file name for a run started at `at`.
pub fn default_output_name<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("results_{}.txt", record_stamp(at))
}

/// Convert SNMP TimeTicks (hundredths of a second) into whole seconds.
pub fn ticks_to_secs(ticks: u64) -> i64 {
    i64::try_from(ticks / 100).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamps_use_compact_layout() {
        let at = Local.with_ymd_and_hms(2016, 3, 7, 9, 5, 1).unwrap();
        assert_eq!(record_stamp(&at), "20160307-090501");
        assert_eq!(default_output_name(&at), "results_20160307-090501.txt");
    }

    #[test]
    fn ticks_truncate_to_seconds() {
        assert_eq!(ticks_to_secs(0), 0);
        assert_eq!(ticks_to_secs(199), 1);
        assert_eq!(ticks_to_secs(360_000), 3600);
    }
}
