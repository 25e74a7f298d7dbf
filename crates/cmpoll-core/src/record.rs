//! ---
//! cmp_section: "01-core-functionality"
//! cmp_subsection: "module"
//! cmp_type: "source"
//! cmp_scope: "code"
//! cmp_description: "Modem polling state machine and result records."
//! cmp_version: "v0.1.0"
//! cmp_owner: "tbd"
//! ---
//! Flattening a snapshot into the legacy `;`-separated result line.
//!
//! Field order: timestamp, business id, hardware id, address, config file,
//! oper status, boot status, then count and values for downstream power,
//! downstream SNR and upstream power, `<ds>-<us>` channel counts, firmware
//! version and filename, WAN address and gateway, uptime, downstream bytes
//! and delta, upstream bytes and delta.

use cmpoll_common::time::record_stamp;

use crate::snapshot::{ModemSnapshot, ModemState, SignalReading};

/// Fields in every record, whatever the state.
pub const RECORD_FIELDS: usize = 23;

pub const RECORD_SEPARATOR: char = ';';

impl ModemSnapshot {
    /// Render the result line (no trailing newline).
    pub fn to_record(&self) -> String {
        let hardware_id = self.effective_hardware_id();
        let business_id = if self.identity.business_id.is_empty() {
            hardware_id
        } else {
            self.identity.business_id.as_str()
        };

        let mut fields: Vec<String> = Vec::with_capacity(RECORD_FIELDS);
        fields.push(record_stamp(&self.polled_at));
        fields.push(clean(business_id));
        fields.push(clean(hardware_id));
        fields.push(clean(&self.identity.address));

        let details = match (&self.metadata, &self.signals) {
            (Some(metadata), Some(signals)) if self.state.has_details() => {
                Some((metadata, signals))
            }
            _ => None,
        };
        let Some((metadata, signals)) = details else {
            fields.push(self.state.as_str().to_owned());
            fields.resize(RECORD_FIELDS, String::new());
            return fields.join(&RECORD_SEPARATOR.to_string());
        };

        let ds = signals.downstream_power.len();
        let snr = signals.downstream_snr.len();
        let us = signals.upstream_power.len();
        fields.push(clean(&metadata.config_file));
        fields.push(clean(&metadata.sw_oper_status));
        fields.push(clean(&metadata.boot_status));
        fields.push(ds.to_string());
        fields.push(join_tenths(&signals.downstream_power));
        fields.push(snr.to_string());
        fields.push(join_tenths(&signals.downstream_snr));
        fields.push(us.to_string());
        fields.push(join_tenths(&signals.upstream_power));
        fields.push(format!("{}-{}", ds, us));
        fields.push(clean(&metadata.firmware_version));
        fields.push(clean(&metadata.firmware_filename));
        fields.push(clean(&metadata.wan_address));
        fields.push(clean(&metadata.wan_gateway));

        let counters = self.counters.filter(|_| self.state == ModemState::Completed);
        let usage = self.usage.filter(|_| counters.is_some());
        fields.push(opt(counters.map(|c| c.uptime_ticks)));
        fields.push(opt(counters.map(|c| c.downstream_bytes)));
        fields.push(opt(usage.map(|u| u.downstream)));
        fields.push(opt(counters.map(|c| c.upstream_bytes)));
        fields.push(opt(usage.map(|u| u.upstream)));

        debug_assert_eq!(fields.len(), RECORD_FIELDS);
        fields.join(&RECORD_SEPARATOR.to_string())
    }
}

/// Tenths rendered with exactly one decimal: `352` -> `35.2`, `-15` -> `-1.5`.
pub fn format_tenths(tenths: i64) -> String {
    let sign = if tenths < 0 { "-" } else { "" };
    let magnitude = tenths.unsigned_abs();
    format!("{}{}.{}", sign, magnitude / 10, magnitude % 10)
}

fn join_tenths(readings: &[SignalReading]) -> String {
    readings
        .iter()
        .map(|r| format_tenths(r.tenths))
        .collect::<Vec<_>>()
        .join(":")
}

fn opt(value: Option<u64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Free text must not introduce separators or line breaks.
fn clean(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            ';' | '\r' | '\n' => '_',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ModemIdentity;
    use crate::snapshot::{DeviceMetadata, SignalTables, TrafficCounters};
    use chrono::{Local, TimeZone};
    use cmpoll_cache::{UsageBasis, UsageDelta};

    fn readings(values: &[i64]) -> Vec<SignalReading> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| SignalReading {
                channel: i as u32 + 1,
                tenths: *v,
            })
            .collect()
    }

    fn completed() -> ModemSnapshot {
        let at = Local.with_ymd_and_hms(2016, 3, 7, 9, 5, 1).unwrap();
        let mut snap = ModemSnapshot::new(
            ModemIdentity::new("0091000060", "5c353bef6106", "10.133.28.103"),
            at,
        );
        snap.state = ModemState::Completed;
        snap.counters = Some(TrafficCounters {
            uptime_ticks: 360_000,
            downstream_bytes: 1500,
            upstream_bytes: 300,
        });
        snap.usage = Some(UsageDelta {
            downstream: 500,
            upstream: 100,
            basis: UsageBasis::Incremental,
        });
        snap.metadata = Some(DeviceMetadata {
            config_file: "cm;basic.cfg".into(),
            sw_oper_status: "3".into(),
            boot_status: "1".into(),
            firmware_version: "CH6643E-1.2".into(),
            firmware_filename: "fw.bin".into(),
            wan_address: "192.168.100.10".into(),
            wan_gateway: "192.168.100.1".into(),
        });
        snap.signals = Some(SignalTables {
            downstream_power: readings(&[352, -15]),
            downstream_snr: readings(&[380, 375, 371]),
            upstream_power: readings(&[450]),
        });
        snap
    }

    #[test]
    fn completed_record_layout() {
        let record = completed().to_record();
        let fields: Vec<&str> = record.split(';').collect();
        assert_eq!(fields.len(), RECORD_FIELDS);
        assert_eq!(fields[0], "20160307-090501");
        assert_eq!(fields[1], "0091000060");
        assert_eq!(fields[4], "cm_basic.cfg");
        assert_eq!(fields[7], "2");
        assert_eq!(fields[8], "35.2:-1.5");
        assert_eq!(fields[9], "3");
        assert_eq!(fields[10], "38.0:37.5:37.1");
        assert_eq!(fields[12], "45.0");
        assert_eq!(fields[13], "2-1");
        assert_eq!(&fields[18..], &["360000", "1500", "500", "300", "100"]);
    }

    #[test]
    fn timeout_record_has_same_width() {
        let completed = completed().to_record();
        let mut snap = completed_snapshot_as(ModemState::Timeout);
        snap.identity.business_id.clear();
        let record = snap.to_record();
        assert_eq!(record.matches(';').count(), completed.matches(';').count());
        let fields: Vec<&str> = record.split(';').collect();
        assert_eq!(fields[1], "5c353bef6106");
        assert_eq!(fields[4], "timeout");
        assert!(fields[5..].iter().all(|f| f.is_empty()));
    }

    #[test]
    fn nocounter_keeps_details_but_blanks_counters() {
        let snap = completed_snapshot_as(ModemState::Nocounter);
        let record = snap.to_record();
        let fields: Vec<&str> = record.split(';').collect();
        assert_eq!(fields.len(), RECORD_FIELDS);
        assert_eq!(fields[13], "2-1");
        assert!(fields[18..].iter().all(|f| f.is_empty()));
    }

    #[test]
    fn unknown_delta_renders_empty() {
        let mut snap = completed();
        snap.usage = None;
        let record = snap.to_record();
        let fields: Vec<&str> = record.split(';').collect();
        assert_eq!(fields[19], "1500");
        assert_eq!(fields[20], "");
        assert_eq!(fields[22], "");
    }

    #[test]
    fn tenths_formatting() {
        assert_eq!(format_tenths(352), "35.2");
        assert_eq!(format_tenths(-15), "-1.5");
        assert_eq!(format_tenths(-5), "-0.5");
        assert_eq!(format_tenths(0), "0.0");
        assert_eq!(format_tenths(350), "35.0");
    }

    fn completed_snapshot_as(state: ModemState) -> ModemSnapshot {
        let mut snap = completed();
        snap.state = state;
        if !state.has_details() {
            snap.metadata = None;
            snap.signals = None;
            snap.counters = None;
        }
        snap
    }
}
