//! ---
//! cmp_section: "15-testing-qa-runbook"
//! cmp_subsection: "module"
//! cmp_type: "source"
//! cmp_scope: "code"
//! cmp_description: "Synthetic cable modems for tests."
//! cmp_version: "v0.1.0"
//! cmp_owner: "tbd"
//! ---
//! Builds in-memory agents that answer like a cable modem.

use cmpoll_snmp::testing::FakeAgent;
use cmpoll_snmp::{Oid, SnmpValue};

use crate::modem::oids;

/// Shape of a synthetic modem.
#[derive(Debug, Clone)]
pub struct ModemProfile {
    pub mac: [u8; 6],
    pub uptime_ticks: u32,
    pub downstream_bytes: u64,
    pub upstream_bytes: u64,
    /// Report counters as text the poller cannot parse.
    pub malformed_counters: bool,
    pub firmware_version: String,
    /// WAN address and gateway; `None` leaves both empty.
    pub wan: Option<([u8; 4], [u8; 4])>,
    pub downstream_power: Vec<i64>,
    pub downstream_snr: Vec<i64>,
    pub upstream_power: Vec<i64>,
}

impl Default for ModemProfile {
    fn default() -> Self {
        Self {
            mac: [0x5c, 0x35, 0x3b, 0xef, 0x61, 0x06],
            uptime_ticks: 360_000,
            downstream_bytes: 1_500,
            upstream_bytes: 300,
            malformed_counters: false,
            firmware_version: "CH6643E-3.5.27.1".into(),
            wan: Some(([192, 168, 100, 10], [192, 168, 100, 1])),
            downstream_power: vec![52, 48, 45, 41, 38, 36, 30, -15],
            downstream_snr: vec![380, 381, 379, 377, 376, 375, 372, 370],
            upstream_power: vec![450, 455, 460, 452],
        }
    }
}

impl ModemProfile {
    /// Agent listening on `address` with this profile's objects.
    pub fn agent(&self, address: &str) -> FakeAgent {
        let counter = |value: u64| {
            if self.malformed_counters {
                SnmpValue::OctetString(b"unsupported".to_vec())
            } else {
                SnmpValue::Counter64(value)
            }
        };
        let (wan_address, wan_gateway) = match self.wan {
            Some((address, gateway)) => (
                SnmpValue::OctetString(address.to_vec()),
                SnmpValue::IpAddress(gateway),
            ),
            None => (
                SnmpValue::OctetString(Vec::new()),
                SnmpValue::OctetString(Vec::new()),
            ),
        };

        FakeAgent::new(address)
            .with(oids::IF_PHYS_ADDRESS, SnmpValue::OctetString(self.mac.to_vec()))
            .with(oids::SYS_UPTIME, SnmpValue::TimeTicks(self.uptime_ticks))
            .with(oids::IF_HC_IN_OCTETS, counter(self.downstream_bytes))
            .with(oids::IF_HC_OUT_OCTETS, counter(self.upstream_bytes))
            .with(
                oids::DOCS_DEV_SERVER_CONFIG_FILE,
                SnmpValue::OctetString(b"cm_basic_100M.cfg".to_vec()),
            )
            .with(oids::DOCS_DEV_SW_OPER_STATUS, SnmpValue::Integer(3))
            .with(oids::DOCS_DEV_SERVER_BOOT_STATE, SnmpValue::Integer(1))
            .with(
                oids::DOCS_DEV_SW_CURRENT_VERS,
                SnmpValue::OctetString(self.firmware_version.clone().into_bytes()),
            )
            .with(
                oids::DOCS_DEV_SW_FILENAME,
                SnmpValue::OctetString(b"ch6643e.bin".to_vec()),
            )
            .with(oids::CM_GW_WAN_INET_ADDRESS, wan_address)
            .with(oids::CM_GW_WAN_ROUTER, wan_gateway)
            .with_table(&table(oids::DOCS_IF_DOWN_CHANNEL_POWER), rows(&self.downstream_power, 3))
            .with_table(&table(oids::DOCS_IF_SIGQ_SIGNAL_NOISE), rows(&self.downstream_snr, 3))
            .with_table(&table(oids::DOCS_IF3_CM_STATUS_US_TX_POWER), rows(&self.upstream_power, 4))
    }
}

fn table(root: &str) -> Oid {
    root.parse().unwrap_or_else(|_| unreachable!("{}", root))
}

fn rows(values: &[i64], first_channel: u32) -> Vec<(u32, SnmpValue)> {
    values
        .iter()
        .zip(first_channel..)
        .map(|(value, channel)| (channel, SnmpValue::Integer(*value)))
        .collect()
}
