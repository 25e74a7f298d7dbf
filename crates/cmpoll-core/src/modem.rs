//! ---
//! cmp_section: "01-core-functionality"
//! cmp_subsection: "module"
//! cmp_type: "source"
//! cmp_scope: "code"
//! cmp_description: "Modem polling state machine and result records."
//! cmp_version: "v0.1.0"
//! cmp_owner: "tbd"
//! ---
//! One modem, three phases: counters, metadata, signal tables.
//!
//! Phases run strictly in order on one session. A timeout or unexpected
//! failure ends the poll; malformed counters only downgrade the final state.

use std::sync::OnceLock;

use cmpoll_common::time::poll_now;
use cmpoll_logging::{cmp_debug, cmp_warn, LogContext};
use cmpoll_snmp::{Oid, SessionConnector, SnmpError, SnmpSession, TableWalker, VarBind};

use crate::identity::{ModemIdentity, PollRequest};
use crate::snapshot::{
    DeviceMetadata, ModemSnapshot, ModemState, SignalReading, SignalTables, TrafficCounters,
    NO_WAN,
};

/// Numeric identifiers read from each modem.
pub mod oids {
    pub const IF_PHYS_ADDRESS: &str = ".1.3.6.1.2.1.2.2.1.6.2";
    pub const SYS_UPTIME: &str = ".1.3.6.1.2.1.1.3.0";
    pub const IF_HC_IN_OCTETS: &str = ".1.3.6.1.2.1.31.1.1.1.6.2";
    pub const IF_HC_OUT_OCTETS: &str = ".1.3.6.1.2.1.31.1.1.1.10.2";

    pub const DOCS_DEV_SERVER_CONFIG_FILE: &str = ".1.3.6.1.2.1.69.1.4.5.0";
    pub const DOCS_DEV_SW_OPER_STATUS: &str = ".1.3.6.1.2.1.69.1.3.4.0";
    pub const DOCS_DEV_SERVER_BOOT_STATE: &str = ".1.3.6.1.2.1.69.1.4.1.0";
    pub const DOCS_DEV_SW_CURRENT_VERS: &str = ".1.3.6.1.2.1.69.1.3.5.0";
    pub const DOCS_DEV_SW_FILENAME: &str = ".1.3.6.1.2.1.69.1.3.2.0";
    pub const CM_GW_WAN_INET_ADDRESS: &str = ".1.3.6.1.4.1.35604.1.19.52.1.1.5.0";
    pub const CM_GW_WAN_ROUTER: &str = ".1.3.6.1.4.1.35604.1.19.52.1.1.10.0";

    pub const DOCS_IF_DOWN_CHANNEL_POWER: &str = ".1.3.6.1.2.1.10.127.1.1.1.1.6";
    pub const DOCS_IF_SIGQ_SIGNAL_NOISE: &str = ".1.3.6.1.2.1.10.127.1.1.4.1.5";
    pub const DOCS_IF3_CM_STATUS_US_TX_POWER: &str = ".1.3.6.1.4.1.4491.2.1.20.1.2.1.1";
}

use oids::*;

const COUNTER_OIDS: [&str; 4] = [IF_PHYS_ADDRESS, SYS_UPTIME, IF_HC_IN_OCTETS, IF_HC_OUT_OCTETS];
const METADATA_OIDS: [&str; 7] = [
    DOCS_DEV_SERVER_CONFIG_FILE,
    DOCS_DEV_SW_OPER_STATUS,
    DOCS_DEV_SERVER_BOOT_STATE,
    DOCS_DEV_SW_CURRENT_VERS,
    DOCS_DEV_SW_FILENAME,
    CM_GW_WAN_INET_ADDRESS,
    CM_GW_WAN_ROUTER,
];

struct PollOids {
    counters: Vec<Oid>,
    metadata: Vec<Oid>,
    ds_power: Oid,
    ds_snr: Oid,
    us_power: Oid,
}

fn poll_oids() -> &'static PollOids {
    static OIDS: OnceLock<PollOids> = OnceLock::new();
    OIDS.get_or_init(|| {
        let parse = |s: &str| s.parse::<Oid>().unwrap_or_else(|_| unreachable!("{}", s));
        PollOids {
            counters: COUNTER_OIDS.iter().map(|s| parse(s)).collect(),
            metadata: METADATA_OIDS.iter().map(|s| parse(s)).collect(),
            ds_power: parse(DOCS_IF_DOWN_CHANNEL_POWER),
            ds_snr: parse(DOCS_IF_SIGQ_SIGNAL_NOISE),
            us_power: parse(DOCS_IF3_CM_STATUS_US_TX_POWER),
        }
    })
}

/// Why a phase did not produce its data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PhaseError {
    #[error("{phase} phase timed out")]
    Timeout { phase: &'static str },
    /// Counters were returned but are not unsigned integers.
    #[error("counter {field} is not an integer: {raw:?}")]
    MalformedCounter {
        field: &'static str,
        raw: String,
        device_hardware_id: Option<String>,
    },
    #[error("{phase} phase failed: {message}")]
    Unexpected {
        phase: &'static str,
        message: String,
    },
}

impl PhaseError {
    fn from_snmp(phase: &'static str, err: SnmpError) -> Self {
        match err {
            SnmpError::Timeout { .. } => PhaseError::Timeout { phase },
            other => PhaseError::Unexpected {
                phase,
                message: other.to_string(),
            },
        }
    }

    /// Terminal state this failure leads to.
    pub fn terminal_state(&self) -> ModemState {
        match self {
            PhaseError::Timeout { .. } => ModemState::Timeout,
            PhaseError::MalformedCounter { .. } => ModemState::Nocounter,
            PhaseError::Unexpected { .. } => ModemState::Error,
        }
    }
}

/// Polls a single modem over an owned session.
pub struct ModemClient<S: SnmpSession> {
    session: S,
    identity: ModemIdentity,
    initial_table_hint: u32,
}

impl<S: SnmpSession> ModemClient<S> {
    pub fn new(session: S, identity: ModemIdentity, initial_table_hint: u32) -> Self {
        Self {
            session,
            identity,
            initial_table_hint: initial_table_hint.max(1),
        }
    }

    pub fn identity(&self) -> &ModemIdentity {
        &self.identity
    }

    /// Run all phases and return the terminal snapshot.
    pub async fn poll(&self, ctx: &LogContext<'_>) -> ModemSnapshot {
        let mut snapshot = ModemSnapshot::new(self.identity.clone(), poll_now());

        let mut malformed = false;
        match self.read_counters(&ctx.with_phase("counters")).await {
            Ok((device_mac, counters)) => {
                snapshot.device_hardware_id = device_mac;
                snapshot.counters = Some(counters);
            }
            Err(PhaseError::MalformedCounter {
                field,
                raw,
                device_hardware_id,
            }) => {
                cmp_warn!(
                    context = ctx.with_phase("counters"),
                    "counter {} unreadable ({:?}); continuing without counters",
                    field,
                    raw
                );
                snapshot.device_hardware_id = device_hardware_id;
                malformed = true;
            }
            Err(err) => return self.abort(snapshot, err, ctx),
        }
        self.check_hardware_id(&snapshot, ctx);

        match self.read_metadata(&ctx.with_phase("metadata")).await {
            Ok(metadata) => snapshot.metadata = Some(metadata),
            Err(err) => return self.abort(snapshot, err, ctx),
        }

        match self.read_signals(&ctx.with_phase("signals")).await {
            Ok(signals) => snapshot.signals = Some(signals),
            Err(err) => return self.abort(snapshot, err, ctx),
        }

        snapshot.state = if malformed {
            ModemState::Nocounter
        } else {
            ModemState::Completed
        };
        cmp_debug!(context = ctx, "poll finished in state {}", snapshot.state);
        snapshot
    }

    fn abort(&self, snapshot: ModemSnapshot, err: PhaseError, ctx: &LogContext<'_>) -> ModemSnapshot {
        let state = err.terminal_state();
        cmp_warn!(context = ctx, "poll ended in state {}: {}", state, err);
        let mut failed =
            ModemSnapshot::failed(snapshot.identity, snapshot.polled_at, state, err.to_string());
        failed.device_hardware_id = snapshot.device_hardware_id;
        failed
    }

    fn check_hardware_id(&self, snapshot: &ModemSnapshot, ctx: &LogContext<'_>) {
        if let Some(reported) = &snapshot.device_hardware_id {
            if !self.identity.hardware_id.is_empty() && *reported != self.identity.hardware_id {
                cmp_warn!(
                    context = ctx,
                    "device reports hardware id {}, target list has {}",
                    reported,
                    self.identity.hardware_id
                );
            }
        }
    }

    async fn read_counters(
        &self,
        ctx: &LogContext<'_>,
    ) -> Result<(Option<String>, TrafficCounters), PhaseError> {
        const PHASE: &str = "counters";
        let vbs = self.get_all(PHASE, &poll_oids().counters).await?;
        let device_mac = vbs[0].value.to_hex().filter(|mac| !mac.is_empty());

        let field = |index: usize, name: &'static str| {
            vbs[index]
                .value
                .as_unsigned()
                .ok_or_else(|| PhaseError::MalformedCounter {
                    field: name,
                    raw: vbs[index].value.to_text(),
                    device_hardware_id: device_mac.clone(),
                })
        };
        let counters = TrafficCounters {
            uptime_ticks: field(1, "sysUpTime")?,
            downstream_bytes: field(2, "ifHCInOctets")?,
            upstream_bytes: field(3, "ifHCOutOctets")?,
        };
        cmp_debug!(
            context = ctx,
            "uptime {} ticks, {} bytes down, {} bytes up",
            counters.uptime_ticks,
            counters.downstream_bytes,
            counters.upstream_bytes
        );
        Ok((device_mac, counters))
    }

    async fn read_metadata(&self, ctx: &LogContext<'_>) -> Result<DeviceMetadata, PhaseError> {
        let vbs = self.get_all("metadata", &poll_oids().metadata).await?;
        let (wan_address, wan_gateway) = match (vbs[5].value.as_ipv4(), vbs[6].value.as_ipv4()) {
            (Some(address), Some(gateway)) => (address.to_string(), gateway.to_string()),
            _ => {
                cmp_debug!(context = ctx, "WAN address not decodable");
                (NO_WAN.to_owned(), NO_WAN.to_owned())
            }
        };
        Ok(DeviceMetadata {
            config_file: vbs[0].value.to_text(),
            sw_oper_status: vbs[1].value.to_text(),
            boot_status: vbs[2].value.to_text(),
            firmware_version: vbs[3].value.to_text(),
            firmware_filename: vbs[4].value.to_text(),
            wan_address,
            wan_gateway,
        })
    }

    async fn read_signals(&self, ctx: &LogContext<'_>) -> Result<SignalTables, PhaseError> {
        let oids = poll_oids();
        let downstream_power = self.walk(&oids.ds_power, self.initial_table_hint, ctx).await?;
        let downstream_snr = self
            .walk(&oids.ds_snr, next_hint(&downstream_power), ctx)
            .await?;
        let upstream_power = self
            .walk(&oids.us_power, next_hint(&downstream_snr), ctx)
            .await?;
        Ok(SignalTables {
            downstream_power,
            downstream_snr,
            upstream_power,
        })
    }

    async fn walk(
        &self,
        root: &Oid,
        hint: u32,
        ctx: &LogContext<'_>,
    ) -> Result<Vec<SignalReading>, PhaseError> {
        const PHASE: &str = "signals";
        let walk = TableWalker::new(&self.session, hint)
            .walk(root, ctx)
            .await
            .map_err(|err| PhaseError::from_snmp(PHASE, err))?;
        walk.into_iter()
            .map(|entry| {
                let tenths = entry.value.as_integer().ok_or_else(|| PhaseError::Unexpected {
                    phase: PHASE,
                    message: format!("non-numeric value under {}", root),
                })?;
                Ok(SignalReading {
                    channel: entry.channel().unwrap_or_default(),
                    tenths,
                })
            })
            .collect()
    }

    async fn get_all(&self, phase: &'static str, oids: &[Oid]) -> Result<Vec<VarBind>, PhaseError> {
        let vbs = self
            .session
            .get(oids)
            .await
            .map_err(|err| PhaseError::from_snmp(phase, err))?;
        if vbs.len() < oids.len() {
            return Err(PhaseError::from_snmp(
                phase,
                SnmpError::ShortResponse {
                    expected: oids.len(),
                    received: vbs.len(),
                },
            ));
        }
        Ok(vbs)
    }
}

fn next_hint(previous: &[SignalReading]) -> u32 {
    u32::try_from(previous.len())
        .unwrap_or(u32::MAX - 1)
        .saturating_add(1)
}

/// Open a session for `request` and poll it. Session setup failures count as
/// failures of the counters phase.
pub async fn poll_target<C: SessionConnector>(
    connector: &C,
    request: &PollRequest,
    initial_table_hint: u32,
) -> ModemSnapshot {
    let identity = request.identity();
    let ctx = identity.log_context();
    match connector.connect(&request.address, &request.community).await {
        Ok(session) => {
            ModemClient::new(session, identity.clone(), initial_table_hint)
                .poll(&ctx)
                .await
        }
        Err(err) => {
            let err = PhaseError::from_snmp("counters", err);
            let state = err.terminal_state();
            cmp_warn!(context = ctx, "session setup failed: {}", err);
            ModemSnapshot::failed(identity.clone(), poll_now(), state, err.to_string())
        }
    }
}
