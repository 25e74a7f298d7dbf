//! ---
//! cmp_section: "05-networking-external-interfaces"
//! cmp_subsection: "module"
//! cmp_type: "source"
//! cmp_scope: "code"
//! cmp_description: "SNMP session seam, wire transport and table walker."
//! cmp_version: "v0.1.0"
//! cmp_owner: "tbd"
//! ---
//! UDP transport backed by `async-snmp`. This is the only module that touches
//! the wire library's types.

use std::time::Duration;

use async_snmp::{Auth, Client, Retry, UdpClient};
use async_trait::async_trait;
use cmpoll_common::config::SnmpConfig;

use crate::{Oid, Result, SessionConnector, SnmpError, SnmpSession, SnmpValue, VarBind};

/// Connector opening one UDP v2c client per target.
#[derive(Debug, Clone)]
pub struct UdpConnector {
    timeout: Duration,
    retries: u32,
    port: u16,
}

impl UdpConnector {
    /// Build a connector from the `[snmp]` configuration section.
    pub fn from_config(config: &SnmpConfig) -> Self {
        Self {
            timeout: config.timeout,
            retries: config.retries,
            port: config.port,
        }
    }

    fn socket_target(&self, address: &str) -> String {
        if address.contains(':') {
            address.to_owned()
        } else {
            format!("{}:{}", address, self.port)
        }
    }
}

#[async_trait]
impl SessionConnector for UdpConnector {
    type Session = UdpSession;

    async fn connect(&self, address: &str, community: &str) -> Result<UdpSession> {
        let target = self.socket_target(address);
        let client = Client::builder(target.clone(), Auth::v2c(community))
            .timeout(self.timeout)
            .retry(retry_policy(self.retries))
            .connect()
            .await
            .map_err(|err| map_error(&target, err))?;
        Ok(UdpSession { target, client })
    }
}

/// Live session against one agent.
pub struct UdpSession {
    target: String,
    client: UdpClient,
}

#[async_trait]
impl SnmpSession for UdpSession {
    fn target(&self) -> &str {
        &self.target
    }

    async fn get(&self, oids: &[Oid]) -> Result<Vec<VarBind>> {
        let request: Vec<async_snmp::Oid> = oids.iter().map(to_wire_oid).collect();
        let response = self
            .client
            .get_many(&request)
            .await
            .map_err(|err| map_error(&self.target, err))?;
        Ok(response.into_iter().map(from_wire_varbind).collect())
    }

    async fn get_bulk(
        &self,
        oids: &[Oid],
        non_repeaters: u32,
        max_repetitions: u32,
    ) -> Result<Vec<VarBind>> {
        let request: Vec<async_snmp::Oid> = oids.iter().map(to_wire_oid).collect();
        let response = self
            .client
            .get_bulk(&request, wire_count(non_repeaters), wire_count(max_repetitions))
            .await
            .map_err(|err| map_error(&self.target, err))?;
        Ok(response.into_iter().map(from_wire_varbind).collect())
    }
}

/// Retries are resent immediately; the per-attempt timeout is the only pacing.
fn retry_policy(retries: u32) -> Retry {
    if retries == 0 {
        Retry::none()
    } else {
        Retry::fixed(retries, Duration::ZERO)
    }
}

fn wire_count(count: u32) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

fn to_wire_oid(oid: &Oid) -> async_snmp::Oid {
    async_snmp::Oid::from_slice(oid.arcs())
}

fn from_wire_varbind(vb: async_snmp::VarBind) -> VarBind {
    VarBind::new(Oid::from(vb.oid.arcs()), from_wire_value(vb.value))
}

fn from_wire_value(value: async_snmp::Value) -> SnmpValue {
    use async_snmp::Value;
    match value {
        Value::Integer(v) => SnmpValue::Integer(i64::from(v)),
        Value::OctetString(bytes) => SnmpValue::OctetString(bytes.to_vec()),
        Value::Null => SnmpValue::Null,
        Value::ObjectIdentifier(oid) => SnmpValue::ObjectIdentifier(Oid::from(oid.arcs())),
        Value::IpAddress(octets) => SnmpValue::IpAddress(octets),
        Value::Counter32(v) => SnmpValue::Counter32(v),
        Value::Gauge32(v) => SnmpValue::Gauge32(v),
        Value::TimeTicks(v) => SnmpValue::TimeTicks(v),
        Value::Counter64(v) => SnmpValue::Counter64(v),
        Value::NoSuchObject => SnmpValue::NoSuchObject,
        Value::NoSuchInstance => SnmpValue::NoSuchInstance,
        Value::EndOfMibView => SnmpValue::EndOfMibView,
        // Opaque and unknown tags are kept as their textual rendering.
        other => SnmpValue::OctetString(other.to_string().into_bytes()),
    }
}

fn map_error(target: &str, err: Box<async_snmp::Error>) -> SnmpError {
    match *err {
        async_snmp::Error::Timeout { .. } => SnmpError::Timeout {
            target: target.to_owned(),
        },
        other => SnmpError::Transport(other.to_string()),
    }
}
