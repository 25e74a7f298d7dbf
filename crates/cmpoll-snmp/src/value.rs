//! ---
//! cmp_section: "05-networking-external-interfaces"
//! cmp_subsection: "module"
//! cmp_type: "source"
//! cmp_scope: "code"
//! cmp_description: "SNMP session seam, wire transport and table walker."
//! cmp_version: "v0.1.0"
//! cmp_owner: "tbd"
//! ---
use std::fmt::Write as _;
use std::net::Ipv4Addr;

use serde::Serialize;

use crate::Oid;

/// Value carried by a variable binding, independent of the wire library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SnmpValue {
    /// Signed INTEGER; signal levels are reported this way in tenths.
    Integer(i64),
    /// Raw OCTET STRING bytes.
    OctetString(Vec<u8>),
    /// OBJECT IDENTIFIER value.
    ObjectIdentifier(Oid),
    /// IpAddress in network order.
    IpAddress([u8; 4]),
    /// Wrapping 32-bit counter.
    Counter32(u32),
    /// 32-bit gauge.
    Gauge32(u32),
    /// Hundredths of a second, e.g. sysUpTime.
    TimeTicks(u32),
    /// Wrapping 64-bit counter.
    Counter64(u64),
    /// NULL.
    Null,
    /// The agent does not implement the object.
    NoSuchObject,
    /// The object exists but not this instance.
    NoSuchInstance,
    /// Nothing follows the requested identifier.
    EndOfMibView,
}

impl SnmpValue {
    /// Exception values mark the absence of data rather than data itself.
    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            SnmpValue::NoSuchObject | SnmpValue::NoSuchInstance | SnmpValue::EndOfMibView
        )
    }

    /// Unsigned interpretation. Octet strings holding decimal text are accepted
    /// since some modem firmwares report counters that way.
    pub fn as_unsigned(&self) -> Option<u64> {
        match self {
            SnmpValue::Counter64(v) => Some(*v),
            SnmpValue::Counter32(v) | SnmpValue::Gauge32(v) | SnmpValue::TimeTicks(v) => {
                Some(u64::from(*v))
            }
            SnmpValue::Integer(v) => u64::try_from(*v).ok(),
            SnmpValue::OctetString(bytes) => std::str::from_utf8(bytes)
                .ok()
                .and_then(|s| s.trim().parse().ok()),
            _ => None,
        }
    }

    /// Signed interpretation used for signal-quality tables.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            SnmpValue::Integer(v) => Some(*v),
            SnmpValue::Counter32(v) | SnmpValue::Gauge32(v) | SnmpValue::TimeTicks(v) => {
                Some(i64::from(*v))
            }
            SnmpValue::Counter64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// IPv4 interpretation: an IpAddress value or a raw 4-byte octet string.
    pub fn as_ipv4(&self) -> Option<Ipv4Addr> {
        match self {
            SnmpValue::IpAddress(octets) => Some(Ipv4Addr::from(*octets)),
            SnmpValue::OctetString(bytes) => {
                <[u8; 4]>::try_from(bytes.as_slice()).ok().map(Ipv4Addr::from)
            }
            _ => None,
        }
    }

    /// Text rendering. Octet strings are decoded byte-per-char so binary
    /// firmware strings never fail to render.
    pub fn to_text(&self) -> String {
        match self {
            SnmpValue::OctetString(bytes) => bytes.iter().map(|b| char::from(*b)).collect(),
            SnmpValue::Integer(v) => v.to_string(),
            SnmpValue::ObjectIdentifier(oid) => oid.to_string(),
            SnmpValue::IpAddress(octets) => Ipv4Addr::from(*octets).to_string(),
            SnmpValue::Counter32(v) | SnmpValue::Gauge32(v) | SnmpValue::TimeTicks(v) => {
                v.to_string()
            }
            SnmpValue::Counter64(v) => v.to_string(),
            SnmpValue::Null
            | SnmpValue::NoSuchObject
            | SnmpValue::NoSuchInstance
            | SnmpValue::EndOfMibView => String::new(),
        }
    }

    /// Lowercase hex of an octet string, e.g. a MAC address.
    pub fn to_hex(&self) -> Option<String> {
        match self {
            SnmpValue::OctetString(bytes) => {
                let mut out = String::with_capacity(bytes.len() * 2);
                for b in bytes {
                    let _ = write!(out, "{:02x}", b);
                }
                Some(out)
            }
            _ => None,
        }
    }
}

/// An identifier paired with the value the agent returned for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VarBind {
    /// Identifier the value belongs to.
    pub oid: Oid,
    /// Value or exception returned for `oid`.
    pub value: SnmpValue,
}

impl VarBind {
    /// Pair `oid` with `value`.
    pub fn new(oid: Oid, value: SnmpValue) -> Self {
        Self { oid, value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_renders_as_lowercase_hex() {
        let mac = SnmpValue::OctetString(vec![0x5c, 0x35, 0x3b, 0xef, 0x61, 0x06]);
        assert_eq!(mac.to_hex().as_deref(), Some("5c353bef6106"));
        assert_eq!(SnmpValue::Integer(1).to_hex(), None);
    }

    #[test]
    fn unsigned_accepts_counters_and_rejects_garbage() {
        assert_eq!(SnmpValue::Counter64(1_000).as_unsigned(), Some(1_000));
        assert_eq!(SnmpValue::TimeTicks(360_000).as_unsigned(), Some(360_000));
        assert_eq!(SnmpValue::OctetString(b" 42 ".to_vec()).as_unsigned(), Some(42));
        assert_eq!(SnmpValue::OctetString(b"n/a".to_vec()).as_unsigned(), None);
        assert_eq!(SnmpValue::Integer(-3).as_unsigned(), None);
        assert_eq!(SnmpValue::NoSuchInstance.as_unsigned(), None);
    }

    #[test]
    fn ipv4_from_either_encoding() {
        assert_eq!(
            SnmpValue::IpAddress([10, 1, 2, 3]).as_ipv4(),
            Some(Ipv4Addr::new(10, 1, 2, 3))
        );
        assert_eq!(
            SnmpValue::OctetString(vec![192, 168, 0, 1]).as_ipv4(),
            Some(Ipv4Addr::new(192, 168, 0, 1))
        );
        assert_eq!(SnmpValue::OctetString(vec![1, 2, 3]).as_ipv4(), None);
    }

    #[test]
    fn text_is_lossless_for_high_bytes() {
        let v = SnmpValue::OctetString(vec![b'v', b'1', 0xe9]);
        assert_eq!(v.to_text(), "v1\u{e9}");
        assert!(SnmpValue::EndOfMibView.to_text().is_empty());
    }
}
