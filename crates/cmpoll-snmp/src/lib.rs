//! ---
//! cmp_section: "05-networking-external-interfaces"
//! cmp_subsection: "module"
//! cmp_type: "source"
//! cmp_scope: "code"
//! cmp_description: "SNMP session seam, wire transport and table walker."
//! cmp_version: "v0.1.0"
//! cmp_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Read-only SNMP v2c access for the poller.
//!
//! Everything above this crate talks to devices through [`SnmpSession`] and
//! [`SessionConnector`]; only [`transport`] knows about the wire library.

pub mod oid;
pub mod session;
pub mod transport;
pub mod value;
pub mod walk;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use oid::Oid;
pub use session::{SessionConnector, SnmpSession};
pub use transport::{UdpConnector, UdpSession};
pub use value::{SnmpValue, VarBind};
pub use walk::{walk_table, TableEntry, TableWalk, TableWalker};

/// Result alias used throughout the SNMP crate.
pub type Result<T> = std::result::Result<T, SnmpError>;

/// Error type for SNMP operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnmpError {
    /// The agent did not answer within the configured timeout and retries.
    #[error("request to {target} timed out")]
    Timeout {
        /// Agent the request was addressed to.
        target: String,
    },
    /// Socket, encoding or protocol failure reported by the transport.
    #[error("transport error: {0}")]
    Transport(String),
    /// An identifier could not be parsed.
    #[error("invalid object identifier: {0}")]
    InvalidOid(String),
    /// A bulk response did not move past the identifier it was rooted at.
    #[error("bulk response rooted at {root} did not advance (last {last})")]
    NonIncreasing {
        /// Identifier the request was rooted at.
        root: Oid,
        /// Last identifier returned by the agent.
        last: Oid,
    },
    /// A GET returned fewer variables than requested.
    #[error("expected {expected} variables, received {received}")]
    ShortResponse {
        /// Number of identifiers requested.
        expected: usize,
        /// Number of variables returned.
        received: usize,
    },
}

impl SnmpError {
    /// Whether the failure is a protocol timeout rather than any other fault.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SnmpError::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_classification() {
        let err = SnmpError::Timeout {
            target: "10.0.0.1:161".into(),
        };
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "request to 10.0.0.1:161 timed out");
        assert!(!SnmpError::Transport("socket closed".into()).is_timeout());
    }
}
