//! ---
//! cmp_section: "05-networking-external-interfaces"
//! cmp_subsection: "module"
//! cmp_type: "source"
//! cmp_scope: "code"
//! cmp_description: "SNMP session seam, wire transport and table walker."
//! cmp_version: "v0.1.0"
//! cmp_owner: "tbd"
//! ---
use async_trait::async_trait;

use crate::{Oid, Result, VarBind};

/// Read-only SNMP v2c session bound to a single agent.
#[async_trait]
pub trait SnmpSession: Send + Sync {
    /// Address the session talks to, used in logs and errors.
    fn target(&self) -> &str;

    /// Batched GET. The response carries one binding per requested identifier,
    /// in request order; missing objects come back as exception values.
    async fn get(&self, oids: &[Oid]) -> Result<Vec<VarBind>>;

    /// GETBULK with the given repetition parameters.
    async fn get_bulk(
        &self,
        oids: &[Oid],
        non_repeaters: u32,
        max_repetitions: u32,
    ) -> Result<Vec<VarBind>>;
}

/// Opens sessions to agents. Shared between polling workers.
#[async_trait]
pub trait SessionConnector: Send + Sync + 'static {
    /// Session type produced by this connector.
    type Session: SnmpSession + 'static;

    /// Open a session to `address` using `community`.
    async fn connect(&self, address: &str, community: &str) -> Result<Self::Session>;
}

#[async_trait]
impl<T: SnmpSession + ?Sized> SnmpSession for std::sync::Arc<T> {
    fn target(&self) -> &str {
        (**self).target()
    }

    async fn get(&self, oids: &[Oid]) -> Result<Vec<VarBind>> {
        (**self).get(oids).await
    }

    async fn get_bulk(
        &self,
        oids: &[Oid],
        non_repeaters: u32,
        max_repetitions: u32,
    ) -> Result<Vec<VarBind>> {
        (**self).get_bulk(oids, non_repeaters, max_repetitions).await
    }
}
