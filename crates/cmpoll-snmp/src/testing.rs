//! ---
//! cmp_section: "15-testing-qa-runbook"
//! cmp_subsection: "module"
//! cmp_type: "source"
//! cmp_scope: "code"
//! cmp_description: "In-memory SNMP agent used by unit and integration tests."
//! cmp_version: "v0.1.0"
//! cmp_owner: "tbd"
//! ---
//! In-memory agents with v2c GET/GETBULK semantics and fault injection.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{Oid, Result, SessionConnector, SnmpError, SnmpSession, SnmpValue, VarBind};

/// Failure an agent can be told to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeFault {
    /// The request times out.
    Timeout,
    /// The transport reports the given failure.
    Transport(String),
    /// Panic inside the request, as a buggy decoder would.
    Panic,
}

#[derive(Debug, Default)]
struct FakeState {
    roundtrips: usize,
    fail_after: Option<(usize, FakeFault)>,
    fail_under: Vec<(Oid, FakeFault)>,
    stall_from: Option<Oid>,
    stall: bool,
}

/// An agent answering from an ordered object map.
#[derive(Debug)]
pub struct FakeAgent {
    target: String,
    objects: BTreeMap<Oid, SnmpValue>,
    state: Mutex<FakeState>,
}

impl FakeAgent {
    /// Empty agent reachable at `target`.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            objects: BTreeMap::new(),
            state: Mutex::new(FakeState::default()),
        }
    }

    /// Add a scalar object.
    ///
    /// # Panics
    /// When `oid` does not parse.
    pub fn with(mut self, oid: &str, value: SnmpValue) -> Self {
        let oid: Oid = oid.parse().expect("fake agent oid");
        self.objects.insert(oid, value);
        self
    }

    /// Add one column of a table, rows keyed by their single index arc.
    pub fn with_table(
        mut self,
        root: &Oid,
        rows: impl IntoIterator<Item = (u32, SnmpValue)>,
    ) -> Self {
        for (index, value) in rows {
            self.objects.insert(root.child(index), value);
        }
        self
    }

    /// Every request after the first `successes` fails with `fault`.
    pub fn fail_after(self, successes: usize, fault: FakeFault) -> Self {
        self.state.lock().fail_after = Some((successes, fault));
        self
    }

    /// Requests whose first identifier lies under `prefix` fail with `fault`.
    pub fn fail_under(self, prefix: &str, fault: FakeFault) -> Self {
        let prefix: Oid = prefix.parse().expect("fake agent prefix");
        self.state.lock().fail_under.push((prefix, fault));
        self
    }

    /// GETBULK keeps answering from the first requested identifier, so the
    /// responses never advance.
    pub fn stall_bulk(self) -> Self {
        self.state.lock().stall = true;
        self
    }

    /// Requests received so far, including failed ones.
    pub fn roundtrips(&self) -> usize {
        self.state.lock().roundtrips
    }

    fn admit(&self, oids: &[Oid]) -> Result<()> {
        let fault = {
            let mut state = self.state.lock();
            state.roundtrips += 1;
            let seen = state.roundtrips;
            let after = state
                .fail_after
                .as_ref()
                .filter(|(successes, _)| seen > *successes)
                .map(|(_, fault)| fault.clone());
            after.or_else(|| {
                let first = oids.first()?;
                state
                    .fail_under
                    .iter()
                    .find(|(prefix, _)| first.starts_with(prefix))
                    .map(|(_, fault)| fault.clone())
            })
        };
        match fault {
            None => Ok(()),
            Some(FakeFault::Timeout) => Err(SnmpError::Timeout {
                target: self.target.clone(),
            }),
            Some(FakeFault::Transport(msg)) => Err(SnmpError::Transport(msg)),
            Some(FakeFault::Panic) => panic!("injected agent panic at {}", self.target),
        }
    }

    fn successor(&self, oid: &Oid) -> VarBind {
        self.objects
            .range((Bound::Excluded(oid.clone()), Bound::Unbounded))
            .next()
            .map(|(oid, value)| VarBind::new(oid.clone(), value.clone()))
            .unwrap_or_else(|| VarBind::new(oid.clone(), SnmpValue::EndOfMibView))
    }
}

#[async_trait]
impl SnmpSession for FakeAgent {
    fn target(&self) -> &str {
        &self.target
    }

    async fn get(&self, oids: &[Oid]) -> Result<Vec<VarBind>> {
        self.admit(oids)?;
        Ok(oids
            .iter()
            .map(|oid| {
                let value = self
                    .objects
                    .get(oid)
                    .cloned()
                    .unwrap_or(SnmpValue::NoSuchInstance);
                VarBind::new(oid.clone(), value)
            })
            .collect())
    }

    async fn get_bulk(
        &self,
        oids: &[Oid],
        non_repeaters: u32,
        max_repetitions: u32,
    ) -> Result<Vec<VarBind>> {
        self.admit(oids)?;
        let mut request = oids.to_vec();
        {
            let mut state = self.state.lock();
            if state.stall {
                let first = state.stall_from.get_or_insert_with(|| request[0].clone());
                request[0] = first.clone();
            }
        }

        let split = (non_repeaters as usize).min(request.len());
        let (scalars, repeaters) = request.split_at(split);
        let mut out: Vec<VarBind> = scalars.iter().map(|oid| self.successor(oid)).collect();
        let mut cursors: Vec<Oid> = repeaters.to_vec();
        for _ in 0..max_repetitions {
            for cursor in cursors.iter_mut() {
                let next = self.successor(cursor);
                *cursor = next.oid.clone();
                out.push(next);
            }
        }
        Ok(out)
    }
}

/// Connector resolving addresses to in-memory agents. Unknown addresses
/// behave like unreachable hosts.
#[derive(Debug, Default)]
pub struct FakeConnector {
    agents: HashMap<String, Arc<FakeAgent>>,
    connect_faults: HashMap<String, FakeFault>,
}

impl FakeConnector {
    /// Connector with no reachable agents.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `agent` at its own target address.
    pub fn with_agent(mut self, agent: FakeAgent) -> Self {
        self.agents.insert(agent.target.clone(), Arc::new(agent));
        self
    }

    /// Make session setup for `address` fail.
    pub fn fail_connect(mut self, address: impl Into<String>, fault: FakeFault) -> Self {
        self.connect_faults.insert(address.into(), fault);
        self
    }

    /// Agent registered for `address`, for inspecting its roundtrips.
    pub fn agent(&self, address: &str) -> Option<Arc<FakeAgent>> {
        self.agents.get(address).cloned()
    }
}

#[async_trait]
impl SessionConnector for FakeConnector {
    type Session = Arc<FakeAgent>;

    async fn connect(&self, address: &str, _community: &str) -> Result<Arc<FakeAgent>> {
        match self.connect_faults.get(address) {
            Some(FakeFault::Timeout) => {
                return Err(SnmpError::Timeout {
                    target: address.to_owned(),
                })
            }
            Some(FakeFault::Transport(msg)) => return Err(SnmpError::Transport(msg.clone())),
            Some(FakeFault::Panic) => panic!("injected connect panic at {}", address),
            None => {}
        }
        self.agents
            .get(address)
            .cloned()
            .ok_or_else(|| SnmpError::Timeout {
                target: address.to_owned(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_reports_missing_objects_as_exceptions() {
        let agent = FakeAgent::new("a").with(".1.3.6.1.2.1.1.3.0", SnmpValue::TimeTicks(100));
        let oids: Vec<Oid> = vec![
            ".1.3.6.1.2.1.1.3.0".parse().unwrap(),
            ".1.3.6.1.2.1.1.5.0".parse().unwrap(),
        ];
        let vbs = agent.get(&oids).await.unwrap();
        assert_eq!(vbs[0].value, SnmpValue::TimeTicks(100));
        assert_eq!(vbs[1].value, SnmpValue::NoSuchInstance);
    }

    #[tokio::test]
    async fn bulk_pads_with_end_of_view() {
        let agent = FakeAgent::new("a").with(".1.3.6.1.2.1.1.3.0", SnmpValue::TimeTicks(1));
        let root: Oid = ".1.3.6.1.2.1.1".parse().unwrap();
        let vbs = agent.get_bulk(&[root], 0, 3).await.unwrap();
        assert_eq!(vbs.len(), 3);
        assert_eq!(vbs[0].value, SnmpValue::TimeTicks(1));
        assert_eq!(vbs[1].value, SnmpValue::EndOfMibView);
    }

    #[tokio::test]
    async fn unknown_address_times_out() {
        let connector = FakeConnector::new().with_agent(FakeAgent::new("10.0.0.1"));
        assert!(connector.connect("10.0.0.1", "public").await.is_ok());
        let err = connector.connect("10.0.0.9", "public").await.unwrap_err();
        assert!(err.is_timeout());
    }
}
