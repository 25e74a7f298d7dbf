//! ---
//! cmp_section: "04-configuration-orchestration"
//! cmp_subsection: "module"
//! cmp_type: "source"
//! cmp_scope: "code"
//! cmp_description: "Batch polling driver: worker pool, cache application, staged output."
//! cmp_version: "v0.1.0"
//! cmp_owner: "tbd"
//! ---
//! Bounded pool of polling tasks that yields exactly one outcome per request.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cmpoll_common::time::poll_now;
use cmpoll_core::{poll_target, ModemIdentity, ModemSnapshot, ModemState, PollRequest};
use cmpoll_snmp::SessionConnector;
use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, warn};

/// A finished poll and where it sits in the input list.
#[derive(Debug)]
pub struct PoolOutcome {
    /// Position of the request in the submitted list.
    pub index: usize,
    /// Terminal snapshot for the request.
    pub snapshot: ModemSnapshot,
    /// Time spent in the worker.
    pub elapsed: Duration,
}

/// Poll one request, turning a panic anywhere below into an `error` snapshot.
pub async fn guarded_poll<C: SessionConnector>(
    connector: &C,
    request: &PollRequest,
    initial_table_hint: u32,
) -> ModemSnapshot {
    match AssertUnwindSafe(poll_target(connector, request, initial_table_hint))
        .catch_unwind()
        .await
    {
        Ok(snapshot) => snapshot,
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            error!(
                address = %request.address,
                hardware_id = %request.hardware_id,
                reason = %reason,
                "poll panicked"
            );
            ModemSnapshot::failed(
                request.identity(),
                poll_now(),
                ModemState::Error,
                format!("poll panicked: {}", reason),
            )
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

/// Running pool. Outcomes arrive in completion order.
pub struct WorkerPool {
    tasks: JoinSet<PoolOutcome>,
    identities: Vec<ModemIdentity>,
    delivered: Vec<bool>,
}

impl WorkerPool {
    /// Spawn one task per request; at most `degree` poll concurrently.
    pub fn spawn<C: SessionConnector>(
        connector: Arc<C>,
        requests: Vec<PollRequest>,
        initial_table_hint: u32,
        degree: usize,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(degree.max(1)));
        let identities = requests.iter().map(PollRequest::identity).collect::<Vec<_>>();
        let delivered = vec![false; requests.len()];
        let mut tasks = JoinSet::new();

        for (index, request) in requests.into_iter().enumerate() {
            let connector = Arc::clone(&connector);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return PoolOutcome {
                            index,
                            snapshot: ModemSnapshot::failed(
                                request.identity(),
                                poll_now(),
                                ModemState::Error,
                                "worker pool closed",
                            ),
                            elapsed: Duration::ZERO,
                        }
                    }
                };
                let started = Instant::now();
                let snapshot = guarded_poll(connector.as_ref(), &request, initial_table_hint).await;
                PoolOutcome {
                    index,
                    snapshot,
                    elapsed: started.elapsed(),
                }
            });
        }

        Self {
            tasks,
            identities,
            delivered,
        }
    }

    /// Next outcome. Once every task has ended, requests that never reported
    /// are returned as `error` snapshots; `None` means all were delivered.
    pub async fn next(&mut self) -> Option<PoolOutcome> {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(outcome) if !self.delivered[outcome.index] => {
                    self.delivered[outcome.index] = true;
                    return Some(outcome);
                }
                Ok(outcome) => warn!(index = outcome.index, "duplicate worker outcome dropped"),
                Err(err) => warn!(error = %err, "worker ended without a result"),
            }
        }

        let index = self.delivered.iter().position(|done| !done)?;
        self.delivered[index] = true;
        let identity = self.identities[index].clone();
        error!(address = %identity.address, "no result from worker, recording error");
        Some(PoolOutcome {
            index,
            snapshot: ModemSnapshot::failed(
                identity,
                poll_now(),
                ModemState::Error,
                "worker ended without a result",
            ),
            elapsed: Duration::ZERO,
        })
    }

    /// Requests submitted to the pool.
    pub fn len(&self) -> usize {
        self.identities.len()
    }

    /// True when nothing was submitted.
    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmpoll_core::fixtures::ModemProfile;
    use cmpoll_snmp::testing::{FakeConnector, FakeFault};

    fn requests(addresses: &[&str]) -> Vec<PollRequest> {
        addresses
            .iter()
            .enumerate()
            .map(|(i, address)| {
                PollRequest::new(
                    ModemIdentity::new(format!("bp-{}", i), "5c353bef6106", *address),
                    "public",
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn panic_becomes_error_snapshot() {
        let connector = FakeConnector::new()
            .with_agent(ModemProfile::default().agent("10.0.0.1"))
            .fail_connect("10.0.0.2", FakeFault::Panic);
        let request = &requests(&["10.0.0.1", "10.0.0.2"])[1];
        let snapshot = guarded_poll(&connector, request, 9).await;
        assert_eq!(snapshot.state, ModemState::Error);
        assert!(snapshot.failure.unwrap().contains("panicked"));
    }

    #[tokio::test]
    async fn one_outcome_per_request() {
        let connector = Arc::new(
            FakeConnector::new()
                .with_agent(ModemProfile::default().agent("10.0.0.1"))
                .with_agent(ModemProfile::default().agent("10.0.0.3"))
                .fail_connect("10.0.0.2", FakeFault::Panic),
        );
        let mut pool = WorkerPool::spawn(
            connector,
            requests(&["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4"]),
            9,
            2,
        );
        assert_eq!(pool.len(), 4);
        let mut seen = Vec::new();
        while let Some(outcome) = pool.next().await {
            seen.push((outcome.index, outcome.snapshot.state));
        }
        seen.sort_by_key(|(index, _)| *index);
        assert_eq!(
            seen,
            vec![
                (0, ModemState::Completed),
                (1, ModemState::Error),
                (2, ModemState::Completed),
                (3, ModemState::Timeout),
            ]
        );
    }

    #[tokio::test]
    async fn cancelled_workers_are_back_filled() {
        let connector = Arc::new(
            FakeConnector::new().with_agent(ModemProfile::default().agent("10.0.0.1")),
        );
        let mut pool = WorkerPool::spawn(connector, requests(&["10.0.0.1", "10.0.0.9"]), 9, 4);
        pool.tasks.abort_all();
        let mut states = Vec::new();
        while let Some(outcome) = pool.next().await {
            states.push(outcome.snapshot.state);
        }
        assert_eq!(states, vec![ModemState::Error, ModemState::Error]);
    }
}
