//! ---
//! cmp_section: "04-configuration-orchestration"
//! cmp_subsection: "module"
//! cmp_type: "source"
//! cmp_scope: "code"
//! cmp_description: "Batch polling driver: worker pool, cache application, staged output."
//! cmp_version: "v0.1.0"
//! cmp_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cmpoll_cache::UsageCache;
use cmpoll_common::config::{BootMarkerSource, PollerConfig};
use cmpoll_core::{read_targets, ModemIdentity, ModemSnapshot, ModemState, PollRequest};
use cmpoll_logging::{cmp_error, log_run_event, LogContext, RunEventOutcome};
use cmpoll_metrics::PollMetrics;
use cmpoll_snmp::SessionConnector;
use serde::Serialize;
use tracing::info;

use crate::output::StagedOutput;
use crate::pool::{guarded_poll, PoolOutcome, WorkerPool};
use crate::OrchestratorError;

/// Knobs for one batch, resolved from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSettings {
    /// v2c community sent to every modem.
    pub community: String,
    /// Max-repetitions for the first signal table of each modem.
    pub initial_table_hint: u32,
    /// Concurrent polls; one or less polls sequentially in input order.
    pub parallelism: usize,
    /// How the reboot marker stored with each usage record is derived.
    pub boot_marker: BootMarkerSource,
}

impl PollSettings {
    /// Resolve settings, defaulting parallelism to `available` CPUs.
    pub fn from_config(config: &PollerConfig, available: usize) -> Self {
        Self {
            community: config.snmp.community.clone(),
            initial_table_hint: config.snmp.initial_table_hint,
            parallelism: config.effective_parallelism(available),
            boot_marker: config.poll.boot_marker,
        }
    }
}

/// What a finished batch produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollSummary {
    /// Targets read from the list.
    pub targets: usize,
    /// Polls that ended `completed`.
    pub completed: usize,
    /// Polls that ended `nocounter`.
    pub nocounter: usize,
    /// Polls that ended `timeout`.
    pub timeout: usize,
    /// Polls that ended `error`.
    pub error: usize,
    /// Completed polls whose usage could not be computed.
    pub cache_failures: usize,
    /// Result file the batch was published to.
    pub output: PathBuf,
    /// Wall time of the whole batch.
    pub elapsed: Duration,
}

impl PollSummary {
    fn new(output: PathBuf) -> Self {
        Self {
            targets: 0,
            completed: 0,
            nocounter: 0,
            timeout: 0,
            error: 0,
            cache_failures: 0,
            output,
            elapsed: Duration::ZERO,
        }
    }

    /// Results recorded in `state`.
    pub fn count(&self, state: ModemState) -> usize {
        match state {
            ModemState::Init => 0,
            ModemState::Completed => self.completed,
            ModemState::Nocounter => self.nocounter,
            ModemState::Timeout => self.timeout,
            ModemState::Error => self.error,
        }
    }

    fn tally(&mut self, state: ModemState) {
        self.targets += 1;
        match state {
            ModemState::Completed => self.completed += 1,
            ModemState::Nocounter => self.nocounter += 1,
            ModemState::Timeout => self.timeout += 1,
            // A snapshot never leaves a poll in `init`; count it as a failure.
            ModemState::Init | ModemState::Error => self.error += 1,
        }
    }
}

/// Polls a target list and writes one record per target.
pub struct Orchestrator<C: SessionConnector> {
    connector: Arc<C>,
    settings: PollSettings,
    cache: Option<UsageCache>,
    metrics: Option<PollMetrics>,
}

impl<C: SessionConnector> Orchestrator<C> {
    /// Orchestrator without usage tracking or metrics.
    pub fn new(connector: Arc<C>, settings: PollSettings) -> Self {
        Self {
            connector,
            settings,
            cache: None,
            metrics: None,
        }
    }

    /// Compute usage deltas for completed polls through `cache`.
    pub fn with_cache(mut self, cache: UsageCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Count outcomes and durations into `metrics`.
    pub fn with_metrics(mut self, metrics: PollMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Usage cache, when one is attached.
    pub fn cache(&self) -> Option<&UsageCache> {
        self.cache.as_ref()
    }

    /// Read `targets_path` and poll every entry into `output`.
    pub async fn run(
        &mut self,
        targets_path: &Path,
        output: &Path,
    ) -> Result<PollSummary, OrchestratorError> {
        let targets = read_targets(targets_path)?;
        info!(
            targets = targets.len(),
            list = %targets_path.display(),
            "target list loaded"
        );
        self.poll_targets(targets, output).await
    }

    /// Poll `targets` into `output`. The final file exists only if every
    /// target produced its record.
    pub async fn poll_targets(
        &mut self,
        targets: Vec<ModemIdentity>,
        output: &Path,
    ) -> Result<PollSummary, OrchestratorError> {
        let started = Instant::now();
        let requests: Vec<PollRequest> = targets
            .into_iter()
            .map(|identity| PollRequest::new(identity, self.settings.community.clone()))
            .collect();
        if let Some(metrics) = &self.metrics {
            metrics.set_batch_targets(requests.len());
        }

        let mut staged = StagedOutput::create(output)?;
        let mut summary = PollSummary::new(output.to_path_buf());
        let result = if self.settings.parallelism <= 1 {
            self.collect_sequential(requests, &mut staged, &mut summary)
                .await
        } else {
            self.collect_parallel(requests, &mut staged, &mut summary)
                .await
        };
        if let Err(err) = result {
            log_run_event(None, "batch.finished", &err.to_string(), RunEventOutcome::Fault);
            return Err(err);
        }

        summary.output = staged.commit()?;
        summary.elapsed = started.elapsed();
        if let Some(metrics) = &self.metrics {
            metrics.mark_run_finished(chrono::Utc::now().timestamp());
        }
        log_run_event(
            None,
            "batch.finished",
            &format!(
                "{} targets: {} completed, {} nocounter, {} timeout, {} error",
                summary.targets,
                summary.completed,
                summary.nocounter,
                summary.timeout,
                summary.error
            ),
            RunEventOutcome::Success,
        );
        Ok(summary)
    }

    async fn collect_sequential(
        &mut self,
        requests: Vec<PollRequest>,
        staged: &mut StagedOutput,
        summary: &mut PollSummary,
    ) -> Result<(), OrchestratorError> {
        let connector = Arc::clone(&self.connector);
        for (index, request) in requests.iter().enumerate() {
            let polled = Instant::now();
            let snapshot =
                guarded_poll(connector.as_ref(), request, self.settings.initial_table_hint).await;
            self.collect(
                PoolOutcome {
                    index,
                    snapshot,
                    elapsed: polled.elapsed(),
                },
                staged,
                summary,
            )?;
        }
        Ok(())
    }

    async fn collect_parallel(
        &mut self,
        requests: Vec<PollRequest>,
        staged: &mut StagedOutput,
        summary: &mut PollSummary,
    ) -> Result<(), OrchestratorError> {
        let mut pool = WorkerPool::spawn(
            Arc::clone(&self.connector),
            requests,
            self.settings.initial_table_hint,
            self.settings.parallelism,
        );
        while let Some(outcome) = pool.next().await {
            self.collect(outcome, staged, summary)?;
        }
        Ok(())
    }

    /// Single-writer step: usage, record, tally.
    fn collect(
        &mut self,
        outcome: PoolOutcome,
        staged: &mut StagedOutput,
        summary: &mut PollSummary,
    ) -> Result<(), OrchestratorError> {
        let PoolOutcome {
            mut snapshot,
            elapsed,
            ..
        } = outcome;
        if !self.apply_usage(&mut snapshot) {
            summary.cache_failures += 1;
        }
        staged.append(&snapshot.to_record())?;
        summary.tally(snapshot.state);
        if let Some(metrics) = &self.metrics {
            metrics.record_poll(snapshot.state.as_str(), elapsed.as_secs_f64());
        }
        Ok(())
    }

    /// Fill in the usage delta of a completed snapshot. Returns false when the
    /// cache failed; the record then carries empty deltas.
    fn apply_usage(&mut self, snapshot: &mut ModemSnapshot) -> bool {
        let Some(cache) = self.cache.as_mut() else {
            return true;
        };
        let Some(observation) = snapshot.usage_observation(self.settings.boot_marker) else {
            return true;
        };
        let ctx = LogContext::new()
            .with_business_id(&snapshot.identity.business_id)
            .with_hardware_id(&observation.hardware_id)
            .with_address(&snapshot.identity.address)
            .with_phase("usage");
        match cache.compute_usage(&observation, &ctx) {
            Ok(delta) => {
                snapshot.usage = Some(delta);
                true
            }
            Err(err) => {
                cmp_error!(context = ctx, "usage computation failed: {}", err);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmpoll_cache::open_store;
    use cmpoll_core::fixtures::ModemProfile;
    use cmpoll_core::RECORD_FIELDS;
    use cmpoll_metrics::new_registry;
    use cmpoll_snmp::testing::{FakeConnector, FakeFault};
    use std::fs;
    use tempfile::tempdir;

    fn settings(parallelism: usize) -> PollSettings {
        PollSettings {
            community: "public".into(),
            initial_table_hint: 9,
            parallelism,
            boot_marker: BootMarkerSource::Uptime,
        }
    }

    fn identities(addresses: &[&str]) -> Vec<ModemIdentity> {
        addresses
            .iter()
            .enumerate()
            .map(|(i, address)| ModemIdentity::new(format!("009100006{}", i), "5c353bef6106", *address))
            .collect()
    }

    fn lines(path: &Path) -> Vec<Vec<String>> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| line.split(';').map(str::to_owned).collect())
            .collect()
    }

    #[tokio::test]
    async fn faulting_target_still_yields_one_line_each() {
        let connector = FakeConnector::new()
            .with_agent(ModemProfile::default().agent("10.0.0.1"))
            .with_agent(ModemProfile::default().agent("10.0.0.2"))
            .with_agent(ModemProfile::default().agent("10.0.0.4"))
            .fail_connect("10.0.0.3", FakeFault::Panic);
        let dir = tempdir().unwrap();
        let output = dir.path().join("results.txt");
        let mut orchestrator = Orchestrator::new(Arc::new(connector), settings(3));

        let summary = orchestrator
            .poll_targets(
                identities(&["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4"]),
                &output,
            )
            .await
            .unwrap();

        assert_eq!(summary.targets, 4);
        assert_eq!(summary.count(ModemState::Completed), 3);
        assert_eq!(summary.count(ModemState::Error), 1);
        assert!(!output.with_file_name("results.txt.ongoing").exists());
        let records = lines(&output);
        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| r.len() == RECORD_FIELDS));
        let failed: Vec<_> = records.iter().filter(|r| r[4] == "error").collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0][3], "10.0.0.3");
    }

    #[tokio::test]
    async fn sequential_run_keeps_input_order() {
        let connector = FakeConnector::new()
            .with_agent(ModemProfile::default().agent("10.0.0.3"))
            .with_agent(ModemProfile::default().agent("10.0.0.1"));
        let dir = tempdir().unwrap();
        let output = dir.path().join("ordered.txt");
        let mut orchestrator = Orchestrator::new(Arc::new(connector), settings(1));

        orchestrator
            .poll_targets(identities(&["10.0.0.3", "10.0.0.9", "10.0.0.1"]), &output)
            .await
            .unwrap();

        let addresses: Vec<_> = lines(&output).into_iter().map(|r| r[3].clone()).collect();
        assert_eq!(addresses, vec!["10.0.0.3", "10.0.0.9", "10.0.0.1"]);
    }

    #[tokio::test]
    async fn missing_target_list_aborts_without_output() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("never.txt");
        let mut orchestrator = Orchestrator::new(Arc::new(FakeConnector::new()), settings(2));
        let err = orchestrator
            .run(&dir.path().join("absent.csv"), &output)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::TargetList(_)));
        assert!(!output.exists());
        assert!(!output.with_file_name("never.txt.ongoing").exists());
    }

    #[tokio::test]
    async fn usage_applies_to_completed_polls_only() {
        let connector = FakeConnector::new()
            .with_agent(ModemProfile::default().agent("10.0.0.1"))
            .with_agent(
                ModemProfile {
                    mac: [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff],
                    malformed_counters: true,
                    ..ModemProfile::default()
                }
                .agent("10.0.0.2"),
            );
        let dir = tempdir().unwrap();
        let output = dir.path().join("usage.txt");
        let cache = UsageCache::new(open_store(&dir.path().join("cache.db")).unwrap()).unwrap();
        let mut orchestrator =
            Orchestrator::new(Arc::new(connector), settings(2)).with_cache(cache);

        let mut targets = identities(&["10.0.0.1", "10.0.0.2"]);
        targets[1] = ModemIdentity::new("0091000099", "aabbccddeeff", "10.0.0.2");
        let summary = orchestrator.poll_targets(targets, &output).await.unwrap();
        assert_eq!(summary.count(ModemState::Nocounter), 1);

        let cache = orchestrator.cache().unwrap();
        assert_eq!(cache.len().unwrap(), 1);
        assert!(cache.record("aabbccddeeff").unwrap().is_none());

        let records = lines(&output);
        let healthy = records.iter().find(|r| r[3] == "10.0.0.1").unwrap();
        assert_eq!(&healthy[19..], ["1500", "1500", "300", "300"]);
        let broken = records.iter().find(|r| r[3] == "10.0.0.2").unwrap();
        assert_eq!(&broken[18..], ["", "", "", "", ""]);
    }

    #[tokio::test]
    async fn deltas_follow_counters_across_runs() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("cache").join("modems.db");
        let polls = [(1_000, 200, "1000", "200"), (1_500, 300, "500", "100"), (400, 50, "400", "50")];

        for (run, (down, up, down_delta, up_delta)) in polls.into_iter().enumerate() {
            let profile = ModemProfile {
                downstream_bytes: down,
                upstream_bytes: up,
                ..ModemProfile::default()
            };
            let connector = FakeConnector::new().with_agent(profile.agent("10.0.0.1"));
            let cache = UsageCache::new(open_store(&db).unwrap()).unwrap();
            let mut orchestrator =
                Orchestrator::new(Arc::new(connector), settings(1)).with_cache(cache);
            let output = dir.path().join(format!("run{}.txt", run));
            orchestrator
                .poll_targets(identities(&["10.0.0.1"]), &output)
                .await
                .unwrap();

            let record = &lines(&output)[0];
            assert_eq!(record[20], down_delta, "run {}", run);
            assert_eq!(record[22], up_delta, "run {}", run);
        }
    }

    #[tokio::test]
    async fn metrics_count_every_target() {
        let registry = new_registry();
        let metrics = PollMetrics::new(registry).unwrap();
        let connector = FakeConnector::new().with_agent(ModemProfile::default().agent("10.0.0.1"));
        let dir = tempdir().unwrap();
        let mut orchestrator =
            Orchestrator::new(Arc::new(connector), settings(2)).with_metrics(metrics.clone());

        orchestrator
            .poll_targets(identities(&["10.0.0.1", "10.0.0.2"]), &dir.path().join("m.txt"))
            .await
            .unwrap();

        assert_eq!(metrics.polls("completed"), 1);
        assert_eq!(metrics.polls("timeout"), 1);
    }
}
