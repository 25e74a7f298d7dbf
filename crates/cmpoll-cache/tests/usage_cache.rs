//! ---
//! cmp_section: "15-testing-qa-runbook"
//! cmp_subsection: "module"
//! cmp_type: "source"
//! cmp_scope: "code"
//! cmp_description: "Usage cache behaviour against an on-disk store."
//! cmp_version: "v0.1.0"
//! cmp_owner: "tbd"
//! ---
use anyhow::Result;
use cmpoll_cache::{
    open_store, CacheMetrics, UsageBasis, UsageCache, UsageObservation, REBOOT_TOLERANCE_SECS,
};
use cmpoll_logging::LogContext;
use prometheus::Registry;
use tempfile::tempdir;

const MAC: &str = "5c353bef6106";

fn observation(down: u64, up: u64, timestamp: i64, boot_marker: i64) -> UsageObservation {
    UsageObservation {
        hardware_id: MAC.into(),
        downstream_bytes: down,
        upstream_bytes: up,
        timestamp,
        boot_marker,
    }
}

#[test]
fn worked_example_across_three_cycles() -> Result<()> {
    let dir = tempdir()?;
    let mut cache = UsageCache::new(open_store(&dir.path().join("cmpoll.db"))?)?;
    let ctx = LogContext::new().with_hardware_id(MAC);

    let first = cache.compute_usage(&observation(1000, 200, 100, 0), &ctx)?;
    assert_eq!(first.basis, UsageBasis::FirstSighting);
    assert_eq!((first.downstream, first.upstream), (1000, 200));

    let second = cache.compute_usage(&observation(1500, 300, 200, 0), &ctx)?;
    assert_eq!(second.basis, UsageBasis::Incremental);
    assert_eq!((second.downstream, second.upstream), (500, 100));

    let third = cache.compute_usage(&observation(400, 50, 300, 0), &ctx)?;
    assert_eq!(third.basis, UsageBasis::Reboot);
    assert_eq!((third.downstream, third.upstream), (400, 50));

    let stored = cache.record(MAC)?.expect("record present");
    assert_eq!(stored.downstream_bytes, 400);
    assert_eq!(stored.timestamp, 300);
    Ok(())
}

#[test]
fn upstream_decrease_alone_is_a_reboot() -> Result<()> {
    let mut cache = UsageCache::new(cmpoll_cache::store::open_in_memory()?)?;
    let ctx = LogContext::new();
    cache.compute_usage(&observation(1000, 200, 0, 0), &ctx)?;
    let delta = cache.compute_usage(&observation(1100, 150, 60, 0), &ctx)?;
    assert_eq!(delta.basis, UsageBasis::Reboot);
    assert_eq!((delta.downstream, delta.upstream), (1100, 150));
    Ok(())
}

#[test]
fn boot_marker_jump_is_a_reboot_even_when_counters_grow() -> Result<()> {
    let mut cache = UsageCache::new(cmpoll_cache::store::open_in_memory()?)?;
    let ctx = LogContext::new();
    cache.compute_usage(&observation(1000, 200, 0, 1_457_000_000), &ctx)?;
    let delta = cache.compute_usage(
        &observation(5000, 900, 3600, 1_457_000_000 + REBOOT_TOLERANCE_SECS + 1),
        &ctx,
    )?;
    assert_eq!(delta.basis, UsageBasis::Reboot);
    assert_eq!((delta.downstream, delta.upstream), (5000, 900));
    Ok(())
}

#[test]
fn state_survives_reopen() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("state/cmpoll.db");
    let ctx = LogContext::new();
    {
        let mut cache = UsageCache::new(open_store(&path)?)?;
        cache.compute_usage(&observation(10, 10, 0, 0), &ctx)?;
    }
    let registry = Registry::new();
    let metrics = CacheMetrics::new(&registry)?;
    let mut cache = UsageCache::new(open_store(&path)?)?.with_metrics(metrics.clone());
    let delta = cache.compute_usage(&observation(25, 11, 300, 0), &ctx)?;
    assert_eq!(delta.basis, UsageBasis::Incremental);
    assert_eq!((delta.downstream, delta.upstream), (15, 1));
    assert_eq!(metrics.delta_count(UsageBasis::Incremental), 1);
    Ok(())
}
