//! ---
//! cmp_section: "01-core-functionality"
//! cmp_subsection: "binary"
//! cmp_type: "source"
//! cmp_scope: "code"
//! cmp_description: "Binary entrypoint for the cmpoll cable modem poller."
//! cmp_version: "v0.1.0"
//! cmp_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use cmpoll_cache::{open_store, CacheMetrics, UsageCache};
use cmpoll_common::config::PollerConfig;
use cmpoll_common::logging::init_tracing;
use cmpoll_common::time::{default_output_name, poll_now};
use cmpoll_core::{poll_target, ModemIdentity, PollRequest};
use cmpoll_metrics::{new_registry, write_textfile, PollMetrics};
use cmpoll_orchestrator::{Orchestrator, PollSettings};
use cmpoll_snmp::UdpConnector;
use tracing::{info, warn};

const DEFAULT_CONFIG_PATHS: [&str; 2] = ["/etc/cmpoll/cmpoll.toml", "cmpoll.toml"];

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "SNMP poller for DOCSIS cable modems",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(short, long, action = ArgAction::SetTrue, help = "Log at debug level")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Poll every modem of a target list into a result file")]
    Run {
        #[arg(value_name = "TARGETS", help = "Target list, one `business;mac;address` per line")]
        targets: PathBuf,
        #[arg(long, value_name = "N", help = "Modems polled concurrently")]
        parallel: Option<usize>,
        #[arg(long, value_name = "PATH", help = "Usage cache database")]
        cachedb: Option<PathBuf>,
        #[arg(long, value_name = "PATH", help = "Result file (default: results_<stamp>.txt)")]
        output: Option<PathBuf>,
        #[arg(long, help = "Skip usage deltas; the cache is neither read nor written")]
        no_usage: bool,
    },
    #[command(about = "Poll a single modem and print its record")]
    Probe {
        #[arg(value_name = "ADDRESS")]
        address: String,
        #[arg(long, value_name = "MAC", default_value = "")]
        hardware_id: String,
        #[arg(long, value_name = "ID", default_value = "")]
        business_id: String,
        #[arg(long, help = "Print the snapshot as JSON")]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (mut config, source) = load_config(cli.config.as_deref())?;
    init_tracing("cmpoll", &config.logging, cli.verbose)?;
    match &source {
        Some(path) => info!(config_path = %path.display(), "configuration loaded"),
        None => info!("no configuration file found; using defaults"),
    }

    match cli.command {
        Commands::Run {
            targets,
            parallel,
            cachedb,
            output,
            no_usage,
        } => {
            if parallel.is_some() {
                config.poll.parallelism = parallel;
            }
            if let Some(path) = cachedb {
                config.cache.path = path;
            }
            if no_usage {
                config.cache.enabled = false;
            }
            config.validate()?;
            let output = output.unwrap_or_else(|| {
                config
                    .output
                    .directory
                    .join(default_output_name(&poll_now()))
            });
            run(&config, &targets, &output).await
        }
        Commands::Probe {
            address,
            hardware_id,
            business_id,
            json,
        } => probe(&config, ModemIdentity::new(business_id, hardware_id, address), json).await,
    }
}

/// Explicit `--config` (or `CMPOLL_CONFIG`) must load; otherwise the first
/// default path that exists is used, falling back to built-in defaults.
fn load_config(explicit: Option<&Path>) -> Result<(PollerConfig, Option<PathBuf>)> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(path) = explicit {
        candidates.push(path.to_path_buf());
    } else {
        candidates.extend(DEFAULT_CONFIG_PATHS.iter().map(PathBuf::from));
    }
    let env_override = std::env::var_os(PollerConfig::ENV_CONFIG_PATH).is_some();
    if explicit.is_none() && !env_override && !candidates.iter().any(|p| p.exists()) {
        return Ok((PollerConfig::default(), None));
    }
    let loaded = PollerConfig::load_with_source(&candidates)?;
    Ok((loaded.config, Some(loaded.source)))
}

async fn run(config: &PollerConfig, targets: &Path, output: &Path) -> Result<()> {
    let started = Instant::now();
    let registry = new_registry();
    let poll_metrics = PollMetrics::new(registry.clone())?;
    let settings = PollSettings::from_config(config, num_cpus::get());
    info!(
        targets = %targets.display(),
        output = %output.display(),
        parallelism = settings.parallelism,
        usage = config.cache.enabled,
        "starting polling run"
    );

    let connector = Arc::new(UdpConnector::from_config(&config.snmp));
    let mut orchestrator = Orchestrator::new(connector, settings).with_metrics(poll_metrics);
    if config.cache.enabled {
        let conn = open_store(&config.cache.path)
            .with_context(|| format!("unable to open usage cache {}", config.cache.path.display()))?;
        let cache = UsageCache::new(conn)?.with_metrics(CacheMetrics::new(&registry)?);
        orchestrator = orchestrator.with_cache(cache);
    }

    let summary = orchestrator
        .run(targets, output)
        .await
        .context("polling run aborted")?;
    info!(
        targets = summary.targets,
        completed = summary.completed,
        nocounter = summary.nocounter,
        timeout = summary.timeout,
        error = summary.error,
        cache_failures = summary.cache_failures,
        output = %summary.output.display(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "polling run finished"
    );

    if let Some(path) = &config.metrics.textfile {
        if let Err(err) = write_textfile(&registry, path) {
            warn!(path = %path.display(), error = %err, "metrics textfile not written");
        }
    }
    Ok(())
}

/// Request for a single-modem poll. The configuration is checked first so a
/// probe fails the same way a run would.
fn probe_request(config: &PollerConfig, identity: ModemIdentity) -> Result<PollRequest> {
    config.validate()?;
    Ok(PollRequest::new(identity, config.snmp.community.clone()))
}

async fn probe(config: &PollerConfig, identity: ModemIdentity, json: bool) -> Result<()> {
    let request = probe_request(config, identity)?;
    let connector = UdpConnector::from_config(&config.snmp);
    let snapshot = poll_target(&connector, &request, config.snmp.initial_table_hint).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        println!("{}", snapshot.to_record());
        println!("{:#?}", snapshot);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> ModemIdentity {
        ModemIdentity::new("0091000060", "5c353bef6106", "10.133.28.103")
    }

    #[test]
    fn probe_uses_configured_community() {
        let mut config = PollerConfig::default();
        config.snmp.community = "cmread".into();
        let request = probe_request(&config, identity()).unwrap();
        assert_eq!(request.community, "cmread");
        assert_eq!(request.address, "10.133.28.103");
    }

    #[test]
    fn probe_rejects_invalid_configuration() {
        let mut config = PollerConfig::default();
        config.snmp.community = "  ".into();
        let err = probe_request(&config, identity()).unwrap_err();
        assert!(err.to_string().contains("community"));

        let mut config = PollerConfig::default();
        config.snmp.initial_table_hint = 0;
        assert!(probe_request(&config, identity()).is_err());
    }
}
