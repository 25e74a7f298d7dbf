//! ---
//! cmp_section: "04-configuration-orchestration"
//! cmp_subsection: "module"
//! cmp_type: "source"
//! cmp_scope: "code"
//! cmp_description: "Batch polling driver: worker pool, cache application, staged output."
//! cmp_version: "v0.1.0"
//! cmp_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Polls a whole target list once.
//!
//! Workers only produce snapshots. The collecting loop is the single place
//! that touches the usage cache and the output file.

use std::path::PathBuf;

use cmpoll_core::TargetListError;
use thiserror::Error;

pub mod output;
pub mod poller;
pub mod pool;

pub use output::StagedOutput;
pub use poller::{Orchestrator, PollSettings, PollSummary};
pub use pool::PoolOutcome;

/// Failures that abort a whole run.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The target list could not be read.
    #[error(transparent)]
    TargetList(#[from] TargetListError),
    /// The staging or final output file could not be written.
    #[error("output {path}: {source}")]
    Output {
        /// File being written or renamed.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
}
