//! ---
//! cmp_section: "01-core-functionality"
//! cmp_subsection: "module"
//! cmp_type: "source"
//! cmp_scope: "code"
//! cmp_description: "Shared primitives and utilities for the poller runtime."
//! cmp_version: "v0.1.0"
//! cmp_owner: "tbd"
//! ---
//! Shared primitives for the cmpoll workspace.
//! This crate exposes configuration loading, tracing initialisation and the
//! poll timestamp helpers consumed across the workspace.

pub mod config;
pub mod logging;
pub mod time;

pub use config::{
    BootMarkerSource, CacheConfig, LoadedPollerConfig, LoggingConfig, MetricsConfig,
    OutputConfig, PollConfig, PollerConfig, SnmpConfig,
};
pub use logging::{init_tracing, LogFormat};
