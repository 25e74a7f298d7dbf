//! ---
//! cmp_section: "03-persistence-logging"
//! cmp_subsection: "module"
//! cmp_type: "source"
//! cmp_scope: "code"
//! cmp_description: "Structured logging context handed to every polling component."
//! cmp_version: "v0.1.0"
//! cmp_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Components never reach for a process-wide logger of their own: callers pass a
//! [`LogContext`] describing the target being worked on, and the `cmp_*!` macros
//! attach its fields to every event.

use tracing::Level;
use tracing_subscriber::{fmt as subscriber_fmt, prelude::*, EnvFilter, Registry};

pub mod macros;

/// Initialize a baseline tracing subscriber suitable for tests and ad-hoc tools.
pub fn init() {
    let _ = Registry::default()
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(subscriber_fmt::layer())
        .try_init();
}

/// Structured logging context propagated by the convenience macros.
#[derive(Debug, Default, Clone)]
pub struct LogContext<'a> {
    /// Customer reference of the polled modem.
    pub business_id: Option<&'a str>,
    /// Hardware (MAC) identifier of the polled modem.
    pub hardware_id: Option<&'a str>,
    /// Network address the modem is polled on.
    pub address: Option<&'a str>,
    /// Query phase currently executing.
    pub phase: Option<&'a str>,
}

impl<'a> LogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a business identifier.
    pub fn with_business_id(mut self, business_id: &'a str) -> Self {
        self.business_id = Some(business_id);
        self
    }

    /// Attach a hardware identifier.
    pub fn with_hardware_id(mut self, hardware_id: &'a str) -> Self {
        self.hardware_id = Some(hardware_id);
        self
    }

    /// Attach the network address.
    pub fn with_address(mut self, address: &'a str) -> Self {
        self.address = Some(address);
        self
    }

    /// Derive a context scoped to a query phase.
    pub fn with_phase(&self, phase: &'a str) -> Self {
        let mut scoped = self.clone();
        scoped.phase = Some(phase);
        scoped
    }
}

/// High-level outcome used when emitting run lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEventOutcome {
    /// The operation completed successfully.
    Success,
    /// The operation failed or was aborted.
    Fault,
}

impl RunEventOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            RunEventOutcome::Success => "success",
            RunEventOutcome::Fault => "fault",
        }
    }

    fn level(&self) -> Level {
        match self {
            RunEventOutcome::Success => Level::INFO,
            RunEventOutcome::Fault => Level::ERROR,
        }
    }
}

/// Emit a standardized run event with a success/fault outcome.
pub fn log_run_event(
    context: Option<&LogContext>,
    event: &str,
    message: &str,
    outcome: RunEventOutcome,
) {
    let default_ctx = LogContext::default();
    let ctx = context.unwrap_or(&default_ctx);
    let outcome_str = outcome.as_str();
    let business_id = ctx.business_id.unwrap_or("");
    let hardware_id = ctx.hardware_id.unwrap_or("");
    let address = ctx.address.unwrap_or("");
    // `tracing::event!` needs a constant level.
    match outcome.level() {
        Level::ERROR => tracing::event!(
            Level::ERROR,
            event,
            outcome = outcome_str,
            business_id,
            hardware_id,
            address,
            message = %message
        ),
        _ => tracing::event!(
            Level::INFO,
            event,
            outcome = outcome_str,
            business_id,
            hardware_id,
            address,
            message = %message
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macros_emit_without_panic() {
        init();
        let ctx = LogContext::new()
            .with_business_id("0091000060")
            .with_address("10.133.28.103");
        cmp_info!(context = ctx.clone(), "modem polled");
        cmp_debug!("debug message");
        cmp_warn!(context = ctx.with_phase("counters"), "counter quirk");
        cmp_error!(context = ctx, "error code: {}", 42);
    }

    #[test]
    fn phase_scoping_keeps_identity() {
        let ctx = LogContext::new().with_hardware_id("5c353bef6106");
        let scoped = ctx.with_phase("signals");
        assert_eq!(scoped.hardware_id, Some("5c353bef6106"));
        assert_eq!(scoped.phase, Some("signals"));
        assert_eq!(ctx.phase, None);
    }

    #[test]
    fn run_event_helper_emits() {
        init();
        let ctx = LogContext::new().with_business_id("bp-1");
        log_run_event(
            Some(&ctx),
            "test.event",
            "run event helper executed",
            RunEventOutcome::Success,
        );
        log_run_event(
            None,
            "test.event",
            "run event helper fault",
            RunEventOutcome::Fault,
        );
    }
}
