//! ---
//! cmp_section: "03-persistence-logging"
//! cmp_subsection: "module"
//! cmp_type: "source"
//! cmp_scope: "code"
//! cmp_description: "Structured logging context handed to every polling component."
//! cmp_version: "v0.1.0"
//! cmp_owner: "tbd"
//! ---

/// Shared expansion for the level-specific macros below.
#[doc(hidden)]
#[macro_export]
macro_rules! __cmp_event {
    ($level:expr, $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            $level,
            business_id = ctx.business_id.unwrap_or(""),
            hardware_id = ctx.hardware_id.unwrap_or(""),
            address = ctx.address.unwrap_or(""),
            phase = ctx.phase.unwrap_or(""),
            message = %format_args!($($arg)+)
        );
    }};
}

/// Emit an informational log enriched with the target context.
#[macro_export]
macro_rules! cmp_info {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__cmp_event!(tracing::Level::INFO, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__cmp_event!(tracing::Level::INFO, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a debug log enriched with the target context.
#[macro_export]
macro_rules! cmp_debug {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__cmp_event!(tracing::Level::DEBUG, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__cmp_event!(tracing::Level::DEBUG, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a warning enriched with the target context.
#[macro_export]
macro_rules! cmp_warn {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__cmp_event!(tracing::Level::WARN, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__cmp_event!(tracing::Level::WARN, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit an error log enriched with the target context.
#[macro_export]
macro_rules! cmp_error {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__cmp_event!(tracing::Level::ERROR, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__cmp_event!(tracing::Level::ERROR, $crate::LogContext::default(), $($arg)+)
    };
}
