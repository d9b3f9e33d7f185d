//! Logging integration for quarry.
//!
//! Provides helpers for configuring [`tracing`]-based logging from
//! [`Settings`](crate::settings::Settings) and for creating one span per
//! terminal query-set operation.

use crate::settings::Settings;

/// Sets up the global tracing subscriber based on the given settings.
///
/// The filter is read from `settings.log_level` (e.g. "debug", "info",
/// "quarry_db=debug"). In debug mode a pretty, human-readable format is used;
/// otherwise a structured JSON format is used. Installing twice is a no-op.
pub fn setup_logging(settings: &Settings) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if settings.debug {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .try_init()
            .ok();
    } else {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init()
            .ok();
    }
}

/// Creates a tracing span for a terminal query-set operation.
///
/// # Examples
///
/// ```
/// use quarry_core::logging::query_span;
///
/// let span = query_span("User", "get");
/// let _guard = span.enter();
/// tracing::debug!("resolving joins");
/// ```
pub fn query_span(model: &str, operation: &str) -> tracing::Span {
    tracing::info_span!("query", model = model, op = operation)
}
