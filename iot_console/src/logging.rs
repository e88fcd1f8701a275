//! Logging configuration for the console.
//!
//! Library crates log through the `log` facade; those records are forwarded
//! into the tracing subscriber installed here.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging
///
/// Log levels are configurable via the `RUST_LOG` env var.
///
/// # Example
///
/// ```no_run
/// use iot_console::logging;
///
/// logging::init();
/// tracing::info!("Console starting");
/// ```
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,reqwest=warn,hyper=warn"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::debug!("Logging initialized");
}

/// Log the outcome of a session operation with structured data
///
/// # Arguments
///
/// * `operation` - Operation name
/// * `user_id` - Signed-in user after the operation, if any
/// * `outcome` - Error or success message the operation left behind
pub fn log_session_event(operation: &str, user_id: Option<&str>, outcome: Option<&str>) {
    tracing::info!(
        operation = operation,
        user_id = user_id,
        outcome = outcome,
        "SESSION: {} finished",
        operation
    );
}
