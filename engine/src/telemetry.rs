//! Telemetry and Observability
//!
//! Sets up `tracing-subscriber` for structured logging. Every dispatched unit
//! runs inside a `run` span carrying `run_id` and `item`, so in release builds
//! each JSON line can be correlated back to its run ledger row.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber with the given log level from config.
///
/// Priority: `RUST_LOG` env var > `log_level` parameter > default "info"
///
/// In debug builds: pretty-printed terminal output.
/// In release builds: JSON structured output with spans.
///
/// Logs go to stderr so `--json` command output on stdout stays parseable.
pub fn init_telemetry_with_level(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(log_level)));

    #[cfg(debug_assertions)]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    }
}

/// Filter directives for our own crates at `log_level`
///
/// Third-party crates (hyper, sqlx, reqwest) stay at `warn` unless `RUST_LOG`
/// says otherwise.
fn default_filter(log_level: &str) -> String {
    format!(
        "warn,foreman_engine={level},foreman={level},webhook_server={level},sdk={level},tower_http={level}",
        level = log_level
    )
}
