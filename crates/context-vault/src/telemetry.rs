// context-vault/src/telemetry.rs

use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_DIRECTIVE: &str = "info";

/// Install the process-wide subscriber, filtered by `RUST_LOG` (default `info`).
/// Returns `false` when a subscriber was already installed.
pub fn init_tracing() -> bool {
    init_tracing_with(DEFAULT_DIRECTIVE)
}

/// Same as [`init_tracing`] with a caller-chosen fallback directive, used when
/// `RUST_LOG` is unset or unparseable.
pub fn init_tracing_with(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    // Log lines go to stderr so CLI JSON output on stdout stays clean.
    fmt()
        .with_env_filter(filter)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .is_ok()
}
