//! Tracing subscriber setup for embedders and tests

use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directive
pub const LOG_ENV_VAR: &str = "WAYPOST_LOG";

const DEFAULT_FILTER: &str = "info";

/// Build the filter from `WAYPOST_LOG`, then `RUST_LOG`, then the default
pub fn env_filter() -> EnvFilter {
    std::env::var(LOG_ENV_VAR)
        .ok()
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a global fmt subscriber.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_tracing() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_timer(ChronoLocal::rfc_3339())
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_should_be_idempotent() {
        init_tracing();
        assert!(!init_tracing());
    }
}
