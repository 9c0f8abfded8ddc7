// Logging - tracing subscriber setup
//
// Installs a fmt subscriber filtered by `RUST_LOG`, falling back to the
// given default directive. Safe to call more than once.

use tracing_subscriber::EnvFilter;

/// Default directive used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "story_engine=info";

/// Install the global tracing subscriber
///
/// Returns `false` if a global subscriber was already installed
/// (by an earlier call or by the host application).
pub fn init_logging(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
