//! Tracing subscriber setup for binaries and tests

use tracing_subscriber::EnvFilter;

/// Environment variable holding the filter directives, e.g. `ragbench=debug`.
pub const LOG_ENV: &str = "RAGBENCH_LOG";

const DEFAULT_DIRECTIVES: &str = "info";

/// Install a fmt subscriber filtered by [`LOG_ENV`] (default `info`).
///
/// Returns `false` when a global subscriber was already installed, which
/// makes it safe to call from every test.
pub fn init_tracing() -> bool {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_a_no_op() {
        init_tracing();
        assert!(!init_tracing());
    }
}
