//! CLI logging adapter (part of C7).
//!
//! Maps the cumulative `-v` flag to the CRITICAL/WARNING/INFO/DEBUG
//! verbosity levels `spec.md` §6.1 describes, in `tracing`'s vocabulary:
//! `ERROR` is always shown (it's how a top-level [`crate::Error`] is
//! reported as CRITICAL), and each `-v` widens the filter by one step.
//! [`crate::config::LOG_ENV_VAR`] overrides the computed level entirely,
//! for callers who want `tracing-subscriber`'s full `EnvFilter` syntax.

use tracing_subscriber::EnvFilter;

use crate::config::LOG_ENV_VAR;

/// Initialize the global `tracing` subscriber for the `tej` binary.
/// `verbosity` is the number of times `-v` was given on the command
/// line (0 = default "WARNING").
pub fn init(verbosity: u8) {
    let filter = match std::env::var(LOG_ENV_VAR) {
        Ok(value) if !value.is_empty() => EnvFilter::new(value),
        _ => EnvFilter::new(level_for(verbosity)),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_verbosity_to_level() {
        assert_eq!(level_for(0), "warn");
        assert_eq!(level_for(1), "info");
        assert_eq!(level_for(2), "debug");
        assert_eq!(level_for(9), "debug");
    }
}
