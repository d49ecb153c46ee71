//! Resolving defaults for options callers may leave unset.
//!
//! Nothing here is read from disk or environment except where `spec.md`
//! §6.4 explicitly allows it (local username fallback, `RUST_LOG`/`TEJ_LOG`
//! style overrides consumed only by the CLI binary). The library itself
//! stays configuration-free: every default below is a compiled-in
//! constant a caller can override by simply passing a different value.

/// Default queue pathname used when a caller doesn't specify `--queue`.
pub const DEFAULT_QUEUE_PATH: &str = "~/.tej";

/// Default script name invoked inside a submitted job directory.
pub const DEFAULT_SCRIPT_NAME: &str = "start.sh";

/// Environment variable the CLI binary reads to override its tracing
/// filter, in addition to the cumulative `-v` flag.
pub const LOG_ENV_VAR: &str = "TEJ_LOG";

/// Resolve an optional `--queue` value to the effective queue path.
pub fn queue_path(requested: Option<&str>) -> String {
    requested.unwrap_or(DEFAULT_QUEUE_PATH).to_string()
}

/// Resolve an optional `--script` value to the effective script name.
pub fn script_name(requested: Option<&str>) -> String {
    requested.unwrap_or(DEFAULT_SCRIPT_NAME).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_defaults() {
        assert_eq!(queue_path(None), DEFAULT_QUEUE_PATH);
        assert_eq!(script_name(None), DEFAULT_SCRIPT_NAME);
    }

    #[test]
    fn honors_explicit_overrides() {
        assert_eq!(queue_path(Some("~/q")), "~/q");
        assert_eq!(script_name(Some("run.sh")), "run.sh");
    }
}
