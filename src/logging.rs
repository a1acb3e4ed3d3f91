use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber for binaries and test runs.
///
/// Respects `RUST_LOG`; defaults to `info` for this crate. Safe to call more
/// than once (subsequent calls are no-ops).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,commission_core=debug"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
