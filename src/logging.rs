use tracing_subscriber::{fmt, EnvFilter};

/// Initialize diagnostic logging on stderr.
///
/// `RUST_LOG` takes precedence when set. Otherwise only warnings are shown,
/// or everything from this crate down to `debug` when `verbose` is set.
/// Record output never goes through here; it is written to stdout directly.
pub fn init_logging(verbose: bool) {
    let default_directive = if verbose { "lequery=debug,warn" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    // A second initialisation (e.g. from tests) is harmless; keep the first.
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
