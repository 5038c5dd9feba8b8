use tracing_subscriber::{fmt, EnvFilter};

/// Install the global fmt subscriber on stderr.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` applies. Calling
/// this twice is harmless.
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
