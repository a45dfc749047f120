use tracing_subscriber::EnvFilter;

/// Install the diagnostic subscriber. Diagnostics go to stderr, the ping
/// report itself goes to stdout. `RUST_LOG` takes precedence over
/// `verbosity`.
pub fn init(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
