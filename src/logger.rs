use tracing_subscriber::EnvFilter;

/// Overrides the CLI verbosity when set, e.g. `TESTSMITH_LOG=testsmith=debug`.
pub const LOG_ENV: &str = "TESTSMITH_LOG";

pub fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Installs the stderr subscriber. Only the binary calls this; a second call
/// is a no-op.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(level_for(verbosity)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
