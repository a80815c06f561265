use tracing_subscriber::EnvFilter;

/// Initialize tracing on stderr so command output on stdout stays clean.
///
/// Default level: WARN, raised by `-v`/`-vv`; override via RUST_LOG.
pub fn init(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
