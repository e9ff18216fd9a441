pub mod cancel;
pub mod config;
pub mod intake;
pub mod media;
pub mod poster;
#[cfg(test)]
pub mod test_fixtures;

/// Install the fmt subscriber. `RUST_LOG` overrides the default `info` filter.
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
