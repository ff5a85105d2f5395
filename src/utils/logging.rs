use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "tubebatch=info";

/// Build the env filter, honouring `RUST_LOG` and falling back to `level`
pub fn build_env_filter(level: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| match level {
        Some(level) => EnvFilter::new(format!("tubebatch={level}")),
        None => EnvFilter::new(DEFAULT_FILTER),
    })
}

/// Install the global subscriber; repeated calls are ignored
pub fn init_tracing(level: Option<&str>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(build_env_filter(level))
        .with_writer(std::io::stderr)
        .try_init();
}
