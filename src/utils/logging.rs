use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,tower_http=info,ort=warn";

/// Installs the fmt subscriber, filtered by `RUST_LOG`. A second call is a no-op.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .try_init();
}
