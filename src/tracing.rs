/// Initializes structured logging for an application built on the framework.
///
/// Filtering comes from the `RUST_LOG` environment variable:
/// - `RUST_LOG=info` shows boot stages and route registration
/// - `RUST_LOG=debug` adds every emitted event and dispatched request
/// - `RUST_LOG=folia=debug` limits debug output to the framework
///
/// Calling it twice is harmless; the second call leaves the first subscriber in place.
///
/// # Example
///
/// ```ignore
/// folia::tracing::setup_tracing();
/// tracing::info!("Application started");
/// ```
pub fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .compact()
        .try_init();
}
