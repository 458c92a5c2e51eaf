//! Boots the sample blog and drives a few requests through the in-memory router.
//!
//! When `FOLIA_CONFIG` names a JSON server config, it is loaded (and `FOLIA_ROOT` still
//! overrides its root). Otherwise the project is laid out in `FOLIA_ROOT` when set, or in
//! a `folia-sample` directory under the system temp dir.
//!
//! ```bash
//! RUST_LOG=info cargo run -p folia-sample
//! ```

use folia::config::{ServerConfig, ROOT_ENV};
use folia::tracing::setup_tracing;
use folia::transport::Request;
use folia_sample::{start_with, SampleSettings};
use std::path::PathBuf;
use tracing::{info, warn, Instrument};

#[tokio::main]
async fn main() -> Result<(), String> {
    setup_tracing();

    let config = match std::env::var("FOLIA_CONFIG") {
        Ok(path) => ServerConfig::from_file(path)
            .await
            .map_err(|e| e.to_string())?,
        Err(_) => ServerConfig::with_root(
            std::env::var(ROOT_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| std::env::temp_dir().join("folia-sample")),
        ),
    };
    let settings = SampleSettings::from_env();
    info!(root = %config.root.display(), site = %settings.site_name, "Starting sample blog");

    let (server, router) = start_with(config, &settings)
        .instrument(tracing::info_span!("boot"))
        .await
        .map_err(|e| e.to_string())?;

    for advisory in server.advisories() {
        warn!(%advisory, "Configuration advisory");
    }

    let requests = vec![
        Request::new("GET", "/"),
        Request::new("GET", "/posts"),
        Request::new("POST", "/posts/new").with_body(r#"{ "title": "Anonymous" }"#),
        Request::new("POST", "/posts/new")
            .with_header("x-api-key", settings.api_key.as_str())
            .with_body(r#"{ "title": "Hello again", "body": "Second post." }"#),
        Request::new("GET", "/posts/latest"),
        Request::new("GET", "/health"),
        Request::new("GET", "/missing"),
    ];

    for request in requests {
        let label = format!("{} {}", request.method, request.path);
        let response = router
            .handle(request)
            .instrument(tracing::info_span!("request", %label))
            .await;
        info!(status = response.status, body = ?response.body, "{label}");
    }

    info!("Sample completed");
    Ok(())
}
