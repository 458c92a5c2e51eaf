//! # Folia Sample Blog
//!
//! A small blog assembled from the framework's building blocks:
//!
//! - **[extensions]**: request metrics and site settings, loaded in dependency order.
//! - **[plugins]**: a [`PostStore`](plugins::PostStore) shared by the blog controllers.
//! - **[controllers]**: a home page, a health check and the post endpoints, plus an
//!   API-key middleware guarding post creation.
//!
//! [`start`] lays out a project directory, boots a [`Server`] against an in-memory router
//! and returns both, so requests can be driven without a socket.

pub mod controllers;
pub mod extensions;
pub mod plugins;

use controllers::{ApiKey, HomeController, PostController};
use extensions::{site_settings, RequestMetrics};
use folia::config::ServerConfig;
use folia::transport::{MemoryRouter, MiddlewareEntry};
use folia::{AppManifest, FoliaError, RouteDescriptor, Server};
use plugins::PostStore;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Settings of the sample, read from the environment.
#[derive(Debug, Clone)]
pub struct SampleSettings {
    pub site_name: String,
    pub api_key: String,
}

impl Default for SampleSettings {
    fn default() -> Self {
        Self {
            site_name: "Folia Blog".to_string(),
            api_key: "letmein".to_string(),
        }
    }
}

impl SampleSettings {
    /// Defaults overridden by `FOLIA_SITE_NAME` and `FOLIA_API_KEY`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            site_name: std::env::var("FOLIA_SITE_NAME").unwrap_or(defaults.site_name),
            api_key: std::env::var("FOLIA_API_KEY").unwrap_or(defaults.api_key),
        }
    }
}

/// Extensions, plugins and routes of the sample.
pub fn manifest(settings: &SampleSettings) -> AppManifest {
    let posts = RouteDescriptor::group("/posts")
        .controller::<PostController>()
        .child(RouteDescriptor::new().method("get").action("list"))
        .child(RouteDescriptor::get("/latest").action("latest"))
        .child(
            RouteDescriptor::post("/new")
                .action("create")
                .middleware(MiddlewareEntry::Invokable(Arc::new(ApiKey::new(
                    settings.api_key.clone(),
                )))),
        );

    AppManifest::new()
        .extension(RequestMetrics)
        .extension(site_settings(settings.site_name.clone()))
        .plugin::<PostStore>()
        .module(
            "Application",
            vec![
                RouteDescriptor::get("/")
                    .controller::<HomeController>()
                    .action("index"),
                RouteDescriptor::get("/health")
                    .controller::<HomeController>()
                    .action("health"),
            ],
        )
        .module("Blog", vec![posts])
}

/// Files the sample needs besides what the server scaffolds: the blog module with its
/// config and plugin list, under `modules`. Existing files are left alone.
pub async fn prepare_project(modules: &Path) -> Result<(), FoliaError> {
    let blog = modules.join("Blog");
    let files = [
        (blog.join("config/config.json"), "{ \"page_size\": 10 }\n"),
        (blog.join("plugins/PostStore.plugin"), ""),
    ];

    for (path, content) in files {
        let exists = tokio::fs::try_exists(&path)
            .await
            .map_err(|source| FoliaError::Io {
                path: path.clone(),
                source,
            })?;
        if exists {
            continue;
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| FoliaError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|source| FoliaError::Io {
                path: path.clone(),
                source,
            })?;
    }
    Ok(())
}

/// Prepares `root`, then boots the sample against a fresh [`MemoryRouter`].
pub async fn start(
    root: &Path,
    settings: &SampleSettings,
) -> Result<(Server, Arc<MemoryRouter>), FoliaError> {
    start_with(ServerConfig::with_root(root), settings).await
}

/// Like [`start`], with a full server configuration, e.g. one read by
/// [`ServerConfig::from_file`].
pub async fn start_with(
    config: ServerConfig,
    settings: &SampleSettings,
) -> Result<(Server, Arc<MemoryRouter>), FoliaError> {
    prepare_project(&config.root.join(&config.modules_dir)).await?;

    let router = Arc::new(MemoryRouter::new());
    let mut server = Server::new(config, router.clone());
    let report = server.init(manifest(settings)).await?;

    info!(
        created = report.architecture.files_created.len(),
        routes = router.routes().len(),
        "Sample blog booted"
    );
    Ok((server, router))
}
