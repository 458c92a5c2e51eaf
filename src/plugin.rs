//! # Plugins
//!
//! Plugins are helper objects made available to every controller of a module. Each module
//! owns a plugins directory; every file found there (recursively, depth-first, sorted by
//! name) names a plugin type registered in the [`PluginRegistry`]. The file stem must match
//! the plugin's type name.
//!
//! The application module's plugins are loaded first. Every other module receives the
//! application plugins merged with its own, and its own win on name collisions.

use crate::controller::short_type_name;
use crate::error::{BoxError, FoliaError};
use crate::{BoxFuture, Server};
use async_trait::async_trait;
use std::any::Any;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A type-erased plugin instance.
pub type PluginInstance = Arc<dyn Any + Send + Sync>;

/// Plugin instances of one module, keyed by type name.
pub type PluginMap = BTreeMap<String, PluginInstance>;

/// A per-module helper built once at boot.
#[async_trait]
pub trait Plugin: Any + Send + Sync + Sized {
    async fn init(server: &Server) -> Result<Self, BoxError>;
}

/// The name a plugin is registered and looked up under.
pub fn plugin_name<P: ?Sized + 'static>() -> &'static str {
    short_type_name::<P>()
}

type PluginInit = for<'a> fn(&'a Server) -> BoxFuture<'a, Result<PluginInstance, BoxError>>;

fn init_plugin<P: Plugin>(server: &Server) -> BoxFuture<'_, Result<PluginInstance, BoxError>> {
    Box::pin(async move {
        let plugin = P::init(server).await?;
        Ok(Arc::new(plugin) as PluginInstance)
    })
}

/// The plugin types known to the application.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    factories: BTreeMap<&'static str, PluginInit>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: Plugin>(&mut self) -> &mut Self {
        let init: PluginInit = init_plugin::<P>;
        self.factories.insert(plugin_name::<P>(), init);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    pub(crate) async fn instantiate(
        &self,
        name: &str,
        server: &Server,
    ) -> Result<PluginInstance, FoliaError> {
        let init = self.factories.get(name).ok_or_else(|| {
            FoliaError::Configuration(format!("plugin '{name}' has no registered type"))
        })?;
        init(server).await.map_err(|source| FoliaError::PluginInit {
            name: name.to_string(),
            source,
        })
    }
}

/// Plugin names found under `dir`: file stems, depth-first, entries sorted by name.
///
/// Dotfiles are ignored. A missing directory yields no plugins.
pub async fn discover_plugins(dir: &Path) -> Result<Vec<String>, FoliaError> {
    let exists = tokio::fs::try_exists(dir)
        .await
        .map_err(|e| FoliaError::io(dir, e))?;
    let mut names = Vec::new();
    if exists {
        walk(dir.to_path_buf(), &mut names).await?;
    }
    Ok(names)
}

fn walk(dir: PathBuf, names: &mut Vec<String>) -> BoxFuture<'_, Result<(), FoliaError>> {
    Box::pin(async move {
        let mut entries = Vec::new();
        let mut read = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| FoliaError::io(&dir, e))?;
        while let Some(entry) = read.next_entry().await.map_err(|e| FoliaError::io(&dir, e))? {
            entries.push(entry);
        }
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let path = entry.path();
            let file_name = entry.file_name();
            if file_name.to_string_lossy().starts_with('.') {
                continue;
            }
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| FoliaError::io(&path, e))?;
            if file_type.is_dir() {
                walk(path, names).await?;
            } else if let Some(stem) = path.file_stem() {
                names.push(stem.to_string_lossy().into_owned());
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plugins_are_discovered_depth_first() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("b_nested/deeper")).unwrap();
        std::fs::write(root.join("Zeta.rs"), "").unwrap();
        std::fs::write(root.join("Alpha.rs"), "").unwrap();
        std::fs::write(root.join("b_nested/Mailer.rs"), "").unwrap();
        std::fs::write(root.join("b_nested/deeper/Cache.rs"), "").unwrap();
        std::fs::write(root.join(".gitkeep"), "").unwrap();

        let names = discover_plugins(root).await.unwrap();

        assert_eq!(names, vec!["Alpha", "Zeta", "Mailer", "Cache"]);
    }

    #[tokio::test]
    async fn missing_directory_has_no_plugins() {
        let dir = tempfile::tempdir().unwrap();
        let names = discover_plugins(&dir.path().join("none")).await.unwrap();
        assert!(names.is_empty());
    }
}
