//! # Server Configuration
//!
//! [`ServerConfig`] describes where the project lives on disk and how its modules are
//! laid out. Every field has a default, so an empty JSON object is a valid config file.
//!
//! Module configuration files are plain JSON objects ([`ConfigMap`]). The application
//! module's values act as defaults that each module overrides key by key.

use crate::error::FoliaError;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Key/value configuration of one module.
pub type ConfigMap = Map<String, Value>;

/// Environment variable overriding [`ServerConfig::root`].
pub const ROOT_ENV: &str = "FOLIA_ROOT";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Project root; every other path is relative to it.
    pub root: PathBuf,
    /// Directory (under `root`) holding one sub-directory per module.
    pub modules_dir: String,
    /// The distinguished module supplying global defaults.
    pub application_module: String,
    pub paths: LayoutPaths,
}

/// Paths relative to a module directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LayoutPaths {
    /// Developer-local overrides of the application module. `None` disables the drift check.
    pub local_file: Option<String>,
    /// Committed template of [`local_file`](Self::local_file).
    pub dist_local_file: Option<String>,
    pub plugins_dir: String,
    pub config_file: String,
    pub views_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            modules_dir: "module".to_string(),
            application_module: "Application".to_string(),
            paths: LayoutPaths::default(),
        }
    }
}

impl Default for LayoutPaths {
    fn default() -> Self {
        Self {
            local_file: Some("config/local.json".to_string()),
            dist_local_file: Some("config/local.dist.json".to_string()),
            plugins_dir: "plugins".to_string(),
            config_file: "config/config.json".to_string(),
            views_dir: "src/views".to_string(),
        }
    }
}

impl ServerConfig {
    /// Default layout rooted at `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Reads a JSON config file, then applies the `FOLIA_ROOT` override.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, FoliaError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| FoliaError::io(path, e))?;
        let config: ServerConfig =
            serde_json::from_str(&raw).map_err(|source| FoliaError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(config.with_root_override(std::env::var(ROOT_ENV).ok()))
    }

    fn with_root_override(mut self, root: Option<String>) -> Self {
        if let Some(root) = root.filter(|r| !r.is_empty()) {
            self.root = PathBuf::from(root);
        }
        self
    }

    /// Absolute-ish path of the modules directory.
    pub fn modules_path(&self) -> PathBuf {
        self.root.join(&self.modules_dir)
    }

    /// Path of `relative` inside `module`'s directory.
    pub fn module_path(&self, module: &str, relative: &str) -> PathBuf {
        self.modules_path().join(module).join(relative)
    }

    /// Directory where views of `controller` in `module` live.
    pub fn views_path(&self, module: &str, controller: &str) -> PathBuf {
        self.module_path(module, &self.paths.views_dir)
            .join(controller)
    }
}

/// Reads a module configuration file. A missing file yields an empty map.
pub async fn load_module_config(path: &Path) -> Result<ConfigMap, FoliaError> {
    match tokio::fs::try_exists(path).await {
        Ok(true) => read_json_object(path).await,
        Ok(false) => Ok(ConfigMap::new()),
        Err(e) => Err(FoliaError::io(path, e)),
    }
}

/// Reads `path` and requires it to hold a JSON object.
pub async fn read_json_object(path: &Path) -> Result<ConfigMap, FoliaError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| FoliaError::io(path, e))?;
    let value: Value = serde_json::from_str(&raw).map_err(|source| FoliaError::ConfigParse {
        path: path.to_path_buf(),
        source,
    })?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(FoliaError::Precondition(format!(
            "'{}' must contain a JSON object, found {}",
            path.display(),
            json_kind(&other)
        ))),
    }
}

/// Shallow merge: every key of `local` replaces the same key of `global`.
pub fn merge_config(global: &ConfigMap, local: ConfigMap) -> ConfigMap {
    let mut merged = global.clone();
    merged.extend(local);
    merged
}

/// Compares the local and dist configuration of the application module key by key.
///
/// Both files are required; a missing or non-object file is a boot precondition failure.
/// Returns one advisory message per key present on one side only.
pub async fn check_local_drift(config: &ServerConfig) -> Result<Vec<String>, FoliaError> {
    let (Some(local_file), Some(dist_file)) =
        (&config.paths.local_file, &config.paths.dist_local_file)
    else {
        return Ok(Vec::new());
    };

    let local_path = config.module_path(&config.application_module, local_file);
    let dist_path = config.module_path(&config.application_module, dist_file);
    for path in [&local_path, &dist_path] {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|e| FoliaError::io(path, e))?;
        if !exists {
            return Err(FoliaError::Precondition(format!(
                "local configuration file '{}' is missing",
                path.display()
            )));
        }
    }

    let local = read_json_object(&local_path).await?;
    let dist = read_json_object(&dist_path).await?;

    let mut warnings = Vec::new();
    for key in dist.keys().filter(|k| !local.contains_key(*k)) {
        warnings.push(format!(
            "Entry '{key}' was added to '{dist_file}' but is missing in your local '{local_file}'"
        ));
    }
    for (key, value) in local.iter().filter(|(k, _)| !dist.contains_key(*k)) {
        warnings.push(format!(
            "Entry {{ '{key}': {value} }} is in '{local_file}' but not in the dist file '{dist_file}'"
        ));
    }
    Ok(warnings)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> ConfigMap {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn module_values_override_global_values() {
        let global = map(json!({ "title": "App", "debug": false }));
        let merged = merge_config(&global, map(json!({ "debug": true, "page_size": 20 })));

        assert_eq!(merged["title"], json!("App"));
        assert_eq!(merged["debug"], json!(true));
        assert_eq!(merged["page_size"], json!(20));
    }

    #[test]
    fn empty_json_object_yields_default_layout() {
        let config: ServerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.modules_dir, "module");
        assert_eq!(config.application_module, "Application");
        assert_eq!(config.paths.plugins_dir, "plugins");
    }

    #[tokio::test]
    async fn config_file_fills_missing_fields_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("folia.json");
        tokio::fs::write(&path, r#"{ "root": "/srv/app", "paths": { "views_dir": "views" } }"#)
            .await
            .unwrap();

        let config = ServerConfig::from_file(&path).await.unwrap();

        if std::env::var(ROOT_ENV).is_err() {
            assert_eq!(config.root, PathBuf::from("/srv/app"));
        }
        assert_eq!(config.paths.views_dir, "views");
        assert_eq!(config.paths.plugins_dir, "plugins");
        assert_eq!(config.modules_dir, "module");
    }

    #[tokio::test]
    async fn unreadable_config_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("folia.json");

        let missing = ServerConfig::from_file(&path).await.unwrap_err();
        assert!(matches!(missing, FoliaError::Io { .. }));

        tokio::fs::write(&path, "not json").await.unwrap();
        let invalid = ServerConfig::from_file(&path).await.unwrap_err();
        assert!(matches!(invalid, FoliaError::ConfigParse { .. }));
    }

    #[test]
    fn root_override_replaces_configured_root() {
        let config = ServerConfig::with_root("/srv/app");

        let kept = config.clone().with_root_override(None);
        assert_eq!(kept.root, PathBuf::from("/srv/app"));
        let blank = config.clone().with_root_override(Some(String::new()));
        assert_eq!(blank.root, PathBuf::from("/srv/app"));
        let moved = config.with_root_override(Some("/tmp/other".to_string()));
        assert_eq!(moved.root, PathBuf::from("/tmp/other"));
    }

    #[tokio::test]
    async fn drift_check_reports_keys_on_either_side() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::with_root(dir.path());
        let app = config.modules_path().join("Application").join("config");
        tokio::fs::create_dir_all(&app).await.unwrap();
        tokio::fs::write(app.join("local.json"), r#"{ "db": "x", "secret": "y" }"#)
            .await
            .unwrap();
        tokio::fs::write(app.join("local.dist.json"), r#"{ "db": "", "port": 0 }"#)
            .await
            .unwrap();

        let warnings = check_local_drift(&config).await.unwrap();

        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("'port'"));
        assert!(warnings[1].contains("'secret'"));
    }

    #[tokio::test]
    async fn drift_check_requires_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::with_root(dir.path());

        let err = check_local_drift(&config).await.unwrap_err();
        assert!(matches!(err, FoliaError::Precondition(_)));
    }
}
