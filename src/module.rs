//! # Modules
//!
//! A module is a directory under the modules directory. Its bundle combines:
//!
//! - `config`: the application module's config file, overridden key by key by its own;
//! - `plugins`: the application module's plugins, overridden by name by its own;
//! - `routes`: the routes declared for it in the [`AppManifest`](crate::AppManifest).
//!
//! The application module is loaded and registered first, under its own name.

use crate::config::{load_module_config, merge_config, ConfigMap, ServerConfig};
use crate::dispatch::fallback_error_handler;
use crate::error::FoliaError;
use crate::events::{EventPayload, ServerEvent};
use crate::plugin::{discover_plugins, PluginMap, PluginRegistry};
use crate::routing::{RouteDescriptor, RouteRegistrar};
use crate::Server;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Config, routes and plugins of one module.
#[derive(Clone, Default)]
pub struct ModuleBundle {
    pub module: String,
    pub config: ConfigMap,
    pub routes: Vec<RouteDescriptor>,
    pub plugins: PluginMap,
}

impl fmt::Debug for ModuleBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleBundle")
            .field("module", &self.module)
            .field("config", &self.config)
            .field("routes", &self.routes)
            .field("plugins", &self.plugins.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Module directory names, sorted. Hidden directories and plain files are ignored.
pub async fn discover_modules(config: &ServerConfig) -> Result<Vec<String>, FoliaError> {
    let dir = config.modules_path();
    let exists = tokio::fs::try_exists(&dir)
        .await
        .map_err(|e| FoliaError::io(&dir, e))?;
    if !exists {
        return Ok(Vec::new());
    }

    let mut modules = Vec::new();
    let mut entries = tokio::fs::read_dir(&dir)
        .await
        .map_err(|e| FoliaError::io(&dir, e))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| FoliaError::io(&dir, e))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| FoliaError::io(entry.path(), e))?;
        if file_type.is_dir() {
            modules.push(name);
        }
    }
    modules.sort();
    Ok(modules)
}

/// Builds every module bundle and registers its routes.
pub struct ModuleLoader<'a> {
    server: &'a Server,
    plugins: &'a PluginRegistry,
}

impl<'a> ModuleLoader<'a> {
    pub fn new(server: &'a Server, plugins: &'a PluginRegistry) -> Self {
        Self { server, plugins }
    }

    /// Loads all modules. Returns the module names in load order.
    #[instrument(skip_all)]
    pub async fn load(
        &self,
        mut declared: BTreeMap<String, Vec<RouteDescriptor>>,
    ) -> Result<Vec<String>, FoliaError> {
        let layout = self.server.layout();
        let events = self.server.events();
        let application = layout.application_module.clone();

        let mut modules = discover_modules(layout).await?;
        if !modules.contains(&application) {
            return Err(FoliaError::Precondition(format!(
                "application module '{application}' was not found in '{}'",
                layout.modules_path().display()
            )));
        }
        modules.retain(|m| *m != application);
        modules.insert(0, application.clone());

        events
            .emit_boot(ServerEvent::BeforeModulesLoaded, EventPayload::Modules(&modules))
            .await?;

        let registrar = RouteRegistrar::new(
            self.server.router(),
            layout,
            events,
            self.server.globals().view(),
        );

        let global_config =
            load_module_config(&layout.module_path(&application, &layout.paths.config_file))
                .await?;
        let global_plugins = self.load_plugins(&application).await?;

        for module in &modules {
            let (config, plugins) = if *module == application {
                (global_config.clone(), global_plugins.clone())
            } else {
                let own_config =
                    load_module_config(&layout.module_path(module, &layout.paths.config_file))
                        .await?;
                let mut plugins = global_plugins.clone();
                plugins.extend(self.load_plugins(module).await?);
                (merge_config(&global_config, own_config), plugins)
            };

            let routes = declared.remove(module).unwrap_or_else(|| {
                debug!(module = %module, "Module declares no routes");
                Vec::new()
            });
            let mut bundle = ModuleBundle {
                module: module.clone(),
                config,
                routes,
                plugins,
            };

            events
                .emit_boot(ServerEvent::BeforeModuleLoaded, EventPayload::Module(&mut bundle))
                .await?;
            registrar.register_module(&mut bundle).await?;
            events
                .emit_boot(ServerEvent::AfterModuleLoaded, EventPayload::Module(&mut bundle))
                .await?;
            info!(module = %module, plugins = bundle.plugins.len(), "Module loaded");
        }

        for module in declared.keys() {
            warn!(module = %module, "Routes declared for a module without a directory");
        }

        self.server
            .router()
            .set_error_handler(Arc::new(fallback_error_handler));

        events
            .emit_boot(ServerEvent::AfterModulesLoaded, EventPayload::Modules(&modules))
            .await?;
        Ok(modules)
    }

    async fn load_plugins(&self, module: &str) -> Result<PluginMap, FoliaError> {
        let layout = self.server.layout();
        let events = self.server.events();
        let names = discover_plugins(&layout.module_path(module, &layout.paths.plugins_dir)).await?;

        events
            .emit_boot(
                ServerEvent::BeforePluginsLoaded,
                EventPayload::Plugins {
                    module,
                    names: &names,
                },
            )
            .await?;

        let mut plugins = PluginMap::new();
        for name in &names {
            let instance = self.plugins.instantiate(name, self.server).await?;
            plugins.insert(name.clone(), instance);
            debug!(module, plugin = %name, "Plugin initialized");
        }

        events
            .emit_boot(
                ServerEvent::AfterPluginsLoaded,
                EventPayload::Plugins {
                    module,
                    names: &names,
                },
            )
            .await?;
        Ok(plugins)
    }
}
