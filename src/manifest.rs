use crate::extension::ExtensionDescriptor;
use crate::plugin::{Plugin, PluginRegistry};
use crate::routing::RouteDescriptor;
use std::collections::BTreeMap;

/// Everything an application contributes at boot: extensions in load order, the plugin
/// types its modules may name, and the route tree of each module.
#[derive(Default)]
pub struct AppManifest {
    pub extensions: Vec<ExtensionDescriptor>,
    pub plugins: PluginRegistry,
    pub modules: BTreeMap<String, Vec<RouteDescriptor>>,
}

impl AppManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extension(mut self, extension: impl Into<ExtensionDescriptor>) -> Self {
        self.extensions.push(extension.into());
        self
    }

    pub fn plugin<P: Plugin>(mut self) -> Self {
        self.plugins.register::<P>();
        self
    }

    /// Declares the routes of `module`. Declaring a module twice appends to its routes.
    pub fn module(mut self, module: impl Into<String>, routes: Vec<RouteDescriptor>) -> Self {
        self.modules.entry(module.into()).or_default().extend(routes);
        self
    }
}
