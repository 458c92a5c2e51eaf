//! Per-request state handed to controllers and request-lifecycle listeners.

use crate::config::{ConfigMap, ServerConfig};
use crate::globals::GlobalsView;
use crate::plugin::{plugin_name, PluginMap};
use crate::response::Reply;
use crate::routing::RouteSummary;
use crate::transport::{Request, ResponseSink};
use std::any::Any;
use std::sync::Arc;

/// Everything a controller can see while handling one request.
///
/// A fresh context is built for every request. Module-level data (`config`, `routes`,
/// `plugins`) is shared between requests of the same module.
pub struct RequestContext {
    pub layout: Arc<ServerConfig>,
    pub module: String,
    /// Merged configuration of the module.
    pub config: Arc<ConfigMap>,
    pub routes: Arc<[RouteSummary]>,
    pub plugins: Arc<PluginMap>,
    pub method: String,
    pub path: String,
    /// Short type name of the controller.
    pub controller: String,
    pub action: String,
    pub req: Request,
    pub res: ResponseSink,
    /// The value the action produced, or the controller's early response.
    pub response: Option<Reply>,
    globals: GlobalsView,
}

impl RequestContext {
    /// A context with no request behind it, used to probe controllers at registration.
    pub fn empty() -> Self {
        Self {
            layout: Arc::new(ServerConfig::default()),
            module: String::new(),
            config: Arc::new(ConfigMap::new()),
            routes: Arc::from(Vec::new()),
            plugins: Arc::new(PluginMap::new()),
            method: String::new(),
            path: String::new(),
            controller: String::new(),
            action: String::new(),
            req: Request::default(),
            res: ResponseSink::new(),
            response: None,
            globals: GlobalsView::default(),
        }
    }

    pub(crate) fn with_globals(mut self, globals: GlobalsView) -> Self {
        self.globals = globals;
        self
    }

    /// The plugin instance of type `P` loaded for this module.
    pub fn plugin<P: Any + Send + Sync>(&self) -> Option<Arc<P>> {
        self.plugins
            .get(plugin_name::<P>())?
            .clone()
            .downcast::<P>()
            .ok()
    }

    /// A server global set during boot.
    pub fn global<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.globals.get(name)
    }

    pub fn config_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.config.get(key)
    }
}
