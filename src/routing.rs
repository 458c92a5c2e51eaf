//! # Routing
//!
//! A module declares its routes as a tree of [`RouteDescriptor`]s. Before registration
//! the tree is flattened by [`expand_routes`]:
//!
//! - a child's path is appended to its parent's path;
//! - a child inherits its parent's method, controller and router when it sets none;
//! - a child's middlewares run after its parent's;
//! - a node with neither action nor handler that has children is only a group and is not
//!   registered itself.
//!
//! Routes come out parents first, children in declaration order.
//!
//! The [`RouteRegistrar`] then validates every flattened route and binds it to the
//! transport. Validation is synchronous and complete before the transport is touched.

use crate::config::{ConfigMap, ServerConfig};
use crate::context::RequestContext;
use crate::controller::{Controller, ControllerFactory};
use crate::dispatch::{self, RouteBinding};
use crate::error::{FoliaError, RouteError};
use crate::events::{EventBus, EventPayload, ServerEvent};
use crate::globals::GlobalsView;
use crate::module::ModuleBundle;
use crate::plugin::PluginMap;
use crate::transport::{Middleware, MiddlewareEntry, Router};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// The method of routes binding raw middleware instead of a controller action.
pub const USE_METHOD: &str = "use";

/// Declarative binding of a method and path to raw middleware or a controller action.
#[derive(Clone, Default)]
pub struct RouteDescriptor {
    /// Transport to bind to; the server's root router when unset.
    pub router: Option<Arc<dyn Router>>,
    pub method: Option<String>,
    pub path: Option<String>,
    pub handler: Option<Arc<dyn Middleware>>,
    pub middlewares: Vec<MiddlewareEntry>,
    pub controller: Option<ControllerFactory>,
    pub action: Option<String>,
    pub children: Vec<RouteDescriptor>,
}

impl RouteDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(method: &str, path: &str) -> Self {
        Self {
            method: Some(method.to_string()),
            path: Some(path.to_string()),
            ..Self::default()
        }
    }

    pub fn get(path: &str) -> Self {
        Self::route("get", path)
    }

    pub fn post(path: &str) -> Self {
        Self::route("post", path)
    }

    pub fn put(path: &str) -> Self {
        Self::route("put", path)
    }

    pub fn delete(path: &str) -> Self {
        Self::route("delete", path)
    }

    /// A `use` route running `handler` for every request under the optional path.
    pub fn mount(path: Option<&str>, handler: Arc<dyn Middleware>) -> Self {
        Self {
            method: Some(USE_METHOD.to_string()),
            path: path.map(str::to_string),
            handler: Some(handler),
            ..Self::default()
        }
    }

    /// A grouping node whose children share `path` as a prefix.
    pub fn group(path: &str) -> Self {
        Self {
            path: Some(path.to_string()),
            ..Self::default()
        }
    }

    pub fn method(mut self, method: &str) -> Self {
        self.method = Some(method.to_string());
        self
    }

    pub fn path(mut self, path: &str) -> Self {
        self.path = Some(path.to_string());
        self
    }

    pub fn controller<C: Controller>(mut self) -> Self {
        self.controller = Some(ControllerFactory::of::<C>());
        self
    }

    pub fn action(mut self, action: &str) -> Self {
        self.action = Some(action.to_string());
        self
    }

    pub fn handler(mut self, handler: Arc<dyn Middleware>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn middleware(mut self, entry: impl Into<MiddlewareEntry>) -> Self {
        self.middlewares.push(entry.into());
        self
    }

    pub fn router(mut self, router: Arc<dyn Router>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn child(mut self, child: RouteDescriptor) -> Self {
        self.children.push(child);
        self
    }

    pub fn is_use(&self) -> bool {
        self.method
            .as_deref()
            .is_some_and(|m| m == USE_METHOD)
    }

    fn is_group(&self) -> bool {
        self.action.is_none() && self.handler.is_none() && !self.children.is_empty()
    }
}

impl fmt::Debug for RouteDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteDescriptor")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("controller", &self.controller)
            .field("action", &self.action)
            .field("handler", &self.handler.is_some())
            .field("middlewares", &self.middlewares.len())
            .field("children", &self.children)
            .finish()
    }
}

/// Summary of a registered route, visible to every request of its module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSummary {
    pub method: String,
    pub path: String,
    pub controller: Option<String>,
    pub action: Option<String>,
}

impl From<&RouteDescriptor> for RouteSummary {
    fn from(route: &RouteDescriptor) -> Self {
        Self {
            method: route.method.clone().unwrap_or_default(),
            path: route.path.clone().unwrap_or_default(),
            controller: route.controller.map(|c| c.name().to_string()),
            action: route.action.clone(),
        }
    }
}

/// Flattens route trees depth-first.
pub fn expand_routes(routes: Vec<RouteDescriptor>) -> Vec<RouteDescriptor> {
    let mut flat = Vec::new();
    for route in routes {
        expand_into(route, &mut flat);
    }
    flat
}

fn expand_into(mut route: RouteDescriptor, flat: &mut Vec<RouteDescriptor>) {
    let group = route.is_group();
    let children = std::mem::take(&mut route.children);
    let parent = route.clone();
    if !group {
        flat.push(route);
    }

    for mut child in children {
        child.path = match (&parent.path, child.path.take()) {
            (Some(prefix), Some(own)) => Some(join_paths(prefix, &own)),
            (Some(prefix), None) => Some(prefix.clone()),
            (None, own) => own,
        };
        if child.method.is_none() {
            child.method = parent.method.clone();
        }
        if child.controller.is_none() {
            child.controller = parent.controller;
        }
        if child.router.is_none() {
            child.router = parent.router.clone();
        }
        let mut middlewares = parent.middlewares.clone();
        middlewares.append(&mut child.middlewares);
        child.middlewares = middlewares;
        expand_into(child, flat);
    }
}

fn join_paths(parent: &str, child: &str) -> String {
    match (parent.ends_with('/'), child.starts_with('/')) {
        (true, true) => format!("{parent}{}", &child[1..]),
        (false, false) if !child.is_empty() => format!("{parent}/{child}"),
        _ => format!("{parent}{child}"),
    }
}

/// Module-level data shared by every route of one module.
struct ModuleScope {
    module: String,
    config: Arc<ConfigMap>,
    routes: Arc<[RouteSummary]>,
    plugins: Arc<PluginMap>,
}

/// Validates routes and binds them to the transport.
pub struct RouteRegistrar<'a> {
    root: &'a Arc<dyn Router>,
    layout: &'a Arc<ServerConfig>,
    events: &'a EventBus,
    globals: GlobalsView,
}

impl<'a> RouteRegistrar<'a> {
    pub fn new(
        root: &'a Arc<dyn Router>,
        layout: &'a Arc<ServerConfig>,
        events: &'a EventBus,
        globals: GlobalsView,
    ) -> Self {
        Self {
            root,
            layout,
            events,
            globals,
        }
    }

    /// Registers every route of `bundle`. Returns the number of routes bound.
    pub async fn register_module(&self, bundle: &mut ModuleBundle) -> Result<usize, FoliaError> {
        self.events
            .emit_boot(
                ServerEvent::BeforeModuleRoutesLoaded,
                EventPayload::Module(&mut *bundle),
            )
            .await?;

        let routes = expand_routes(bundle.routes.clone());
        let scope = ModuleScope {
            module: bundle.module.clone(),
            config: Arc::new(bundle.config.clone()),
            routes: routes.iter().map(RouteSummary::from).collect(),
            plugins: Arc::new(bundle.plugins.clone()),
        };

        let count = routes.len();
        for mut route in routes {
            self.events
                .emit_boot(ServerEvent::BeforeRouteLoaded, EventPayload::Route(&mut route))
                .await?;
            self.register_route(&route, &scope)?;
            self.events
                .emit_boot(ServerEvent::AfterRouteLoaded, EventPayload::Route(&mut route))
                .await?;
        }

        self.events
            .emit_boot(
                ServerEvent::AfterModuleRoutesLoaded,
                EventPayload::Module(&mut *bundle),
            )
            .await?;
        info!(module = %bundle.module, routes = count, "Module routes registered");
        Ok(count)
    }

    fn register_route(&self, route: &RouteDescriptor, scope: &ModuleScope) -> Result<(), FoliaError> {
        let fail = |source: RouteError| FoliaError::Routing {
            path: route.path.clone().unwrap_or_default(),
            source,
        };

        if !route.is_use() && route.path.as_deref().map_or(true, str::is_empty) {
            return Err(fail(RouteError::MissingPath));
        }
        let method = route
            .method
            .as_deref()
            .filter(|m| !m.is_empty())
            .ok_or_else(|| fail(RouteError::MissingMethod))?;

        let middlewares = route
            .middlewares
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                entry
                    .normalize()
                    .ok_or_else(|| fail(RouteError::InvalidMiddleware { index }))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let router = route.router.clone().unwrap_or_else(|| self.root.clone());

        if route.is_use() {
            let handler = route
                .handler
                .clone()
                .ok_or_else(|| fail(RouteError::MissingHandler))?;
            router
                .mount(route.path.as_deref(), middlewares, handler)
                .map_err(|e| fail(e.into()))?;
            debug!(module = %scope.module, path = ?route.path, "Mounted middleware");
            return Ok(());
        }

        let controller = route
            .controller
            .ok_or_else(|| fail(RouteError::MissingController))?;
        let action = route
            .action
            .clone()
            .filter(|a| !a.is_empty())
            .ok_or_else(|| fail(RouteError::MissingAction))?;

        let probe = controller
            .build(&RequestContext::empty())
            .map_err(|source| {
                fail(RouteError::ControllerProbe {
                    controller: controller.name().to_string(),
                    source,
                })
            })?;
        if !probe.actions().contains(&action.as_str()) {
            return Err(fail(RouteError::UnknownAction {
                controller: controller.name().to_string(),
                action,
            }));
        }

        let path = route.path.clone().unwrap_or_default();
        let binding = Arc::new(RouteBinding {
            module: scope.module.clone(),
            config: scope.config.clone(),
            routes: scope.routes.clone(),
            plugins: scope.plugins.clone(),
            method: method.to_ascii_uppercase(),
            path: path.clone(),
            controller,
            action,
            layout: self.layout.clone(),
            globals: self.globals.clone(),
            events: self.events.clone(),
        });
        router
            .register(method, &path, middlewares, dispatch::endpoint(binding))
            .map_err(|e| fail(e.into()))?;
        debug!(module = %scope.module, method, path = %path, "Registered route");
        Ok(())
    }
}
