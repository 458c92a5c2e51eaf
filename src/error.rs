//! # Framework Errors
//!
//! Boot-time failures ([`FoliaError`]) abort startup so misconfiguration is caught
//! before any traffic is served. Request-time failures ([`RequestError`]) are caught
//! at the dispatch boundary, logged, and forwarded to the fallback error handler.

use std::path::PathBuf;

/// Type-erased error used for user-supplied callbacks (extensions, plugins, actions).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that abort the boot sequence.
#[derive(Debug, thiserror::Error)]
pub enum FoliaError {
    /// A malformed extension, plugin or module declaration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Extension '{extension}' requires extension '{dependency}'")]
    Dependency {
        extension: String,
        dependency: String,
    },

    #[error("Invalid route at path '{path}': {source}")]
    Routing {
        path: String,
        #[source]
        source: RouteError,
    },

    #[error("Extension '{name}' failed to initialize: {source}")]
    ExtensionInit {
        name: String,
        #[source]
        source: BoxError,
    },

    #[error("Plugin '{name}' failed to initialize: {source}")]
    PluginInit {
        name: String,
        #[source]
        source: BoxError,
    },

    #[error("Listener for '{event}' failed: {source}")]
    Listener {
        event: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("I/O error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to parse '{}': {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A file the boot sequence relies on is absent or has the wrong shape.
    #[error("Boot precondition failed: {0}")]
    Precondition(String),
}

impl FoliaError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FoliaError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Route descriptor validation failures, one per registration rule.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("missing 'path' in route definition")]
    MissingPath,
    #[error("missing 'method' in route")]
    MissingMethod,
    #[error("middleware #{index} is neither a function nor an invokable object")]
    InvalidMiddleware { index: usize },
    #[error("missing 'handler' in route definition")]
    MissingHandler,
    #[error("missing 'controller' in route")]
    MissingController,
    #[error("missing 'action' in route")]
    MissingAction,
    #[error("unable to build controller {controller} for validation: {source}")]
    ControllerProbe {
        controller: String,
        #[source]
        source: BoxError,
    },
    #[error("missing action '{action}' in controller {controller}")]
    UnknownAction { controller: String, action: String },
    #[error("transport rejected route: {0}")]
    Transport(#[from] TransportError),
}

/// Errors raised while serving a single request.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Listener for '{event}' failed: {source}")]
    Listener {
        event: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("Unable to build controller {controller}: {source}")]
    ControllerInit {
        controller: String,
        #[source]
        source: BoxError,
    },

    #[error("Action '{action}' failed: {source}")]
    Action {
        action: String,
        #[source]
        source: BoxError,
    },

    /// The action succeeded but its response could not be written.
    #[error("Error while sending response ! At route {path}")]
    ResponseSend {
        path: String,
        #[source]
        source: BoxError,
    },

    #[error("Middleware failed: {0}")]
    Middleware(#[source] BoxError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl RequestError {
    /// Short, stable name used by error renderers.
    pub fn name(&self) -> &'static str {
        match self {
            RequestError::Listener { .. } => "ListenerError",
            RequestError::ControllerInit { .. } => "ControllerInitError",
            RequestError::Action { .. } => "ActionError",
            RequestError::ResponseSend { .. } => "ResponseSendError",
            RequestError::Middleware(_) => "MiddlewareError",
            RequestError::Transport(_) => "TransportError",
        }
    }
}

/// Errors reported by the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("response was already sent")]
    AlreadySent,
    #[error("route {method} {path} is already registered")]
    DuplicateRoute { method: String, path: String },
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}
