//! # Extensions
//!
//! Extensions are boot-time units that configure the [`Server`] before modules load:
//! registering listeners, setting globals, mounting transport-level middleware.
//!
//! They load strictly in list order. An extension may only depend on extensions that were
//! loaded before it; declaring a dependency that appears later in the list is an error.

use crate::error::{BoxError, FoliaError};
use crate::events::{EventPayload, ServerEvent};
use crate::{BoxFuture, Server};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument};

/// Initializer of an extension.
pub type InitFn =
    Box<dyn for<'a> Fn(&'a mut Server) -> BoxFuture<'a, Result<(), BoxError>> + Send + Sync>;

/// An extension implemented as a type.
#[async_trait]
pub trait Extension: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    async fn init(&self, server: &mut Server) -> Result<(), BoxError>;
}

/// A named initializer with optional dependencies.
pub struct ExtensionDescriptor {
    pub name: String,
    pub dependencies: Vec<String>,
    init: Option<InitFn>,
}

impl ExtensionDescriptor {
    /// A descriptor without an initializer; loading fails until one is set.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            init: None,
        }
    }

    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(name.into());
        self
    }

    pub fn init<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Server) -> BoxFuture<'a, Result<(), BoxError>>
            + Send
            + Sync
            + 'static,
    {
        self.init = Some(Box::new(f));
        self
    }

    /// An extension whose initializer does nothing.
    pub fn noop(name: impl Into<String>) -> Self {
        Self::new(name).init(|_| Box::pin(async { Ok(()) }))
    }
}

impl fmt::Debug for ExtensionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionDescriptor")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("init", &self.init.is_some())
            .finish()
    }
}

impl<E: Extension> From<E> for ExtensionDescriptor {
    fn from(extension: E) -> Self {
        let extension = Arc::new(extension);
        let name = extension.name().to_string();
        let dependencies = extension.dependencies();
        let descriptor = Self {
            name,
            dependencies,
            init: None,
        };
        descriptor.init(move |server| {
            let extension = extension.clone();
            Box::pin(async move { extension.init(server).await })
        })
    }
}

/// Loads `extensions` in order, recording each name in the server's registry.
#[instrument(skip_all, fields(count = extensions.len()))]
pub(crate) async fn load_extensions(
    server: &mut Server,
    extensions: Vec<ExtensionDescriptor>,
) -> Result<(), FoliaError> {
    let events = server.events().clone();
    let names: Vec<String> = extensions.iter().map(|e| e.name.clone()).collect();
    events
        .emit_boot(
            ServerEvent::BeforeExtensionsLoaded,
            EventPayload::Extensions(&names),
        )
        .await?;

    for extension in extensions {
        if extension.name.is_empty() {
            return Err(FoliaError::Configuration(
                "extension is missing a 'name'".to_string(),
            ));
        }
        let Some(init) = extension.init else {
            return Err(FoliaError::Configuration(format!(
                "extension '{}' is missing an 'init' function",
                extension.name
            )));
        };
        if let Some(missing) = extension
            .dependencies
            .iter()
            .find(|dependency| !server.extensions().contains(*dependency))
        {
            return Err(FoliaError::Dependency {
                extension: extension.name,
                dependency: missing.clone(),
            });
        }

        events
            .emit_boot(
                ServerEvent::BeforeExtensionLoaded,
                EventPayload::Extension(&extension.name),
            )
            .await?;
        server.register_extension(extension.name.clone());
        init(&mut *server)
            .await
            .map_err(|source| FoliaError::ExtensionInit {
                name: extension.name.clone(),
                source,
            })?;
        events
            .emit_boot(
                ServerEvent::AfterExtensionLoaded,
                EventPayload::Extension(&extension.name),
            )
            .await?;
        info!(extension = %extension.name, "Extension loaded");
    }

    events
        .emit_boot(
            ServerEvent::AfterExtensionsLoaded,
            EventPayload::Extensions(server.extensions()),
        )
        .await
}
