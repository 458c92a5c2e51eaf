use crate::architecture::{Architecture, ArchitectureReconciler, ReconcileReport};
use crate::config::ServerConfig;
use crate::error::{BoxError, FoliaError};
use crate::events::{EventBus, EventListener, EventPayload, ServerEvent};
use crate::extension::load_extensions;
use crate::globals::Globals;
use crate::manifest::AppManifest;
use crate::module::{discover_modules, ModuleLoader};
use crate::transport::Router;
use std::any::Any;
use std::sync::Arc;
use tracing::{info, instrument};

/// The orchestrator: owns the registries and runs the boot sequence.
///
/// `Server` is responsible for:
/// - **Layout**: making sure the project tree on disk matches the [`Architecture`]
/// - **Extensions**: loading them in order against their declared dependencies
/// - **Modules**: building each module bundle and binding its routes to the [`Router`]
///
/// Every stage reports to the [`EventBus`]; listeners registered by extensions observe
/// the stages that follow them.
///
/// # Example
///
/// ```ignore
/// let router = Arc::new(MemoryRouter::new());
/// let mut server = Server::new(ServerConfig::with_root("./site"), router.clone());
/// server.init(manifest).await?;
///
/// let response = router.handle(Request::new("GET", "/")).await;
/// ```
pub struct Server {
    layout: Arc<ServerConfig>,
    router: Arc<dyn Router>,
    events: EventBus,
    globals: Globals,
    architecture: Architecture,
    extensions: Vec<String>,
    modules: Vec<String>,
    advisories: Vec<String>,
}

/// What [`Server::init`] did.
#[derive(Debug, Clone, Default)]
pub struct BootReport {
    pub architecture: ReconcileReport,
    pub extensions: Vec<String>,
    pub modules: Vec<String>,
}

impl Server {
    /// A server using the default project architecture.
    pub fn new(config: ServerConfig, router: Arc<dyn Router>) -> Self {
        let architecture = Architecture::default_for(&config);
        Self {
            layout: Arc::new(config),
            router,
            events: EventBus::new(),
            globals: Globals::new(),
            architecture,
            extensions: Vec::new(),
            modules: Vec::new(),
            advisories: Vec::new(),
        }
    }

    /// Replaces the expected project architecture.
    pub fn with_architecture(mut self, architecture: Architecture) -> Self {
        self.architecture = architecture;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.layout
    }

    pub(crate) fn layout(&self) -> &Arc<ServerConfig> {
        &self.layout
    }

    /// The root transport router.
    pub fn router(&self) -> &Arc<dyn Router> {
        &self.router
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub(crate) fn globals(&self) -> &Globals {
        &self.globals
    }

    /// Registers `listener` for `event`.
    pub fn on(&self, event: ServerEvent, listener: impl EventListener + 'static) {
        self.events.on(event, listener);
    }

    pub async fn emit(&self, event: ServerEvent, payload: EventPayload<'_>) -> Result<(), BoxError> {
        self.events.emit(event, payload).await
    }

    /// Sets a global readable by every request.
    pub fn set<T: Any + Send + Sync>(&mut self, name: impl Into<String>, value: T) {
        self.globals.set(name, value);
    }

    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.globals.get(name)
    }

    /// Names of the loaded extensions, in load order.
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub(crate) fn register_extension(&mut self, name: String) {
        self.extensions.push(name);
    }

    /// Names of the loaded modules, application module first.
    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    /// Non-fatal warnings raised during boot.
    pub fn advisories(&self) -> &[String] {
        &self.advisories
    }

    /// Runs the boot sequence: architecture, extensions, then modules.
    ///
    /// Any failure aborts the boot; the server must not serve traffic afterwards.
    #[instrument(skip_all, fields(root = %self.layout.root.display()))]
    pub async fn init(&mut self, manifest: AppManifest) -> Result<BootReport, FoliaError> {
        let AppManifest {
            extensions,
            plugins,
            modules,
        } = manifest;

        // =====================================================================
        // Step 1: Reconcile the project tree
        // =====================================================================
        let mut names = discover_modules(&self.layout).await?;
        if !names.contains(&self.layout.application_module) {
            names.push(self.layout.application_module.clone());
            names.sort();
        }
        let architecture = ArchitectureReconciler::new(&self.layout, &self.events)
            .reconcile(&self.architecture, names)
            .await?;
        self.advisories.extend(architecture.warnings.iter().cloned());

        // =====================================================================
        // Step 2: Load extensions
        // =====================================================================
        load_extensions(self, extensions).await?;

        // =====================================================================
        // Step 3: Load modules and register their routes
        // =====================================================================
        let loaded = ModuleLoader::new(self, &plugins).load(modules).await?;
        self.modules = loaded;

        info!(
            extensions = self.extensions.len(),
            modules = self.modules.len(),
            advisories = self.advisories.len(),
            "Server ready"
        );
        Ok(BootReport {
            architecture,
            extensions: self.extensions.clone(),
            modules: self.modules.clone(),
        })
    }
}
