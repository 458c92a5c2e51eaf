//! # Architecture Reconciliation
//!
//! An [`Architecture`] is a declarative tree of the files and directories a project is
//! expected to contain: a *base* tree evaluated once, and a *module* tree evaluated once
//! per module directory. [`ArchitectureReconciler`] diffs both trees against the real
//! filesystem and creates whatever is missing.
//!
//! ## Two phases
//!
//! 1. **Scan**: every entry is resolved and checked; missing directories and files are
//!    recorded in an [`ArchitecturePlan`]. Nothing is written.
//! 2. **Mutate**: recorded directories are created (parents first), then recorded files.
//!
//! Running the reconciler on a consistent tree records nothing and writes nothing.
//!
//! ## Templated entries
//!
//! Paths and contents are [`Template`]s. A templated value is a function of the module
//! name, evaluated while a module's tree is resolved. A child's path is its parent's path
//! joined with its own, composed as a function when either side is templated.

use crate::config::ServerConfig;
use crate::error::FoliaError;
use crate::events::{EventBus, EventPayload, ServerEvent};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

type TemplateFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// A string that is either fixed or computed from a module name.
#[derive(Clone)]
pub enum Template {
    Literal(String),
    Templated(TemplateFn),
}

impl Template {
    pub fn templated(f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Template::Templated(Arc::new(f))
    }

    pub fn resolve(&self, module: &str) -> String {
        match self {
            Template::Literal(value) => value.clone(),
            Template::Templated(f) => f(module),
        }
    }

    /// `parent/child`, keeping literals literal.
    pub fn join(parent: &Template, child: &Template) -> Template {
        match (parent, child) {
            (Template::Literal(p), Template::Literal(c)) => Template::Literal(format!("{p}/{c}")),
            _ => {
                let (parent, child) = (parent.clone(), child.clone());
                Template::templated(move |module| {
                    format!("{}/{}", parent.resolve(module), child.resolve(module))
                })
            }
        }
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Template::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Template::Templated(_) => f.write_str("Templated(..)"),
        }
    }
}

impl From<&str> for Template {
    fn from(value: &str) -> Self {
        Template::Literal(value.to_string())
    }
}

impl From<String> for Template {
    fn from(value: String) -> Self {
        Template::Literal(value)
    }
}

/// One expected filesystem node. With `content` it is a file, otherwise a directory.
#[derive(Debug, Clone)]
pub struct ArchitectureEntry {
    pub path: Template,
    pub content: Option<Template>,
    pub children: Vec<ArchitectureEntry>,
    /// When this path already exists the entry is considered satisfied.
    pub require_path: Option<Template>,
}

impl ArchitectureEntry {
    pub fn dir(path: impl Into<Template>) -> Self {
        Self {
            path: path.into(),
            content: None,
            children: Vec::new(),
            require_path: None,
        }
    }

    pub fn file(path: impl Into<Template>, content: impl Into<Template>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::dir(path)
        }
    }

    pub fn with_children(mut self, children: Vec<ArchitectureEntry>) -> Self {
        self.children = children;
        self
    }

    pub fn require(mut self, path: impl Into<Template>) -> Self {
        self.require_path = Some(path.into());
        self
    }
}

/// The expected layout: a base tree and a per-module tree.
#[derive(Debug, Clone, Default)]
pub struct Architecture {
    pub base: Vec<ArchitectureEntry>,
    pub modules: Vec<ArchitectureEntry>,
}

impl Architecture {
    /// The stock layout for `config`.
    pub fn default_for(config: &ServerConfig) -> Self {
        let mut app_children = Vec::new();
        if let Some(local) = &config.paths.local_file {
            app_children.push(ArchitectureEntry::file(local.as_str(), "{}\n"));
        }
        if let Some(dist) = &config.paths.dist_local_file {
            app_children.push(ArchitectureEntry::file(dist.as_str(), "{}\n"));
        }

        let base = vec![ArchitectureEntry::dir(format!(
            "{}/{}",
            config.modules_dir, config.application_module
        ))
        .with_children(app_children)];

        let modules = vec![
            ArchitectureEntry::dir(config.paths.plugins_dir.as_str()),
            ArchitectureEntry::file(config.paths.config_file.as_str(), "{}\n"),
            ArchitectureEntry::dir(config.paths.views_dir.as_str()).with_children(vec![
                ArchitectureEntry::file(
                    Template::templated(|module| format!("{module}/index.html")),
                    Template::templated(|module| format!("<h1>{module}</h1>\n")),
                ),
            ]),
        ];

        Self { base, modules }
    }
}

/// An entry after template resolution, handed to per-entry listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEntry {
    /// Path relative to the project root.
    pub path: String,
    pub content: Option<String>,
    /// `None` for base entries.
    pub module: Option<String>,
}

/// Everything the scan phase found missing.
#[derive(Debug, Clone, Default)]
pub struct ArchitecturePlan {
    pub modules: Vec<String>,
    /// Relative to the project root, parents before children.
    pub directories_to_create: Vec<PathBuf>,
    pub files_to_create: BTreeMap<PathBuf, String>,
}

impl ArchitecturePlan {
    pub fn is_empty(&self) -> bool {
        self.directories_to_create.is_empty() && self.files_to_create.is_empty()
    }
}

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    pub directories_created: Vec<PathBuf>,
    pub files_created: Vec<PathBuf>,
    /// Non-fatal configuration drift advisories.
    pub warnings: Vec<String>,
}

/// A flattened entry with its composed path and inherited guard.
#[derive(Debug, Clone)]
struct FlatEntry {
    path: Template,
    content: Option<Template>,
    require_path: Option<Template>,
}

/// Depth-first flattening. A child without its own guard is guarded by its parent's path.
fn flatten(entries: &[ArchitectureEntry], parent: Option<&Template>) -> Vec<FlatEntry> {
    let mut flat = Vec::new();
    for entry in entries {
        let (path, require_path) = match parent {
            Some(parent) => (
                Template::join(parent, &entry.path),
                entry
                    .require_path
                    .clone()
                    .or_else(|| Some(parent.clone())),
            ),
            None => (entry.path.clone(), entry.require_path.clone()),
        };
        flat.push(FlatEntry {
            path: path.clone(),
            content: entry.content.clone(),
            require_path,
        });
        flat.extend(flatten(&entry.children, Some(&path)));
    }
    flat
}

/// Diffs an [`Architecture`] against the filesystem and repairs it.
pub struct ArchitectureReconciler<'a> {
    config: &'a ServerConfig,
    events: &'a EventBus,
}

impl<'a> ArchitectureReconciler<'a> {
    pub fn new(config: &'a ServerConfig, events: &'a EventBus) -> Self {
        Self { config, events }
    }

    /// Scans both trees for `modules`, creates what is missing, then checks config drift.
    #[instrument(skip_all, fields(root = %self.config.root.display()))]
    pub async fn reconcile(
        &self,
        architecture: &Architecture,
        modules: Vec<String>,
    ) -> Result<ReconcileReport, FoliaError> {
        let mut plan = ArchitecturePlan {
            modules,
            ..ArchitecturePlan::default()
        };
        self.events
            .emit_boot(
                ServerEvent::BeforeArchitectureVerified,
                EventPayload::Architecture(&mut plan),
            )
            .await?;

        let base = flatten(&architecture.base, None);
        let per_module = flatten(&architecture.modules, None);
        let mut recorded: HashSet<PathBuf> = HashSet::new();

        for entry in &base {
            let module = &self.config.application_module;
            if let Some(guard) = &entry.require_path {
                if self.exists(Path::new(&guard.resolve(module))).await? {
                    debug!(guard = %guard.resolve(module), "Base entry already satisfied");
                    continue;
                }
            }
            let resolved = ResolvedEntry {
                path: entry.path.resolve(module),
                content: entry.content.as_ref().map(|c| c.resolve(module)),
                module: None,
            };
            self.verify_entry(resolved, &mut plan, &mut recorded).await?;
        }

        let modules = plan.modules.clone();
        for module in &modules {
            let module_root = format!("{}/{}", self.config.modules_dir, module);
            for entry in &per_module {
                if let Some(guard) = &entry.require_path {
                    let guard = guard.resolve(module);
                    if self.exists(Path::new(&guard)).await?
                        || self.exists(&Path::new(&module_root).join(&guard)).await?
                    {
                        continue;
                    }
                }
                let resolved = ResolvedEntry {
                    path: format!("{}/{}", module_root, entry.path.resolve(module)),
                    content: entry.content.as_ref().map(|c| c.resolve(module)),
                    module: Some(module.clone()),
                };
                self.verify_entry(resolved, &mut plan, &mut recorded).await?;
            }
        }

        let mut report = self.apply(&plan).await?;

        report.warnings = crate::config::check_local_drift(self.config).await?;
        for warning in &report.warnings {
            warn!("{warning}");
        }

        self.events
            .emit_boot(
                ServerEvent::AfterArchitectureVerified,
                EventPayload::Architecture(&mut plan),
            )
            .await?;

        info!(
            directories = report.directories_created.len(),
            files = report.files_created.len(),
            "Architecture verified"
        );
        Ok(report)
    }

    /// Records every missing ancestor directory and, for files, the missing file itself.
    async fn verify_entry(
        &self,
        mut entry: ResolvedEntry,
        plan: &mut ArchitecturePlan,
        recorded: &mut HashSet<PathBuf>,
    ) -> Result<(), FoliaError> {
        self.events
            .emit_boot(
                ServerEvent::OnArchitectureEntryVerificationStart,
                EventPayload::ArchitectureEntry(&mut entry),
            )
            .await?;

        let mut segments: Vec<&str> = entry.path.split('/').filter(|s| !s.is_empty()).collect();
        let file_name = match entry.content {
            Some(_) => segments.pop(),
            None => None,
        };

        let mut dir = PathBuf::new();
        for segment in segments {
            dir.push(segment);
            if !recorded.contains(&dir) && !self.exists(&dir).await? {
                recorded.insert(dir.clone());
                plan.directories_to_create.push(dir.clone());
            }
        }

        if let (Some(name), Some(content)) = (file_name, &entry.content) {
            let file = dir.join(name);
            if !plan.files_to_create.contains_key(&file) && !self.exists(&file).await? {
                plan.files_to_create.insert(file, content.clone());
            }
        }

        self.events
            .emit_boot(
                ServerEvent::OnArchitectureEntryVerificationEnd,
                EventPayload::ArchitectureEntry(&mut entry),
            )
            .await
    }

    async fn apply(&self, plan: &ArchitecturePlan) -> Result<ReconcileReport, FoliaError> {
        let mut report = ReconcileReport::default();
        if plan.is_empty() {
            return Ok(report);
        }

        for dir in &plan.directories_to_create {
            let full = self.config.root.join(dir);
            tokio::fs::create_dir_all(&full)
                .await
                .map_err(|e| FoliaError::io(&full, e))?;
            debug!(path = %dir.display(), "Created directory");
            report.directories_created.push(dir.clone());
        }
        for (file, content) in &plan.files_to_create {
            let full = self.config.root.join(file);
            tokio::fs::write(&full, content)
                .await
                .map_err(|e| FoliaError::io(&full, e))?;
            debug!(path = %file.display(), "Created file");
            report.files_created.push(file.clone());
        }
        Ok(report)
    }

    async fn exists(&self, relative: &Path) -> Result<bool, FoliaError> {
        let full = self.config.root.join(relative);
        tokio::fs::try_exists(&full)
            .await
            .map_err(|e| FoliaError::io(&full, e))
    }
}
