mod common;

use common::{EventLog, Project};
use folia::architecture::ArchitectureReconciler;
use folia::config::LayoutPaths;
use folia::error::FoliaError;
use folia::events::{listener_fn, EventBus, EventPayload, ServerEvent};
use folia::{
    AppManifest, Architecture, ArchitectureEntry, BoxError, Extension, ExtensionDescriptor,
    Plugin, Server, ServerConfig, Template,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// =============================================================================
// EXTENSIONS
// =============================================================================

#[tokio::test]
async fn test_single_extension_is_registered() {
    let mut project = Project::new();

    project
        .boot(AppManifest::new().extension(ExtensionDescriptor::noop("A")))
        .await
        .expect("Boot failed");

    assert_eq!(project.server.extensions(), &["A".to_string()]);
}

#[tokio::test]
async fn test_missing_dependency_aborts_boot() {
    let mut project = Project::new();

    let err = project
        .boot(AppManifest::new().extension(ExtensionDescriptor::noop("B").depends_on("A")))
        .await
        .unwrap_err();

    match err {
        FoliaError::Dependency {
            extension,
            dependency,
        } => {
            assert_eq!(extension, "B");
            assert_eq!(dependency, "A");
        }
        other => panic!("Expected a dependency error, got {other}"),
    }
    assert!(project.server.extensions().is_empty());
}

#[tokio::test]
async fn test_dependency_listed_later_is_not_satisfied() {
    let mut project = Project::new();

    let err = project
        .boot(
            AppManifest::new()
                .extension(ExtensionDescriptor::noop("B").depends_on("A"))
                .extension(ExtensionDescriptor::noop("A")),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, FoliaError::Dependency { .. }));
}

#[tokio::test]
async fn test_extension_without_init_is_a_configuration_error() {
    let mut project = Project::new();

    let err = project
        .boot(AppManifest::new().extension(ExtensionDescriptor::new("bare")))
        .await
        .unwrap_err();

    assert!(matches!(err, FoliaError::Configuration(msg) if msg.contains("'init'")));
}

struct SiteName;

#[async_trait::async_trait]
impl Extension for SiteName {
    fn name(&self) -> &str {
        "site-name"
    }

    fn dependencies(&self) -> Vec<String> {
        vec!["logger".to_string()]
    }

    async fn init(&self, server: &mut Server) -> Result<(), BoxError> {
        server.set("site_name", "Folia".to_string());
        Ok(())
    }
}

#[tokio::test]
async fn test_extensions_initialize_in_order_and_see_each_other() {
    let mut project = Project::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();

    let logger = ExtensionDescriptor::new("logger").init(move |server| {
        let recorder = recorder.clone();
        Box::pin(async move {
            server.on(
                ServerEvent::AfterExtensionLoaded,
                listener_fn(move |_, payload| {
                    if let EventPayload::Extension(name) = payload {
                        recorder.lock().unwrap().push(name.to_string());
                    }
                    Ok(())
                }),
            );
            Ok(())
        })
    });

    project
        .boot(AppManifest::new().extension(logger).extension(SiteName))
        .await
        .expect("Boot failed");

    assert_eq!(project.server.extensions(), &["logger", "site-name"]);
    // The listener registered by `logger` observes every extension after its own init
    assert_eq!(*seen.lock().unwrap(), vec!["logger", "site-name"]);
    assert_eq!(
        project.server.get::<String>("site_name").as_deref(),
        Some(&"Folia".to_string())
    );
}

#[tokio::test]
async fn test_failing_extension_init_aborts_boot() {
    let mut project = Project::new();
    let failing = ExtensionDescriptor::new("db")
        .init(|_| Box::pin(async { Err::<(), BoxError>("connection refused".into()) }));

    let err = project
        .boot(AppManifest::new().extension(failing))
        .await
        .unwrap_err();

    assert!(matches!(err, FoliaError::ExtensionInit { name, .. } if name == "db"));
}

// =============================================================================
// ARCHITECTURE
// =============================================================================

fn config_without_drift_check(root: &std::path::Path) -> ServerConfig {
    ServerConfig {
        root: root.to_path_buf(),
        paths: LayoutPaths {
            local_file: None,
            dist_local_file: None,
            ..LayoutPaths::default()
        },
        ..ServerConfig::default()
    }
}

#[tokio::test]
async fn test_reconciliation_creates_missing_entries_once() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_without_drift_check(dir.path());
    let events = EventBus::new();
    let architecture = Architecture {
        base: vec![ArchitectureEntry::file("cfg/x.txt", "hi")],
        modules: Vec::new(),
    };
    let reconciler = ArchitectureReconciler::new(&config, &events);

    let first = reconciler
        .reconcile(&architecture, Vec::new())
        .await
        .expect("First run failed");

    assert_eq!(first.directories_created, vec![PathBuf::from("cfg")]);
    assert_eq!(first.files_created, vec![PathBuf::from("cfg/x.txt")]);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("cfg/x.txt")).unwrap(),
        "hi"
    );

    let second = reconciler
        .reconcile(&architecture, Vec::new())
        .await
        .expect("Second run failed");

    assert!(second.directories_created.is_empty());
    assert!(second.files_created.is_empty());
}

#[tokio::test]
async fn test_reconciliation_never_overwrites_existing_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("cfg")).unwrap();
    std::fs::write(dir.path().join("cfg/x.txt"), "edited").unwrap();
    let config = config_without_drift_check(dir.path());
    let events = EventBus::new();
    let architecture = Architecture {
        base: vec![ArchitectureEntry::file("cfg/x.txt", "hi")],
        modules: Vec::new(),
    };

    let report = ArchitectureReconciler::new(&config, &events)
        .reconcile(&architecture, Vec::new())
        .await
        .unwrap();

    assert!(report.files_created.is_empty());
    assert_eq!(
        std::fs::read_to_string(dir.path().join("cfg/x.txt")).unwrap(),
        "edited"
    );
}

#[tokio::test]
async fn test_templated_module_entries_use_module_name() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_without_drift_check(dir.path());
    let events = EventBus::new();
    let architecture = Architecture {
        base: Vec::new(),
        modules: vec![ArchitectureEntry::dir("docs").with_children(vec![
            ArchitectureEntry::file(
                Template::templated(|m| format!("{}.md", m.to_lowercase())),
                Template::templated(|m| format!("# {m}")),
            ),
        ])],
    };

    ArchitectureReconciler::new(&config, &events)
        .reconcile(&architecture, vec!["Blog".into(), "Shop".into()])
        .await
        .unwrap();

    assert_eq!(
        std::fs::read_to_string(dir.path().join("module/Blog/docs/blog.md")).unwrap(),
        "# Blog"
    );
    assert_eq!(
        std::fs::read_to_string(dir.path().join("module/Shop/docs/shop.md")).unwrap(),
        "# Shop"
    );
}

#[tokio::test]
async fn test_guarded_entry_is_skipped_when_its_marker_exists() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("marker"), "").unwrap();
    let config = config_without_drift_check(dir.path());
    let events = EventBus::new();
    let architecture = Architecture {
        base: vec![ArchitectureEntry::file("setup/install.txt", "run me").require("marker")],
        modules: Vec::new(),
    };

    let report = ArchitectureReconciler::new(&config, &events)
        .reconcile(&architecture, Vec::new())
        .await
        .unwrap();

    assert!(report.directories_created.is_empty());
    assert!(report.files_created.is_empty());
    assert!(!dir.path().join("setup").exists());
}

#[tokio::test]
async fn test_module_children_are_skipped_when_their_parent_exists() {
    let dir = tempfile::tempdir().unwrap();
    // Blog already has its docs directory, without the guide inside it
    std::fs::create_dir_all(dir.path().join("module/Blog/docs")).unwrap();
    let config = config_without_drift_check(dir.path());
    let events = EventBus::new();
    let architecture = Architecture {
        base: Vec::new(),
        modules: vec![ArchitectureEntry::dir("docs")
            .with_children(vec![ArchitectureEntry::file("guide.md", "# Guide")])],
    };

    let report = ArchitectureReconciler::new(&config, &events)
        .reconcile(&architecture, vec!["Blog".into()])
        .await
        .unwrap();

    assert!(report.directories_created.is_empty());
    assert!(report.files_created.is_empty());
    assert!(!dir.path().join("module/Blog/docs/guide.md").exists());
}

#[tokio::test]
async fn test_default_boot_lays_out_application_module() {
    let mut project = Project::new();

    project.boot(AppManifest::new()).await.expect("Boot failed");

    assert!(project.exists("module/Application/plugins"));
    assert_eq!(project.read("module/Application/config/local.json"), "{}\n");
    assert_eq!(project.read("module/Application/config/local.dist.json"), "{}\n");
    assert_eq!(project.read("module/Application/config/config.json"), "{}\n");
    assert_eq!(
        project.read("module/Application/src/views/Application/index.html"),
        "<h1>Application</h1>\n"
    );
    assert_eq!(project.server.modules(), &["Application"]);
}

#[tokio::test]
async fn test_second_boot_creates_nothing() {
    let mut project = Project::new();
    project.write("module/Blog/.keep", "");
    project.boot(AppManifest::new()).await.expect("First boot failed");

    let router = Arc::new(folia::transport::MemoryRouter::new());
    let mut again = Server::new(ServerConfig::with_root(project.root()), router);
    let report = again.init(AppManifest::new()).await.expect("Second boot failed");

    assert!(report.architecture.directories_created.is_empty());
    assert!(report.architecture.files_created.is_empty());
    assert_eq!(report.modules, vec!["Application", "Blog"]);
}

#[tokio::test]
async fn test_missing_local_config_is_a_boot_precondition() {
    let mut project = Project::new();
    // The application module exists, so its local files are not scaffolded
    project.write("module/Application/config/config.json", "{}");

    let err = project.boot(AppManifest::new()).await.unwrap_err();

    assert!(matches!(err, FoliaError::Precondition(_)));
}

#[tokio::test]
async fn test_config_drift_is_reported_as_advisory() {
    let mut project = Project::new();
    project.write("module/Application/config/local.json", r#"{ "db": "x" }"#);
    project.write(
        "module/Application/config/local.dist.json",
        r#"{ "db": "", "cache": "" }"#,
    );

    project.boot(AppManifest::new()).await.expect("Boot failed");

    let advisories = project.server.advisories();
    assert_eq!(advisories.len(), 1);
    assert!(advisories[0].contains("'cache'"));
}

// =============================================================================
// MODULES, CONFIG AND PLUGINS
// =============================================================================

static GREETER_SERIAL: AtomicUsize = AtomicUsize::new(0);

struct Greeter {
    serial: usize,
}

#[async_trait::async_trait]
impl Plugin for Greeter {
    async fn init(_server: &Server) -> Result<Self, BoxError> {
        Ok(Greeter {
            serial: GREETER_SERIAL.fetch_add(1, Ordering::SeqCst),
        })
    }
}

struct Mailer;

#[async_trait::async_trait]
impl Plugin for Mailer {
    async fn init(_server: &Server) -> Result<Self, BoxError> {
        Ok(Mailer)
    }
}

#[tokio::test]
async fn test_module_plugins_override_global_plugins() {
    let mut project = Project::new();
    project.seed_application();
    project.write("module/Application/plugins/Greeter.rs", "");
    project.write("module/Application/plugins/Mailer.rs", "");
    project.write("module/Blog/plugins/Greeter.rs", "");

    let bundles = Arc::new(Mutex::new(Vec::new()));
    let recorder = bundles.clone();
    project.server.on(
        ServerEvent::AfterModuleLoaded,
        listener_fn(move |_, payload| {
            if let EventPayload::Module(bundle) = payload {
                let greeter = bundle
                    .plugins
                    .get("Greeter")
                    .and_then(|p| p.clone().downcast::<Greeter>().ok())
                    .map(|g| g.serial);
                let has_mailer = bundle.plugins.contains_key("Mailer");
                recorder
                    .lock()
                    .unwrap()
                    .push((bundle.module.clone(), greeter, has_mailer));
            }
            Ok(())
        }),
    );

    project
        .boot(AppManifest::new().plugin::<Greeter>().plugin::<Mailer>())
        .await
        .expect("Boot failed");

    let bundles = bundles.lock().unwrap();
    assert_eq!(bundles.len(), 2);
    let (app_module, app_greeter, app_mailer) = &bundles[0];
    let (blog_module, blog_greeter, blog_mailer) = &bundles[1];
    assert_eq!(app_module, "Application");
    assert_eq!(blog_module, "Blog");
    assert!(app_greeter.is_some() && blog_greeter.is_some());
    assert_ne!(app_greeter, blog_greeter);
    assert!(*app_mailer && *blog_mailer);
}

#[tokio::test]
async fn test_unregistered_plugin_file_aborts_boot() {
    let mut project = Project::new();
    project.seed_application();
    project.write("module/Application/plugins/Unknown.rs", "");

    let err = project.boot(AppManifest::new()).await.unwrap_err();

    assert!(matches!(err, FoliaError::Configuration(msg) if msg.contains("Unknown")));
}

#[tokio::test]
async fn test_module_config_overrides_application_config() {
    let mut project = Project::new();
    project.seed_application();
    project.write(
        "module/Application/config/config.json",
        r#"{ "title": "Site", "debug": false }"#,
    );
    project.write("module/Blog/config/config.json", r#"{ "debug": true }"#);

    let configs = Arc::new(Mutex::new(Vec::new()));
    let recorder = configs.clone();
    project.server.on(
        ServerEvent::BeforeModuleLoaded,
        listener_fn(move |_, payload| {
            if let EventPayload::Module(bundle) = payload {
                recorder
                    .lock()
                    .unwrap()
                    .push((bundle.module.clone(), bundle.config.clone()));
            }
            Ok(())
        }),
    );

    project.boot(AppManifest::new()).await.expect("Boot failed");

    let configs = configs.lock().unwrap();
    let (_, blog) = configs
        .iter()
        .find(|(module, _)| module == "Blog")
        .expect("Blog was not loaded");
    assert_eq!(blog["title"], json!("Site"));
    assert_eq!(blog["debug"], json!(true));
}

#[tokio::test]
async fn test_boot_stages_emit_events_in_order() {
    let mut project = Project::new();
    let log = EventLog::default();
    log.attach(
        &project.server,
        &[
            ServerEvent::BeforeArchitectureVerified,
            ServerEvent::AfterArchitectureVerified,
            ServerEvent::BeforeExtensionsLoaded,
            ServerEvent::BeforeExtensionLoaded,
            ServerEvent::AfterExtensionLoaded,
            ServerEvent::AfterExtensionsLoaded,
            ServerEvent::BeforeModulesLoaded,
            ServerEvent::BeforePluginsLoaded,
            ServerEvent::AfterPluginsLoaded,
            ServerEvent::BeforeModuleLoaded,
            ServerEvent::BeforeModuleRoutesLoaded,
            ServerEvent::AfterModuleRoutesLoaded,
            ServerEvent::AfterModuleLoaded,
            ServerEvent::AfterModulesLoaded,
        ],
    );

    project
        .boot(AppManifest::new().extension(ExtensionDescriptor::noop("A")))
        .await
        .expect("Boot failed");

    assert_eq!(
        log.names(),
        vec![
            "BEFORE_ARCHITECTURE_VERIFIED",
            "AFTER_ARCHITECTURE_VERIFIED",
            "BEFORE_EXTENSIONS_LOADED",
            "BEFORE_EXTENSION_LOADED",
            "AFTER_EXTENSION_LOADED",
            "AFTER_EXTENSIONS_LOADED",
            "BEFORE_MODULES_LOADED",
            "BEFORE_PLUGINS_LOADED",
            "AFTER_PLUGINS_LOADED",
            "BEFORE_MODULE_LOADED",
            "BEFORE_MODULE_ROUTES_LOADED",
            "AFTER_MODULE_ROUTES_LOADED",
            "AFTER_MODULE_LOADED",
            "AFTER_MODULES_LOADED",
        ]
    );
}

#[tokio::test]
async fn test_failing_boot_listener_aborts_boot() {
    let mut project = Project::new();
    project.server.on(
        ServerEvent::BeforeModulesLoaded,
        listener_fn(|_, _| Err("not today".into())),
    );

    let err = project.boot(AppManifest::new()).await.unwrap_err();

    assert!(matches!(
        err,
        FoliaError::Listener {
            event: "BEFORE_MODULES_LOADED",
            ..
        }
    ));
}
