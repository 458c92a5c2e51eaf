#![allow(dead_code)]

use folia::error::FoliaError;
use folia::events::{EventListener, EventPayload, ServerEvent};
use folia::transport::MemoryRouter;
use folia::{AppManifest, BoxError, Server, ServerConfig};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// A scratch project root with a server and an in-memory router attached.
pub struct Project {
    pub dir: TempDir,
    pub router: Arc<MemoryRouter>,
    pub server: Server,
}

impl Project {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let router = Arc::new(MemoryRouter::new());
        let server = Server::new(ServerConfig::with_root(dir.path()), router.clone());
        Self {
            dir,
            router,
            server,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Writes `content` at `relative`, creating parent directories.
    pub fn write(&self, relative: &str, content: &str) {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.root().join(relative)).expect("Failed to read file")
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.root().join(relative).exists()
    }

    /// Creates the application module with matching local and dist config files.
    pub fn seed_application(&self) {
        self.write("module/Application/config/local.json", "{}");
        self.write("module/Application/config/local.dist.json", "{}");
    }

    pub async fn boot(&mut self, manifest: AppManifest) -> Result<(), FoliaError> {
        self.server.init(manifest).await.map(|_| ())
    }
}

/// Records the name of every event it is registered for.
#[derive(Clone, Default)]
pub struct EventLog {
    pub names: Arc<Mutex<Vec<&'static str>>>,
}

impl EventLog {
    pub fn attach(&self, server: &Server, events: &[ServerEvent]) {
        for event in events {
            server.on(*event, self.clone());
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.names.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.names().iter().filter(|n| **n == name).count()
    }
}

#[async_trait::async_trait]
impl EventListener for EventLog {
    async fn on_event(
        &self,
        event: ServerEvent,
        _payload: &mut EventPayload<'_>,
    ) -> Result<(), BoxError> {
        self.names.lock().unwrap().push(event.as_str());
        Ok(())
    }
}
