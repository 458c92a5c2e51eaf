//! # Lifecycle Events
//!
//! The [`EventBus`] is the ordered publish/subscribe hub every boot stage and every
//! dispatched request reports to.
//!
//! ## Ordering
//!
//! - Listeners for one event run strictly in registration order.
//! - Each listener is awaited to completion before the next one starts.
//! - All listeners receive the same mutable [`EventPayload`], so a listener sees the
//!   mutations made by the listeners before it.
//! - The first failing listener aborts the remaining ones for that emission.
//!
//! Listeners are registered during boot and only read afterwards; `emit` snapshots the
//! listener list before awaiting, so no lock is held across a suspension point.

use crate::architecture::{ArchitecturePlan, ResolvedEntry};
use crate::context::RequestContext;
use crate::error::{BoxError, FoliaError};
use crate::module::ModuleBundle;
use crate::routing::RouteDescriptor;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Fixed lifecycle checkpoints, in the order they occur during boot and requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerEvent {
    BeforeArchitectureVerified,
    OnArchitectureEntryVerificationStart,
    OnArchitectureEntryVerificationEnd,
    AfterArchitectureVerified,
    BeforeExtensionsLoaded,
    BeforeExtensionLoaded,
    AfterExtensionLoaded,
    AfterExtensionsLoaded,
    BeforeModulesLoaded,
    BeforeModuleLoaded,
    AfterModuleLoaded,
    AfterModulesLoaded,
    BeforePluginsLoaded,
    AfterPluginsLoaded,
    BeforeModuleRoutesLoaded,
    BeforeRouteLoaded,
    AfterRouteLoaded,
    AfterModuleRoutesLoaded,
    OnRequestStart,
    BeforeControllerInit,
    AfterControllerInit,
    BeforeAction,
    AfterAction,
    BeforeResponseSent,
    AfterResponseSent,
    OnRequestEnd,
}

impl ServerEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerEvent::BeforeArchitectureVerified => "BEFORE_ARCHITECTURE_VERIFIED",
            ServerEvent::OnArchitectureEntryVerificationStart => {
                "ON_ARCHITECTURE_ENTRY_VERIFICATION_START"
            }
            ServerEvent::OnArchitectureEntryVerificationEnd => {
                "ON_ARCHITECTURE_ENTRY_VERIFICATION_END"
            }
            ServerEvent::AfterArchitectureVerified => "AFTER_ARCHITECTURE_VERIFIED",
            ServerEvent::BeforeExtensionsLoaded => "BEFORE_EXTENSIONS_LOADED",
            ServerEvent::BeforeExtensionLoaded => "BEFORE_EXTENSION_LOADED",
            ServerEvent::AfterExtensionLoaded => "AFTER_EXTENSION_LOADED",
            ServerEvent::AfterExtensionsLoaded => "AFTER_EXTENSIONS_LOADED",
            ServerEvent::BeforeModulesLoaded => "BEFORE_MODULES_LOADED",
            ServerEvent::BeforeModuleLoaded => "BEFORE_MODULE_LOADED",
            ServerEvent::AfterModuleLoaded => "AFTER_MODULE_LOADED",
            ServerEvent::AfterModulesLoaded => "AFTER_MODULES_LOADED",
            ServerEvent::BeforePluginsLoaded => "BEFORE_PLUGINS_LOADED",
            ServerEvent::AfterPluginsLoaded => "AFTER_PLUGINS_LOADED",
            ServerEvent::BeforeModuleRoutesLoaded => "BEFORE_MODULE_ROUTES_LOADED",
            ServerEvent::BeforeRouteLoaded => "BEFORE_ROUTE_LOADED",
            ServerEvent::AfterRouteLoaded => "AFTER_ROUTE_LOADED",
            ServerEvent::AfterModuleRoutesLoaded => "AFTER_MODULE_ROUTES_LOADED",
            ServerEvent::OnRequestStart => "ON_REQUEST_START",
            ServerEvent::BeforeControllerInit => "BEFORE_CONTROLLER_INIT",
            ServerEvent::AfterControllerInit => "AFTER_CONTROLLER_INIT",
            ServerEvent::BeforeAction => "BEFORE_ACTION",
            ServerEvent::AfterAction => "AFTER_ACTION",
            ServerEvent::BeforeResponseSent => "BEFORE_RESPONSE_SENT",
            ServerEvent::AfterResponseSent => "AFTER_RESPONSE_SENT",
            ServerEvent::OnRequestEnd => "ON_REQUEST_END",
        }
    }
}

impl std::fmt::Display for ServerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The data handed to listeners. Boot stages lend their working state mutably.
pub enum EventPayload<'a> {
    Architecture(&'a mut ArchitecturePlan),
    ArchitectureEntry(&'a mut ResolvedEntry),
    Extensions(&'a [String]),
    Extension(&'a str),
    Modules(&'a [String]),
    Module(&'a mut ModuleBundle),
    Plugins { module: &'a str, names: &'a [String] },
    Route(&'a mut RouteDescriptor),
    Request(&'a mut RequestContext),
}

/// A callback registered for one [`ServerEvent`].
#[async_trait]
pub trait EventListener: Send + Sync {
    async fn on_event(
        &self,
        event: ServerEvent,
        payload: &mut EventPayload<'_>,
    ) -> Result<(), BoxError>;
}

/// Adapter turning a synchronous closure into an [`EventListener`].
pub struct FnListener<F>(F);

/// Wraps a closure as a listener.
///
/// ```rust
/// use folia::events::{listener_fn, EventBus, EventPayload, ServerEvent};
///
/// let bus = EventBus::new();
/// bus.on(
///     ServerEvent::OnRequestEnd,
///     listener_fn(|_event, _payload: &mut EventPayload<'_>| Ok(())),
/// );
/// assert_eq!(bus.listener_count(ServerEvent::OnRequestEnd), 1);
/// ```
pub fn listener_fn<F>(f: F) -> FnListener<F>
where
    F: Fn(ServerEvent, &mut EventPayload<'_>) -> Result<(), BoxError> + Send + Sync,
{
    FnListener(f)
}

#[async_trait]
impl<F> EventListener for FnListener<F>
where
    F: Fn(ServerEvent, &mut EventPayload<'_>) -> Result<(), BoxError> + Send + Sync,
{
    async fn on_event(
        &self,
        event: ServerEvent,
        payload: &mut EventPayload<'_>,
    ) -> Result<(), BoxError> {
        (self.0)(event, payload)
    }
}

type ListenerList = Vec<Arc<dyn EventListener>>;

/// Append-only registry of listeners, cheap to clone and shared with every route.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<RwLock<HashMap<ServerEvent, ListenerList>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `listener` to the list for `event`. Duplicates are not detected.
    pub fn on(&self, event: ServerEvent, listener: impl EventListener + 'static) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event)
            .or_default()
            .push(Arc::new(listener));
    }

    pub fn listener_count(&self, event: ServerEvent) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event)
            .map_or(0, Vec::len)
    }

    fn snapshot(&self, event: ServerEvent) -> Option<ListenerList> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event)
            .cloned()
    }

    /// Runs every listener for `event` in registration order, stopping at the first error.
    pub async fn emit(
        &self,
        event: ServerEvent,
        mut payload: EventPayload<'_>,
    ) -> Result<(), BoxError> {
        let Some(snapshot) = self.snapshot(event) else {
            return Ok(());
        };

        debug!(event = event.as_str(), listeners = snapshot.len(), "Emit");
        for listener in snapshot {
            listener.on_event(event, &mut payload).await?;
        }
        Ok(())
    }

    /// Boot-time variant of [`emit`](Self::emit): a failing listener aborts startup.
    pub(crate) async fn emit_boot(
        &self,
        event: ServerEvent,
        payload: EventPayload<'_>,
    ) -> Result<(), FoliaError> {
        self.emit(event, payload)
            .await
            .map_err(|source| FoliaError::Listener {
                event: event.as_str(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        tag: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl EventListener for Recorder {
        async fn on_event(
            &self,
            _event: ServerEvent,
            payload: &mut EventPayload<'_>,
        ) -> Result<(), BoxError> {
            self.log.lock().unwrap().push(format!("{}:start", self.tag));
            tokio::task::yield_now().await;
            if let EventPayload::Extension(name) = payload {
                self.log.lock().unwrap().push(format!("{}:{}", self.tag, name));
            }
            self.log.lock().unwrap().push(format!("{}:end", self.tag));
            Ok(())
        }
    }

    #[tokio::test]
    async fn listeners_run_one_after_another() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for tag in ["f1", "f2"] {
            bus.on(
                ServerEvent::AfterExtensionLoaded,
                Recorder {
                    tag,
                    log: log.clone(),
                },
            );
        }

        bus.emit(ServerEvent::AfterExtensionLoaded, EventPayload::Extension("A"))
            .await
            .unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["f1:start", "f1:A", "f1:end", "f2:start", "f2:A", "f2:end"]
        );
    }

    #[tokio::test]
    async fn failing_listener_stops_the_emission() {
        let bus = EventBus::new();
        let calls = Arc::new(Mutex::new(0));
        bus.on(
            ServerEvent::BeforeModulesLoaded,
            listener_fn(|_, _| Err("stop".into())),
        );
        let counter = calls.clone();
        bus.on(
            ServerEvent::BeforeModulesLoaded,
            listener_fn(move |_, _| {
                *counter.lock().unwrap() += 1;
                Ok(())
            }),
        );

        let result = bus
            .emit(ServerEvent::BeforeModulesLoaded, EventPayload::Modules(&[]))
            .await;

        assert!(result.is_err());
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn emit_without_listeners_is_a_no_op() {
        let bus = EventBus::new();
        bus.emit(ServerEvent::OnRequestEnd, EventPayload::Modules(&[]))
            .await
            .unwrap();
        assert_eq!(bus.listener_count(ServerEvent::OnRequestEnd), 0);
    }
}
