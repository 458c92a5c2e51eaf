//! # Folia
//!
//! > **A convention-driven bootstrap engine for modular web applications.**
//!
//! Folia takes a project laid out as modules on disk plus a static [`AppManifest`] and
//! turns them into a running set of routes:
//!
//! 1. **Architecture**: the expected project tree is compared with the filesystem and
//!    anything missing is created ([`architecture`]).
//! 2. **Extensions**: boot-time units load in order, each after its dependencies
//!    ([`extension`]).
//! 3. **Modules**: every module directory gets its merged config, its plugins and its
//!    routes; routes are validated and bound to the transport ([`module`], [`routing`]).
//!
//! Each request to a controller route then runs through the dispatcher's state machine
//! ([`dispatch`]), and every stage of boot and dispatch reports to the ordered
//! [`EventBus`](events::EventBus).
//!
//! ## Module Tour
//!
//! - [`server`]: the [`Server`] orchestrator and its boot sequence.
//! - [`events`]: lifecycle event names, listeners, the event bus.
//! - [`controller`] / [`response`]: what application code implements and returns.
//! - [`transport`]: the router port and an in-memory router for tests and demos.
//! - [`config`]: server layout and module configuration files.
//!
//! ## Running the Sample
//!
//! ```bash
//! RUST_LOG=info cargo run -p folia-sample
//! ```

use std::future::Future;
use std::pin::Pin;

pub mod architecture;
pub mod config;
pub mod context;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod extension;
pub mod globals;
pub mod manifest;
pub mod module;
pub mod plugin;
pub mod response;
pub mod routing;
pub mod server;
pub mod tracing;
pub mod transport;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub use architecture::{Architecture, ArchitectureEntry, Template};
pub use config::ServerConfig;
pub use context::RequestContext;
pub use controller::{Controller, ResponseSlot};
pub use error::{BoxError, FoliaError, RequestError};
pub use events::{EventPayload, ServerEvent};
pub use extension::{Extension, ExtensionDescriptor};
pub use manifest::AppManifest;
pub use plugin::Plugin;
pub use response::{Reply, ResponseProtocol};
pub use routing::RouteDescriptor;
pub use server::{BootReport, Server};
