//! # Transport Port
//!
//! The HTTP transport is an external collaborator. This module defines the narrow
//! surface the engine needs from it:
//!
//! - [`Router`]: binds controller endpoints (`register`), raw middleware (`mount`, the
//!   `use` form) and the fallback error handler.
//! - [`Request`] / [`ResponseSink`]: the live request and the response being written.
//! - [`Middleware`]: the uniform middleware type; [`Invokable`] configuration objects are
//!   converted into it at registration time.
//!
//! [`memory::MemoryRouter`] is an in-process implementation used by tests and the sample
//! application.

pub mod memory;

use crate::error::{BoxError, RequestError, TransportError};
use crate::BoxFuture;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub use memory::MemoryRouter;

/// An inbound request as delivered by the transport.
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// Upper-case HTTP method.
    pub method: String,
    pub path: String,
    /// Lower-case header names.
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn new(method: &str, path: impl Into<String>) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// True when the caller asked for a data payload rather than a document.
    pub fn expects_data(&self) -> bool {
        let xhr = self
            .header("x-requested-with")
            .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"));
        let json_first = self
            .header("accept")
            .and_then(|accept| accept.split(',').next())
            .is_some_and(|first| first.trim().starts_with("application/json"));
        xhr || json_first
    }
}

/// A response body.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Body {
    #[default]
    Empty,
    Text(String),
    Json(Value),
    Bytes(Vec<u8>),
}

/// The response as observed by the transport once handling completes.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Body,
    pub sent: bool,
}

impl Default for OutgoingResponse {
    fn default() -> Self {
        Self {
            status: 200,
            headers: BTreeMap::new(),
            body: Body::Empty,
            sent: false,
        }
    }
}

impl OutgoingResponse {
    pub fn text(&self) -> Option<&str> {
        match &self.body {
            Body::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn json(&self) -> Option<&Value> {
        match &self.body {
            Body::Json(value) => Some(value),
            _ => None,
        }
    }
}

/// Shared handle on the response being written. A response can be sent once.
#[derive(Debug, Clone, Default)]
pub struct ResponseSink {
    inner: Arc<Mutex<OutgoingResponse>>,
}

impl ResponseSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, OutgoingResponse> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self, status: u16) -> &Self {
        self.lock().status = status;
        self
    }

    pub fn set_header(&self, name: &str, value: impl Into<String>) -> &Self {
        self.lock()
            .headers
            .insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn is_sent(&self) -> bool {
        self.lock().sent
    }

    /// Finalizes the response with `body`.
    pub fn send(&self, body: Body) -> Result<(), TransportError> {
        let mut response = self.lock();
        if response.sent {
            return Err(TransportError::AlreadySent);
        }
        response.body = body;
        response.sent = true;
        Ok(())
    }

    /// Sends `status` with no body.
    pub fn send_status(&self, status: u16) -> Result<(), TransportError> {
        self.status(status);
        self.send(Body::Empty)
    }

    pub fn send_text(&self, text: impl Into<String>) -> Result<(), TransportError> {
        self.set_header("content-type", "text/plain; charset=utf-8");
        self.send(Body::Text(text.into()))
    }

    pub fn send_html(&self, html: impl Into<String>) -> Result<(), TransportError> {
        self.set_header("content-type", "text/html; charset=utf-8");
        self.send(Body::Text(html.into()))
    }

    pub fn json(&self, value: Value) -> Result<(), TransportError> {
        self.set_header("content-type", "application/json");
        self.send(Body::Json(value))
    }

    pub fn redirect(&self, url: &str) -> Result<(), TransportError> {
        self.status(302).set_header("location", url);
        self.send(Body::Empty)
    }

    /// Sends the file at `path` as an attachment.
    pub fn download(&self, path: &Path) -> Result<(), TransportError> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.set_header("content-type", "application/octet-stream")
            .set_header(
                "content-disposition",
                format!("attachment; filename=\"{name}\""),
            );
        self.send(Body::Bytes(bytes))
    }

    /// Copy of the current response state.
    pub fn snapshot(&self) -> OutgoingResponse {
        self.lock().clone()
    }
}

/// Whether request processing continues after a middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Halt,
}

/// Uniform middleware: inspects or amends the request, may answer it and halt.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, req: &mut Request, res: &ResponseSink) -> Result<Flow, BoxError>;
}

/// Adapter turning a synchronous closure into a [`Middleware`].
pub struct FnMiddleware<F>(F);

pub fn middleware_fn<F>(f: F) -> Arc<dyn Middleware>
where
    F: Fn(&mut Request, &ResponseSink) -> Result<Flow, BoxError> + Send + Sync + 'static,
{
    Arc::new(FnMiddleware(f))
}

#[async_trait]
impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&mut Request, &ResponseSink) -> Result<Flow, BoxError> + Send + Sync,
{
    async fn handle(&self, req: &mut Request, res: &ResponseSink) -> Result<Flow, BoxError> {
        (self.0)(req, res)
    }
}

/// A configuration object that produces its middleware on demand.
pub trait Invokable: Send + Sync {
    /// `None` when the object cannot produce a middleware.
    fn invoke(&self) -> Option<Arc<dyn Middleware>>;
}

/// A middleware as declared on a route, before normalization.
#[derive(Clone)]
pub enum MiddlewareEntry {
    Function(Arc<dyn Middleware>),
    Invokable(Arc<dyn Invokable>),
}

impl MiddlewareEntry {
    /// Resolves the entry into a callable middleware.
    pub fn normalize(&self) -> Option<Arc<dyn Middleware>> {
        match self {
            MiddlewareEntry::Function(middleware) => Some(middleware.clone()),
            MiddlewareEntry::Invokable(invokable) => invokable.invoke(),
        }
    }
}

impl From<Arc<dyn Middleware>> for MiddlewareEntry {
    fn from(middleware: Arc<dyn Middleware>) -> Self {
        MiddlewareEntry::Function(middleware)
    }
}

/// Controller endpoint bound by the registrar. An `Err` is forwarded to the error handler.
pub type Endpoint =
    Arc<dyn Fn(Request, ResponseSink) -> BoxFuture<'static, Result<(), RequestError>> + Send + Sync>;

/// Wraps a closure as an [`Endpoint`].
pub fn endpoint_fn<F>(f: F) -> Endpoint
where
    F: Fn(Request, ResponseSink) -> BoxFuture<'static, Result<(), RequestError>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// Last-resort handler for errors that reach the transport.
pub type ErrorHandler = Arc<dyn Fn(&RequestError, &Request, &ResponseSink) + Send + Sync>;

/// The transport's registration surface.
pub trait Router: Send + Sync {
    fn register(
        &self,
        method: &str,
        path: &str,
        middlewares: Vec<Arc<dyn Middleware>>,
        endpoint: Endpoint,
    ) -> Result<(), TransportError>;

    /// Binds raw middleware, optionally scoped to a path prefix.
    fn mount(
        &self,
        path: Option<&str>,
        middlewares: Vec<Arc<dyn Middleware>>,
        handler: Arc<dyn Middleware>,
    ) -> Result<(), TransportError>;

    fn set_error_handler(&self, handler: ErrorHandler);
}
