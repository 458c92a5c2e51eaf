//! # In-Memory Router
//!
//! A [`Router`] that keeps its layers in a list and serves requests by calling
//! [`MemoryRouter::handle`] directly, without a socket.
//!
//! Layers are matched in registration order:
//! - a mounted layer runs when its prefix matches (or it has none) and falls through on
//!   [`Flow::Continue`];
//! - a route layer runs on an exact method and path match and always ends the request.
//!
//! Unmatched requests get a 404. Errors go to the registered [`ErrorHandler`].

use super::{Endpoint, ErrorHandler, Flow, Middleware, OutgoingResponse, Request, ResponseSink, Router};
use crate::error::{RequestError, TransportError};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

#[derive(Clone)]
enum Layer {
    Mount {
        prefix: Option<String>,
        middlewares: Vec<Arc<dyn Middleware>>,
        handler: Arc<dyn Middleware>,
    },
    Route {
        method: String,
        path: String,
        middlewares: Vec<Arc<dyn Middleware>>,
        endpoint: Endpoint,
    },
}

#[derive(Default)]
pub struct MemoryRouter {
    layers: RwLock<Vec<Layer>>,
    error_handler: RwLock<Option<ErrorHandler>>,
}

impl MemoryRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(METHOD, path)` of every registered controller route, in registration order.
    pub fn routes(&self) -> Vec<(String, String)> {
        self.layers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(|layer| match layer {
                Layer::Route { method, path, .. } => Some((method.clone(), path.clone())),
                Layer::Mount { .. } => None,
            })
            .collect()
    }

    /// Number of mounted middleware layers.
    pub fn mounted(&self) -> usize {
        self.layers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|layer| matches!(layer, Layer::Mount { .. }))
            .count()
    }

    /// Serves `req` and returns what was written to the response.
    pub async fn handle(&self, mut req: Request) -> OutgoingResponse {
        let layers = self
            .layers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let res = ResponseSink::new();
        debug!(method = %req.method, path = %req.path, "Handling request");

        for layer in layers {
            match layer {
                Layer::Mount {
                    prefix,
                    middlewares,
                    handler,
                } => {
                    if !prefix_matches(prefix.as_deref(), &req.path) {
                        continue;
                    }
                    let chain = middlewares.iter().chain(std::iter::once(&handler));
                    for middleware in chain {
                        match middleware.handle(&mut req, &res).await {
                            Ok(Flow::Continue) => {}
                            Ok(Flow::Halt) => return res.snapshot(),
                            Err(e) => {
                                self.report(&RequestError::Middleware(e), &req, &res);
                                return res.snapshot();
                            }
                        }
                    }
                }
                Layer::Route {
                    method,
                    path,
                    middlewares,
                    endpoint,
                } => {
                    if !method.eq_ignore_ascii_case(&req.method) || path != req.path {
                        continue;
                    }
                    for middleware in &middlewares {
                        match middleware.handle(&mut req, &res).await {
                            Ok(Flow::Continue) => {}
                            Ok(Flow::Halt) => return res.snapshot(),
                            Err(e) => {
                                self.report(&RequestError::Middleware(e), &req, &res);
                                return res.snapshot();
                            }
                        }
                    }
                    if let Err(e) = endpoint(req.clone(), res.clone()).await {
                        self.report(&e, &req, &res);
                    }
                    return res.snapshot();
                }
            }
        }

        if !res.is_sent() {
            let message = format!("Cannot {} {}", req.method, req.path);
            let _ = res.status(404).send_text(message);
        }
        res.snapshot()
    }

    fn report(&self, err: &RequestError, req: &Request, res: &ResponseSink) {
        let handler = self
            .error_handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match handler {
            Some(handler) => handler(err, req, res),
            None => {
                warn!(error = %err, path = %req.path, "Unhandled request error");
                if !res.is_sent() {
                    let _ = res.status(500).send_text("Internal Server Error");
                }
            }
        }
    }
}

fn prefix_matches(prefix: Option<&str>, path: &str) -> bool {
    match prefix {
        None | Some("") | Some("/") => true,
        Some(prefix) => {
            let prefix = prefix.trim_end_matches('/');
            path == prefix
                || path
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('/'))
        }
    }
}

impl Router for MemoryRouter {
    fn register(
        &self,
        method: &str,
        path: &str,
        middlewares: Vec<Arc<dyn Middleware>>,
        endpoint: Endpoint,
    ) -> Result<(), TransportError> {
        let method = method.to_ascii_uppercase();
        let mut layers = self.layers.write().unwrap_or_else(PoisonError::into_inner);
        let duplicate = layers.iter().any(|layer| {
            matches!(layer, Layer::Route { method: m, path: p, .. } if *m == method && p == path)
        });
        if duplicate {
            return Err(TransportError::DuplicateRoute {
                method,
                path: path.to_string(),
            });
        }
        layers.push(Layer::Route {
            method,
            path: path.to_string(),
            middlewares,
            endpoint,
        });
        Ok(())
    }

    fn mount(
        &self,
        path: Option<&str>,
        middlewares: Vec<Arc<dyn Middleware>>,
        handler: Arc<dyn Middleware>,
    ) -> Result<(), TransportError> {
        self.layers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Layer::Mount {
                prefix: path.map(str::to_string),
                middlewares,
                handler,
            });
        Ok(())
    }

    fn set_error_handler(&self, handler: ErrorHandler) {
        *self
            .error_handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }
}
