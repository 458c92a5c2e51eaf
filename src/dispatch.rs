//! # Request Dispatch
//!
//! Every controller route is served by the same state machine:
//!
//! ```text
//! START -> CONTROLLER_INIT -> ACTION -> RESPONSE_HANDLING -> END
//!              \________________\___________\_____________-> ERROR -> END
//! ```
//!
//! `END` runs exactly once per request, on success and on error. On error the failure is
//! logged and returned to the transport, which hands it to the fallback error handler;
//! the dispatcher itself never writes an error response.

use crate::config::{ConfigMap, ServerConfig};
use crate::context::RequestContext;
use crate::controller::{ControllerFactory, EarlyResponse};
use crate::error::{BoxError, RequestError};
use crate::events::{EventBus, EventPayload, ServerEvent};
use crate::globals::GlobalsView;
use crate::plugin::PluginMap;
use crate::response::Reply;
use crate::routing::RouteSummary;
use crate::transport::{endpoint_fn, Endpoint, Request, ResponseSink};
use serde_json::{json, Value};
use std::error::Error as _;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Everything a route closes over at registration time.
pub struct RouteBinding {
    pub module: String,
    pub config: Arc<ConfigMap>,
    pub routes: Arc<[RouteSummary]>,
    pub plugins: Arc<PluginMap>,
    pub method: String,
    pub path: String,
    pub controller: ControllerFactory,
    pub action: String,
    pub layout: Arc<ServerConfig>,
    pub globals: GlobalsView,
    pub events: EventBus,
}

impl RouteBinding {
    fn context(&self, req: Request, res: ResponseSink) -> RequestContext {
        let mut ctx = RequestContext::empty().with_globals(self.globals.clone());
        ctx.layout = self.layout.clone();
        ctx.module = self.module.clone();
        ctx.config = self.config.clone();
        ctx.routes = self.routes.clone();
        ctx.plugins = self.plugins.clone();
        ctx.method = self.method.clone();
        ctx.path = self.path.clone();
        ctx.controller = self.controller.name().to_string();
        ctx.action = self.action.clone();
        ctx.req = req;
        ctx.res = res;
        ctx
    }
}

/// The transport endpoint serving `binding`.
pub fn endpoint(binding: Arc<RouteBinding>) -> Endpoint {
    endpoint_fn(move |req, res| {
        let binding = binding.clone();
        Box::pin(async move { dispatch(&binding, req, res).await })
    })
}

/// Serves one request.
pub async fn dispatch(
    binding: &RouteBinding,
    req: Request,
    res: ResponseSink,
) -> Result<(), RequestError> {
    let mut ctx = binding.context(req, res);

    let outcome = run(binding, &mut ctx).await;
    if let Err(e) = &outcome {
        error!(
            module = %binding.module,
            method = %binding.method,
            path = %binding.path,
            error = %e,
            "Request failed"
        );
    }

    if let Err(e) = binding
        .events
        .emit(ServerEvent::OnRequestEnd, EventPayload::Request(&mut ctx))
        .await
    {
        warn!(path = %binding.path, error = %e, "Request end listener failed");
    }
    outcome
}

async fn emit(
    events: &EventBus,
    event: ServerEvent,
    ctx: &mut RequestContext,
) -> Result<(), RequestError> {
    events
        .emit(event, EventPayload::Request(ctx))
        .await
        .map_err(|source| RequestError::Listener {
            event: event.as_str(),
            source,
        })
}

async fn run(binding: &RouteBinding, ctx: &mut RequestContext) -> Result<(), RequestError> {
    let events = &binding.events;
    emit(events, ServerEvent::OnRequestStart, ctx).await?;

    emit(events, ServerEvent::BeforeControllerInit, ctx).await?;
    let mut controller =
        binding
            .controller
            .build(ctx)
            .map_err(|source| RequestError::ControllerInit {
                controller: binding.controller.name().to_string(),
                source,
            })?;
    emit(events, ServerEvent::AfterControllerInit, ctx).await?;

    emit(events, ServerEvent::BeforeAction, ctx).await?;
    let action_error = |source: BoxError| RequestError::Action {
        action: binding.action.clone(),
        source,
    };
    let reply = controller
        .call(&binding.action, ctx)
        .await
        .map_err(action_error)?;
    ctx.response = Some(match controller.take_early_response() {
        Some(EarlyResponse::Ready(early)) => early,
        Some(EarlyResponse::Deferred(pending)) => pending.await.map_err(action_error)?,
        None => reply,
    });
    emit(events, ServerEvent::AfterAction, ctx).await?;

    respond(binding, ctx).await
}

async fn respond(binding: &RouteBinding, ctx: &mut RequestContext) -> Result<(), RequestError> {
    match ctx.response.take() {
        None | Some(Reply::Empty) => {
            ctx.res.send_status(204)?;
        }
        Some(Reply::Body(Value::String(text))) => {
            ctx.res.send_text(text)?;
        }
        Some(Reply::Body(value)) => {
            ctx.res.json(value)?;
        }
        Some(Reply::Custom(custom)) => {
            ctx.response = Some(Reply::Custom(custom));
            emit(&binding.events, ServerEvent::BeforeResponseSent, ctx).await?;

            let Some(Reply::Custom(mut custom)) = ctx.response.take() else {
                return Err(RequestError::ResponseSend {
                    path: binding.path.clone(),
                    source: "response was replaced by a listener".into(),
                });
            };
            let sent = custom.prepare(ctx).and_then(|()| custom.send(&ctx.res));
            ctx.response = Some(Reply::Custom(custom));
            if let Err(source) = sent {
                error!(path = %binding.path, error = %source, "Error while sending response");
                return Err(RequestError::ResponseSend {
                    path: binding.path.clone(),
                    source,
                });
            }

            emit(&binding.events, ServerEvent::AfterResponseSent, ctx).await?;
        }
    }
    debug!(path = %binding.path, "Response sent");
    Ok(())
}

/// Renders a generic 500 for any error reaching the transport unhandled.
///
/// Callers expecting data get `{"error": {"name", "message"}}`; others get an HTML page
/// listing the error and its causes. Nothing is written when a response was already sent.
pub fn fallback_error_handler(err: &RequestError, req: &Request, res: &ResponseSink) {
    if res.is_sent() {
        warn!(path = %req.path, error = %err, "Error after response was sent");
        return;
    }

    res.status(500);
    let sent = if req.expects_data() {
        res.json(json!({
            "error": { "name": err.name(), "message": err.to_string() }
        }))
    } else {
        let mut lines = vec![format!("<b>{}</b>: {}", err.name(), escape(&err.to_string()))];
        let mut cause = err.source();
        while let Some(inner) = cause {
            lines.push(escape(&inner.to_string()));
            cause = inner.source();
        }
        res.send_html(format!(
            "<!DOCTYPE html><html><body><h1>Internal Server Error</h1><p>{}</p></body></html>",
            lines.join("<br>")
        ))
    };
    if let Err(e) = sent {
        warn!(path = %req.path, error = %e, "Unable to render error response");
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_renders_json_for_data_requests() {
        let err = RequestError::Action {
            action: "list".into(),
            source: BoxError::from("boom"),
        };
        let req = Request::new("GET", "/items").with_header("Accept", "application/json");
        let res = ResponseSink::new();

        fallback_error_handler(&err, &req, &res);

        let out = res.snapshot();
        assert_eq!(out.status, 500);
        assert_eq!(out.json().unwrap()["error"]["name"], "ActionError");
    }

    #[test]
    fn fallback_renders_html_with_causes() {
        let err = RequestError::Action {
            action: "list".into(),
            source: BoxError::from("<boom>"),
        };
        let res = ResponseSink::new();

        fallback_error_handler(&err, &Request::new("GET", "/items"), &res);

        let html = res.snapshot().text().unwrap().to_string();
        assert!(html.contains("ActionError"));
        assert!(html.contains("&lt;boom&gt;"));
    }

    #[test]
    fn fallback_does_not_write_twice() {
        let res = ResponseSink::new();
        res.send_text("done").unwrap();

        fallback_error_handler(
            &RequestError::Middleware("late".into()),
            &Request::new("GET", "/"),
            &res,
        );

        let out = res.snapshot();
        assert_eq!(out.status, 200);
        assert_eq!(out.text(), Some("done"));
    }
}
