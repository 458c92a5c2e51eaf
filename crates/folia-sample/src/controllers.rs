//! Controllers and middleware of the sample blog.

use crate::extensions::{REQUEST_COUNT, SITE_NAME};
use crate::plugins::{NewPost, PostStore};
use async_trait::async_trait;
use folia::controller::EarlyResponse;
use folia::response::ViewResponse;
use folia::transport::{middleware_fn, Flow, Invokable, Middleware};
use folia::{BoxError, Controller, Reply, RequestContext, ResponseSlot};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Front page and health check of the application module.
pub struct HomeController;

#[async_trait]
impl Controller for HomeController {
    fn new(_ctx: &RequestContext) -> Result<Self, BoxError> {
        Ok(HomeController)
    }

    fn actions(&self) -> &'static [&'static str] {
        &["index", "health"]
    }

    async fn call(&mut self, action: &str, ctx: &mut RequestContext) -> Result<Reply, BoxError> {
        match action {
            // The page scaffolded for the application module on first boot.
            "index" => Ok(Reply::view(ViewResponse::new().file("Application/index"))),
            "health" => {
                let served = ctx
                    .global::<Arc<AtomicUsize>>(REQUEST_COUNT)
                    .map_or(0, |count| count.load(Ordering::Relaxed));
                Ok(json!({
                    "status": "ok",
                    "site": ctx.global::<String>(SITE_NAME).map(|s| s.to_string()),
                    "served": served,
                })
                .into())
            }
            other => Err(format!("HomeController has no action '{other}'").into()),
        }
    }
}

/// Posts of the blog module.
///
/// When the module config sets `"read_only": true`, every POST is answered with a
/// redirect to the listing before the action runs.
pub struct PostController {
    slot: ResponseSlot,
}

#[async_trait]
impl Controller for PostController {
    fn new(ctx: &RequestContext) -> Result<Self, BoxError> {
        let mut slot = ResponseSlot::new();
        let read_only = ctx
            .config_value("read_only")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if read_only {
            slot.on_post(&ctx.req, || Reply::redirect("/posts"));
        }
        Ok(Self { slot })
    }

    fn actions(&self) -> &'static [&'static str] {
        &["list", "latest", "create"]
    }

    async fn call(&mut self, action: &str, ctx: &mut RequestContext) -> Result<Reply, BoxError> {
        let store = ctx
            .plugin::<PostStore>()
            .ok_or("PostStore is not loaded for this module")?;

        match action {
            "list" => {
                let page_size = ctx
                    .config_value("page_size")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(20) as usize;
                let posts: Vec<_> = store.list().into_iter().take(page_size).collect();
                Ok(Reply::json(serde_json::to_value(posts)?))
            }
            "latest" => Ok(Reply::json(serde_json::to_value(store.latest()?)?)),
            "create" => {
                let new: NewPost = serde_json::from_slice(&ctx.req.body)?;
                let post = store.create(new)?;
                ctx.res.status(201);
                Ok(Reply::json(serde_json::to_value(post)?))
            }
            other => Err(format!("PostController has no action '{other}'").into()),
        }
    }

    fn take_early_response(&mut self) -> Option<EarlyResponse> {
        self.slot.take()
    }
}

/// Route middleware rejecting requests without the expected `x-api-key` header.
pub struct ApiKey {
    key: String,
}

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl Invokable for ApiKey {
    fn invoke(&self) -> Option<Arc<dyn Middleware>> {
        if self.key.is_empty() {
            return None;
        }
        let expected = self.key.clone();
        Some(middleware_fn(move |req, res| {
            if req.header("x-api-key") == Some(expected.as_str()) {
                return Ok(Flow::Continue);
            }
            res.status(401).send_text("Missing or invalid API key")?;
            Ok(Flow::Halt)
        }))
    }
}
