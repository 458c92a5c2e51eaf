//! Boot-time extensions of the sample blog.
//!
//! `request-metrics` counts finished requests; `site-settings` publishes the site name and
//! requires the metrics to be in place first.

use async_trait::async_trait;
use folia::events::{listener_fn, EventPayload, ServerEvent};
use folia::{BoxError, Extension, ExtensionDescriptor, Server};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

/// Global holding the number of finished requests.
pub const REQUEST_COUNT: &str = "request_count";
/// Global holding the site name.
pub const SITE_NAME: &str = "site_name";

/// Counts and logs every request that reaches the end of dispatch.
pub struct RequestMetrics;

#[async_trait]
impl Extension for RequestMetrics {
    fn name(&self) -> &str {
        "request-metrics"
    }

    async fn init(&self, server: &mut Server) -> Result<(), BoxError> {
        let counter = Arc::new(AtomicUsize::new(0));
        server.set(REQUEST_COUNT, counter.clone());

        server.on(
            ServerEvent::OnRequestEnd,
            listener_fn(move |_, payload| {
                if let EventPayload::Request(ctx) = payload {
                    let total = counter.fetch_add(1, Ordering::Relaxed) + 1;
                    let status = ctx.res.snapshot().status;
                    info!(
                        method = %ctx.method,
                        path = %ctx.path,
                        status,
                        total,
                        "Request finished"
                    );
                }
                Ok(())
            }),
        );
        Ok(())
    }
}

/// Publishes `site_name` for plugins and controllers.
pub fn site_settings(site_name: String) -> ExtensionDescriptor {
    ExtensionDescriptor::new("site-settings")
        .depends_on("request-metrics")
        .init(move |server| {
            let site_name = site_name.clone();
            Box::pin(async move {
                server.set(SITE_NAME, site_name);
                Ok(())
            })
        })
}
