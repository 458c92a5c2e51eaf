//! # Controllers
//!
//! A controller is built fresh for every request from the [`RequestContext`] and runs one
//! of its named actions. Routes refer to controllers through a [`ControllerFactory`], which
//! is also used at registration time to build a probe instance and check that the route's
//! action exists.
//!
//! A controller may answer before its action result is used by setting an
//! [`EarlyResponse`], typically from its constructor through [`ResponseSlot`] helpers such
//! as [`ResponseSlot::on_get`]. An early response takes precedence over the action's return
//! value.

use crate::context::RequestContext;
use crate::error::BoxError;
use crate::response::Reply;
use crate::transport::Request;
use crate::BoxFuture;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;

#[async_trait]
pub trait Controller: Send + 'static {
    /// Builds the controller for one request.
    fn new(ctx: &RequestContext) -> Result<Self, BoxError>
    where
        Self: Sized;

    /// Names of the actions [`call`](Self::call) accepts.
    fn actions(&self) -> &'static [&'static str];

    /// Runs `action`.
    async fn call(&mut self, action: &str, ctx: &mut RequestContext) -> Result<Reply, BoxError>;

    /// Removes and returns the early response, if any.
    fn take_early_response(&mut self) -> Option<EarlyResponse> {
        None
    }
}

/// Builds controllers of one type.
#[derive(Clone, Copy)]
pub struct ControllerFactory {
    name: &'static str,
    build: fn(&RequestContext) -> Result<Box<dyn Controller>, BoxError>,
}

fn build<C: Controller>(ctx: &RequestContext) -> Result<Box<dyn Controller>, BoxError> {
    Ok(Box::new(C::new(ctx)?))
}

impl ControllerFactory {
    pub fn of<C: Controller>() -> Self {
        Self {
            name: short_type_name::<C>(),
            build: build::<C>,
        }
    }

    /// Short type name of the controller, e.g. `PostController`.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn build(&self, ctx: &RequestContext) -> Result<Box<dyn Controller>, BoxError> {
        (self.build)(ctx)
    }
}

impl fmt::Debug for ControllerFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ControllerFactory").field(&self.name).finish()
    }
}

pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// A response set by the controller before its action result is used.
pub enum EarlyResponse {
    Ready(Reply),
    Deferred(BoxFuture<'static, Result<Reply, BoxError>>),
}

impl fmt::Debug for EarlyResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EarlyResponse::Ready(reply) => f.debug_tuple("Ready").field(reply).finish(),
            EarlyResponse::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// Holder for an [`EarlyResponse`], embedded in controllers that use one.
#[derive(Default)]
pub struct ResponseSlot {
    early: Option<EarlyResponse>,
}

impl ResponseSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the early response unless one is already set.
    pub fn set(&mut self, reply: Reply) {
        if self.early.is_none() {
            self.early = Some(EarlyResponse::Ready(reply));
        }
    }

    /// Sets the early response to `f()` when `req` is a GET. The first response set wins.
    pub fn on_get(&mut self, req: &Request, f: impl FnOnce() -> Reply) {
        self.on_method("GET", req, f);
    }

    /// Sets the early response to `f()` when `req` is a POST.
    pub fn on_post(&mut self, req: &Request, f: impl FnOnce() -> Reply) {
        self.on_method("POST", req, f);
    }

    /// Like [`on_get`](Self::on_get), with a response computed asynchronously.
    pub fn on_get_async<F>(&mut self, req: &Request, fut: F)
    where
        F: Future<Output = Result<Reply, BoxError>> + Send + 'static,
    {
        if self.early.is_none() && req.method.eq_ignore_ascii_case("GET") {
            self.early = Some(EarlyResponse::Deferred(Box::pin(fut)));
        }
    }

    fn on_method(&mut self, method: &str, req: &Request, f: impl FnOnce() -> Reply) {
        if self.early.is_none() && req.method.eq_ignore_ascii_case(method) {
            self.early = Some(EarlyResponse::Ready(f()));
        }
    }

    pub fn is_set(&self) -> bool {
        self.early.is_some()
    }

    pub fn take(&mut self) -> Option<EarlyResponse> {
        self.early.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Listing;

    #[async_trait]
    impl Controller for Listing {
        fn new(_ctx: &RequestContext) -> Result<Self, BoxError> {
            Ok(Listing)
        }

        fn actions(&self) -> &'static [&'static str] {
            &["list"]
        }

        async fn call(&mut self, _action: &str, _ctx: &mut RequestContext) -> Result<Reply, BoxError> {
            Ok(Reply::Empty)
        }
    }

    #[test]
    fn factory_reports_short_name_and_builds() {
        let factory = ControllerFactory::of::<Listing>();
        assert_eq!(factory.name(), "Listing");

        let controller = factory.build(&RequestContext::empty()).unwrap();
        assert_eq!(controller.actions(), &["list"]);
    }

    #[test]
    fn slot_only_fires_for_matching_method() {
        let mut slot = ResponseSlot::new();
        slot.on_post(&Request::new("GET", "/"), || Reply::from("posted"));
        assert!(!slot.is_set());

        slot.on_get(&Request::new("get", "/"), || Reply::from("fetched"));
        assert!(matches!(slot.take(), Some(EarlyResponse::Ready(Reply::Body(_)))));
        assert!(slot.take().is_none());
    }

    #[test]
    fn slot_keeps_the_first_response() {
        let req = Request::new("GET", "/");
        let mut slot = ResponseSlot::new();
        slot.on_get(&req, || Reply::from("first"));
        slot.on_get(&req, || Reply::from("second"));
        slot.set(Reply::from("third"));
        slot.on_get_async(&req, async { Ok::<_, BoxError>(Reply::from("fourth")) });

        match slot.take() {
            Some(EarlyResponse::Ready(Reply::Body(body))) => assert_eq!(body, "first"),
            other => panic!("Expected the first reply, got {other:?}"),
        }
    }
}
