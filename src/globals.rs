//! Typed key/value store shared by the server and every request.
//!
//! Values are written during boot through [`Server::set`](crate::Server::set); requests
//! only receive a read-only [`GlobalsView`].

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

type Value = Arc<dyn Any + Send + Sync>;

#[derive(Clone, Default)]
pub struct Globals {
    values: Arc<RwLock<HashMap<String, Value>>>,
}

impl Globals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `name`, replacing any previous value.
    pub fn set<T: Any + Send + Sync>(&self, name: impl Into<String>, value: T) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), Arc::new(value));
    }

    /// `None` when `name` is absent or holds a value of another type.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        let value = self
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()?;
        value.downcast::<T>().ok()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    pub fn view(&self) -> GlobalsView {
        GlobalsView(self.clone())
    }
}

/// Read-only handle on [`Globals`].
#[derive(Clone, Default)]
pub struct GlobalsView(Globals);

impl GlobalsView {
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.0.get(name)
    }
}
