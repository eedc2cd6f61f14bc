//! Handler routing: resolves the terminal [`Handler`] for an action kind.

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;

use crate::error::BusError;
use crate::pipeline::{Handler, Input};

/// Routes action kinds (`CommandKind`, `QueryKind`) to their handlers.
///
/// Kinds without a registered handler resolve to
/// `BusError::UnknownHandler`.
pub struct HandlerRouter<K, I: Input> {
    handlers: HashMap<K, Arc<dyn Handler<I>>>,
}

impl<K, I> HandlerRouter<K, I>
where
    K: Copy + Eq + Hash + Display,
    I: Input,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers the handler for `kind`, replacing any previous one.
    pub fn register(&mut self, kind: K, handler: Arc<dyn Handler<I>>) {
        self.handlers.insert(kind, handler);
    }

    /// # Errors
    ///
    /// Returns `BusError::UnknownHandler` if nothing handles `kind`.
    pub fn get(&self, kind: K) -> Result<&dyn Handler<I>, BusError> {
        self.handlers
            .get(&kind)
            .map(AsRef::as_ref)
            .ok_or_else(|| BusError::UnknownHandler {
                action: kind.to_string(),
            })
    }

    #[must_use]
    pub fn contains(&self, kind: K) -> bool {
        self.handlers.contains_key(&kind)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<K, I> Default for HandlerRouter<K, I>
where
    K: Copy + Eq + Hash + Display,
    I: Input,
{
    fn default() -> Self {
        Self::new()
    }
}
