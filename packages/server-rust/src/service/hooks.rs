//! Hook listeners and their registration tables.
//!
//! A [`HookSet`] holds the listeners of one scope: the API-wide set is global,
//! each collection owns a local one. Listeners are kept in registration order
//! per `(phase, action)` key.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use schemapi_core::{Action, HookPhase};

use super::event::EventHandle;
use super::operation::OperationError;

/// Asynchronous callback attached to a `before.<action>` or `after.<action>` event.
///
/// Returning an error aborts the operation; no later phase runs.
#[async_trait]
pub trait Listener: Send + Sync {
    async fn on_event(&self, event: EventHandle) -> Result<(), OperationError>;
}

#[async_trait]
impl<F, Fut> Listener for F
where
    F: Fn(EventHandle) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), OperationError>> + Send + 'static,
{
    async fn on_event(&self, event: EventHandle) -> Result<(), OperationError> {
        (self)(event).await
    }
}

/// Which registration table a listener lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Global,
    Local,
}

impl Scope {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::Local => "local",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type ListenerList = Vec<Arc<dyn Listener>>;

/// Ordered listener lists for one scope.
pub struct HookSet {
    scope: Scope,
    listeners: RwLock<HashMap<(HookPhase, Action), ListenerList>>,
}

impl HookSet {
    #[must_use]
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            listeners: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Appends an async closure listener for the given phase and action.
    pub fn on<F, Fut>(&self, phase: HookPhase, action: Action, listener: F)
    where
        F: Fn(EventHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), OperationError>> + Send + 'static,
    {
        self.on_shared(phase, action, Arc::new(listener));
    }

    /// Appends a listener implemented as a type.
    pub fn on_listener(&self, phase: HookPhase, action: Action, listener: impl Listener + 'static) {
        self.on_shared(phase, action, Arc::new(listener));
    }

    /// Appends an already shared listener, e.g. one registered in several places.
    pub fn on_shared(&self, phase: HookPhase, action: Action, listener: Arc<dyn Listener>) {
        self.listeners
            .write()
            .entry((phase, action))
            .or_default()
            .push(listener);
    }

    /// Snapshot of the listeners for a key, in registration order.
    #[must_use]
    pub fn listeners(&self, phase: HookPhase, action: Action) -> ListenerList {
        self.listeners
            .read()
            .get(&(phase, action))
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn count(&self, phase: HookPhase, action: Action) -> usize {
        self.listeners
            .read()
            .get(&(phase, action))
            .map_or(0, Vec::len)
    }
}

impl fmt::Debug for HookSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered: usize = self.listeners.read().values().map(Vec::len).sum();
        f.debug_struct("HookSet")
            .field("scope", &self.scope)
            .field("registered", &registered)
            .finish()
    }
}
