//! The per-operation event threaded through the hook pipeline.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use schemapi_core::{Action, Payload, Principal};

use crate::traits::ModelHandle;

/// Mutable record of one operation invocation.
#[derive(Debug, Clone)]
pub struct Event {
    /// Collection (schema) name.
    pub name: String,
    pub action: Action,
    /// Authenticated caller.
    pub user: Principal,
    /// Operation payload: the input before the action, the result after it.
    pub data: Payload,
}

/// Shared handle to the live [`Event`] of a running operation.
///
/// Every listener and the action executor receive a clone of the same handle,
/// so a replacement of `data` is observed by every later phase. The lock is
/// only held inside the synchronous accessor calls and never across an
/// `.await`.
///
/// The handle also carries the collection's [`ModelHandle`], so listeners can
/// read or write the store themselves.
#[derive(Clone)]
pub struct EventHandle {
    inner: Arc<Mutex<Event>>,
    model: Arc<dyn ModelHandle>,
}

impl EventHandle {
    #[must_use]
    pub fn new(event: Event, model: Arc<dyn ModelHandle>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(event)),
            model,
        }
    }

    /// Storage handle of the collection the operation runs on.
    #[must_use]
    pub fn model(&self) -> Arc<dyn ModelHandle> {
        Arc::clone(&self.model)
    }

    #[must_use]
    pub fn collection(&self) -> String {
        self.inner.lock().name.clone()
    }

    #[must_use]
    pub fn action(&self) -> Action {
        self.inner.lock().action
    }

    #[must_use]
    pub fn user(&self) -> Principal {
        self.inner.lock().user.clone()
    }

    /// A copy of the current payload.
    #[must_use]
    pub fn data(&self) -> Payload {
        self.inner.lock().data.clone()
    }

    /// Replaces the payload entirely.
    pub fn set_data(&self, data: impl Into<Payload>) {
        self.inner.lock().data = data.into();
    }

    /// Runs `f` with exclusive access to the event.
    pub fn with<R>(&self, f: impl FnOnce(&mut Event) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// Moves the payload out, leaving [`Payload::Empty`] behind.
    pub(crate) fn take_data(&self) -> Payload {
        std::mem::replace(&mut self.inner.lock().data, Payload::Empty)
    }
}

impl fmt::Debug for EventHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandle")
            .field("event", &*self.inner.lock())
            .field("model", &self.model.collection())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use schemapi_core::{Document, Query};

    use super::*;
    use crate::storage::model::memory_model;

    fn handle() -> EventHandle {
        EventHandle::new(
            Event {
                name: "users".into(),
                action: Action::Create,
                user: Principal::new("u1"),
                data: Payload::Id("a".into()),
            },
            memory_model("users"),
        )
    }

    #[test]
    fn clones_share_state() {
        let a = handle();
        let b = a.clone();
        b.set_data(Document::new());
        assert_eq!(a.data(), Payload::Document(Document::new()));
    }

    #[test]
    fn with_mutates_in_place() {
        let h = handle();
        h.with(|event| event.data = Payload::Empty);
        assert_eq!(h.data(), Payload::Empty);
        assert_eq!(h.collection(), "users");
        assert_eq!(h.action(), Action::Create);
        assert_eq!(h.user().id, "u1");
    }

    #[tokio::test]
    async fn model_reaches_the_collection_store() {
        let h = handle();
        h.model().insert(Document::new()).await.unwrap();

        let clone = h.clone();
        assert_eq!(clone.model().collection(), "users");
        assert_eq!(clone.model().count(&Query::new()).await.unwrap(), 1);
    }

    #[test]
    fn take_data_leaves_empty() {
        let h = handle();
        assert_eq!(h.take_data(), Payload::Id("a".into()));
        assert_eq!(h.data(), Payload::Empty);
    }
}
