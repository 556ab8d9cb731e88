//! The hook pipeline wrapping every collection operation.
//!
//! One run goes through five strictly sequential phases:
//!
//! 1. `before.<action>` at global scope
//! 2. `before.<action>` at local (collection) scope
//! 3. the action itself
//! 4. `after.<action>` at local scope
//! 5. `after.<action>` at global scope
//!
//! Within an emission step all listeners are polled concurrently on the
//! calling task and joined. The first error aborts the run and no later phase
//! is entered.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::try_join_all;
use schemapi_core::{Action, HookPhase, Payload, Principal};
use tracing::{debug, info_span, Instrument};

use super::event::{Event, EventHandle};
use super::hooks::HookSet;
use super::operation::OperationError;
use crate::traits::ModelHandle;

/// Runs actions through the global and local hook scopes.
///
/// Every event it creates carries `model`, the store of the collection the
/// pipeline belongs to.
#[derive(Clone)]
pub struct Pipeline {
    global: Arc<HookSet>,
    local: Arc<HookSet>,
    model: Arc<dyn ModelHandle>,
    listener_timeout: Option<Duration>,
}

impl Pipeline {
    #[must_use]
    pub fn new(
        global: Arc<HookSet>,
        local: Arc<HookSet>,
        model: Arc<dyn ModelHandle>,
        listener_timeout: Option<Duration>,
    ) -> Self {
        Self {
            global,
            local,
            model,
            listener_timeout,
        }
    }

    /// Runs `execute` wrapped in the hook phases and returns the final payload.
    ///
    /// `execute` receives the live event and is expected to replace its data
    /// with the action result. If `input` carried a correlation token it is
    /// re-attached to the data right after the action.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::IdentityMissing`] without running any phase
    /// when `user` is `None`, otherwise the first error raised by a listener,
    /// the action, or an emission timeout.
    pub async fn run<F, Fut>(
        &self,
        collection: &str,
        action: Action,
        input: Payload,
        user: Option<&Principal>,
        execute: F,
    ) -> Result<Payload, OperationError>
    where
        F: FnOnce(EventHandle) -> Fut,
        Fut: Future<Output = Result<(), OperationError>>,
    {
        let span = info_span!(
            "operation",
            collection = collection,
            action = action.as_str(),
            user = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        async move {
            let start = Instant::now();
            let result = self.run_phases(collection, action, input, user, execute).await;

            #[allow(clippy::cast_possible_truncation)]
            let duration_ms = start.elapsed().as_millis() as u64;
            let outcome = if result.is_ok() { "ok" } else { "error" };
            tracing::Span::current().record("duration_ms", duration_ms);
            tracing::Span::current().record("outcome", outcome);
            debug!(duration_ms, outcome, "operation complete");

            result
        }
        .instrument(span)
        .await
    }

    async fn run_phases<F, Fut>(
        &self,
        collection: &str,
        action: Action,
        input: Payload,
        user: Option<&Principal>,
        execute: F,
    ) -> Result<Payload, OperationError>
    where
        F: FnOnce(EventHandle) -> Fut,
        Fut: Future<Output = Result<(), OperationError>>,
    {
        let Some(user) = user else {
            return Err(OperationError::IdentityMissing {
                collection: collection.to_string(),
                action,
            });
        };
        tracing::Span::current().record("user", user.id.as_str());

        let correlation = input.correlation_token();
        let event = EventHandle::new(
            Event {
                name: collection.to_string(),
                action,
                user: user.clone(),
                data: input,
            },
            Arc::clone(&self.model),
        );

        self.emit(&self.global, HookPhase::Before, action, &event).await?;
        self.emit(&self.local, HookPhase::Before, action, &event).await?;

        execute(event.clone()).await?;
        if let Some(token) = correlation {
            event.with(|e| e.data.attach_correlation(token));
        }

        self.emit(&self.local, HookPhase::After, action, &event).await?;
        self.emit(&self.global, HookPhase::After, action, &event).await?;

        Ok(event.take_data())
    }

    /// One emission step. Returns immediately when nobody listens.
    async fn emit(
        &self,
        hooks: &HookSet,
        phase: HookPhase,
        action: Action,
        event: &EventHandle,
    ) -> Result<(), OperationError> {
        let listeners = hooks.listeners(phase, action);
        if listeners.is_empty() {
            return Ok(());
        }

        debug!(
            scope = %hooks.scope(),
            event = %phase.event_name(action),
            listeners = listeners.len(),
            "emitting hook"
        );

        let fanout = try_join_all(listeners.iter().map(|l| l.on_event(event.clone())));
        let joined = match self.listener_timeout {
            Some(limit) => tokio::time::timeout(limit, fanout).await.map_err(|_elapsed| {
                #[allow(clippy::cast_possible_truncation)]
                let timeout_ms = limit.as_millis() as u64;
                OperationError::ListenerTimeout {
                    event: phase.event_name(action),
                    timeout_ms,
                }
            })?,
            None => fanout.await,
        };
        joined.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use parking_lot::Mutex;
    use schemapi_core::{Document, CORRELATION_FIELD};
    use serde_json::json;

    use super::*;
    use crate::service::hooks::Scope;
    use crate::storage::model::memory_model;

    struct Fixture {
        global: Arc<HookSet>,
        local: Arc<HookSet>,
        pipeline: Pipeline,
    }

    fn fixture(timeout: Option<Duration>) -> Fixture {
        let global = Arc::new(HookSet::new(Scope::Global));
        let local = Arc::new(HookSet::new(Scope::Local));
        let pipeline = Pipeline::new(
            Arc::clone(&global),
            Arc::clone(&local),
            memory_model("users"),
            timeout,
        );
        Fixture {
            global,
            local,
            pipeline,
        }
    }

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn user() -> Principal {
        Principal::new("tester")
    }

    fn record(log: &Arc<Mutex<Vec<String>>>, hooks: &HookSet, phase: HookPhase, tag: &str) {
        let log = Arc::clone(log);
        let tag = tag.to_string();
        hooks.on(phase, Action::Create, move |_e: EventHandle| {
            let log = Arc::clone(&log);
            let tag = tag.clone();
            async move {
                log.lock().push(tag);
                Ok(())
            }
        });
    }

    #[tokio::test]
    async fn phases_run_in_order() {
        let f = fixture(None);
        let log = Arc::new(Mutex::new(Vec::new()));
        record(&log, &f.local, HookPhase::After, "after-local");
        record(&log, &f.global, HookPhase::After, "after-global");
        record(&log, &f.local, HookPhase::Before, "before-local");
        record(&log, &f.global, HookPhase::Before, "before-global");

        let action_log = Arc::clone(&log);
        f.pipeline
            .run("users", Action::Create, Payload::Empty, Some(&user()), |_e| async move {
                action_log.lock().push("action".to_string());
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(
            *log.lock(),
            ["before-global", "before-local", "action", "after-local", "after-global"]
        );
    }

    #[tokio::test]
    async fn missing_user_runs_nothing() {
        let f = fixture(None);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        f.global.on(HookPhase::Before, Action::Create, move |_e: EventHandle| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        });

        let action_calls = Arc::clone(&calls);
        let err = f
            .pipeline
            .run("users", Action::Create, Payload::Empty, None, |_e| async move {
                action_calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap_err();

        assert_eq!(
            err,
            OperationError::IdentityMissing {
                collection: "users".into(),
                action: Action::Create
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failing_before_listener_prevents_action_and_after_phases() {
        let f = fixture(None);
        f.local.on(HookPhase::Before, Action::Create, |_e: EventHandle| async {
            Err(OperationError::rejected("not allowed"))
        });
        let after_calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&after_calls);
        f.global.on(HookPhase::After, Action::Create, move |_e: EventHandle| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        });

        let ran = Arc::new(AtomicU32::new(0));
        let ran_in_action = Arc::clone(&ran);
        let err = f
            .pipeline
            .run("users", Action::Create, Payload::Empty, Some(&user()), |_e| async move {
                ran_in_action.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap_err();

        assert_eq!(err, OperationError::Rejected("not allowed".into()));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(after_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failing_action_skips_after_phases() {
        let f = fixture(None);
        let after_calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&after_calls);
        f.local.on(HookPhase::After, Action::Create, move |_e: EventHandle| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        });

        let result = f
            .pipeline
            .run("users", Action::Create, Payload::Empty, Some(&user()), |_e| async {
                Err(OperationError::ClearDisabled)
            })
            .await;

        assert_eq!(result, Err(OperationError::ClearDisabled));
        assert_eq!(after_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn after_listener_mutations_reach_result() {
        let f = fixture(None);
        f.local.on(HookPhase::After, Action::Create, |e: EventHandle| async move {
            e.with(|ev| {
                if let Payload::Document(d) = &mut ev.data {
                    d.insert("audited".into(), json!(true));
                }
            });
            Ok(())
        });
        f.global.on(HookPhase::After, Action::Create, |e: EventHandle| async move {
            let seen = e.data();
            assert_eq!(seen.as_document().unwrap()["audited"], json!(true));
            Ok(())
        });

        let out = f
            .pipeline
            .run("users", Action::Create, Payload::Empty, Some(&user()), |e| async move {
                e.set_data(doc(json!({"_id": "1"})));
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(out, Payload::Document(doc(json!({"_id": "1", "audited": true}))));
    }

    #[tokio::test]
    async fn correlation_token_survives_replacement() {
        let f = fixture(None);
        f.global.on(HookPhase::Before, Action::Create, |e: EventHandle| async move {
            e.set_data(doc(json!({"name": "replaced"})));
            Ok(())
        });

        let input = Payload::Document(doc(json!({"uuid": "abc", "name": "Alice"})));
        let out = f
            .pipeline
            .run("users", Action::Create, input, Some(&user()), |e| async move {
                let received = e.data();
                assert!(received.as_document().unwrap().get(CORRELATION_FIELD).is_none());
                e.set_data(doc(json!({"_id": "1", "name": "replaced"})));
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(out.as_document().unwrap()[CORRELATION_FIELD], json!("abc"));
    }

    #[tokio::test]
    async fn correlation_token_overwrites_action_token() {
        let f = fixture(None);
        let input = Payload::Document(doc(json!({"uuid": "client"})));
        let out = f
            .pipeline
            .run("users", Action::Create, input, Some(&user()), |e| async move {
                e.set_data(doc(json!({"uuid": "server"})));
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(out.as_document().unwrap()[CORRELATION_FIELD], json!("client"));
    }

    #[tokio::test]
    async fn listeners_in_one_phase_run_concurrently() {
        let f = fixture(Some(Duration::from_secs(5)));
        let barrier = Arc::new(tokio::sync::Barrier::new(2));
        for _ in 0..2 {
            let barrier = Arc::clone(&barrier);
            f.local.on(HookPhase::Before, Action::Create, move |_e: EventHandle| {
                let barrier = Arc::clone(&barrier);
                async move {
                    barrier.wait().await;
                    Ok(())
                }
            });
        }

        let result = f
            .pipeline
            .run("users", Action::Create, Payload::Empty, Some(&user()), |_e| async { Ok(()) })
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn later_phase_waits_for_slow_listener() {
        let f = fixture(None);
        let done = Arc::new(AtomicU32::new(0));
        let flag = Arc::clone(&done);
        f.global.on(HookPhase::Before, Action::Create, move |_e: EventHandle| {
            let flag = Arc::clone(&flag);
            async move {
                tokio::task::yield_now().await;
                tokio::time::sleep(Duration::from_millis(5)).await;
                flag.store(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let observed = Arc::clone(&done);
        f.pipeline
            .run("users", Action::Create, Payload::Empty, Some(&user()), |_e| async move {
                assert_eq!(observed.load(Ordering::SeqCst), 1);
                Ok(())
            })
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn no_listeners_means_no_delay() {
        let f = fixture(Some(Duration::from_secs(30)));
        let start = tokio::time::Instant::now();
        f.pipeline
            .run("users", Action::Get, Payload::Id("1".into()), Some(&user()), |_e| async {
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_listener_times_out() {
        let f = fixture(Some(Duration::from_millis(100)));
        f.local.on(HookPhase::After, Action::Create, |_e: EventHandle| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });

        let err = f
            .pipeline
            .run("users", Action::Create, Payload::Empty, Some(&user()), |_e| async { Ok(()) })
            .await
            .unwrap_err();

        assert_eq!(
            err,
            OperationError::ListenerTimeout {
                event: "after.create".into(),
                timeout_ms: 100
            }
        );
    }

    #[tokio::test]
    async fn after_failure_is_reported_even_though_action_ran() {
        let f = fixture(None);
        f.global.on(HookPhase::After, Action::Create, |_e: EventHandle| async {
            Err(OperationError::rejected("audit failed"))
        });
        let result = f
            .pipeline
            .run("users", Action::Create, Payload::Empty, Some(&user()), |e| async move {
                e.set_data(Document::new());
                Ok(())
            })
            .await;
        assert_eq!(result, Err(OperationError::Rejected("audit failed".into())));
    }
}
