//! engine::listeners
//!
//! Lifecycle events and the registry that delivers them.
//!
//! # Delivery
//!
//! Events are delivered on whichever thread raised them: the caller's
//! thread for `AboutToStart`, the scheduler worker for terminal events.
//! Listeners that drive a UI marshal to their own thread themselves.
//!
//! Delivery works on a snapshot of the subscribers taken when the event is
//! raised, in registration order. A listener subscribed during delivery
//! first hears the next event. A listener that returns an error or panics
//! is logged and skipped; the rest still hear the event and the operation
//! is unaffected.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

use super::descriptor::{OperationDescriptor, OperationOutcome};
use super::error::OpError;
use super::scheduler::panic_message;
use super::state::RepositoryState;

/// One lifecycle event. Every `AboutToStart` is followed by exactly one
/// `Succeeded` or `Failed` for the same descriptor.
#[derive(Debug)]
pub enum OperationEvent {
    AboutToStart {
        descriptor: OperationDescriptor,
    },
    Succeeded {
        descriptor: OperationDescriptor,
        outcome: OperationOutcome,
        /// Recomputed after the operation; `None` when no repository is open.
        state: Option<RepositoryState>,
    },
    Failed {
        descriptor: OperationDescriptor,
        error: OpError,
        /// Recomputed after the failure, which may have left the
        /// repository mid-operation.
        state: Option<RepositoryState>,
    },
}

impl OperationEvent {
    pub fn descriptor(&self) -> &OperationDescriptor {
        match self {
            OperationEvent::AboutToStart { descriptor }
            | OperationEvent::Succeeded { descriptor, .. }
            | OperationEvent::Failed { descriptor, .. } => descriptor,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationEvent::AboutToStart { .. })
    }

    pub fn state(&self) -> Option<&RepositoryState> {
        match self {
            OperationEvent::AboutToStart { .. } => None,
            OperationEvent::Succeeded { state, .. } | OperationEvent::Failed { state, .. } => {
                state.as_ref()
            }
        }
    }

    /// The operation result carried by a terminal event.
    pub(crate) fn into_result(self) -> Option<Result<OperationOutcome, OpError>> {
        match self {
            OperationEvent::AboutToStart { .. } => None,
            OperationEvent::Succeeded { outcome, .. } => Some(Ok(outcome)),
            OperationEvent::Failed { error, .. } => Some(Err(error)),
        }
    }
}

/// Something that wants to hear about operations.
pub trait Listener: Send + Sync {
    fn on_event(&self, event: &OperationEvent) -> anyhow::Result<()>;
}

impl<F> Listener for F
where
    F: Fn(&OperationEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn on_event(&self, event: &OperationEvent) -> anyhow::Result<()> {
        self(event)
    }
}

/// Token returned by [`ListenerRegistry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Subscribers, in registration order.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, Arc<dyn Listener>)>>,
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Vec<(ListenerId, Arc<dyn Listener>)>> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(&self, listener: Arc<dyn Listener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries().push((id, listener));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every current subscriber.
    pub fn notify(&self, event: &OperationEvent) {
        let snapshot: Vec<(ListenerId, Arc<dyn Listener>)> = self.entries().clone();

        for (id, listener) in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(
                    listener = id.0,
                    op_id = %event.descriptor().id,
                    error = %e,
                    "listener failed"
                ),
                Err(payload) => warn!(
                    listener = id.0,
                    op_id = %event.descriptor().id,
                    panic = %panic_message(payload.as_ref()),
                    "listener panicked"
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::descriptor::OperationKind;

    fn event() -> OperationEvent {
        OperationEvent::AboutToStart {
            descriptor: OperationDescriptor::new(OperationKind::Commit),
        }
    }

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Arc<dyn Listener> {
        let log = Arc::clone(log);
        Arc::new(move |_: &OperationEvent| -> anyhow::Result<()> {
            log.lock().unwrap().push(name);
            Ok(())
        })
    }

    #[test]
    fn delivers_in_registration_order() {
        let registry = ListenerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.subscribe(recorder(&log, "first"));
        registry.subscribe(recorder(&log, "second"));
        registry.subscribe(recorder(&log, "third"));

        registry.notify(&event());
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let registry = ListenerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = registry.subscribe(recorder(&log, "first"));
        registry.subscribe(recorder(&log, "second"));

        assert!(registry.unsubscribe(first));
        assert!(!registry.unsubscribe(first));
        registry.notify(&event());
        assert_eq!(*log.lock().unwrap(), vec!["second"]);
    }

    #[test]
    fn failing_listeners_do_not_stop_delivery() {
        let registry = ListenerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.subscribe(Arc::new(|_: &OperationEvent| -> anyhow::Result<()> {
            anyhow::bail!("nope")
        }));
        registry.subscribe(Arc::new(|_: &OperationEvent| -> anyhow::Result<()> {
            panic!("listener blew up")
        }));
        registry.subscribe(recorder(&log, "survivor"));

        registry.notify(&event());
        assert_eq!(*log.lock().unwrap(), vec!["survivor"]);
    }

    #[test]
    fn subscribe_during_delivery_waits_for_next_event() {
        let registry = Arc::new(ListenerRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let reg = Arc::clone(&registry);
        let late_log = Arc::clone(&log);
        let added = Arc::new(std::sync::atomic::AtomicBool::new(false));
        registry.subscribe(Arc::new(move |_: &OperationEvent| -> anyhow::Result<()> {
            if !added.swap(true, Ordering::SeqCst) {
                reg.subscribe(recorder(&late_log, "late"));
            }
            Ok(())
        }));

        registry.notify(&event());
        assert!(log.lock().unwrap().is_empty());

        registry.notify(&event());
        assert_eq!(*log.lock().unwrap(), vec!["late"]);
    }

    #[test]
    fn terminal_event_yields_result() {
        let descriptor = OperationDescriptor::new(OperationKind::Commit);
        let failed = OperationEvent::Failed {
            descriptor,
            error: OpError::NoRepositoryOpen,
            state: None,
        };
        assert!(failed.is_terminal());
        assert!(matches!(
            failed.into_result(),
            Some(Err(OpError::NoRepositoryOpen))
        ));
        assert!(event().into_result().is_none());
    }
}
