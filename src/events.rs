//! Observable capability shared by stores and getters.
//!
//! Listeners are plain closures keyed by event. The emitter clones the
//! listener list before invoking it, so a listener may register or remove
//! listeners (or call back into the application) without deadlocking.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Events emitted by stores and getters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StateEvent {
    /// About to replace the current value.
    Changing,
    /// The new value is committed and readable.
    Change,
    /// A store ran a transition for the current action (changed or not).
    DispatchHandled,
    /// Teardown is starting.
    BeforeDestroy,
    /// Teardown finished.
    Destroy,
}

/// Handle returned by [`Observable::on`], used to remove the listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

type Listener = Arc<dyn Fn(StateEvent) + Send + Sync>;

/// Publish/subscribe capability.
pub trait Observable {
    /// Subscribe to one event.
    fn on(&self, event: StateEvent, listener: Box<dyn Fn(StateEvent) + Send + Sync>) -> ListenerId;

    /// Remove one listener. Returns false if it was not registered.
    fn off(&self, id: ListenerId) -> bool;

    /// Invoke every listener registered for `event`.
    fn trigger(&self, event: StateEvent);

    /// Remove every listener.
    fn stop_listening(&self);
}

/// Lifecycle capability.
pub trait Destroyable {
    fn destroy(&self);
}

/// Listener registry backing [`Observable`].
pub struct Emitter {
    listeners: RwLock<Vec<(ListenerId, StateEvent, Listener)>>,
    next_id: AtomicU64,
}

impl Emitter {
    /// Create an emitter with no listeners.
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Emit `Changing`.
    pub fn emit_changing(&self) {
        self.trigger(StateEvent::Changing);
    }

    /// Emit `Change`.
    pub fn emit_change(&self) {
        self.trigger(StateEvent::Change);
    }

    /// Number of listeners across all events.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Observable for Emitter {
    fn on(&self, event: StateEvent, listener: Box<dyn Fn(StateEvent) + Send + Sync>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.listeners.write().push((id, event, Arc::from(listener)));
        id
    }

    fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _, _)| *lid != id);
        listeners.len() != before
    }

    fn trigger(&self, event: StateEvent) {
        let matching: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .filter(|(_, e, _)| *e == event)
            .map(|(_, _, l)| Arc::clone(l))
            .collect();

        for listener in matching {
            listener(event);
        }
    }

    fn stop_listening(&self) {
        self.listeners.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_trigger_only_matching_event() {
        let emitter = Emitter::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        emitter.on(
            StateEvent::Change,
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        emitter.emit_changing();
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        emitter.emit_change();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_off_and_stop_listening() {
        let emitter = Emitter::new();
        let a = emitter.on(StateEvent::Change, Box::new(|_| {}));
        emitter.on(StateEvent::Changing, Box::new(|_| {}));

        assert!(emitter.off(a));
        assert!(!emitter.off(a));
        assert_eq!(emitter.listener_count(), 1);

        emitter.stop_listening();
        assert_eq!(emitter.listener_count(), 0);
    }

    #[test]
    fn test_listener_may_subscribe_during_trigger() {
        let emitter = Arc::new(Emitter::new());
        let inner = Arc::clone(&emitter);
        emitter.on(
            StateEvent::Change,
            Box::new(move |_| {
                inner.on(StateEvent::Change, Box::new(|_| {}));
            }),
        );

        emitter.emit_change();
        assert_eq!(emitter.listener_count(), 2);
    }
}
