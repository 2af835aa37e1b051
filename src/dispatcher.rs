//! Action dispatcher.
//!
//! Broadcasts each action to every registered callback in registration order.
//! A callback may call [`Dispatcher::wait_for`] to force other callbacks to run
//! first within the same cycle, which is how one store reads another store's
//! already-updated state. Dispatching from inside a dispatch is rejected.
//!
//! Cycle bookkeeping lives behind a mutex that is never held while a callback
//! runs, so `wait_for` can recurse through the dispatcher freely.

use crate::error::{FluxError, Result};
use crate::types::{Action, DispatchToken};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A registered dispatch callback.
pub type Callback = Arc<dyn Fn(&Action) -> Result<()> + Send + Sync>;

/// Per-cycle bookkeeping.
#[derive(Default)]
struct Cycle {
    dispatching: bool,
    pending: HashSet<DispatchToken>,
    handled: HashSet<DispatchToken>,
    action: Option<Arc<Action>>,
}

/// Broadcasts actions to registered callbacks.
pub struct Dispatcher {
    callbacks: RwLock<IndexMap<DispatchToken, Callback>>,
    cycle: Mutex<Cycle>,
    next_token: AtomicU64,
}

impl Dispatcher {
    /// Create a dispatcher with no callbacks.
    pub fn new() -> Self {
        Self {
            callbacks: RwLock::new(IndexMap::new()),
            cycle: Mutex::new(Cycle::default()),
            next_token: AtomicU64::new(1),
        }
    }

    /// Register a callback to be invoked with every dispatched action.
    pub fn register(&self, callback: Callback) -> DispatchToken {
        let token = DispatchToken(self.next_token.fetch_add(1, Ordering::SeqCst));
        self.callbacks.write().insert(token, callback);
        token
    }

    /// Remove a callback. Returns false if the token was not registered.
    pub fn unregister(&self, token: DispatchToken) -> bool {
        self.callbacks.write().shift_remove(&token).is_some()
    }

    /// Whether `token` maps to a live callback.
    pub fn is_registered(&self, token: DispatchToken) -> bool {
        self.callbacks.read().contains_key(&token)
    }

    /// Number of registered callbacks.
    pub fn callback_count(&self) -> usize {
        self.callbacks.read().len()
    }

    /// Whether a dispatch cycle is in flight.
    pub fn is_dispatching(&self) -> bool {
        self.cycle.lock().dispatching
    }

    /// Dispatch an action to every registered callback.
    ///
    /// The first callback error aborts the cycle and is returned.
    pub fn dispatch(&self, action: Action) -> Result<()> {
        self.start_dispatching(action)?;

        let tokens: Vec<DispatchToken> = self.callbacks.read().keys().copied().collect();
        let result = tokens.into_iter().try_for_each(|token| {
            if self.cycle.lock().pending.contains(&token) {
                return Ok(());
            }
            self.invoke_callback(token)
        });

        self.stop_dispatching();
        result
    }

    /// Run the callbacks behind `tokens` before continuing the current one.
    ///
    /// Only valid while dispatching. Waiting on a callback that is already
    /// running further up the stack is a circular wait and fails.
    pub fn wait_for(&self, tokens: &[DispatchToken]) -> Result<()> {
        if !self.is_dispatching() {
            return Err(FluxError::WaitForOutsideDispatch);
        }

        for &token in tokens {
            {
                let cycle = self.cycle.lock();
                if cycle.pending.contains(&token) {
                    if cycle.handled.contains(&token) {
                        continue;
                    }
                    return Err(FluxError::CircularWait(token));
                }
            }

            if !self.is_registered(token) {
                return Err(FluxError::UnknownDispatchToken(token));
            }

            self.invoke_callback(token)?;
        }

        Ok(())
    }

    fn invoke_callback(&self, token: DispatchToken) -> Result<()> {
        let action = {
            let mut cycle = self.cycle.lock();
            cycle.pending.insert(token);
            cycle.action.clone()
        };

        // Unregistered mid-cycle: nothing to run.
        let callback = self.callbacks.read().get(&token).cloned();
        if let (Some(callback), Some(action)) = (callback, action) {
            callback(&action)?;
        }

        self.cycle.lock().handled.insert(token);
        Ok(())
    }

    fn start_dispatching(&self, action: Action) -> Result<()> {
        let mut cycle = self.cycle.lock();
        if cycle.dispatching {
            return Err(FluxError::DispatchInProgress);
        }

        cycle.pending.clear();
        cycle.handled.clear();
        cycle.action = Some(Arc::new(action));
        cycle.dispatching = true;
        Ok(())
    }

    fn stop_dispatching(&self) {
        let mut cycle = self.cycle.lock();
        cycle.action = None;
        cycle.dispatching = false;
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Callback {
        let log = Arc::clone(log);
        Arc::new(move |_: &Action| {
            log.lock().push(name);
            Ok(())
        })
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let dispatcher = Dispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        dispatcher.register(recorder(&log, "a"));
        dispatcher.register(recorder(&log, "b"));
        dispatcher.register(recorder(&log, "c"));

        dispatcher.dispatch(Action::bare("go")).unwrap();
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
        assert!(!dispatcher.is_dispatching());
    }

    #[test]
    fn test_wait_for_runs_target_first_and_once() {
        let dispatcher = Arc::new(Dispatcher::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        // Registered first, but waits for the store registered after it.
        let waiting_log = Arc::clone(&log);
        let inner = Arc::clone(&dispatcher);
        let target = Arc::new(Mutex::new(None));
        let target_ref = Arc::clone(&target);
        dispatcher.register(Arc::new(move |_: &Action| {
            let token = (*target_ref.lock()).expect("target registered");
            inner.wait_for(&[token])?;
            waiting_log.lock().push("waiter");
            Ok(())
        }));
        let token = dispatcher.register(recorder(&log, "target"));
        *target.lock() = Some(token);

        dispatcher.dispatch(Action::new("go", json!(1))).unwrap();
        assert_eq!(*log.lock(), vec!["target", "waiter"]);
    }

    #[test]
    fn test_wait_for_outside_dispatch() {
        let dispatcher = Dispatcher::new();
        let token = dispatcher.register(Arc::new(|_: &Action| Ok(())));

        let result = dispatcher.wait_for(&[token]);
        assert!(matches!(result, Err(FluxError::WaitForOutsideDispatch)));
    }

    #[test]
    fn test_circular_wait_is_detected() {
        let dispatcher = Arc::new(Dispatcher::new());
        let tokens: Arc<Mutex<Vec<DispatchToken>>> = Arc::new(Mutex::new(Vec::new()));

        for other in [1usize, 0] {
            let inner = Arc::clone(&dispatcher);
            let tokens_ref = Arc::clone(&tokens);
            let token = dispatcher.register(Arc::new(move |_: &Action| {
                let target = tokens_ref.lock()[other];
                inner.wait_for(&[target])
            }));
            tokens.lock().push(token);
        }

        let result = dispatcher.dispatch(Action::bare("go"));
        assert!(matches!(result, Err(FluxError::CircularWait(_))));
        assert!(!dispatcher.is_dispatching());
    }

    #[test]
    fn test_nested_dispatch_rejected() {
        let dispatcher = Arc::new(Dispatcher::new());
        let inner = Arc::clone(&dispatcher);
        dispatcher.register(Arc::new(move |_: &Action| inner.dispatch(Action::bare("nested"))));

        let result = dispatcher.dispatch(Action::bare("outer"));
        assert!(matches!(result, Err(FluxError::DispatchInProgress)));

        // The guard resets after the failed cycle.
        dispatcher.unregister(DispatchToken(1));
        dispatcher.dispatch(Action::bare("again")).unwrap();
    }

    #[test]
    fn test_unknown_token() {
        let dispatcher = Arc::new(Dispatcher::new());
        let inner = Arc::clone(&dispatcher);
        dispatcher.register(Arc::new(move |_: &Action| inner.wait_for(&[DispatchToken(99)])));

        let result = dispatcher.dispatch(Action::bare("go"));
        assert!(matches!(result, Err(FluxError::UnknownDispatchToken(DispatchToken(99)))));
    }

    #[test]
    fn test_unregister() {
        let dispatcher = Dispatcher::new();
        let token = dispatcher.register(Arc::new(|_: &Action| Ok(())));

        assert!(dispatcher.unregister(token));
        assert!(!dispatcher.unregister(token));
        assert_eq!(dispatcher.callback_count(), 0);
    }
}
