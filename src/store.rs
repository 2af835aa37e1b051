//! Stores: owners of one state slice each.
//!
//! A store maps action types to transition functions. When a dispatched
//! action matches, the transition receives the current slice and the action
//! payload and must return the next slice (the same one if nothing changed).
//! A changed slice is committed as `Changing` -> table write -> `Change`,
//! followed by propagation to dependent getters.

use crate::application::Core;
use crate::error::{FluxError, Result};
use crate::events::{Destroyable, Emitter, ListenerId, Observable, StateEvent};
use crate::types::{Action, DispatchToken, NodeKey};
use crate::value::Immutable;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Transition function: `(context, current slice, action data) -> next slice`.
///
/// Returning `Ok(None)` is a contract violation; return the current slice to
/// signal "unchanged".
pub type TransitionFn = Arc<
    dyn Fn(&TransitionContext<'_>, &Immutable, &Value) -> Result<Option<Immutable>> + Send + Sync,
>;

/// Produces a store's initial slice.
pub type InitialStateFn = Arc<dyn Fn() -> Immutable + Send + Sync>;

enum HandlerRef {
    Inline(TransitionFn),
    Named(String),
}

/// Description of a store, consumed by
/// [`Application::create_store`](crate::Application::create_store).
#[derive(Default)]
pub struct StoreDefinition {
    initial_state: Option<InitialStateFn>,
    events: Vec<(String, HandlerRef)>,
    handlers: HashMap<String, TransitionFn>,
}

impl StoreDefinition {
    /// Empty definition: `{}` initial state, no transitions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Initial slice factory. Plain values are converted; `null` becomes `{}`.
    pub fn initial_state<F, V>(mut self, f: F) -> Self
    where
        F: Fn() -> V + Send + Sync + 'static,
        V: Into<Immutable>,
    {
        self.initial_state = Some(Arc::new(move || f().into()));
        self
    }

    /// Handle `action_type` with an inline transition.
    pub fn on<F>(mut self, action_type: impl Into<String>, f: F) -> Self
    where
        F: Fn(&TransitionContext<'_>, &Immutable, &Value) -> Result<Option<Immutable>>
            + Send
            + Sync
            + 'static,
    {
        self.events
            .push((action_type.into(), HandlerRef::Inline(Arc::new(f))));
        self
    }

    /// Define a named transition that `on_named` entries can refer to.
    pub fn handler<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&TransitionContext<'_>, &Immutable, &Value) -> Result<Option<Immutable>>
            + Send
            + Sync
            + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(f));
        self
    }

    /// Handle `action_type` with the transition registered under `handler`.
    pub fn on_named(mut self, action_type: impl Into<String>, handler: impl Into<String>) -> Self {
        self.events
            .push((action_type.into(), HandlerRef::Named(handler.into())));
        self
    }

    /// Resolve named handlers into the action-type table.
    fn resolve(self) -> Result<(Option<InitialStateFn>, HashMap<String, TransitionFn>)> {
        let mut table = HashMap::with_capacity(self.events.len());

        for (event, handler) in self.events {
            let transition = match handler {
                HandlerRef::Inline(f) => f,
                HandlerRef::Named(name) => match self.handlers.get(&name) {
                    Some(f) => Arc::clone(f),
                    None => {
                        return Err(FluxError::UnknownHandler {
                            event,
                            handler: name,
                        })
                    }
                },
            };
            table.insert(event, transition);
        }

        Ok((self.initial_state, table))
    }
}

/// What a transition may touch while it runs.
pub struct TransitionContext<'a> {
    core: &'a Core,
    store: &'a Store,
    action: &'a Action,
}

impl<'a> TransitionContext<'a> {
    /// Id of the store running the transition.
    pub fn store_id(&self) -> String {
        self.store.id()
    }

    /// The action being dispatched.
    pub fn action(&self) -> &Action {
        self.action
    }

    /// Current slice of any registered store.
    pub fn state_of(&self, id: &str) -> Option<Immutable> {
        self.core.state.get(id)
    }

    /// Let the targeted stores finish handling this action first.
    pub fn wait_for<I>(&self, targets: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<WaitTarget>,
    {
        let tokens = self.core.resolve_wait_targets(targets)?;
        self.core.dispatcher.wait_for(&tokens)
    }

    /// Always rejected: a dispatch is already in flight.
    pub fn dispatch(&self, action: Action) -> Result<()> {
        self.core.dispatch(action)
    }
}

/// Something a transition can wait for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WaitTarget {
    /// A registered store, by id.
    Store(String),
    /// A raw dispatcher token.
    Token(DispatchToken),
}

impl From<&str> for WaitTarget {
    fn from(id: &str) -> Self {
        WaitTarget::Store(id.to_string())
    }
}

impl From<String> for WaitTarget {
    fn from(id: String) -> Self {
        WaitTarget::Store(id)
    }
}

impl From<DispatchToken> for WaitTarget {
    fn from(token: DispatchToken) -> Self {
        WaitTarget::Token(token)
    }
}

impl From<&Store> for WaitTarget {
    fn from(store: &Store) -> Self {
        match store.dispatch_token() {
            Some(token) => WaitTarget::Token(token),
            None => WaitTarget::Store(store.id()),
        }
    }
}

impl From<&Arc<Store>> for WaitTarget {
    fn from(store: &Arc<Store>) -> Self {
        WaitTarget::from(store.as_ref())
    }
}

/// A store: one slice of application state plus its transitions.
pub struct Store {
    id: RwLock<String>,
    token: Mutex<Option<DispatchToken>>,
    initial_state: Option<InitialStateFn>,
    dispatcher_events: HashMap<String, TransitionFn>,
    emitter: Emitter,
    core: Weak<Core>,
}

impl Store {
    pub(crate) fn from_definition(
        definition: StoreDefinition,
        temp_id: String,
        core: Weak<Core>,
    ) -> Result<Self> {
        let (initial_state, dispatcher_events) = definition.resolve()?;

        Ok(Self {
            id: RwLock::new(temp_id),
            token: Mutex::new(None),
            initial_state,
            dispatcher_events,
            emitter: Emitter::new(),
            core,
        })
    }

    /// Registry id, or a temporary `fs<N>` id before registration.
    pub fn id(&self) -> String {
        self.id.read().clone()
    }

    /// Dispatcher token, while registered.
    pub fn dispatch_token(&self) -> Option<DispatchToken> {
        *self.token.lock()
    }

    /// Whether the store is live in the dispatcher.
    pub fn is_registered(&self) -> bool {
        self.dispatch_token().is_some()
    }

    /// Whether the store has a transition for `action_type`.
    pub fn handles(&self, action_type: &str) -> bool {
        self.dispatcher_events.contains_key(action_type)
    }

    /// Action types this store reacts to.
    pub fn action_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.dispatcher_events.keys().cloned().collect();
        types.sort();
        types
    }

    /// Current slice. `None` before registration or after the application is gone.
    pub fn get_state(&self) -> Option<Immutable> {
        let core = self.core.upgrade()?;
        core.state.get(&self.id())
    }

    /// Freshly computed initial slice.
    pub fn initial_value(&self) -> Immutable {
        match &self.initial_state {
            Some(f) => {
                let value = f();
                if value.as_value().is_null() {
                    Immutable::empty_map()
                } else {
                    value
                }
            }
            None => Immutable::empty_map(),
        }
    }

    /// Wait for other stores from inside this store's transition.
    pub fn wait_for<I>(&self, targets: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<WaitTarget>,
    {
        let core = self.core.upgrade().ok_or(FluxError::ApplicationDropped)?;
        let tokens = core.resolve_wait_targets(targets)?;
        core.dispatcher.wait_for(&tokens)
    }

    pub(crate) fn belongs_to(&self, core: &Weak<Core>) -> bool {
        Weak::ptr_eq(&self.core, core)
    }

    pub(crate) fn assign(&self, id: String, token: DispatchToken) {
        *self.id.write() = id;
        *self.token.lock() = Some(token);
    }

    /// Dispatcher callback body.
    pub(crate) fn process_action(&self, core: &Core, action: &Action) -> Result<()> {
        let Some(transition) = self.dispatcher_events.get(&action.action_type) else {
            return Ok(());
        };

        let id = self.id();
        let current = core.state.get(&id).unwrap_or_default();
        let ctx = TransitionContext {
            core,
            store: self,
            action,
        };

        let next = transition(&ctx, &current, &action.data)?.ok_or_else(|| {
            FluxError::TransitionReturnedNothing {
                store: id.clone(),
                action_type: action.action_type.clone(),
            }
        })?;

        self.emitter.trigger(StateEvent::DispatchHandled);

        if next == current {
            tracing::trace!("{}: {} left state unchanged", id, action.action_type);
            return Ok(());
        }

        tracing::trace!("{}: {} produced new state", id, action.action_type);
        self.commit(core, &id, next)
    }

    /// `Changing`, single-assignment write of slice `id`, `Change`, then
    /// getter propagation.
    pub(crate) fn commit(&self, core: &Core, id: &str, value: Immutable) -> Result<()> {
        self.emitter.emit_changing();
        core.state.set(id, value);
        self.emitter.emit_change();

        let node = NodeKey::store(id);
        core.feed.broadcast_state_changed(&node);
        core.propagate(node)
    }
}

impl Observable for Store {
    fn on(&self, event: StateEvent, listener: Box<dyn Fn(StateEvent) + Send + Sync>) -> ListenerId {
        self.emitter.on(event, listener)
    }

    fn off(&self, id: ListenerId) -> bool {
        self.emitter.off(id)
    }

    fn trigger(&self, event: StateEvent) {
        self.emitter.trigger(event)
    }

    fn stop_listening(&self) {
        self.emitter.stop_listening()
    }
}

impl Destroyable for Store {
    /// Unregister from the dispatcher and drop every listener. The slice stays
    /// in the table until the application resets.
    fn destroy(&self) {
        self.emitter.trigger(StateEvent::BeforeDestroy);

        let token = self.token.lock().take();
        if let Some(token) = token {
            if let Some(core) = self.core.upgrade() {
                core.dispatcher.unregister(token);
            }
        }

        self.emitter.trigger(StateEvent::Destroy);
        self.emitter.stop_listening();
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.id())
            .field("dispatch_token", &self.dispatch_token())
            .field("action_types", &self.action_types())
            .finish()
    }
}
