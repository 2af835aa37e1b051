//! Application facade tying the dispatcher, stores, getters and snapshots together.

use crate::dispatcher::{Callback, Dispatcher};
use crate::error::{FluxError, Result};
use crate::events::Destroyable;
use crate::getter::{ComputeFn, Getter};
use crate::graph::DependencyGraph;
use crate::state::{self, StateTable};
use crate::storage::{MemoryStorage, SnapshotStorage};
use crate::store::{Store, StoreDefinition, WaitTarget};
use crate::subscriptions::{
    SubscriptionConfig, SubscriptionHandle, SubscriptionId, SubscriptionManager,
};
use crate::types::{Action, DispatchToken, Evaluation, NodeKey, SnapshotRecord};
use crate::value::Immutable;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Storage key of the snapshot record.
pub const DEFAULT_SNAPSHOT_KEY: &str = "lastSnapshot";

/// Builds an action from a payload.
pub type ActionCreator = Arc<dyn Fn(Value) -> Action + Send + Sync>;

/// Application configuration.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Log every dispatched action and its payload at debug level.
    pub debug: bool,

    /// Key under which the snapshot record is persisted.
    pub snapshot_key: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            debug: false,
            snapshot_key: DEFAULT_SNAPSHOT_KEY.to_string(),
        }
    }
}

/// State shared by the facade and, through weak handles, its stores and getters.
pub(crate) struct Core {
    pub(crate) config: AppConfig,
    pub(crate) state: StateTable,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) graph: DependencyGraph,
    pub(crate) feed: SubscriptionManager,
    stores: RwLock<IndexMap<String, Arc<Store>>>,
    getters: RwLock<IndexMap<String, Arc<Getter>>>,
    actions: RwLock<IndexMap<String, ActionCreator>>,
    action_types: RwLock<IndexMap<String, String>>,
    storage: Arc<dyn SnapshotStorage>,
    next_store_id: AtomicU64,
}

impl Core {
    pub(crate) fn store(&self, id: &str) -> Option<Arc<Store>> {
        self.stores.read().get(id).cloned()
    }

    pub(crate) fn getter(&self, id: &str) -> Option<Arc<Getter>> {
        self.getters.read().get(id).cloned()
    }

    /// Registry entries, keyed by the id each store was registered under.
    fn registered_stores(&self) -> Vec<(String, Arc<Store>)> {
        self.stores
            .read()
            .iter()
            .map(|(id, store)| (id.clone(), Arc::clone(store)))
            .collect()
    }

    fn is_in_registry(&self, store: &Arc<Store>) -> bool {
        self.stores.read().values().any(|s| Arc::ptr_eq(s, store))
    }

    pub(crate) fn dispatch(&self, action: Action) -> Result<()> {
        if self.config.debug {
            tracing::debug!(
                "Dispatching action: {} with payload of {}",
                action.action_type,
                action.data
            );
        }

        let action_type = action.action_type.clone();
        self.dispatcher.dispatch(action)?;
        self.feed.broadcast_action(&action_type);
        Ok(())
    }

    pub(crate) fn resolve_wait_targets<I>(&self, targets: I) -> Result<Vec<DispatchToken>>
    where
        I: IntoIterator,
        I::Item: Into<WaitTarget>,
    {
        let tokens = targets
            .into_iter()
            .map(|target| match target.into() {
                WaitTarget::Token(token) => Ok(token),
                WaitTarget::Store(id) => self
                    .store(&id)
                    .and_then(|s| s.dispatch_token())
                    .ok_or(FluxError::StoreNotRegistered(id)),
            })
            .collect::<Result<Vec<_>>>()?;

        if tokens.is_empty() {
            return Err(FluxError::InvalidOperation(
                "wait_for called without any stores".into(),
            ));
        }
        Ok(tokens)
    }

    /// Refresh every getter downstream of `from`, upstream getters first.
    /// A getter refreshes only if one of its own dependencies changed.
    pub(crate) fn propagate(&self, from: NodeKey) -> Result<()> {
        let order = self.graph.propagation_order(&from);
        if order.is_empty() {
            return Ok(());
        }

        let mut changed = HashSet::new();
        changed.insert(from);

        for id in order {
            let Some(getter) = self.getter(&id) else {
                continue;
            };
            if !getter.dependency_keys().iter().any(|k| changed.contains(k)) {
                continue;
            }

            if getter.refresh()? {
                let node = NodeKey::getter(id);
                self.feed.broadcast_state_changed(&node);
                changed.insert(node);
            }
        }

        Ok(())
    }

    /// Apply plain values to stores whose slice differs by deep equality.
    /// Every key is validated before anything is applied.
    fn bulk_set(&self, desired: Map<String, Value>) -> Result<Vec<String>> {
        let stores = desired
            .keys()
            .map(|id| match self.store(id) {
                Some(store) => Ok((id.clone(), store)),
                None => Err(FluxError::StoreNotFound(id.clone())),
            })
            .collect::<Result<IndexMap<String, Arc<Store>>>>()?;

        let changes = state::diff_against(&self.state, &desired);
        let mut applied = Vec::with_capacity(changes.len());

        for (id, value) in changes {
            if let Some(store) = stores.get(&id) {
                store.commit(self, &id, Immutable::new(value))?;
                applied.push(id);
            }
        }

        Ok(applied)
    }

    /// Put a store back to a fresh initial value if its slice differs.
    fn reset_store(&self, id: &str, store: &Store) -> Result<bool> {
        let initial = store.initial_value();
        match self.state.get(id) {
            Some(current) if current == initial => Ok(false),
            _ => {
                store.commit(self, id, initial)?;
                Ok(true)
            }
        }
    }
}

/// The facade: registries, state table, dispatcher and snapshot handling for
/// one application instance.
///
/// Every instance starts empty; independent instances share nothing.
pub struct Application {
    core: Arc<Core>,
}

impl Application {
    /// Application with default configuration and in-memory snapshot storage.
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    /// Application with `config` and in-memory snapshot storage.
    pub fn with_config(config: AppConfig) -> Self {
        Self::with_storage(config, Arc::new(MemoryStorage::new()))
    }

    /// Application persisting snapshots to `storage`.
    pub fn with_storage(config: AppConfig, storage: Arc<dyn SnapshotStorage>) -> Self {
        let core = Arc::new(Core {
            config,
            state: StateTable::new(),
            dispatcher: Dispatcher::new(),
            graph: DependencyGraph::new(),
            feed: SubscriptionManager::new(),
            stores: RwLock::new(IndexMap::new()),
            getters: RwLock::new(IndexMap::new()),
            actions: RwLock::new(IndexMap::new()),
            action_types: RwLock::new(IndexMap::new()),
            storage,
            next_store_id: AtomicU64::new(1),
        });

        Self { core }
    }

    /// Configuration the application was built with.
    pub fn config(&self) -> &AppConfig {
        &self.core.config
    }

    // --- Registries ---

    /// Build a store from its definition. The store stays inert until
    /// [`register_stores`](Self::register_stores) gives it an id.
    pub fn create_store(&self, definition: StoreDefinition) -> Result<Arc<Store>> {
        let temp_id = format!("fs{}", self.core.next_store_id.fetch_add(1, Ordering::SeqCst));
        let store = Store::from_definition(definition, temp_id, Arc::downgrade(&self.core))?;
        Ok(Arc::new(store))
    }

    /// Register stores under their ids, wiring them into the dispatcher and
    /// capturing their initial slices. Can be called repeatedly; stores
    /// registered earlier are not touched.
    pub fn register_stores<I, K>(&self, stores: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, Arc<Store>)>,
        K: Into<String>,
    {
        let batch: Vec<(String, Arc<Store>)> =
            stores.into_iter().map(|(k, s)| (k.into(), s)).collect();

        let weak_core = Arc::downgrade(&self.core);
        let mut seen = HashSet::new();
        for (id, store) in &batch {
            if self.core.stores.read().contains_key(id) || !seen.insert(id.clone()) {
                return Err(FluxError::DuplicateStore(id.clone()));
            }
            if store.is_registered() || self.core.is_in_registry(store) {
                return Err(FluxError::StoreAlreadyRegistered {
                    store: id.clone(),
                    existing: store.id(),
                });
            }
            if !store.belongs_to(&weak_core) {
                return Err(FluxError::InvalidOperation(format!(
                    "Store {} was created by another application",
                    id
                )));
            }
        }
        let mut batch_stores = HashSet::new();
        for (id, store) in &batch {
            if !batch_stores.insert(Arc::as_ptr(store)) {
                return Err(FluxError::StoreAlreadyRegistered {
                    store: id.clone(),
                    existing: store.id(),
                });
            }
        }

        for (id, store) in batch {
            let callback = Self::dispatch_callback(&store, &weak_core);
            let token = self.core.dispatcher.register(callback);
            store.assign(id.clone(), token);

            self.core.state.set(&id, store.initial_value());
            self.core.stores.write().insert(id.clone(), store);
            tracing::trace!("Registered store {} with {}", id, token);
        }

        Ok(())
    }

    fn dispatch_callback(store: &Arc<Store>, core: &Weak<Core>) -> Callback {
        let store = Arc::downgrade(store);
        let core = core.clone();
        Arc::new(move |action: &Action| {
            match (store.upgrade(), core.upgrade()) {
                (Some(store), Some(core)) => store.process_action(&core, action),
                _ => Ok(()),
            }
        })
    }

    /// Register an action creator under a unique id.
    pub fn create_action<F>(&self, id: impl Into<String>, creator: F) -> Result<ActionCreator>
    where
        F: Fn(Value) -> Action + Send + Sync + 'static,
    {
        let id = id.into();
        let mut actions = self.core.actions.write();
        if actions.contains_key(&id) {
            return Err(FluxError::DuplicateAction(id));
        }

        let creator: ActionCreator = Arc::new(creator);
        actions.insert(id, Arc::clone(&creator));
        Ok(creator)
    }

    /// Build the action registered under `id` and dispatch it.
    pub fn invoke_action(&self, id: &str, data: Value) -> Result<()> {
        let creator = self
            .core
            .actions
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| FluxError::ActionNotFound(id.to_string()))?;

        self.dispatch(creator(data))
    }

    /// Whether an action creator is registered under `id`.
    pub fn has_action(&self, id: &str) -> bool {
        self.core.actions.read().contains_key(id)
    }

    /// Add an upper-cased action type to the key mirror.
    pub fn create_action_type(&self, name: &str) -> Result<String> {
        let name = name.to_uppercase();
        let mut action_types = self.core.action_types.write();
        if action_types.contains_key(&name) {
            return Err(FluxError::DuplicateActionType(name));
        }

        action_types.insert(name.clone(), name.clone());
        Ok(name)
    }

    /// Look up an action type, case-insensitively.
    pub fn action_type(&self, name: &str) -> Option<String> {
        self.core.action_types.read().get(&name.to_uppercase()).cloned()
    }

    /// The action-type key mirror, in creation order.
    pub fn action_types(&self) -> IndexMap<String, String> {
        self.core.action_types.read().clone()
    }

    /// Create a getter over registered stores and getters.
    pub fn create_getter<F>(&self, id: &str, dependencies: &[&str], compute: F) -> Result<Arc<Getter>>
    where
        F: Fn(&[Immutable]) -> Option<Immutable> + Send + Sync + 'static,
    {
        if self.core.getters.read().contains_key(id) {
            return Err(FluxError::DuplicateGetter(id.to_string()));
        }

        let compute: ComputeFn = Arc::new(compute);
        let getter = Arc::new(Getter::new(
            id.to_string(),
            dependencies.iter().map(|d| d.to_string()).collect(),
            compute,
            &self.core,
        )?);

        {
            let mut getters = self.core.getters.write();
            if getters.contains_key(id) {
                return Err(FluxError::DuplicateGetter(id.to_string()));
            }
            getters.insert(id.to_string(), Arc::clone(&getter));
        }

        for key in getter.dependency_keys() {
            self.core.graph.link(key.clone(), id);
        }

        Ok(getter)
    }

    /// Registered store by id.
    pub fn store(&self, id: &str) -> Option<Arc<Store>> {
        self.core.store(id)
    }

    /// Registered getter by id.
    pub fn getter(&self, id: &str) -> Option<Arc<Getter>> {
        self.core.getter(id)
    }

    /// Registered store ids, in registration order.
    pub fn store_ids(&self) -> Vec<String> {
        self.core.stores.read().keys().cloned().collect()
    }

    /// Registered getter ids, in creation order.
    pub fn getter_ids(&self) -> Vec<String> {
        self.core.getters.read().keys().cloned().collect()
    }

    // --- State ---

    /// Read the state table: everything for `[]`, one slice for one id,
    /// an ordered list of slices for several ids.
    pub fn evaluate(&self, ids: &[&str]) -> Evaluation {
        match ids {
            [] => Evaluation::All(self.core.state.entries()),
            [id] => Evaluation::One(self.core.state.get(id)),
            many => Evaluation::Many(many.iter().map(|id| self.core.state.get(id)).collect()),
        }
    }

    /// Current slice of one store.
    pub fn state(&self, id: &str) -> Option<Immutable> {
        self.core.state.get(id)
    }

    /// Broadcast an action to every registered store.
    pub fn dispatch(&self, action: Action) -> Result<()> {
        self.core.dispatch(action)
    }

    /// Whether a dispatch cycle is in flight.
    pub fn is_dispatching(&self) -> bool {
        self.core.dispatcher.is_dispatching()
    }

    /// Hot-load plain data: a JSON object, or a string holding one.
    /// Stores not named are left untouched.
    pub fn bootstrap(&self, data: Value) -> Result<()> {
        match data {
            Value::String(raw) => self.bootstrap_str(&raw),
            Value::Object(map) => self.core.bulk_set(map).map(|_| ()),
            other => Err(FluxError::UnsupportedBootstrapData(json_kind(&other).into())),
        }
    }

    /// Hot-load a serialized JSON object.
    pub fn bootstrap_str(&self, raw: &str) -> Result<()> {
        let parsed: Value = serde_json::from_str(raw)?;
        match parsed {
            Value::Object(map) => self.core.bulk_set(map).map(|_| ()),
            other => Err(FluxError::UnsupportedBootstrapData(json_kind(&other).into())),
        }
    }

    // --- Snapshots ---

    /// Persist the named slices (every slice for `[]`), replacing any earlier
    /// snapshot. Only the captured stores are restored on rollback.
    pub fn take_snapshot(&self, ids: &[&str]) -> Result<SnapshotRecord> {
        let record = state::capture(&self.core.state, ids)?;
        let raw = state::encode_snapshot(&record)?;
        self.core.storage.save(&self.core.config.snapshot_key, raw)?;

        tracing::debug!("Snapshot taken of {} stores", record.data.len());
        self.core.feed.broadcast_snapshot_taken(record.store_ids());
        Ok(record)
    }

    /// Restore the stores captured by the last snapshot.
    pub fn rollback(&self) -> Result<()> {
        let raw = self
            .core
            .storage
            .load(&self.core.config.snapshot_key)?
            .ok_or(FluxError::NoSnapshot)?;
        let record = state::decode_snapshot(&raw)?;
        let stores = record.store_ids();

        let applied = self.core.bulk_set(record.data)?;
        tracing::debug!("Rolled back {} of {} stores", applied.len(), stores.len());
        self.core.feed.broadcast_rolled_back(stores);
        Ok(())
    }

    /// Reset every store to its initial slice.
    pub fn flush(&self) -> Result<()> {
        for (id, store) in self.core.registered_stores() {
            self.core.reset_store(&id, &store)?;
        }
        Ok(())
    }

    /// Reset the named stores (every store for `[]`) to their initial slices.
    pub fn recycle(&self, ids: &[&str]) -> Result<()> {
        if ids.is_empty() {
            return self.flush();
        }

        let stores = ids
            .iter()
            .map(|id| match self.core.store(id) {
                Some(store) => Ok((id.to_string(), store)),
                None => Err(FluxError::StoreNotFound(id.to_string())),
            })
            .collect::<Result<Vec<_>>>()?;

        for (id, store) in stores {
            self.core.reset_store(&id, &store)?;
        }
        Ok(())
    }

    // --- Change feed ---

    /// Open a change feed subscription.
    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        self.core.feed.subscribe(config)
    }

    /// Close a change feed subscription.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.core.feed.unsubscribe(id)
    }

    // --- Teardown ---

    /// Destroy every getter and store, and clear all registries and the state
    /// table. The application can be reused afterwards.
    pub fn reset(&self) {
        let getters: Vec<Arc<Getter>> = self
            .core
            .getters
            .write()
            .drain(..)
            .map(|(_, g)| g)
            .collect();
        for getter in &getters {
            getter.destroy();
        }

        let stores: Vec<Arc<Store>> = self
            .core
            .stores
            .write()
            .drain(..)
            .map(|(_, s)| s)
            .collect();
        for store in &stores {
            store.destroy();
        }

        self.core.graph.clear();
        self.core.state.clear();
        self.core.actions.write().clear();
        self.core.action_types.write().clear();

        tracing::debug!(
            "Reset application: {} stores, {} getters destroyed",
            stores.len(),
            getters.len()
        );
        self.core.feed.broadcast_reset();
    }

    /// Tear the application down.
    pub fn destroy(self) {
        self.reset();
    }
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
