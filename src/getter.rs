//! Getters: derived values over stores and other getters.
//!
//! A getter caches the current state of each dependency (`source_vals`) and
//! refreshes that cache when propagation reaches it. Reading the getter runs
//! the compute function over the cache every time; only the upstream fetch is
//! memoized.

use crate::application::Core;
use crate::error::{FluxError, Result};
use crate::events::{Destroyable, Emitter, ListenerId, Observable, StateEvent};
use crate::store::Store;
use crate::types::NodeKey;
use crate::value::Immutable;
use parking_lot::RwLock;
use std::sync::{Arc, Weak};

/// Compute function: dependency values in declaration order -> derived value.
/// `None` means "no value" and is reported as an error on read.
pub type ComputeFn = Arc<dyn Fn(&[Immutable]) -> Option<Immutable> + Send + Sync>;

/// Typed handle to a resolved dependency.
#[derive(Clone)]
pub enum Dependency {
    Store(Weak<Store>),
    Getter(Weak<Getter>),
}

impl Dependency {
    /// Current state of the dependency, if it has one.
    fn current_state(&self) -> Result<Option<Immutable>> {
        match self {
            Dependency::Store(store) => Ok(store.upgrade().and_then(|s| s.get_state())),
            Dependency::Getter(getter) => match getter.upgrade() {
                Some(g) => g.get_state(),
                None => Ok(None),
            },
        }
    }
}

/// A derived, read-only node in the dependency graph.
pub struct Getter {
    id: String,
    dependencies: Vec<String>,
    dependency_keys: Vec<NodeKey>,
    resolved: Vec<Dependency>,
    source_vals: RwLock<Vec<Immutable>>,
    compute: ComputeFn,
    emitter: Emitter,
    core: Weak<Core>,
}

impl Getter {
    /// Resolve `dependencies` (stores first, then getters) and capture their
    /// current state.
    pub(crate) fn new(
        id: String,
        dependencies: Vec<String>,
        compute: ComputeFn,
        core: &Arc<Core>,
    ) -> Result<Self> {
        let mut dependency_keys = Vec::with_capacity(dependencies.len());
        let mut resolved = Vec::with_capacity(dependencies.len());

        for dep in &dependencies {
            if dep.is_empty() {
                return Err(FluxError::InvalidDependency(id));
            }

            if let Some(store) = core.store(dep) {
                dependency_keys.push(NodeKey::store(dep.as_str()));
                resolved.push(Dependency::Store(Arc::downgrade(&store)));
            } else if let Some(getter) = core.getter(dep) {
                dependency_keys.push(NodeKey::getter(dep.as_str()));
                resolved.push(Dependency::Getter(Arc::downgrade(&getter)));
            } else {
                return Err(FluxError::UnresolvedDependency {
                    getter: id,
                    dependency: dep.clone(),
                });
            }
        }

        let getter = Self {
            id,
            dependencies,
            dependency_keys,
            resolved,
            source_vals: RwLock::new(Vec::new()),
            compute,
            emitter: Emitter::new(),
            core: Arc::downgrade(core),
        };

        let initial = getter.fetch_sources()?;
        *getter.source_vals.write() = initial;

        Ok(getter)
    }

    /// Registry id of the getter.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Dependency ids as declared.
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub(crate) fn dependency_keys(&self) -> &[NodeKey] {
        &self.dependency_keys
    }

    /// Cached dependency values.
    pub fn source_values(&self) -> Vec<Immutable> {
        self.source_vals.read().clone()
    }

    /// Recompute the derived value from the cached dependency values.
    ///
    /// `Ok(None)` while some dependency has no value yet.
    pub fn get_state(&self) -> Result<Option<Immutable>> {
        let source_vals = self.source_values();

        if source_vals.len() != self.resolved.len() {
            tracing::trace!("{}: not all deps have a source value", self.id);
            return Ok(None);
        }

        match (self.compute)(&source_vals) {
            Some(value) => {
                tracing::trace!("{}: has new state value of {}", self.id, value);
                Ok(Some(value))
            }
            None => Err(FluxError::GetterReturnedNothing(self.id.clone())),
        }
    }

    /// Refetch every dependency. Emits `Changing`, then `Change` only if the
    /// cached tuple differs. Returns whether it did.
    pub(crate) fn refresh(&self) -> Result<bool> {
        self.emitter.emit_changing();

        let fresh = self.fetch_sources()?;
        let changed = {
            let mut source_vals = self.source_vals.write();
            let changed = *source_vals != fresh;
            *source_vals = fresh;
            changed
        };

        if changed {
            self.emitter.emit_change();
        }
        Ok(changed)
    }

    fn fetch_sources(&self) -> Result<Vec<Immutable>> {
        let mut values = Vec::with_capacity(self.resolved.len());
        for dep in &self.resolved {
            if let Some(value) = dep.current_state()? {
                values.push(value);
            }
        }
        Ok(values)
    }
}

impl Observable for Getter {
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

impl Destroyable for Getter {
    fn destroy(&self) {
        self.emitter.trigger(StateEvent::BeforeDestroy);
        if let Some(core) = self.core.upgrade() {
            core.graph.unlink_getter(&self.id);
        }
        self.emitter.trigger(StateEvent::Destroy);
        self.emitter.stop_listening();
    }
}

impl std::fmt::Debug for Getter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Getter")
            .field("id", &self.id)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}
