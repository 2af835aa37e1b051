//! # Fluxer
//!
//! A unidirectional-data-flow state core: actions flow through a single
//! dispatcher into stores, stores own immutable state slices, and getters
//! derive values from stores and other getters.
//!
//! ## Core Concepts
//!
//! - **Dispatcher**: Broadcasts one action at a time to every store, with
//!   `wait_for` ordering between stores
//! - **Stores**: Map action types to pure transitions over their slice
//! - **Getters**: Memoized derived values, refreshed along the dependency graph
//! - **Application**: Registries, the state table, snapshots and rollback
//!
//! ## Example
//!
//! ```ignore
//! use fluxer::{Action, Application, StoreDefinition};
//! use serde_json::json;
//!
//! let app = Application::new();
//!
//! let people = app.create_store(
//!     StoreDefinition::new()
//!         .initial_state(|| json!([]))
//!         .on("addPerson", |_, state, data| Ok(Some(state.insert(0, data.clone())))),
//! )?;
//! app.register_stores([("PersonStore", people)])?;
//!
//! let count = app.create_getter("personCount", &["PersonStore"], |deps| {
//!     Some(json!(deps[0].len()).into())
//! })?;
//!
//! app.dispatch(Action::new("addPerson", json!({"name": "Ada"})))?;
//! assert_eq!(count.get_state()?.unwrap(), json!(1));
//!
//! app.take_snapshot(&[])?;
//! app.dispatch(Action::new("addPerson", json!({"name": "Grace"})))?;
//! app.rollback()?;
//! ```

pub mod application;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod getter;
pub mod graph;
pub mod state;
pub mod storage;
pub mod store;
pub mod subscriptions;
pub mod types;
pub mod value;

// Re-exports
pub use application::{ActionCreator, AppConfig, Application, DEFAULT_SNAPSHOT_KEY};
pub use dispatcher::{Callback, Dispatcher};
pub use error::{FluxError, Result};
pub use events::{Destroyable, Emitter, ListenerId, Observable, StateEvent};
pub use getter::{ComputeFn, Dependency, Getter};
pub use graph::DependencyGraph;
pub use state::StateTable;
pub use storage::{FileStorage, MemoryStorage, SnapshotStorage};
pub use store::{
    InitialStateFn, Store, StoreDefinition, TransitionContext, TransitionFn, WaitTarget,
};
pub use subscriptions::{
    DropReason, FeedEvent, FeedTopic, SubscriptionConfig, SubscriptionFilter,
    SubscriptionHandle, SubscriptionId, SubscriptionManager,
};
pub use types::*;
pub use value::Immutable;
