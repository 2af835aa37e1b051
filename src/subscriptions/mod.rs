//! Message-based change feed, alongside the per-node listener callbacks.
//!
//! Subscribers pick topics (state, actions, lifecycle) and optionally a set
//! of node ids. Each one reads from its own bounded channel; one that falls
//! behind is removed instead of stalling dispatch.
//!
//! ```ignore
//! let handle = app.subscribe(SubscriptionConfig {
//!     filter: SubscriptionFilter::nodes(["PersonStore"]),
//!     ..Default::default()
//! });
//!
//! app.dispatch(Action::new("addPerson", json!({"name": "X"})))?;
//! let changes = handle.drain();
//! ```

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{
    DropReason, FeedEvent, FeedTopic, SubscriptionConfig, SubscriptionFilter, SubscriptionHandle,
    SubscriptionId,
};
