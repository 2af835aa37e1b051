//! Fan-out of feed events to bounded subscriber channels.

use crate::types::NodeKey;
use crossbeam_channel::{Sender, TrySendError};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use super::types::{
    DropReason, FeedEvent, SubscriptionConfig, SubscriptionFilter, SubscriptionHandle,
    SubscriptionId,
};

struct Subscriber {
    filter: SubscriptionFilter,
    outbox: Sender<FeedEvent>,
}

impl Subscriber {
    fn deliver(&self, event: &FeedEvent) -> Result<(), DropReason> {
        if !self.filter.accepts(event) {
            return Ok(());
        }

        self.outbox.try_send(event.clone()).map_err(|e| match e {
            TrySendError::Full(_) => DropReason::BufferOverflow,
            TrySendError::Disconnected(_) => DropReason::Disconnected,
        })
    }

    /// Final notice to a removed subscriber. Lost if its buffer is full.
    fn farewell(self, reason: DropReason) {
        let _ = self.outbox.try_send(FeedEvent::Dropped { reason });
    }
}

/// Publishes feed events to subscribers, in subscription order.
///
/// Publishing never blocks: a subscriber whose buffer is full, or whose
/// handle is gone, is removed on the spot.
pub struct SubscriptionManager {
    subscribers: RwLock<IndexMap<SubscriptionId, Subscriber>>,
    next_id: AtomicU64,
}

impl SubscriptionManager {
    /// Create a manager with no subscribers.
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(IndexMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Add a subscriber and hand back its receiving end.
    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (outbox, events) = crossbeam_channel::bounded(config.buffer_size.max(1));

        self.subscribers.write().insert(
            id,
            Subscriber {
                filter: config.filter,
                outbox,
            },
        );
        tracing::trace!("Feed subscriber {:?} added", id);

        SubscriptionHandle { id, events }
    }

    /// Remove a subscriber, sending it a final `Dropped` event.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let removed = self.subscribers.write().shift_remove(&id);
        if let Some(subscriber) = removed {
            subscriber.farewell(DropReason::Unsubscribed);
        }
    }

    /// Number of live subscribers.
    pub fn subscription_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Publish a store commit or getter refresh.
    pub fn broadcast_state_changed(&self, node: &NodeKey) {
        if self.is_idle() {
            return;
        }
        self.publish(FeedEvent::StateChanged {
            node: node.kind,
            id: node.id.clone(),
        });
    }

    /// Publish a completed dispatch cycle.
    pub fn broadcast_action(&self, action_type: &str) {
        if self.is_idle() {
            return;
        }
        self.publish(FeedEvent::ActionDispatched {
            action_type: action_type.to_string(),
        });
    }

    /// Publish a persisted snapshot.
    pub fn broadcast_snapshot_taken(&self, stores: Vec<String>) {
        self.publish(FeedEvent::SnapshotTaken { stores });
    }

    /// Publish a rollback.
    pub fn broadcast_rolled_back(&self, stores: Vec<String>) {
        self.publish(FeedEvent::RolledBack { stores });
    }

    /// Publish an application reset.
    pub fn broadcast_reset(&self) {
        self.publish(FeedEvent::Reset);
    }

    fn is_idle(&self) -> bool {
        self.subscribers.read().is_empty()
    }

    fn publish(&self, event: FeedEvent) {
        let failed: Vec<(SubscriptionId, DropReason)> = self
            .subscribers
            .read()
            .iter()
            .filter_map(|(id, sub)| sub.deliver(&event).err().map(|reason| (*id, reason)))
            .collect();

        if failed.is_empty() {
            return;
        }

        let mut subscribers = self.subscribers.write();
        for (id, reason) in failed {
            if let Some(subscriber) = subscribers.shift_remove(&id) {
                tracing::warn!("Dropping feed subscriber {:?}: {:?}", id, reason);
                subscriber.farewell(reason);
            }
        }
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}
