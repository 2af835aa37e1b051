//! Change feed events, filters and subscriber handles.

use crate::types::NodeKind;
use crossbeam_channel::{Receiver, RecvError, RecvTimeoutError, TryRecvError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Event families a subscriber can opt into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedTopic {
    /// Store commits and getter refreshes.
    State,
    /// Completed dispatch cycles.
    Actions,
    /// Snapshot, rollback and reset.
    Lifecycle,
}

/// Events delivered to subscribers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    /// A store committed a new slice, or a getter's inputs changed.
    StateChanged { node: NodeKind, id: String },

    /// An action went through a complete dispatch cycle.
    ActionDispatched { action_type: String },

    /// A snapshot of these stores was persisted.
    SnapshotTaken { stores: Vec<String> },

    /// The last snapshot was applied to these stores.
    RolledBack { stores: Vec<String> },

    /// All stores, getters and registries were torn down.
    Reset,

    /// Last event a removed subscriber sees, when the buffer has room for it.
    Dropped { reason: DropReason },
}

impl FeedEvent {
    /// Topic the event is filed under. `Dropped` has none and bypasses filters.
    pub fn topic(&self) -> Option<FeedTopic> {
        match self {
            FeedEvent::StateChanged { .. } => Some(FeedTopic::State),
            FeedEvent::ActionDispatched { .. } => Some(FeedTopic::Actions),
            FeedEvent::SnapshotTaken { .. } | FeedEvent::RolledBack { .. } | FeedEvent::Reset => {
                Some(FeedTopic::Lifecycle)
            }
            FeedEvent::Dropped { .. } => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// The subscriber's buffer was full.
    BufferOverflow,
    /// The handle was dropped.
    Disconnected,
    Unsubscribed,
}

/// Which events reach a subscriber.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionFilter {
    pub topics: Vec<FeedTopic>,

    /// Restrict state events to these store/getter ids. `None` keeps all.
    pub node_ids: Option<Vec<String>>,
}

impl SubscriptionFilter {
    /// Every event of the given topics.
    pub fn topics(topics: impl IntoIterator<Item = FeedTopic>) -> Self {
        Self {
            topics: topics.into_iter().collect(),
            node_ids: None,
        }
    }

    /// State events of the named stores and getters.
    pub fn nodes<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            topics: vec![FeedTopic::State],
            node_ids: Some(ids.into_iter().map(Into::into).collect()),
        }
    }

    /// State events of every node.
    pub fn state_changes() -> Self {
        Self::topics([FeedTopic::State])
    }

    /// Dispatched actions only.
    pub fn actions() -> Self {
        Self::topics([FeedTopic::Actions])
    }

    /// Snapshot, rollback and reset events only.
    pub fn lifecycle() -> Self {
        Self::topics([FeedTopic::Lifecycle])
    }

    /// Everything.
    pub fn all() -> Self {
        Self::topics([FeedTopic::State, FeedTopic::Actions, FeedTopic::Lifecycle])
    }

    /// Whether `event` passes the filter.
    pub fn accepts(&self, event: &FeedEvent) -> bool {
        let Some(topic) = event.topic() else {
            return true;
        };
        if !self.topics.contains(&topic) {
            return false;
        }

        match (event, &self.node_ids) {
            (FeedEvent::StateChanged { id, .. }, Some(ids)) => ids.iter().any(|n| n == id),
            _ => true,
        }
    }
}

impl Default for SubscriptionFilter {
    fn default() -> Self {
        Self::all()
    }
}

/// Subscription settings.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Events buffered before the subscriber is dropped as too slow.
    pub buffer_size: usize,
    pub filter: SubscriptionFilter,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            filter: SubscriptionFilter::all(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Receiving end of a subscription. Dropping it ends the subscription at the
/// next publish.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    pub(crate) events: Receiver<FeedEvent>,
}

impl SubscriptionHandle {
    /// Block until the next event.
    pub fn recv(&self) -> Result<FeedEvent, RecvError> {
        self.events.recv()
    }

    /// Next buffered event, without blocking.
    pub fn try_recv(&self) -> Result<FeedEvent, TryRecvError> {
        self.events.try_recv()
    }

    /// Wait up to `timeout` for the next event.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<FeedEvent, RecvTimeoutError> {
        self.events.recv_timeout(timeout)
    }

    /// Everything currently buffered, without blocking.
    pub fn drain(&self) -> Vec<FeedEvent> {
        self.events.try_iter().collect()
    }
}
