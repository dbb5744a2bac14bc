//! Process-wide event bus for query notifications.
//!
//! Delivery is synchronous: [`EventBus::publish`] calls every subscriber of
//! the channel inline, on the publishing thread.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use super::event::QueryEvent;
use crate::error::{Error, Result};

/// Receives events published on a channel.
pub trait Subscriber: Send + Sync {
    /// Handle one event. Must not panic or block.
    fn on_event(&self, event: &QueryEvent);
}

impl<F> Subscriber for F
where
    F: Fn(&QueryEvent) + Send + Sync,
{
    fn on_event(&self, event: &QueryEvent) {
        self(event)
    }
}

/// Identifier returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct SubscriptionEntry {
    channel: String,
    subscriber: Arc<dyn Subscriber>,
    created_at: Instant,
}

#[derive(Default)]
struct BusState {
    /// Active subscriptions keyed by ID.
    subscriptions: HashMap<SubscriptionId, SubscriptionEntry>,
    /// Subscription IDs per channel, in subscription order.
    channel_index: HashMap<String, Vec<SubscriptionId>>,
}

/// Named-channel event bus.
pub struct EventBus {
    state: RwLock<BusState>,
    next_subscription_id: AtomicU64,
}

impl EventBus {
    /// Create a new event bus.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(BusState::default()),
            next_subscription_id: AtomicU64::new(1),
        }
    }

    /// Subscribe to a channel.
    pub fn subscribe(&self, channel: &str, subscriber: Arc<dyn Subscriber>) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription_id.fetch_add(1, Ordering::SeqCst));

        let mut state = self.state.write();
        state.subscriptions.insert(
            id,
            SubscriptionEntry {
                channel: channel.to_string(),
                subscriber,
                created_at: Instant::now(),
            },
        );
        state
            .channel_index
            .entry(channel.to_string())
            .or_default()
            .push(id);

        tracing::debug!(subscription = %id, channel, "subscription created");
        id
    }

    /// Remove a subscription.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        let mut state = self.state.write();
        let entry = state
            .subscriptions
            .remove(&id)
            .ok_or_else(|| Error::UnknownSubscription(id.to_string()))?;

        if let Some(ids) = state.channel_index.get_mut(&entry.channel) {
            ids.retain(|&existing| existing != id);
            if ids.is_empty() {
                state.channel_index.remove(&entry.channel);
            }
        }

        tracing::debug!(
            subscription = %id,
            channel = %entry.channel,
            age_ms = entry.created_at.elapsed().as_millis() as u64,
            "subscription removed"
        );
        Ok(())
    }

    /// Deliver an event to every subscriber of `channel`.
    ///
    /// Returns the number of subscribers called.
    pub fn publish(&self, channel: &str, event: &QueryEvent) -> usize {
        // Snapshot under the read lock so subscribers may touch the bus.
        let subscribers: Vec<Arc<dyn Subscriber>> = {
            let state = self.state.read();
            match state.channel_index.get(channel) {
                Some(ids) => ids
                    .iter()
                    .filter_map(|id| state.subscriptions.get(id))
                    .map(|entry| entry.subscriber.clone())
                    .collect(),
                None => return 0,
            }
        };

        for subscriber in &subscribers {
            subscriber.on_event(event);
        }

        tracing::trace!(channel, delivered = subscribers.len(), "published event");
        subscribers.len()
    }

    /// Get the number of active subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.state.read().subscriptions.len()
    }

    /// Get subscriptions for a specific channel.
    pub fn subscribers_for(&self, channel: &str) -> Vec<SubscriptionId> {
        self.state
            .read()
            .channel_index
            .get(channel)
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

/// Shared event bus handle.
pub type SharedEventBus = Arc<EventBus>;
