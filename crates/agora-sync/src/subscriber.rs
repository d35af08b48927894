//! Observers of the published model.

use std::collections::BTreeMap;
use std::sync::Arc;

use agora_model::{OpinionModel, Position};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Receives every published model.
///
/// Callbacks run on the coordinator task and must not block.
pub trait ModelSubscriber: Send + 'static {
    /// A new model was published.
    fn on_model(&mut self, model: &Arc<OpinionModel>);

    /// The viewer's dot moved after a local vote.
    fn on_self_moved(&mut self, _position: Position) {}
}

/// Handle returned by registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

/// Registered subscribers, notified in registration order.
#[derive(Default)]
pub struct SubscriberRegistry {
    next_id: u64,
    subscribers: BTreeMap<SubscriptionId, Box<dyn ModelSubscriber>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber, replaying `latest` to it first when present.
    pub fn register(
        &mut self,
        mut subscriber: Box<dyn ModelSubscriber>,
        latest: Option<&Arc<OpinionModel>>,
    ) -> SubscriptionId {
        if let Some(model) = latest {
            subscriber.on_model(model);
        }
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.insert(id, subscriber);
        trace!(id = id.0, replayed = latest.is_some(), "Registered subscriber");
        id
    }

    /// Remove a subscriber. Returns whether it was registered.
    pub fn unregister(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    pub fn notify(&mut self, model: &Arc<OpinionModel>) {
        for subscriber in self.subscribers.values_mut() {
            subscriber.on_model(model);
        }
    }

    pub fn notify_self_moved(&mut self, position: Position) {
        for subscriber in self.subscribers.values_mut() {
            subscriber.on_self_moved(position);
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

/// Forwards model events into a channel.
///
/// Events are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelSubscriber {
    tx: tokio::sync::mpsc::UnboundedSender<ModelEvent>,
}

/// A notification as delivered by [`ChannelSubscriber`].
#[derive(Debug, Clone)]
pub enum ModelEvent {
    Model(Arc<OpinionModel>),
    SelfMoved(Position),
}

impl ChannelSubscriber {
    pub fn new() -> (Self, tokio::sync::mpsc::UnboundedReceiver<ModelEvent>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ModelSubscriber for ChannelSubscriber {
    fn on_model(&mut self, model: &Arc<OpinionModel>) {
        let _ = self.tx.send(ModelEvent::Model(Arc::clone(model)));
    }

    fn on_self_moved(&mut self, position: Position) {
        let _ = self.tx.send(ModelEvent::SelfMoved(position));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_model::{MathTick, VoteMatrix};

    fn model(tick: i64) -> Arc<OpinionModel> {
        Arc::new(OpinionModel {
            math_tick: MathTick(tick),
            buckets: Vec::new(),
            clusters: Vec::new(),
            participant_count: 0,
            comment_positions: None,
            consensus: Default::default(),
            votes: VoteMatrix::default(),
        })
    }

    #[test]
    fn register_replays_latest() {
        let mut registry = SubscriberRegistry::new();
        let (subscriber, mut rx) = ChannelSubscriber::new();
        let latest = model(3);
        registry.register(Box::new(subscriber), Some(&latest));

        match rx.try_recv().unwrap() {
            ModelEvent::Model(m) => assert!(Arc::ptr_eq(&m, &latest)),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn register_without_model_is_silent() {
        let mut registry = SubscriberRegistry::new();
        let (subscriber, mut rx) = ChannelSubscriber::new();
        registry.register(Box::new(subscriber), None);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unregistered_subscriber_stops_receiving() {
        let mut registry = SubscriberRegistry::new();
        let (a, mut rx_a) = ChannelSubscriber::new();
        let (b, mut rx_b) = ChannelSubscriber::new();
        let id_a = registry.register(Box::new(a), None);
        let id_b = registry.register(Box::new(b), None);
        assert_ne!(id_a, id_b);

        assert!(registry.unregister(id_a));
        assert!(!registry.unregister(id_a));
        registry.notify(&model(1));
        registry.notify_self_moved(Position::new(1.0, 2.0));

        assert!(rx_a.try_recv().is_err());
        assert!(matches!(rx_b.try_recv(), Ok(ModelEvent::Model(_))));
        assert!(matches!(rx_b.try_recv(), Ok(ModelEvent::SelfMoved(p)) if p == Position::new(1.0, 2.0)));
    }
}
