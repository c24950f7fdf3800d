//! Notification bus for UI consumers.

use crate::record::{EntityType, Record};
use crate::summary::SweepSummary;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Receives sync notifications.
///
/// Both methods default to no-ops so observers only implement what they
/// care about. They are called on the sweep task and must not block.
pub trait SyncObserver: Send + Sync {
    /// A record was accepted by the backend (or its deletion confirmed).
    fn on_item_synced(&self, _entity: &EntityType, _record: &Record) {}

    /// A sweep finished, including sweeps that halted early.
    fn on_sweep_completed(&self, _summary: &SweepSummary) {}
}

/// Fans notifications out to every registered observer.
#[derive(Default, Clone)]
pub struct NotificationBus {
    observers: Arc<RwLock<Vec<Arc<dyn SyncObserver>>>>,
}

impl NotificationBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer.
    pub fn subscribe(&self, observer: Arc<dyn SyncObserver>) {
        self.observers.write().push(observer);
    }

    /// Returns the number of observers.
    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    /// Returns true if nobody is listening.
    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    pub(crate) fn item_synced(&self, entity: &EntityType, record: &Record) {
        for observer in self.observers.read().iter() {
            observer.on_item_synced(entity, record);
        }
    }

    pub(crate) fn sweep_completed(&self, summary: &SweepSummary) {
        for observer in self.observers.read().iter() {
            observer.on_sweep_completed(summary);
        }
    }
}

/// A notification, as delivered by [`ChannelObserver`].
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A record was accepted.
    ItemSynced {
        /// Entity type.
        entity: EntityType,
        /// The record as written locally.
        record: Record,
    },
    /// A sweep finished.
    SweepCompleted(Arc<SweepSummary>),
}

/// Forwards notifications to a broadcast channel.
pub struct ChannelObserver {
    sender: broadcast::Sender<SyncEvent>,
}

impl ChannelObserver {
    /// Creates an observer with a channel of `capacity` events.
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<SyncEvent>) {
        let (sender, receiver) = broadcast::channel(capacity);
        (Self { sender }, receiver)
    }

    /// Returns a new receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }
}

impl SyncObserver for ChannelObserver {
    fn on_item_synced(&self, entity: &EntityType, record: &Record) {
        // No receivers is fine.
        let _ = self.sender.send(SyncEvent::ItemSynced {
            entity: entity.clone(),
            record: record.clone(),
        });
    }

    fn on_sweep_completed(&self, summary: &SweepSummary) {
        let _ = self
            .sender
            .send(SyncEvent::SweepCompleted(Arc::new(summary.clone())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::SweepHalt;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        items: AtomicUsize,
        sweeps: AtomicUsize,
    }

    impl SyncObserver for Counter {
        fn on_item_synced(&self, _entity: &EntityType, _record: &Record) {
            self.items.fetch_add(1, Ordering::SeqCst);
        }

        fn on_sweep_completed(&self, _summary: &SweepSummary) {
            self.sweeps.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn bus_fans_out() {
        let bus = NotificationBus::new();
        let a = Arc::new(Counter::default());
        let b = Arc::new(Counter::default());
        bus.subscribe(a.clone());
        bus.subscribe(b.clone());
        assert_eq!(bus.len(), 2);

        bus.item_synced(&EntityType::from("orders"), &Record::new("o1"));
        bus.sweep_completed(&SweepSummary::halted(SweepHalt::Offline, Utc::now()));

        assert_eq!(a.items.load(Ordering::SeqCst), 1);
        assert_eq!(b.sweeps.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn channel_observer_delivers_events() {
        let (observer, mut receiver) = ChannelObserver::new(8);
        observer.on_item_synced(&EntityType::from("customers"), &Record::new("c1"));

        match receiver.recv().await.unwrap() {
            SyncEvent::ItemSynced { entity, record } => {
                assert_eq!(entity.as_str(), "customers");
                assert_eq!(record.id, "c1");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
