//! In-process event source with live full-result-set subscriptions.

use crate::error::SourceError;
use crate::types::{Document, Event, EventId, Timestamp};
use crossbeam_channel::{bounded, Sender};
use parking_lot::{RwLock, RwLockWriteGuard};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, warn};

use super::types::{
    AccessPolicy, AllowAll, DropReason, EventSource, FieldUpdate, MutationEffect, Predicate,
    SourceConfig, SourceEvent, SourceSubscription, SubscriptionId,
};

/// Internal subscription state.
struct Subscription {
    predicate: Predicate,
    sender: Sender<SourceEvent>,
}

impl Subscription {
    /// Try to send an event. Returns false if the buffer is full or the
    /// receiver is gone (subscriber will be dropped).
    fn try_send(&self, event: SourceEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(crossbeam_channel::TrySendError::Full(_)) => false,
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => false,
        }
    }

    /// Whether a change from `before` to `after` can alter this result set.
    fn affected_by(&self, before: Option<&Event>, after: Option<&Event>) -> bool {
        before.is_some_and(|e| self.predicate.matches(e))
            || after.is_some_and(|e| self.predicate.matches(e))
    }
}

/// An in-memory event collection that behaves like a live document store.
///
/// Every subscription receives the complete matching set on subscribe and
/// again after each write that touches an event inside its predicate.
/// Writes are serialized; deliveries for one subscription follow write
/// order.
pub struct MemorySource {
    config: SourceConfig,
    events: RwLock<HashMap<EventId, Event>>,
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    next_subscription: AtomicU64,
    next_event: AtomicU64,
    policy: Box<dyn AccessPolicy>,
    available: AtomicBool,
}

impl MemorySource {
    /// Create an empty source that permits every mutation.
    pub fn new() -> Self {
        Self::with_config(SourceConfig::default())
    }

    pub fn with_config(config: SourceConfig) -> Self {
        Self {
            config,
            events: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
            next_subscription: AtomicU64::new(1),
            next_event: AtomicU64::new(1),
            policy: Box::new(AllowAll),
            available: AtomicBool::new(true),
        }
    }

    /// Replace the access policy applied to mutations.
    pub fn with_policy(mut self, policy: impl AccessPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// Toggle availability. While unavailable, new subscriptions and
    /// mutations fail with `Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Number of stored events.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Typed read of one event.
    pub fn event(&self, id: &EventId) -> Option<Event> {
        self.events.read().get(id).cloned()
    }

    // --- Administrative writes ---

    /// Insert or wholesale replace an event, bypassing the access policy.
    pub fn put(&self, event: Event) {
        let mut events = self.events.write();
        let before = events.insert(event.id.clone(), event.clone());
        self.publish(events, before.as_ref(), Some(&event));
    }

    /// Remove an event. Returns whether it existed.
    pub fn remove(&self, id: &EventId) -> bool {
        let mut events = self.events.write();
        let before = events.remove(id);
        let existed = before.is_some();
        if existed {
            self.publish(events, before.as_ref(), None);
        }
        existed
    }

    /// Drop every subscription, telling each subscriber why.
    pub fn shutdown(&self) {
        let mut subs = self.subscriptions.write();
        for (_, sub) in subs.drain() {
            let _ = sub.sender.try_send(SourceEvent::Dropped {
                reason: DropReason::SourceClosed,
            });
        }
    }

    fn ensure_available(&self) -> Result<(), SourceError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SourceError::Unavailable("memory source is offline".into()))
        }
    }

    /// Current result set for a predicate.
    fn result_set(events: &HashMap<EventId, Event>, predicate: &Predicate) -> Vec<Document> {
        let mut documents: Vec<Document> = events
            .values()
            .filter(|e| predicate.matches(e))
            .map(Event::to_document)
            .collect();
        documents.sort_by(|a, b| a.id.cmp(&b.id));
        documents
    }

    /// Downgrade the write guard and redeliver to every affected
    /// subscription while writers stay excluded.
    fn publish(
        &self,
        events: RwLockWriteGuard<'_, HashMap<EventId, Event>>,
        before: Option<&Event>,
        after: Option<&Event>,
    ) {
        let events = RwLockWriteGuard::downgrade(events);
        let mut to_remove = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                if !sub.affected_by(before, after) {
                    continue;
                }
                let documents = Self::result_set(&events, &sub.predicate);
                if !sub.try_send(SourceEvent::Snapshot { documents }) {
                    to_remove.push(*id);
                }
            }
        }

        // Remove dropped subscriptions
        if !to_remove.is_empty() {
            let mut subs = self.subscriptions.write();
            for id in to_remove {
                if let Some(sub) = subs.remove(&id) {
                    warn!(subscription = id.0, "dropping slow subscriber");
                    let _ = sub.sender.try_send(SourceEvent::Dropped {
                        reason: DropReason::BufferOverflow,
                    });
                }
            }
        }
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for MemorySource {
    fn subscribe(&self, predicate: Predicate) -> Result<SourceSubscription, SourceError> {
        self.ensure_available()?;

        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(self.config.buffer_size.max(1));

        // Hold the event lock so no write slips between the initial result
        // set and registration.
        let events = self.events.read();
        let documents = Self::result_set(&events, &predicate);
        let _ = sender.try_send(SourceEvent::Snapshot { documents });

        debug!(subscription = id.0, ?predicate, "subscribed");
        self.subscriptions
            .write()
            .insert(id, Subscription { predicate, sender });

        Ok(SourceSubscription { id, receiver })
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        let mut subs = self.subscriptions.write();
        if let Some(sub) = subs.remove(&id) {
            debug!(subscription = id.0, "unsubscribed");
            let _ = sub.sender.try_send(SourceEvent::Dropped {
                reason: DropReason::Unsubscribed,
            });
        }
    }

    fn mutate(&self, id: &EventId, update: FieldUpdate) -> Result<MutationEffect, SourceError> {
        self.ensure_available()?;

        let mut events = self.events.write();
        let current = events
            .get(id)
            .ok_or_else(|| SourceError::NotFound(id.to_string()))?;

        if !self.policy.allows(current, &update) {
            return Err(SourceError::PermissionDenied(format!(
                "{:?} on event {}",
                update, id
            )));
        }

        let mut next = current.clone();
        if !update.apply(&mut next) {
            return Ok(MutationEffect::Unchanged);
        }

        let before = events.insert(id.clone(), next.clone());
        self.publish(events, before.as_ref(), Some(&next));
        Ok(MutationEffect::Applied)
    }

    fn get_one(&self, id: &EventId) -> Result<Option<Document>, SourceError> {
        self.ensure_available()?;
        Ok(self.events.read().get(id).map(Event::to_document))
    }

    fn create(&self, mut data: serde_json::Value) -> Result<EventId, SourceError> {
        self.ensure_available()?;

        let id = EventId(format!(
            "evt-{:06}",
            self.next_event.fetch_add(1, Ordering::SeqCst)
        ));
        if let Some(map) = data.as_object_mut() {
            map.entry("attendees").or_insert_with(|| serde_json::json!([]));
            map.entry("createdAt")
                .or_insert_with(|| serde_json::json!(Timestamp::now().0));
        }

        let event = Event::from_document(&Document {
            id: id.0.clone(),
            data,
        })?;

        let mut events = self.events.write();
        events.insert(id.clone(), event.clone());
        self.publish(events, None, Some(&event));
        Ok(id)
    }
}

impl Drop for MemorySource {
    fn drop(&mut self) {
        self.shutdown();
    }
}
