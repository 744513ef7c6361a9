//! A source whose deliveries are pushed by hand.
//!
//! Useful for replaying recorded delivery sequences and for reproducing
//! out-of-order or failing subscriptions deterministically.

use crate::error::SourceError;
use crate::types::{Document, EventId};
use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use super::types::{
    DropReason, EventSource, FieldUpdate, MutationEffect, Predicate, SourceEvent,
    SourceSubscription, SubscriptionId,
};

struct Entry {
    predicate: Predicate,
    sender: Sender<SourceEvent>,
}

/// Hand-driven [`EventSource`]. Subscriptions receive nothing until a
/// caller pushes to their predicate. Mutations and lookups are rejected.
#[derive(Default)]
pub struct ManualSource {
    subscriptions: Mutex<HashMap<SubscriptionId, Entry>>,
    rejected: Mutex<HashSet<Predicate>>,
    next_id: AtomicU64,
}

impl ManualSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make future `subscribe` calls for this predicate fail.
    pub fn reject(&self, predicate: Predicate) {
        self.rejected.lock().insert(predicate);
    }

    /// Push an event to every live subscription with this predicate.
    /// Returns how many subscriptions received it.
    pub fn push(&self, predicate: &Predicate, event: SourceEvent) -> usize {
        let subs = self.subscriptions.lock();
        subs.values()
            .filter(|entry| &entry.predicate == predicate)
            .filter(|entry| entry.sender.send(event.clone()).is_ok())
            .count()
    }

    /// Push a full result set.
    pub fn deliver(&self, predicate: &Predicate, documents: Vec<Document>) -> usize {
        self.push(predicate, SourceEvent::Snapshot { documents })
    }

    /// Push a query failure.
    pub fn fail(&self, predicate: &Predicate, error: impl Into<String>) -> usize {
        self.push(
            predicate,
            SourceEvent::Failed {
                error: error.into(),
            },
        )
    }

    /// Predicates with a live subscription.
    pub fn active_predicates(&self) -> Vec<Predicate> {
        self.subscriptions
            .lock()
            .values()
            .map(|entry| entry.predicate.clone())
            .collect()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Senders for the given predicate, kept past unsubscription so tests
    /// can simulate deliveries that race with teardown.
    pub fn senders_for(&self, predicate: &Predicate) -> Vec<Sender<SourceEvent>> {
        self.subscriptions
            .lock()
            .values()
            .filter(|entry| &entry.predicate == predicate)
            .map(|entry| entry.sender.clone())
            .collect()
    }
}

impl EventSource for ManualSource {
    fn subscribe(&self, predicate: Predicate) -> Result<SourceSubscription, SourceError> {
        if self.rejected.lock().contains(&predicate) {
            return Err(SourceError::Unavailable(format!(
                "subscription rejected for {:?}",
                predicate
            )));
        }

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = unbounded();
        self.subscriptions
            .lock()
            .insert(id, Entry { predicate, sender });

        Ok(SourceSubscription { id, receiver })
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if let Some(entry) = self.subscriptions.lock().remove(&id) {
            let _ = entry.sender.send(SourceEvent::Dropped {
                reason: DropReason::Unsubscribed,
            });
        }
    }

    fn mutate(&self, id: &EventId, _update: FieldUpdate) -> Result<MutationEffect, SourceError> {
        Err(SourceError::Unavailable(format!(
            "manual source cannot mutate {}",
            id
        )))
    }

    fn get_one(&self, _id: &EventId) -> Result<Option<Document>, SourceError> {
        Ok(None)
    }

    fn create(&self, _data: serde_json::Value) -> Result<EventId, SourceError> {
        Err(SourceError::Unavailable("manual source cannot create".into()))
    }
}
