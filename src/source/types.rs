//! Types at the event source boundary.

use crate::error::SourceError;
use crate::types::{Document, Event, EventId};
use serde::{Deserialize, Serialize};

/// Configuration for an in-process source.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// Max buffered deliveries per subscription before it is dropped.
    /// Default: 256
    pub buffer_size: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self { buffer_size: 256 }
    }
}

/// The fixed query set a source must be able to evaluate.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Predicate {
    /// Every event.
    All,
    /// Events whose attendee set contains the identity.
    AttendeesContain(String),
    /// Events hosted by the identity.
    HostEquals(String),
    /// Events whose organizing committee contains the identity.
    CommitteeContains(String),
}

impl Predicate {
    pub fn matches(&self, event: &Event) -> bool {
        match self {
            Predicate::All => true,
            Predicate::AttendeesContain(email) => event.has_attendee(email),
            Predicate::HostEquals(host) => event.is_hosted_by(host),
            Predicate::CommitteeContains(email) => event.has_committee_member(email),
        }
    }
}

/// Atomic set-field update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldUpdate {
    AddAttendee(String),
    AddCommitteeMember(String),
}

impl FieldUpdate {
    /// Apply to an event. Returns false when the value was already present.
    pub fn apply(&self, event: &mut Event) -> bool {
        match self {
            FieldUpdate::AddAttendee(email) => event.attendees.insert(email.clone()),
            FieldUpdate::AddCommitteeMember(email) => {
                event.organizing_committee.insert(email.clone())
            }
        }
    }
}

/// Outcome of a successful mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationEffect {
    /// The document changed.
    Applied,
    /// The value was already present; nothing was written.
    Unchanged,
}

/// Events emitted on a source subscription.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceEvent {
    /// Complete current result set for the subscription's predicate.
    Snapshot { documents: Vec<Document> },

    /// The query failed. The subscription may still deliver later.
    Failed { error: String },

    /// Subscription was dropped. Nothing follows.
    Dropped { reason: DropReason },
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// The source shut down.
    SourceClosed,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Unique identifier for a source subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle to receive deliveries from one subscription.
pub struct SourceSubscription {
    pub id: SubscriptionId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<SourceEvent>,
}

impl SourceSubscription {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<SourceEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<SourceEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<SourceEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// An external, subscribable event collection.
pub trait EventSource: Send + Sync {
    /// Open a live query. The first delivery is the current result set.
    fn subscribe(&self, predicate: Predicate) -> Result<SourceSubscription, SourceError>;

    /// Cancel a live query. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);

    /// Atomically apply a set-field update to one event.
    fn mutate(&self, id: &EventId, update: FieldUpdate) -> Result<MutationEffect, SourceError>;

    /// Point lookup outside the live path.
    fn get_one(&self, id: &EventId) -> Result<Option<Document>, SourceError>;

    /// Insert a new event document and return the assigned identity.
    fn create(&self, data: serde_json::Value) -> Result<EventId, SourceError>;
}

/// Access rules a source applies to mutations.
pub trait AccessPolicy: Send + Sync {
    fn allows(&self, event: &Event, update: &FieldUpdate) -> bool;
}

/// Permit every mutation.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn allows(&self, _event: &Event, _update: &FieldUpdate) -> bool {
        true
    }
}

impl<F> AccessPolicy for F
where
    F: Fn(&Event, &FieldUpdate) -> bool + Send + Sync,
{
    fn allows(&self, event: &Event, update: &FieldUpdate) -> bool {
        self(event, update)
    }
}
