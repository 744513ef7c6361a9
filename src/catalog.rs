//! Event creation, lookup and the browse feed.

use crate::error::{BoardError, Result, SourceError};
use crate::source::{EventSource, Predicate, SourceEvent, SourceSubscription};
use crate::types::{Event, EventId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const MIN_NAME_LEN: usize = 3;
const MIN_DESCRIPTION_LEN: usize = 10;
const MIN_VENUE_LEN: usize = 3;

/// A new event as submitted by its host.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDraft {
    pub name: String,
    pub description: String,
    pub date: Timestamp,
    pub venue: String,
    pub image: String,
    pub image_hint: String,
    pub host_id: String,
    pub organizing_committee: Vec<String>,
}

impl EventDraft {
    /// Check the draft, reporting the first field that fails.
    pub fn validate(&self) -> Result<()> {
        check_min_len("name", &self.name, MIN_NAME_LEN)?;
        check_min_len("description", &self.description, MIN_DESCRIPTION_LEN)?;
        check_min_len("venue", &self.venue, MIN_VENUE_LEN)?;

        if self.host_id.trim().is_empty() {
            return Err(BoardError::MissingIdentity("host identity"));
        }
        if self.organizing_committee.is_empty() {
            return Err(invalid(
                "organizing_committee",
                "at least one committee member is required",
            ));
        }
        if let Some(bad) = self
            .organizing_committee
            .iter()
            .find(|email| !is_plausible_email(email))
        {
            return Err(invalid(
                "organizing_committee",
                format!("invalid email address {:?}", bad),
            ));
        }

        Ok(())
    }

    fn to_data(&self) -> serde_json::Value {
        json!({
            "name": self.name.trim(),
            "description": self.description.trim(),
            "date": self.date.as_micros(),
            "venue": self.venue.trim(),
            "image": self.image,
            "imageHint": self.image_hint,
            "hostId": self.host_id,
            "organizingCommittee": self.organizing_committee,
            "attendees": [],
        })
    }
}

fn invalid(field: &'static str, message: impl Into<String>) -> BoardError {
    BoardError::Validation {
        field,
        message: message.into(),
    }
}

fn check_min_len(field: &'static str, value: &str, min: usize) -> Result<()> {
    if value.trim().chars().count() < min {
        return Err(invalid(
            field,
            format!("must be at least {} characters", min),
        ));
    }
    Ok(())
}

/// `local@label.tld`, no whitespace, no empty domain labels.
fn is_plausible_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.split('.').count() >= 2
                && domain.split('.').all(|label| !label.is_empty())
        }
        None => false,
    }
}

/// Public event operations outside the dashboard.
#[derive(Clone)]
pub struct Catalog {
    source: Arc<dyn EventSource>,
}

impl Catalog {
    pub fn new(source: Arc<dyn EventSource>) -> Self {
        Self { source }
    }

    /// Validate and insert a new event with no attendees.
    pub fn create(&self, draft: &EventDraft) -> Result<EventId> {
        draft.validate()?;
        let id = self.source.create(draft.to_data())?;
        info!(event = %id, host = %draft.host_id, "event created");
        Ok(id)
    }

    /// Look up one event.
    pub fn get(&self, id: &EventId) -> Result<Option<Event>> {
        match self.source.get_one(id)? {
            Some(document) => Ok(Some(Event::from_document(&document)?)),
            None => Ok(None),
        }
    }

    /// Follow every event live.
    pub fn browse(&self) -> Result<BrowseFeed> {
        let subscription = self.source.subscribe(Predicate::All)?;
        Ok(BrowseFeed {
            source: Arc::clone(&self.source),
            subscription,
        })
    }
}

/// One delivery of the browse feed, ordered by date.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Listing {
    pub events: Vec<Event>,
    /// Documents that failed decode and were left out.
    pub rejected: usize,
}

impl Listing {
    /// Events at or after `now`.
    pub fn upcoming(&self, now: Timestamp) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(move |e| e.date >= now)
    }
}

/// Live list of all events. Unsubscribes on drop.
pub struct BrowseFeed {
    source: Arc<dyn EventSource>,
    subscription: SourceSubscription,
}

impl BrowseFeed {
    /// Wait for the next listing. Query failures and a dropped
    /// subscription come back as errors.
    pub fn next_listing(&self, timeout: Duration) -> Result<Listing> {
        let event = self
            .subscription
            .recv_timeout(timeout)
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;

        match event {
            SourceEvent::Snapshot { documents } => {
                let mut listing = Listing::default();
                for document in &documents {
                    match Event::from_document(document) {
                        Ok(event) => listing.events.push(event),
                        Err(e) => {
                            warn!(error = %e, "skipping malformed document");
                            listing.rejected += 1;
                        }
                    }
                }
                listing
                    .events
                    .sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
                Ok(listing)
            }
            SourceEvent::Failed { error } => Err(SourceError::Unavailable(error).into()),
            SourceEvent::Dropped { .. } => Err(SourceError::SubscriptionDropped.into()),
        }
    }
}

impl Drop for BrowseFeed {
    fn drop(&mut self) {
        self.source.unsubscribe(self.subscription.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    fn draft() -> EventDraft {
        EventDraft {
            name: "Art & Soul Exhibition".into(),
            description: "Paintings, sculptures and digital art".into(),
            date: Timestamp::from_secs(2_000),
            venue: "Fine Arts Gallery".into(),
            image: "https://img/3".into(),
            image_hint: "art gallery".into(),
            host_id: "uid-host".into(),
            organizing_committee: vec!["oc@x.edu".into()],
        }
    }

    fn field_of(result: Result<()>) -> &'static str {
        match result {
            Err(BoardError::Validation { field, .. }) => field,
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_valid_draft() {
        assert!(draft().validate().is_ok());
    }

    #[test]
    fn test_draft_field_rules() {
        let mut d = draft();
        d.name = "Hi".into();
        assert_eq!(field_of(d.validate()), "name");

        let mut d = draft();
        d.description = "Too short".into();
        assert_eq!(field_of(d.validate()), "description");

        let mut d = draft();
        d.venue = "  ".into();
        assert_eq!(field_of(d.validate()), "venue");

        let mut d = draft();
        d.organizing_committee.clear();
        assert_eq!(field_of(d.validate()), "organizing_committee");

        let mut d = draft();
        d.organizing_committee.push("not-an-email".into());
        assert_eq!(field_of(d.validate()), "organizing_committee");

        let mut d = draft();
        d.host_id = String::new();
        assert!(matches!(d.validate(), Err(BoardError::MissingIdentity(_))));
    }

    #[test]
    fn test_email_shapes() {
        assert!(is_plausible_email("a@x.edu"));
        assert!(!is_plausible_email("a@x"));
        assert!(!is_plausible_email("@x.edu"));
        assert!(!is_plausible_email("a@@x.edu"));
        assert!(!is_plausible_email("a b@x.edu"));
        assert!(!is_plausible_email("a@.edu"));
        assert!(!is_plausible_email("a@x..edu"));
        assert!(!is_plausible_email("a@x.edu."));
        assert!(is_plausible_email("a@cs.x.edu"));
    }

    #[test]
    fn test_create_then_get() {
        let source = Arc::new(MemorySource::new());
        let catalog = Catalog::new(source);

        let id = catalog.create(&draft()).unwrap();
        let event = catalog.get(&id).unwrap().unwrap();

        assert_eq!(event.name, "Art & Soul Exhibition");
        assert!(event.attendees.is_empty());
        assert!(event.has_committee_member("oc@x.edu"));
        assert!(event.created_at.is_some());
        assert!(catalog.get(&EventId::from("missing")).unwrap().is_none());
    }

    #[test]
    fn test_invalid_draft_not_created() {
        let source = Arc::new(MemorySource::new());
        let catalog = Catalog::new(source.clone());

        let mut d = draft();
        d.name = String::new();
        assert!(catalog.create(&d).is_err());
        assert!(source.is_empty());
    }

    #[test]
    fn test_browse_feed_follows_creates() {
        let source = Arc::new(MemorySource::new());
        let catalog = Catalog::new(source.clone());
        let feed = catalog.browse().unwrap();

        let initial = feed.next_listing(Duration::from_millis(200)).unwrap();
        assert!(initial.events.is_empty());

        let mut later = draft();
        later.date = Timestamp::from_secs(5_000);
        catalog.create(&later).unwrap();
        catalog.create(&draft()).unwrap();

        let _ = feed.next_listing(Duration::from_millis(200)).unwrap();
        let listing = feed.next_listing(Duration::from_millis(200)).unwrap();
        assert_eq!(listing.events.len(), 2);
        assert!(listing.events[0].date < listing.events[1].date);
        assert_eq!(listing.upcoming(Timestamp::from_secs(3_000)).count(), 1);

        drop(feed);
        assert_eq!(source.subscription_count(), 0);
    }
}
