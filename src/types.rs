//! Core types: events, documents, timestamps and viewing identities.

use crate::error::{BoardError, Result, SourceError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Externally-assigned event identity.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        EventId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({})", self.0)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EventId {
    fn from(id: &str) -> Self {
        EventId(id.to_string())
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_micros() as i64)
    }

    pub fn from_secs(secs: i64) -> Self {
        Timestamp(secs.saturating_mul(1_000_000))
    }

    pub fn as_micros(self) -> i64 {
        self.0
    }

    pub fn plus(self, by: Duration) -> Self {
        Timestamp(self.0.saturating_add(by.as_micros() as i64))
    }

    pub fn minus(self, by: Duration) -> Self {
        Timestamp(self.0.saturating_sub(by.as_micros() as i64))
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Untyped document as delivered by an event source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub data: serde_json::Value,
}

/// An event as held by the dashboard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub name: String,
    pub description: String,
    /// Scheduled instant.
    pub date: Timestamp,
    pub venue: String,
    pub image: String,
    pub image_hint: String,
    /// Host account identity.
    pub host_id: String,
    /// Organizing committee member emails.
    pub organizing_committee: BTreeSet<String>,
    /// Registered attendee emails.
    pub attendees: BTreeSet<String>,
    pub created_at: Option<Timestamp>,
}

/// Wire shape of an event document.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventFields {
    name: String,
    #[serde(default)]
    description: String,
    date: i64,
    #[serde(default)]
    venue: String,
    #[serde(default)]
    image: String,
    #[serde(default)]
    image_hint: String,
    host_id: String,
    #[serde(default)]
    organizing_committee: Vec<String>,
    #[serde(default)]
    attendees: Vec<String>,
    #[serde(default)]
    created_at: Option<i64>,
}

impl Event {
    /// Decode and validate a source document.
    pub fn from_document(document: &Document) -> std::result::Result<Self, SourceError> {
        let malformed = |reason: String| SourceError::Malformed {
            id: document.id.clone(),
            reason,
        };

        if document.id.trim().is_empty() {
            return Err(malformed("empty document id".into()));
        }

        let fields =
            EventFields::deserialize(&document.data).map_err(|e| malformed(e.to_string()))?;

        if fields.host_id.trim().is_empty() {
            return Err(malformed("empty hostId".into()));
        }

        Ok(Event {
            id: EventId(document.id.clone()),
            name: fields.name,
            description: fields.description,
            date: Timestamp(fields.date),
            venue: fields.venue,
            image: fields.image,
            image_hint: fields.image_hint,
            host_id: fields.host_id,
            organizing_committee: fields.organizing_committee.into_iter().collect(),
            attendees: fields.attendees.into_iter().collect(),
            created_at: fields.created_at.map(Timestamp),
        })
    }

    /// Encode into the document shape sources deliver.
    pub fn to_document(&self) -> Document {
        let mut data = json!({
            "name": self.name,
            "description": self.description,
            "date": self.date.0,
            "venue": self.venue,
            "image": self.image,
            "imageHint": self.image_hint,
            "hostId": self.host_id,
            "organizingCommittee": self.organizing_committee,
            "attendees": self.attendees,
        });
        if let (Some(created), Some(map)) = (self.created_at, data.as_object_mut()) {
            map.insert("createdAt".into(), json!(created.0));
        }

        Document {
            id: self.id.0.clone(),
            data,
        }
    }

    pub fn is_hosted_by(&self, host_id: &str) -> bool {
        self.host_id == host_id
    }

    pub fn has_committee_member(&self, email: &str) -> bool {
        self.organizing_committee.contains(email)
    }

    pub fn has_attendee(&self, email: &str) -> bool {
        self.attendees.contains(email)
    }
}

/// The identity a dashboard is computed for.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Viewer {
    /// Attendee identity (email).
    pub attendee_id: String,
    /// Host identity (account id).
    pub host_id: String,
}

impl Viewer {
    /// Both identities must be present.
    pub fn new(attendee_id: impl Into<String>, host_id: impl Into<String>) -> Result<Self> {
        let viewer = Viewer {
            attendee_id: attendee_id.into(),
            host_id: host_id.into(),
        };
        viewer.validate()?;
        Ok(viewer)
    }

    pub fn validate(&self) -> Result<()> {
        if self.attendee_id.trim().is_empty() {
            return Err(BoardError::MissingIdentity("attendee identity"));
        }
        if self.host_id.trim().is_empty() {
            return Err(BoardError::MissingIdentity("host identity"));
        }
        Ok(())
    }
}
