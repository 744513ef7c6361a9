//! Event registration.

use crate::error::SourceError;
use crate::source::{EventSource, FieldUpdate, MutationEffect};
use crate::types::EventId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Result of a registration attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RegisterOutcome {
    /// The attendee was added.
    Registered,
    /// The attendee was already on the list; nothing changed.
    AlreadyRegistered,
    NotFound,
    PermissionDenied,
    /// The attendee identity was empty.
    MalformedInput,
    UnknownError { message: String },
}

impl RegisterOutcome {
    pub fn is_registered(&self) -> bool {
        matches!(self, RegisterOutcome::Registered)
    }
}

/// Adds attendees to events through the source's atomic mutation.
///
/// Dashboards see the change only when the source redelivers, so a
/// successful registration is not immediately visible in their views.
#[derive(Clone)]
pub struct Registrar {
    source: Arc<dyn EventSource>,
}

impl Registrar {
    pub fn new(source: Arc<dyn EventSource>) -> Self {
        Self { source }
    }

    pub fn register(&self, event_id: &EventId, attendee: &str) -> RegisterOutcome {
        let attendee = attendee.trim();
        if attendee.is_empty() {
            return RegisterOutcome::MalformedInput;
        }

        let result = self
            .source
            .mutate(event_id, FieldUpdate::AddAttendee(attendee.to_string()));

        let outcome = match result {
            Ok(MutationEffect::Applied) => RegisterOutcome::Registered,
            Ok(MutationEffect::Unchanged) => RegisterOutcome::AlreadyRegistered,
            Err(SourceError::NotFound(_)) => RegisterOutcome::NotFound,
            Err(SourceError::PermissionDenied(_)) => RegisterOutcome::PermissionDenied,
            Err(e) => {
                warn!(event = %event_id, error = %e, "registration failed");
                RegisterOutcome::UnknownError {
                    message: e.to_string(),
                }
            }
        };

        info!(event = %event_id, attendee, ?outcome, "registration");
        outcome
    }
}
