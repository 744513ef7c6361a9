//! First-delivery tracking across live queries.

use super::types::{SourceKind, SourceState, SourceStatus};

/// Tracks whether every query has delivered at least once.
///
/// A failure counts as a delivery. Once fully loaded, always fully loaded.
#[derive(Clone, Debug)]
pub struct CompletionTracker {
    states: Vec<SourceState>,
    fully_loaded: bool,
}

impl CompletionTracker {
    pub fn new(kinds: &[SourceKind]) -> Self {
        let states = kinds
            .iter()
            .map(|kind| SourceState {
                kind: *kind,
                status: SourceStatus::Pending,
            })
            .collect();

        Self {
            states,
            fully_loaded: kinds.is_empty(),
        }
    }

    /// Record a successful delivery.
    pub fn record_delivery(&mut self, kind: SourceKind) {
        self.set(kind, SourceStatus::Live);
    }

    /// Record a failed delivery or a query that could not be opened.
    pub fn record_failure(&mut self, kind: SourceKind, reason: impl Into<String>) {
        self.set(
            kind,
            SourceStatus::Failed {
                reason: reason.into(),
            },
        );
    }

    fn set(&mut self, kind: SourceKind, status: SourceStatus) {
        if let Some(state) = self.states.iter_mut().find(|s| s.kind == kind) {
            state.status = status;
        }
        if !self.fully_loaded {
            self.fully_loaded = self
                .states
                .iter()
                .all(|s| s.status != SourceStatus::Pending);
        }
    }

    pub fn is_fully_loaded(&self) -> bool {
        self.fully_loaded
    }

    pub fn status(&self, kind: SourceKind) -> Option<&SourceStatus> {
        self.states.iter().find(|s| s.kind == kind).map(|s| &s.status)
    }

    pub fn states(&self) -> &[SourceState] {
        &self.states
    }
}
