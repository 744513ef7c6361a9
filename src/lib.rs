//! # Event Board
//!
//! Live, role-based event dashboards merged from several independent
//! subscriptions over one event source.
//!
//! ## Core Concepts
//!
//! - **Sources**: Subscribable event collections delivering full result sets
//! - **Dashboards**: One merged collection per viewer, split into disjoint
//!   hosted / organizing / upcoming / attended views
//! - **Registration**: Idempotent attendee mutation, observed through the
//!   same subscriptions
//! - **Catalog**: Event creation, lookup and the browse feed
//!
//! ## Example
//!
//! ```ignore
//! use eventboard::{Aggregator, MemorySource, Registrar, Viewer};
//! use std::sync::Arc;
//!
//! let source = Arc::new(MemorySource::new());
//! let dashboard = Aggregator::new(source.clone())
//!     .open(Viewer::new("a@x.edu", "uid-1")?)?;
//!
//! dashboard.on_update(|update| {
//!     println!("{:?}", update.views.counts());
//! })?;
//!
//! Registrar::new(source).register(&"evt-000001".into(), "a@x.edu");
//! ```

pub mod catalog;
pub mod clock;
pub mod dashboard;
pub mod error;
pub mod registration;
pub mod source;
pub mod types;

// Re-exports
pub use catalog::{BrowseFeed, Catalog, EventDraft, Listing};
pub use clock::{Clock, ManualClock, SystemClock};
pub use dashboard::{
    Aggregator, AggregatorConfig, CompletionTracker, DashboardHandle, DashboardSession,
    DashboardUpdate, EntityStore, Role, RoleCounts, RoleViews, SourceKind, SourceState,
    SourceStatus,
};
pub use error::{BoardError, Result, SourceError};
pub use registration::{RegisterOutcome, Registrar};
pub use source::{
    AccessPolicy, AllowAll, DropReason, EventSource, FieldUpdate, ManualSource, MemorySource,
    MutationEffect, Predicate, SourceConfig, SourceEvent, SourceSubscription, SubscriptionId,
};
pub use types::*;
