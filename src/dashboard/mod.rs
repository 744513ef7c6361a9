//! Live, role-based dashboards.
//!
//! A dashboard merges three live queries over the event source into one
//! collection and splits it into four disjoint views:
//! - Hosted: events the viewer hosts
//! - Organizing: events where the viewer is on the committee
//! - Upcoming / Attended: registered events on either side of "now"
//!
//! Every delivery is handled on a single thread per dashboard: decode,
//! merge, track completion, project, then notify listeners.
//!
//! # Example
//!
//! ```ignore
//! let aggregator = Aggregator::new(source);
//! let handle = aggregator.open(Viewer::new("a@x.edu", "uid-1")?)?;
//!
//! handle.on_update(|update| {
//!     if update.fully_loaded {
//!         println!("{} upcoming", update.views.upcoming.len());
//!     }
//! })?;
//!
//! handle.close();
//! ```

mod completion;
mod manager;
mod projector;
mod store;
mod types;

pub use completion::CompletionTracker;
pub use manager::{Aggregator, DashboardHandle, DashboardSession};
pub use projector::{classify, project};
pub use store::{ApplyStats, EntityStore};
pub use types::{
    AggregatorConfig, DashboardUpdate, Role, RoleCounts, RoleViews, SourceKind, SourceState,
    SourceStatus,
};
