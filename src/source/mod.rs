//! External event sources.
//!
//! A source is the subscribable data store the dashboard reads from:
//! - Live queries over a fixed predicate set, delivering full result sets
//! - Atomic set-field mutations
//! - Point lookups and inserts
//!
//! Two implementations ship with the crate: [`MemorySource`], an
//! in-process store, and [`ManualSource`], whose deliveries are pushed by
//! the caller.
//!
//! # Example
//!
//! ```ignore
//! let source = MemorySource::new();
//! let sub = source.subscribe(Predicate::HostEquals("uid-1".into()))?;
//!
//! loop {
//!     match sub.recv() {
//!         Ok(SourceEvent::Snapshot { documents }) => println!("{} events", documents.len()),
//!         Ok(SourceEvent::Failed { error }) => eprintln!("query failed: {}", error),
//!         Ok(SourceEvent::Dropped { .. }) | Err(_) => break,
//!     }
//! }
//! ```

mod manual;
mod memory;
mod types;

pub use manual::ManualSource;
pub use memory::MemorySource;
pub use types::{
    AccessPolicy, AllowAll, DropReason, EventSource, FieldUpdate, MutationEffect, Predicate,
    SourceConfig, SourceEvent, SourceSubscription, SubscriptionId,
};
