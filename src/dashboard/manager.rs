//! Live aggregation of the dashboard queries.

use crate::clock::{Clock, SystemClock};
use crate::error::{BoardError, Result};
use crate::source::{EventSource, SourceEvent, SourceSubscription, SubscriptionId};
use crate::types::{Event, Viewer};
use crossbeam_channel::{bounded, never, tick, unbounded, Receiver, RecvError, Select, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::completion::CompletionTracker;
use super::projector::project;
use super::store::EntityStore;
use super::types::{AggregatorConfig, DashboardUpdate, RoleViews, SourceKind};

/// Returns false once the listener has nowhere left to deliver.
type Listener = Box<dyn FnMut(&DashboardUpdate) -> bool + Send>;

/// Opens dashboards against one event source.
#[derive(Clone)]
pub struct Aggregator {
    source: Arc<dyn EventSource>,
    clock: Arc<dyn Clock>,
    config: AggregatorConfig,
}

impl Aggregator {
    pub fn new(source: Arc<dyn EventSource>) -> Self {
        Self::with_config(source, AggregatorConfig::default())
    }

    pub fn with_config(source: Arc<dyn EventSource>, config: AggregatorConfig) -> Self {
        Self {
            source,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Use a different notion of "now" for projection.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn source(&self) -> &Arc<dyn EventSource> {
        &self.source
    }

    /// Open the three dashboard queries for `viewer` and start merging.
    ///
    /// A query that fails to open is recorded as a failed source; the
    /// others still run. The returned handle owns the subscriptions and
    /// releases them on `close()` or drop.
    pub fn open(&self, viewer: Viewer) -> Result<DashboardHandle> {
        viewer.validate()?;

        let mut tracker = CompletionTracker::new(&SourceKind::ALL);
        let mut feeds = Vec::with_capacity(SourceKind::ALL.len());

        for kind in SourceKind::ALL {
            match self.source.subscribe(kind.predicate(&viewer)) {
                Ok(subscription) => feeds.push(Feed {
                    kind,
                    subscription,
                    open: true,
                }),
                Err(e) => {
                    warn!(?kind, error = %e, "dashboard query failed to open");
                    tracker.record_failure(kind, e.to_string());
                }
            }
        }

        let subscription_ids: Vec<SubscriptionId> =
            feeds.iter().map(|feed| feed.subscription.id).collect();
        let shared = Arc::new(Shared::default());
        let (control_tx, control_rx) = bounded(16);
        let ticker = match self.config.refresh_interval {
            Some(interval) => tick(interval),
            None => never(),
        };

        let delivery = DeliveryLoop {
            viewer: viewer.clone(),
            feeds,
            store: EntityStore::new(),
            tracker,
            clock: Arc::clone(&self.clock),
            shared: Arc::clone(&shared),
            control: control_rx,
            ticker,
            revision: 0,
            last_views: None,
        };

        let spawned = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || delivery.run());

        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                for id in subscription_ids {
                    self.source.unsubscribe(id);
                }
                return Err(BoardError::Io(e));
            }
        };

        info!(attendee = %viewer.attendee_id, host = %viewer.host_id, "dashboard opened");

        Ok(DashboardHandle {
            viewer,
            shared,
            control: control_tx,
            source: Arc::clone(&self.source),
            subscription_ids,
            thread: Mutex::new(Some(thread)),
        })
    }
}

// --- Handle ---

/// State shared between a handle and its delivery thread.
///
/// Lock order: `listeners` before `latest`. `latest` is never held while
/// a listener runs, so listeners may read their own handle.
#[derive(Default)]
struct Shared {
    closed: AtomicBool,
    listeners: Mutex<Vec<Listener>>,
    latest: Mutex<Option<DashboardUpdate>>,
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn publish(&self, update: DashboardUpdate) {
        let mut listeners = self.listeners.lock();
        if self.is_closed() {
            return;
        }
        *self.latest.lock() = Some(update.clone());

        let before = listeners.len();
        listeners.retain_mut(|listener| listener(&update));
        if listeners.len() < before {
            debug!(pruned = before - listeners.len(), "dropped closed listeners");
        }
    }

    fn latest(&self) -> Option<DashboardUpdate> {
        self.latest.lock().clone()
    }
}

enum Control {
    Refresh,
    Shutdown,
}

/// A live dashboard for one viewer.
///
/// Listeners run on the delivery thread. They may read the handle but must
/// not register further listeners from inside the callback.
pub struct DashboardHandle {
    viewer: Viewer,
    shared: Arc<Shared>,
    control: Sender<Control>,
    source: Arc<dyn EventSource>,
    subscription_ids: Vec<SubscriptionId>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl DashboardHandle {
    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    /// Register a callback for every recomputation. If an update has
    /// already been published, the callback receives it immediately.
    pub fn on_update<F>(&self, listener: F) -> Result<()>
    where
        F: Fn(&DashboardUpdate) + Send + 'static,
    {
        self.add_listener(Box::new(move |update: &DashboardUpdate| {
            listener(update);
            true
        }))
    }

    /// Channel of updates, starting with the latest one. The channel is
    /// released after its receiver is dropped.
    pub fn updates(&self) -> Result<Receiver<DashboardUpdate>> {
        let (tx, rx) = unbounded();
        self.add_listener(Box::new(move |update: &DashboardUpdate| {
            tx.send(update.clone()).is_ok()
        }))?;
        Ok(rx)
    }

    fn add_listener(&self, mut listener: Listener) -> Result<()> {
        if self.is_closed() {
            return Err(BoardError::Closed);
        }
        // Held across replay so no update is missed or seen twice.
        let mut listeners = self.shared.listeners.lock();
        let keep = match self.shared.latest() {
            Some(latest) => listener(&latest),
            None => true,
        };
        if keep {
            listeners.push(listener);
        }
        Ok(())
    }

    /// Most recently published update.
    pub fn latest(&self) -> Option<DashboardUpdate> {
        self.shared.latest()
    }

    pub fn is_fully_loaded(&self) -> bool {
        self.shared
            .latest
            .lock()
            .as_ref()
            .is_some_and(|update| update.fully_loaded)
    }

    #[cfg(test)]
    fn listener_count(&self) -> usize {
        self.shared.listeners.lock().len()
    }

    /// Ask for a re-projection against the current time. Publishes only if
    /// a view changed.
    pub fn refresh(&self) -> Result<()> {
        if self.is_closed() {
            return Err(BoardError::Closed);
        }
        // A full queue already has a wake-up pending.
        let _ = self.control.try_send(Control::Refresh);
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Cancel every query and stop the delivery thread. Safe to call more
    /// than once.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let _ = self.control.try_send(Control::Shutdown);
        for id in &self.subscription_ids {
            self.source.unsubscribe(*id);
        }

        if let Some(thread) = self.thread.lock().take() {
            // Closing from a listener runs on the delivery thread itself.
            if thread.thread().id() != thread::current().id() && thread.join().is_err() {
                warn!("delivery thread panicked");
            }
        }

        info!(attendee = %self.viewer.attendee_id, "dashboard closed");
    }
}

impl Drop for DashboardHandle {
    fn drop(&mut self) {
        self.close();
    }
}

// --- Delivery loop ---

struct Feed {
    kind: SourceKind,
    subscription: SourceSubscription,
    /// False once the subscription dropped or disconnected.
    open: bool,
}

enum Target {
    Control,
    Tick,
    Feed(usize),
}

enum Wake {
    Shutdown,
    Reproject,
    Delivery(usize, std::result::Result<SourceEvent, RecvError>),
}

/// Single-threaded owner of the merged collection. Each wake-up is handled
/// to completion before the next one is taken.
struct DeliveryLoop {
    viewer: Viewer,
    feeds: Vec<Feed>,
    store: EntityStore,
    tracker: CompletionTracker,
    clock: Arc<dyn Clock>,
    shared: Arc<Shared>,
    control: Receiver<Control>,
    ticker: Receiver<Instant>,
    revision: u64,
    last_views: Option<RoleViews>,
}

impl DeliveryLoop {
    fn run(mut self) {
        debug!(attendee = %self.viewer.attendee_id, "delivery loop started");
        self.recompute(0);

        loop {
            if self.shared.is_closed() {
                break;
            }
            let wake = self.wait();
            // Anything that arrives after close is discarded.
            if self.shared.is_closed() {
                break;
            }
            match wake {
                Wake::Shutdown => break,
                Wake::Reproject => self.reproject_if_changed(),
                Wake::Delivery(slot, received) => self.handle(slot, received),
            }
        }

        debug!(attendee = %self.viewer.attendee_id, "delivery loop stopped");
    }

    fn wait(&self) -> Wake {
        let mut sel = Select::new();
        let mut targets = Vec::with_capacity(self.feeds.len() + 2);

        sel.recv(&self.control);
        targets.push(Target::Control);
        sel.recv(&self.ticker);
        targets.push(Target::Tick);
        for (slot, feed) in self.feeds.iter().enumerate() {
            if feed.open {
                sel.recv(&feed.subscription.receiver);
                targets.push(Target::Feed(slot));
            }
        }

        let op = sel.select();
        match targets[op.index()] {
            Target::Control => match op.recv(&self.control) {
                Ok(Control::Refresh) => Wake::Reproject,
                Ok(Control::Shutdown) | Err(_) => Wake::Shutdown,
            },
            Target::Tick => {
                let _ = op.recv(&self.ticker);
                Wake::Reproject
            }
            Target::Feed(slot) => {
                let received = op.recv(&self.feeds[slot].subscription.receiver);
                Wake::Delivery(slot, received)
            }
        }
    }

    fn handle(&mut self, slot: usize, received: std::result::Result<SourceEvent, RecvError>) {
        let kind = self.feeds[slot].kind;
        let mut rejected = 0;

        match received {
            Ok(SourceEvent::Snapshot { documents }) => {
                let mut events = Vec::with_capacity(documents.len());
                for document in &documents {
                    match Event::from_document(document) {
                        Ok(event) => events.push(event),
                        Err(e) => {
                            warn!(?kind, error = %e, "skipping malformed document");
                            rejected += 1;
                        }
                    }
                }

                let stats = self.store.apply_snapshot(kind, events);
                debug!(
                    ?kind,
                    upserted = stats.upserted,
                    evicted = stats.evicted,
                    rejected,
                    "applied delivery"
                );
                self.tracker.record_delivery(kind);
            }
            Ok(SourceEvent::Failed { error }) => {
                warn!(?kind, %error, "dashboard query failed");
                self.tracker.record_failure(kind, error);
            }
            Ok(SourceEvent::Dropped { reason }) => {
                warn!(?kind, ?reason, "dashboard query dropped");
                self.feeds[slot].open = false;
                self.tracker
                    .record_failure(kind, format!("subscription dropped: {:?}", reason));
            }
            Err(_) => {
                warn!(?kind, "dashboard query disconnected");
                self.feeds[slot].open = false;
                self.tracker.record_failure(kind, "subscription disconnected");
            }
        }

        self.recompute(rejected);
    }

    fn project_now(&self) -> RoleViews {
        project(
            self.store.snapshot().values(),
            &self.viewer,
            self.clock.now(),
        )
    }

    /// Project and publish unconditionally.
    fn recompute(&mut self, rejected: usize) {
        let views = self.project_now();
        self.publish(views, rejected);
    }

    /// Project against the current time; publish only on change.
    fn reproject_if_changed(&mut self) {
        let views = self.project_now();
        if self.last_views.as_ref() != Some(&views) {
            self.publish(views, 0);
        }
    }

    fn publish(&mut self, views: RoleViews, rejected: usize) {
        self.revision += 1;
        self.last_views = Some(views.clone());

        self.shared.publish(DashboardUpdate {
            revision: self.revision,
            fully_loaded: self.tracker.is_fully_loaded(),
            views,
            merged: self.store.len(),
            sources: self.tracker.states().to_vec(),
            rejected,
        });
    }
}

// --- Session ---

/// Keeps at most one dashboard open, following the current viewer.
pub struct DashboardSession {
    aggregator: Aggregator,
    current: Option<DashboardHandle>,
}

impl DashboardSession {
    pub fn new(aggregator: Aggregator) -> Self {
        Self {
            aggregator,
            current: None,
        }
    }

    /// Switch to a new viewer (or none). The previous dashboard is closed
    /// before the next one opens; the same viewer keeps its dashboard.
    pub fn set_viewer(&mut self, viewer: Option<Viewer>) -> Result<Option<&DashboardHandle>> {
        let unchanged = match (&self.current, &viewer) {
            (Some(handle), Some(next)) => handle.viewer() == next,
            (None, None) => true,
            _ => false,
        };

        if !unchanged {
            if let Some(previous) = self.current.take() {
                previous.close();
            }
            if let Some(next) = viewer {
                self.current = Some(self.aggregator.open(next)?);
            }
        }

        Ok(self.current.as_ref())
    }

    pub fn handle(&self) -> Option<&DashboardHandle> {
        self.current.as_ref()
    }

    pub fn close(&mut self) {
        if let Some(handle) = self.current.take() {
            handle.close();
        }
    }
}
