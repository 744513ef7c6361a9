//! End-to-end dashboard tests.

use crossbeam_channel::Receiver;
use eventboard::{
    Aggregator, AggregatorConfig, DashboardHandle, DashboardUpdate, Document, Event, EventId,
    EventSource, ManualClock, ManualSource, MemorySource, Predicate, RegisterOutcome, Registrar,
    Role, SourceKind, SourceStatus, Timestamp, Viewer,
};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(2);

fn viewer() -> Viewer {
    Viewer::new("a@x.edu", "uid-a").unwrap()
}

fn make_event(
    id: &str,
    host: &str,
    committee: &[&str],
    attendees: &[&str],
    date: Timestamp,
) -> Event {
    Event {
        id: EventId::from(id),
        name: format!("Event {}", id),
        description: "An event on campus".into(),
        date,
        venue: "Main Auditorium".into(),
        image: String::new(),
        image_hint: String::new(),
        host_id: host.into(),
        organizing_committee: committee.iter().map(|s| s.to_string()).collect(),
        attendees: attendees.iter().map(|s| s.to_string()).collect(),
        created_at: None,
    }
}

fn doc(id: &str, host: &str, attendees: &[&str], date: i64) -> Document {
    Document {
        id: id.into(),
        data: json!({
            "name": format!("Event {}", id),
            "date": date,
            "hostId": host,
            "attendees": attendees,
        }),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn future() -> Timestamp {
    Timestamp::now().plus(Duration::from_secs(30 * 24 * 3600))
}

fn past() -> Timestamp {
    Timestamp::now().minus(Duration::from_secs(30 * 24 * 3600))
}

fn wait_for<F>(rx: &Receiver<DashboardUpdate>, mut pred: F) -> DashboardUpdate
where
    F: FnMut(&DashboardUpdate) -> bool,
{
    let deadline = Instant::now() + WAIT;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(update) if pred(&update) => return update,
            Ok(_) => continue,
            Err(_) => panic!("timed out waiting for dashboard update"),
        }
    }
}

fn attending() -> Predicate {
    Predicate::AttendeesContain("a@x.edu".into())
}

fn hosting() -> Predicate {
    Predicate::HostEquals("uid-a".into())
}

fn committee() -> Predicate {
    Predicate::CommitteeContains("a@x.edu".into())
}

fn open_manual(source: &Arc<ManualSource>, clock: Option<ManualClock>) -> DashboardHandle {
    init_tracing();
    let dyn_source: Arc<dyn EventSource> = source.clone();
    let aggregator = Aggregator::new(dyn_source);
    let aggregator = match clock {
        Some(clock) => aggregator.with_clock(clock),
        None => aggregator,
    };
    aggregator.open(viewer()).unwrap()
}

// --- Merging ---

#[test]
fn test_three_query_merge_and_priority() {
    let source = Arc::new(ManualSource::new());
    let handle = open_manual(&source, None);
    let rx = handle.updates().unwrap();
    let when = future().0;

    source.deliver(
        &attending(),
        vec![
            doc("1", "uid-z", &["a@x.edu"], when),
            doc("2", "uid-a", &["a@x.edu"], when),
        ],
    );
    source.deliver(
        &hosting(),
        vec![doc("2", "uid-a", &["a@x.edu"], when), doc("3", "uid-z", &[], when)],
    );
    source.deliver(&committee(), vec![]);

    let update = wait_for(&rx, |u| u.fully_loaded && u.merged == 3);

    assert_eq!(update.views.ids(Role::Hosted), vec!["2"]);
    assert_eq!(update.views.ids(Role::Upcoming), vec!["1"]);
    assert!(update.views.attended.is_empty());
    assert!(update.views.organizing.is_empty());
    assert_eq!(update.views.role_of(&EventId::from("2")), Some(Role::Hosted));
}

#[test]
fn test_last_delivery_wins_per_event() {
    let source = Arc::new(ManualSource::new());
    let handle = open_manual(&source, None);
    let rx = handle.updates().unwrap();
    let when = future().0;

    let mut stale = doc("1", "uid-z", &["a@x.edu"], when);
    stale.data["name"] = json!("Old Name");
    let mut fresh = doc("1", "uid-z", &["a@x.edu"], when);
    fresh.data["name"] = json!("New Name");
    fresh.data["organizingCommittee"] = json!(["c@x.edu"]);

    source.deliver(&attending(), vec![stale]);
    wait_for(&rx, |u| u.views.upcoming.len() == 1);

    source.deliver(&committee(), vec![fresh]);
    let update = wait_for(&rx, |u| {
        u.views.upcoming.first().is_some_and(|e| e.name == "New Name")
    });
    assert_eq!(update.merged, 1);
}

#[test]
fn test_redelivery_is_idempotent() {
    let source = Arc::new(ManualSource::new());
    let handle = open_manual(&source, None);
    let rx = handle.updates().unwrap();
    let delivery = vec![
        doc("1", "uid-a", &[], future().0),
        doc("2", "uid-z", &["a@x.edu"], past().0),
    ];

    source.deliver(&hosting(), delivery.clone());
    let first = wait_for(&rx, |u| u.merged == 2);

    source.deliver(&hosting(), delivery);
    let second = wait_for(&rx, |u| u.revision > first.revision);

    assert_eq!(first.views, second.views);
    assert_eq!(first.merged, second.merged);
}

// --- Completion ---

#[test]
fn test_fully_loaded_waits_for_every_query() {
    let source = Arc::new(ManualSource::new());
    let handle = open_manual(&source, None);
    let rx = handle.updates().unwrap();

    source.deliver(&attending(), vec![]);
    let update = wait_for(&rx, |u| {
        u.status(SourceKind::Attending) == Some(&SourceStatus::Live)
    });
    assert!(!update.fully_loaded);

    source.fail(&hosting(), "index missing");
    let update = wait_for(&rx, |u| u.has_failures());
    assert!(!update.fully_loaded);

    source.deliver(&committee(), vec![]);
    let update = wait_for(&rx, |u| u.fully_loaded);
    assert!(handle.is_fully_loaded());
    assert!(update.has_failures());

    // Later errors never revert the loaded flag
    source.fail(&committee(), "stream reset");
    let update = wait_for(&rx, |u| {
        matches!(
            u.status(SourceKind::Committee),
            Some(SourceStatus::Failed { .. })
        )
    });
    assert!(update.fully_loaded);
}

// --- Time ---

#[test]
fn test_time_crossing_on_next_delivery() {
    let source = Arc::new(ManualSource::new());
    let clock = ManualClock::new(Timestamp(1_000));
    let handle = open_manual(&source, Some(clock.clone()));
    let rx = handle.updates().unwrap();

    source.deliver(&attending(), vec![doc("1", "uid-z", &["a@x.edu"], 2_000)]);
    let before = wait_for(&rx, |u| u.views.upcoming.len() == 1);

    clock.set(Timestamp(3_000));
    // No recomputation yet: the published views are unchanged.
    assert_eq!(handle.latest().unwrap().views, before.views);

    source.deliver(&committee(), vec![]);
    let after = wait_for(&rx, |u| u.revision > before.revision);
    assert!(after.views.upcoming.is_empty());
    assert_eq!(after.views.ids(Role::Attended), vec!["1"]);
}

#[test]
fn test_periodic_refresh_moves_events() {
    let source = Arc::new(ManualSource::new());
    let clock = ManualClock::new(Timestamp(1_000));
    let dyn_source: Arc<dyn EventSource> = source.clone();
    let handle = Aggregator::with_config(
        dyn_source,
        AggregatorConfig {
            refresh_interval: Some(Duration::from_millis(10)),
            ..Default::default()
        },
    )
    .with_clock(clock.clone())
    .open(viewer())
    .unwrap();
    let rx = handle.updates().unwrap();

    source.deliver(&attending(), vec![doc("1", "uid-z", &["a@x.edu"], 2_000)]);
    wait_for(&rx, |u| u.views.upcoming.len() == 1);

    clock.set(Timestamp(3_000));
    let update = wait_for(&rx, |u| u.views.attended.len() == 1);
    assert!(update.views.upcoming.is_empty());
}

// --- Registration through a live source ---

#[test]
fn test_registration_appears_once_after_redelivery() {
    init_tracing();
    let source = Arc::new(MemorySource::new());
    source.put(make_event("E", "uid-host", &[], &["b@x.edu"], future()));

    let handle = Aggregator::new(source.clone()).open(viewer()).unwrap();
    let rx = handle.updates().unwrap();
    let loaded = wait_for(&rx, |u| u.fully_loaded);
    assert_eq!(loaded.views.total(), 0);

    let registrar = Registrar::new(source.clone());
    assert_eq!(
        registrar.register(&EventId::from("E"), "a@x.edu"),
        RegisterOutcome::Registered
    );

    let update = wait_for(&rx, |u| !u.views.upcoming.is_empty());
    assert_eq!(update.views.ids(Role::Upcoming), vec!["E"]);
    assert_eq!(update.views.total(), 1);
    assert_eq!(update.merged, 1);
}

#[test]
fn test_register_twice_keeps_single_membership() {
    let source = Arc::new(MemorySource::new());
    source.put(make_event("E", "uid-host", &[], &["b@x.edu"], future()));
    let registrar = Registrar::new(source.clone());
    let id = EventId::from("E");

    assert_eq!(registrar.register(&id, "a@x.edu"), RegisterOutcome::Registered);
    assert_eq!(registrar.register(&id, "a@x.edu"), RegisterOutcome::AlreadyRegistered);

    let event = source.event(&id).unwrap();
    assert_eq!(event.attendees.iter().filter(|a| *a == "a@x.edu").count(), 1);
}

#[test]
fn test_full_dashboard_from_memory_source() {
    init_tracing();
    let source = Arc::new(MemorySource::new());
    source.put(make_event("hosted", "uid-a", &["a@x.edu"], &["a@x.edu"], future()));
    source.put(make_event("oc", "uid-z", &["a@x.edu"], &[], past()));
    source.put(make_event("next", "uid-z", &[], &["a@x.edu"], future()));
    source.put(make_event("done", "uid-z", &[], &["a@x.edu"], past()));
    source.put(make_event("other", "uid-z", &[], &["b@x.edu"], future()));

    let handle = Aggregator::new(source.clone()).open(viewer()).unwrap();
    let rx = handle.updates().unwrap();
    let update = wait_for(&rx, |u| u.fully_loaded && u.merged == 4);

    assert_eq!(update.views.ids(Role::Hosted), vec!["hosted"]);
    assert_eq!(update.views.ids(Role::Organizing), vec!["oc"]);
    assert_eq!(update.views.ids(Role::Upcoming), vec!["next"]);
    assert_eq!(update.views.ids(Role::Attended), vec!["done"]);
    assert_eq!(update.views.counts().hosted, 1);
    assert!(!update.has_failures());
}

// --- Eviction ---

#[test]
fn test_event_leaving_every_query_is_evicted() {
    let source = Arc::new(MemorySource::new());
    source.put(make_event("E", "uid-z", &["a@x.edu"], &["a@x.edu"], future()));

    let handle = Aggregator::new(source.clone()).open(viewer()).unwrap();
    let rx = handle.updates().unwrap();
    wait_for(&rx, |u| u.fully_loaded && u.views.organizing.len() == 1);

    // Still an attendee: stays, now under upcoming
    source.put(make_event("E", "uid-z", &[], &["a@x.edu"], future()));
    wait_for(&rx, |u| u.views.ids(Role::Upcoming) == vec!["E"]);

    // Gone from both queries
    source.put(make_event("E", "uid-z", &[], &[], future()));
    let update = wait_for(&rx, |u| u.merged == 0);
    assert_eq!(update.views.total(), 0);
}

#[test]
fn test_removed_event_is_evicted() {
    let source = Arc::new(MemorySource::new());
    source.put(make_event("E", "uid-a", &[], &[], future()));

    let handle = Aggregator::new(source.clone()).open(viewer()).unwrap();
    let rx = handle.updates().unwrap();
    wait_for(&rx, |u| u.views.hosted.len() == 1);

    assert!(source.remove(&EventId::from("E")));
    wait_for(&rx, |u| u.merged == 0 && u.views.hosted.is_empty());
}

// --- Lifecycle ---

#[test]
fn test_delivery_queued_before_close_is_never_applied() {
    let source = Arc::new(ManualSource::new());
    let handle = Arc::new(open_manual(&source, None));
    let rx = handle.updates().unwrap();

    source.deliver(&attending(), vec![doc("1", "uid-z", &["a@x.edu"], future().0)]);
    wait_for(&rx, |u| u.merged == 1);

    // Hold the delivery thread inside the next publish
    let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
    let (release_tx, release_rx) = crossbeam_channel::unbounded::<()>();
    handle
        .on_update(move |update: &DashboardUpdate| {
            if update.merged == 2 {
                let _ = entered_tx.send(());
                let _ = release_rx.recv();
            }
        })
        .unwrap();

    source.deliver(&hosting(), vec![doc("2", "uid-a", &[], future().0)]);
    entered_rx.recv_timeout(WAIT).unwrap();

    // Queued while the loop is busy, so it is only seen after close
    source.deliver(&committee(), vec![doc("3", "uid-z", &[], future().0)]);

    let closing = Arc::clone(&handle);
    let closer = std::thread::spawn(move || closing.close());
    let deadline = Instant::now() + WAIT;
    while !handle.is_closed() {
        assert!(Instant::now() < deadline, "close never started");
        std::thread::yield_now();
    }

    drop(release_tx);
    closer.join().unwrap();

    assert_eq!(source.subscription_count(), 0);
    assert_eq!(handle.latest().unwrap().merged, 2);
    assert!(rx.try_iter().all(|u| u.merged < 3));
}

#[test]
fn test_rejected_query_still_loads() {
    let source = Arc::new(ManualSource::new());
    source.reject(committee());
    let handle = open_manual(&source, None);
    let rx = handle.updates().unwrap();

    source.deliver(&attending(), vec![]);
    source.deliver(&hosting(), vec![doc("1", "uid-a", &[], future().0)]);

    let update = wait_for(&rx, |u| u.fully_loaded);
    assert!(matches!(
        update.status(SourceKind::Committee),
        Some(SourceStatus::Failed { .. })
    ));
    assert_eq!(update.views.ids(Role::Hosted), vec!["1"]);
    assert_eq!(source.subscription_count(), 2);
}

#[test]
fn test_source_shutdown_marks_queries_failed() {
    init_tracing();
    let source = Arc::new(MemorySource::new());
    source.put(make_event("E", "uid-a", &[], &[], future()));

    let handle = Aggregator::new(source.clone()).open(viewer()).unwrap();
    let rx = handle.updates().unwrap();
    wait_for(&rx, |u| u.fully_loaded);

    source.shutdown();
    let update = wait_for(&rx, |u| {
        SourceKind::ALL
            .iter()
            .all(|kind| matches!(u.status(*kind), Some(SourceStatus::Failed { .. })))
    });

    // Last known data survives the failure
    assert!(update.fully_loaded);
    assert_eq!(update.views.ids(Role::Hosted), vec!["E"]);
}

#[test]
fn test_malformed_document_counted() {
    let source = Arc::new(ManualSource::new());
    let handle = open_manual(&source, None);
    let rx = handle.updates().unwrap();

    let broken = Document {
        id: "bad".into(),
        data: json!({ "name": "No date", "hostId": "uid-a" }),
    };
    source.deliver(&hosting(), vec![broken, doc("ok", "uid-a", &[], future().0)]);

    let update = wait_for(&rx, |u| u.merged == 1);
    assert_eq!(update.rejected, 1);
    assert_eq!(update.views.ids(Role::Hosted), vec!["ok"]);
}

#[test]
fn test_listener_sees_updates_in_order() {
    let source = Arc::new(ManualSource::new());
    let handle = open_manual(&source, None);
    let (tx, rx) = crossbeam_channel::unbounded();

    handle
        .on_update(move |update: &DashboardUpdate| {
            let _ = tx.send(update.revision);
        })
        .unwrap();

    for kind_predicate in [attending(), hosting(), committee()] {
        source.deliver(&kind_predicate, vec![]);
    }

    let mut seen = Vec::new();
    while seen.len() < 4 {
        seen.push(rx.recv_timeout(WAIT).unwrap());
    }
    let mut sorted = seen.clone();
    sorted.sort();
    assert_eq!(seen, sorted);
    assert_eq!(*seen.last().unwrap(), 4);
}
