//! End-to-end tests for the tracker pipeline
//!
//! Every tracker here runs against an in-process transport, a static host
//! environment and a manual clock; nothing touches the network or the
//! user's state directory.

mod support;

use std::sync::Arc;

use pagepulse_core::store::QUEUE_KEY;
use pagepulse_core::{
    Error, EventOptions, FlushOutcome, MemoryStore, PageviewOptions, QueuedEvent, SkipReason,
    SqliteStore, Store, Tracker, TrackerConfig,
};
use support::{config, harness, harness_with_store, labels, wait_for, MockTransport};
use tempfile::TempDir;

fn spawn_flush(tracker: &Tracker) -> tokio::task::JoinHandle<FlushOutcome> {
    let tracker = tracker.clone();
    tokio::spawn(async move { tracker.flush(false).await })
}

// ============================================
// Batching and delivery
// ============================================

#[tokio::test]
async fn test_reaching_batch_size_flushes_in_order() {
    let h = harness(TrackerConfig {
        batch_size: 2,
        ..config("s1")
    });

    h.tracker
        .track_pageview(PageviewOptions::path("/a"))
        .unwrap();
    h.tracker.track_event(EventOptions::new("click")).unwrap();

    assert!(wait_for(|| h.transport.delivered().len() == 1).await);

    let batch = &h.transport.delivered()[0];
    assert_eq!(batch.site_id, "s1");
    assert_eq!(batch.user_id, h.tracker.user_id());
    assert_eq!(batch.session_id, h.tracker.session().id);
    assert_eq!(batch.common_params.domain, "shop.example.com");
    assert_eq!(labels(&batch.events), vec!["/a", "click"]);
    assert!(matches!(batch.events[0], QueuedEvent::Pageview(_)));
    assert!(batch.events[0].timestamp() <= batch.events[1].timestamp());

    let status = h.tracker.queue_status();
    assert_eq!(status.queue_length, 0);
    assert_eq!(status.delivery.batches_sent, 1);
    assert_eq!(status.delivery.events_sent, 2);
}

#[tokio::test]
async fn test_third_event_triggers_send_without_timer() {
    let h = harness(TrackerConfig {
        batch_size: 3,
        ..config("s1")
    });

    h.tracker.track_event(EventOptions::new("a")).unwrap();
    h.tracker.track_event(EventOptions::new("b")).unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(h.transport.attempts(), 0);

    h.tracker.track_event(EventOptions::new("c")).unwrap();
    assert!(wait_for(|| h.transport.delivered().len() == 1).await);
    assert_eq!(labels(&h.transport.delivered()[0].events), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_concurrent_flushes_send_once() {
    let h = harness(TrackerConfig {
        manual_flush: true,
        ..config("s1")
    });
    h.tracker.track_event(EventOptions::new("only")).unwrap();

    h.transport.hold();
    let handles: Vec<_> = (0..4).map(|_| spawn_flush(&h.tracker)).collect();
    assert!(wait_for(|| h.transport.attempts() == 1).await);

    // Give every spawned flush a chance to run while the send is held
    assert!(wait_for(|| handles.iter().filter(|handle| handle.is_finished()).count() == 3).await);
    h.transport.release();

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap());
    }
    let sent = outcomes
        .iter()
        .filter(|o| matches!(o, FlushOutcome::Sent { .. }))
        .count();
    let in_flight = outcomes
        .iter()
        .filter(|o| **o == FlushOutcome::Skipped(SkipReason::InFlight))
        .count();
    assert_eq!(sent, 1);
    assert_eq!(in_flight, 3);
    assert_eq!(h.transport.attempts(), 1);
    assert_eq!(h.transport.max_concurrent(), 1);
}

#[tokio::test]
async fn test_below_batch_size_stays_queued() {
    let h = harness(config("s1"));

    h.tracker.track_event(EventOptions::new("one")).unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert_eq!(h.transport.attempts(), 0);
    assert_eq!(h.tracker.queue_status().queue_length, 1);
}

#[tokio::test]
async fn test_pageview_defaults_come_from_host_page() {
    let h = harness(TrackerConfig {
        manual_flush: true,
        ..config("s1")
    });
    h.environment.set_path("/docs/start");

    h.tracker
        .track_pageview(PageviewOptions::default().virtual_pageview())
        .unwrap();

    let status = h.tracker.queue_status();
    let QueuedEvent::Pageview(pv) = &status.events[0] else {
        panic!("expected a pageview");
    };
    assert_eq!(pv.path, "/docs/start");
    assert_eq!(pv.title, "Test page");
    assert_eq!(pv.language, "en-US");
    assert!(pv.is_virtual);
}

#[tokio::test(start_paused = true)]
async fn test_flush_timer_delivers_in_auto_mode() {
    let h = harness(TrackerConfig {
        flush_interval_ms: 1_000,
        ..config("s1")
    });

    h.tracker.track_event(EventOptions::new("tick")).unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(1_500)).await;

    assert!(wait_for(|| h.transport.delivered().len() == 1).await);
    assert_eq!(h.tracker.queue_status().queue_length, 0);
}

// ============================================
// Failure and concurrency
// ============================================

#[tokio::test]
async fn test_failed_batch_goes_back_in_front() {
    let h = harness(TrackerConfig {
        manual_flush: true,
        ..config("s1")
    });
    h.tracker.track_event(EventOptions::new("b1")).unwrap();
    h.tracker.track_event(EventOptions::new("b2")).unwrap();

    h.transport.set_failing(true);
    h.transport.hold();
    let flush = spawn_flush(&h.tracker);
    assert!(wait_for(|| h.transport.attempts() == 1).await);

    // Queued while the first batch is out
    h.tracker.track_event(EventOptions::new("c1")).unwrap();
    assert_eq!(labels(&h.tracker.queue_status().events), vec!["c1"]);

    h.transport.release();
    assert_eq!(flush.await.unwrap(), FlushOutcome::Requeued { events: 2 });
    assert_eq!(
        labels(&h.tracker.queue_status().events),
        vec!["b1", "b2", "c1"]
    );
    assert_eq!(h.tracker.queue_status().delivery.failed_attempts, 1);

    h.transport.set_failing(false);
    assert_eq!(
        h.tracker.flush(false).await,
        FlushOutcome::Sent { events: 3 }
    );
    assert_eq!(
        labels(&h.transport.delivered()[0].events),
        vec!["b1", "b2", "c1"]
    );
}

#[tokio::test]
async fn test_at_most_one_batch_in_flight() {
    let h = harness(TrackerConfig {
        manual_flush: true,
        ..config("s1")
    });
    h.tracker.track_event(EventOptions::new("first")).unwrap();

    h.transport.hold();
    let flush = spawn_flush(&h.tracker);
    assert!(wait_for(|| h.transport.attempts() == 1).await);
    assert!(h.tracker.queue_status().flush_in_flight);

    h.tracker.track_event(EventOptions::new("second")).unwrap();
    assert_eq!(
        h.tracker.flush(false).await,
        FlushOutcome::Skipped(SkipReason::InFlight)
    );

    h.transport.release();
    assert_eq!(flush.await.unwrap(), FlushOutcome::Sent { events: 1 });
    assert!(!h.tracker.queue_status().flush_in_flight);

    assert_eq!(
        h.tracker.flush(false).await,
        FlushOutcome::Sent { events: 1 }
    );
    assert_eq!(h.transport.max_concurrent(), 1);
}

#[tokio::test]
async fn test_switching_to_manual_does_not_cancel_timer_send() {
    let h = harness(TrackerConfig {
        flush_interval_ms: 50,
        ..config("s1")
    });
    h.tracker.track_event(EventOptions::new("timed")).unwrap();

    h.transport.hold();
    assert!(wait_for(|| h.transport.attempts() == 1).await);

    h.tracker.set_manual_flush(true).unwrap();
    h.transport.release();

    assert!(wait_for(|| h.transport.delivered().len() == 1).await);
    assert_eq!(labels(&h.transport.delivered()[0].events), vec!["timed"]);
    assert!(!h.tracker.queue_status().flush_in_flight);
}

#[tokio::test]
async fn test_switching_to_manual_requeues_failed_timer_send() {
    let h = harness(TrackerConfig {
        flush_interval_ms: 50,
        ..config("s1")
    });
    h.tracker.track_event(EventOptions::new("timed")).unwrap();

    h.transport.set_failing(true);
    h.transport.hold();
    assert!(wait_for(|| h.transport.attempts() == 1).await);

    h.tracker.set_manual_flush(true).unwrap();
    h.transport.release();

    assert!(wait_for(|| h.tracker.queue_status().delivery.failed_attempts == 1).await);
    assert_eq!(labels(&h.tracker.queue_status().events), vec!["timed"]);
}

#[tokio::test]
async fn test_cleanup_does_not_cancel_timer_send() {
    let h = harness(TrackerConfig {
        flush_interval_ms: 50,
        ..config("s1")
    });
    h.tracker.track_event(EventOptions::new("timed")).unwrap();

    h.transport.hold();
    assert!(wait_for(|| h.transport.attempts() == 1).await);

    // The batch is already out, so the unloading flush has nothing to add
    assert_eq!(
        h.tracker.cleanup(),
        FlushOutcome::Skipped(SkipReason::InFlight)
    );
    h.transport.release();

    assert!(wait_for(|| h.transport.delivered().len() == 1).await);
    assert_eq!(labels(&h.transport.delivered()[0].events), vec!["timed"]);
    assert!(h.transport.beacons().is_empty());
}

#[tokio::test]
async fn test_flush_after_cleanup_is_skipped() {
    let h = harness(TrackerConfig {
        manual_flush: true,
        ..config("s1")
    });
    h.tracker.track_event(EventOptions::new("held")).unwrap();

    h.transport.set_failing(true);
    h.transport.hold();
    let flush = spawn_flush(&h.tracker);
    assert!(wait_for(|| h.transport.attempts() == 1).await);

    h.tracker.cleanup();
    h.transport.release();
    assert_eq!(flush.await.unwrap(), FlushOutcome::Requeued { events: 1 });

    // The failed batch stays queued for the next run, not for this tracker
    h.transport.set_failing(false);
    assert_eq!(
        h.tracker.flush(false).await,
        FlushOutcome::Skipped(SkipReason::Closed)
    );
    assert_eq!(
        h.tracker.flush(true).await,
        FlushOutcome::Skipped(SkipReason::Closed)
    );
    assert_eq!(
        h.tracker.cleanup(),
        FlushOutcome::Skipped(SkipReason::Closed)
    );
    assert!(h.transport.delivered().is_empty());
    assert_eq!(h.tracker.queue_status().queue_length, 1);
}

#[tokio::test]
async fn test_empty_queue_is_not_sent() {
    let h = harness(config("s1"));
    assert_eq!(
        h.tracker.flush(false).await,
        FlushOutcome::Skipped(SkipReason::Empty)
    );
    h.tracker.flush_events().await.unwrap();
    assert_eq!(h.transport.attempts(), 0);
}

// ============================================
// Connectivity and flush mode
// ============================================

#[tokio::test]
async fn test_offline_holds_queue_until_restored() {
    let h = harness_with_store(config("s1"), Arc::new(MemoryStore::new()), false);
    h.tracker.track_event(EventOptions::new("queued")).unwrap();

    assert_eq!(
        h.tracker.flush(false).await,
        FlushOutcome::Skipped(SkipReason::Offline)
    );
    assert!(!h.tracker.queue_status().is_online);

    h.tracker.set_online(true);
    assert!(wait_for(|| h.transport.delivered().len() == 1).await);
    assert!(h.tracker.queue_status().is_online);
}

#[tokio::test]
async fn test_restore_in_manual_mode_does_not_flush() {
    let h = harness_with_store(
        TrackerConfig {
            manual_flush: true,
            ..config("s1")
        },
        Arc::new(MemoryStore::new()),
        false,
    );
    h.tracker.track_event(EventOptions::new("queued")).unwrap();

    h.tracker.set_online(true);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert_eq!(h.transport.attempts(), 0);
    assert_eq!(h.tracker.queue_status().queue_length, 1);
}

#[tokio::test]
async fn test_manual_mode_waits_for_switch_back() {
    let h = harness(TrackerConfig {
        manual_flush: true,
        batch_size: 2,
        ..config("s1")
    });
    for name in ["a", "b", "c"] {
        h.tracker.track_event(EventOptions::new(name)).unwrap();
    }
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(h.transport.attempts(), 0);
    assert!(h.tracker.queue_status().manual_flush);

    h.tracker.set_manual_flush(false).unwrap();
    assert!(wait_for(|| h.transport.delivered().len() == 1).await);
    assert_eq!(labels(&h.transport.delivered()[0].events), vec!["a", "b", "c"]);
    assert!(!h.tracker.queue_status().manual_flush);
}

// ============================================
// Persistence
// ============================================

#[tokio::test]
async fn test_queue_and_session_survive_restart() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("state.db");
    let manual = TrackerConfig {
        manual_flush: true,
        ..config("s1")
    };

    let (user_id, session_id) = {
        let store = Arc::new(SqliteStore::open(&db_path).unwrap());
        let h = harness_with_store(manual.clone(), store, true);
        h.tracker
            .track_pageview(PageviewOptions::path("/landing"))
            .unwrap();
        h.tracker.track_event(EventOptions::new("cta")).unwrap();
        (h.tracker.user_id().to_string(), h.tracker.session().id)
    };

    let store = Arc::new(SqliteStore::open(&db_path).unwrap());
    let h = harness_with_store(manual.clone(), store, true);
    assert_eq!(h.tracker.user_id(), user_id);
    assert_eq!(h.tracker.session().id, session_id);
    assert_eq!(
        labels(&h.tracker.queue_status().events),
        vec!["/landing", "cta"]
    );

    assert_eq!(
        h.tracker.flush(false).await,
        FlushOutcome::Sent { events: 2 }
    );
    drop(h);

    // A delivered batch is not restored again
    let store = Arc::new(SqliteStore::open(&db_path).unwrap());
    let h = harness_with_store(manual, store, true);
    assert_eq!(h.tracker.queue_status().queue_length, 0);
}

#[tokio::test]
async fn test_offline_tracking_disabled_drops_old_mirror() {
    let store = Arc::new(MemoryStore::new());
    store
        .set(
            QUEUE_KEY,
            r#"[{"type":"event","eventName":"stale","timestamp":1}]"#,
        )
        .unwrap();

    let h = harness_with_store(
        TrackerConfig {
            manual_flush: true,
            enable_offline_tracking: false,
            ..config("s1")
        },
        store.clone(),
        true,
    );

    assert_eq!(h.tracker.queue_status().queue_length, 0);
    assert_eq!(store.get(QUEUE_KEY).unwrap(), None);

    h.tracker.track_event(EventOptions::new("fresh")).unwrap();
    assert_eq!(store.get(QUEUE_KEY).unwrap(), None);
}

// ============================================
// Sessions and sampling
// ============================================

#[tokio::test]
async fn test_session_rolls_over_after_inactivity() {
    let h = harness(TrackerConfig {
        manual_flush: true,
        ..config("s1")
    });

    h.tracker
        .track_pageview(PageviewOptions::path("/a"))
        .unwrap();
    let first = h.tracker.session();
    assert_eq!(first.pageview_count, 1);

    h.clock.advance(chrono::Duration::minutes(29));
    h.tracker.track_event(EventOptions::new("still-here")).unwrap();
    let same = h.tracker.session();
    assert_eq!(same.id, first.id);
    assert_eq!(same.event_count, 1);

    h.clock.advance(chrono::Duration::minutes(31));
    h.tracker.track_event(EventOptions::new("back")).unwrap();
    let next = h.tracker.session();
    assert_ne!(next.id, first.id);
    assert_eq!(next.pageview_count, 0);
    assert_eq!(next.event_count, 1);
    assert!(next.last_activity >= next.start_time);
}

#[tokio::test]
async fn test_activity_keeps_session_alive() {
    let h = harness(TrackerConfig {
        manual_flush: true,
        ..config("s1")
    });
    let first = h.tracker.session();

    h.clock.advance(chrono::Duration::minutes(20));
    h.tracker.record_activity().unwrap();
    h.clock.advance(chrono::Duration::minutes(20));
    h.tracker.check_session();
    assert_eq!(h.tracker.session().id, first.id);

    h.clock.advance(chrono::Duration::minutes(31));
    h.tracker.check_session();
    assert_ne!(h.tracker.session().id, first.id);
}

#[tokio::test]
async fn test_zero_sampling_drops_everything() {
    let h = harness(TrackerConfig {
        sampling_rate: 0,
        batch_size: 1,
        ..config("s1")
    });

    for _ in 0..5 {
        h.tracker.track_event(EventOptions::new("dropped")).unwrap();
    }

    let status = h.tracker.queue_status();
    assert_eq!(status.queue_length, 0);
    assert_eq!(status.sampled_out, 5);
    assert_eq!(h.tracker.session().event_count, 0);
    assert_eq!(h.transport.attempts(), 0);
}

// ============================================
// Construction and teardown
// ============================================

#[tokio::test]
async fn test_auto_track_queues_initial_pageview() {
    let h = harness(TrackerConfig {
        auto_track: true,
        manual_flush: true,
        ..config("s1")
    });

    let status = h.tracker.queue_status();
    assert_eq!(labels(&status.events), vec!["/home"]);
    assert_eq!(h.tracker.session().pageview_count, 1);
}

#[tokio::test]
async fn test_blank_event_name_is_rejected() {
    let h = harness(config("s1"));
    let err = h.tracker.track_event(EventOptions::new("  ")).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert_eq!(h.tracker.queue_status().queue_length, 0);
}

#[test]
fn test_build_outside_runtime_fails() {
    let result = Tracker::builder(config("s1"))
        .store(Arc::new(MemoryStore::new()))
        .transport(MockTransport::new())
        .build();
    assert!(matches!(result, Err(Error::Runtime(_))));
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let result = Tracker::builder(TrackerConfig {
        sampling_rate: 101,
        ..config("s1")
    })
    .store(Arc::new(MemoryStore::new()))
    .transport(MockTransport::new())
    .build();
    assert!(matches!(result, Err(Error::Config(_))));
}

#[tokio::test]
async fn test_cleanup_sends_unload_batch_even_offline() {
    let h = harness_with_store(config("s1"), Arc::new(MemoryStore::new()), false);
    h.tracker.track_event(EventOptions::new("last")).unwrap();

    assert_eq!(
        h.tracker.cleanup(),
        FlushOutcome::Dispatched {
            events: 1,
            queued: true
        }
    );
    assert_eq!(labels(&h.transport.beacons()[0].events), vec!["last"]);
    assert_eq!(h.transport.attempts(), 0);

    assert!(h.tracker.is_closed());
    assert!(matches!(
        h.tracker.track_event(EventOptions::new("late")),
        Err(Error::Closed)
    ));
    assert!(matches!(h.tracker.flush_events().await, Err(Error::Closed)));
    assert_eq!(h.tracker.queue_status().delivery.beacons_dispatched, 1);
}
