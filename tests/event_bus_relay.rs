// Page channel behavior as seen by independent controls
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use chrono::{TimeZone, Utc};

use pcf_samples::event_bus::{
    ChannelState, DIAGNOSTIC_ATTRIBUTE, NotificationPayload, PageContext,
};

fn scenario_payload() -> NotificationPayload {
    NotificationPayload::at(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        "hi",
        "x",
        "A",
    )
}

fn counter() -> (Arc<AtomicUsize>, impl Fn(&NotificationPayload) -> anyhow::Result<()>) {
    let count = Arc::new(AtomicUsize::new(0));
    let count_clone = count.clone();
    (count, move |_: &NotificationPayload| {
        count_clone.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
}

#[test]
fn test_every_lookup_returns_the_same_channel() {
    let page = PageContext::default();
    let channels: Vec<_> = (0..5).map(|_| page.ensure_channel()).collect();

    assert!(channels.iter().all(|c| c.ptr_eq(&channels[0])));
    assert_eq!(page.channels_created(), 1);
}

#[test]
fn test_first_lookup_creates_and_tags_second_does_not_retag() {
    let page = PageContext::default();
    assert_eq!(page.state(), ChannelState::NotCreated);

    let first = page.ensure_channel();
    assert_eq!(page.state(), ChannelState::Created);
    assert_eq!(first.attribute(DIAGNOSTIC_ATTRIBUTE).as_deref(), Some("true"));

    first.set_attribute(DIAGNOSTIC_ATTRIBUTE, "seen");
    let second = page.ensure_channel();
    assert!(second.ptr_eq(&first));
    assert_eq!(second.attribute(DIAGNOSTIC_ATTRIBUTE).as_deref(), Some("seen"));
}

#[test]
fn test_subscribers_called_once_each_in_registration_order() {
    let channel = PageContext::default().ensure_channel();
    let order = Arc::new(Mutex::new(Vec::new()));

    let subscriptions: Vec<_> = (0..5)
        .map(|i| {
            let order = order.clone();
            channel.subscribe(move |_| {
                order.lock().unwrap().push(i);
                Ok(())
            })
        })
        .collect();

    let report = channel.publish(scenario_payload());

    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    assert_eq!(report.delivered, 5);
    assert!(report.is_clean());
    drop(subscriptions);
}

#[test]
fn test_disposed_subscriber_is_not_called() {
    let channel = PageContext::default().ensure_channel();
    let (kept, kept_handler) = counter();
    let (gone, gone_handler) = counter();

    let _kept = channel.subscribe(kept_handler);
    channel.subscribe(gone_handler).dispose();

    channel.publish(scenario_payload());

    assert_eq!(kept.load(Ordering::SeqCst), 1);
    assert_eq!(gone.load(Ordering::SeqCst), 0);
    assert_eq!(channel.subscriber_count(), 1);
}

#[test]
fn test_detached_subscriber_lives_for_the_channel() {
    let channel = PageContext::default().ensure_channel();
    let (count, handler) = counter();

    channel.subscribe(handler).detach();
    channel.publish(scenario_payload());
    channel.publish(scenario_payload());

    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[test]
fn test_two_controls_scenario() {
    let page = PageContext::default();

    // Control B ignores its own id, control A does not filter at all
    let (b_count, b_handler) = counter();
    let _b = page
        .ensure_channel()
        .subscribe_excluding_source("B", b_handler);

    let a_seen = Arc::new(Mutex::new(Vec::new()));
    let a_seen_clone = a_seen.clone();
    let _a = page.ensure_channel().subscribe(move |payload| {
        a_seen_clone.lock().unwrap().push(payload.clone());
        Ok(())
    });

    page.ensure_channel().publish(scenario_payload());

    assert_eq!(b_count.load(Ordering::SeqCst), 1);
    let a_seen = a_seen.lock().unwrap();
    assert_eq!(a_seen.len(), 1);
    assert_eq!(a_seen[0].source_component, "A");
    assert_eq!(a_seen[0].timestamp_iso(), "2024-01-01T00:00:00.000Z");
}

#[test]
fn test_self_filtering_is_opt_in() {
    let channel = PageContext::default().ensure_channel();

    let (unfiltered, unfiltered_handler) = counter();
    let (filtered, filtered_handler) = counter();
    let _unfiltered = channel.subscribe(unfiltered_handler);
    let _filtered = channel.subscribe_excluding_source("A", filtered_handler);

    // Published by A: only the unfiltered listener hears its own message
    channel.publish(scenario_payload());

    assert_eq!(unfiltered.load(Ordering::SeqCst), 1);
    assert_eq!(filtered.load(Ordering::SeqCst), 0);
}

#[test]
fn test_failing_listener_does_not_block_others() {
    let channel = PageContext::default().ensure_channel();
    let (count, handler) = counter();

    let _bad = channel.subscribe(|_| anyhow::bail!("render failed"));
    let _panics = channel.subscribe(|_| panic!("listener bug"));
    let _good = channel.subscribe(handler);

    let report = channel.publish(scenario_payload());

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(report.failures.len(), 2);
    assert_eq!(report.delivered, 3);
    assert_eq!(channel.stats().handler_failures, 2);
}

#[test]
fn test_listener_may_publish_within_depth_limit() {
    let page = PageContext::default();
    let channel = page.ensure_channel();
    let echoes = Arc::new(AtomicUsize::new(0));

    let echo_channel = channel.clone();
    let echoes_clone = echoes.clone();
    let _echo = channel.subscribe(move |payload| {
        echoes_clone.fetch_add(1, Ordering::SeqCst);
        // Re-publishing forever is cut off by the depth limit
        echo_channel.publish(payload.clone());
        Ok(())
    });

    let report = channel.publish(scenario_payload());

    assert!(report.is_clean());
    assert_eq!(echoes.load(Ordering::SeqCst), page.config().max_dispatch_depth);
    assert_eq!(channel.stats().rejected_dispatches, 1);
}

#[test]
fn test_payload_wire_shape() {
    let value = serde_json::to_value(scenario_payload()).unwrap();
    assert_eq!(
        value,
        serde_json::json!({
            "message": "hi",
            "timestamp": "2024-01-01T00:00:00Z",
            "componentType": "x",
            "sourceComponent": "A"
        })
    );
}
