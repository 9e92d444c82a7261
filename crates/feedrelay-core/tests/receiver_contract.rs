//! Contract Test: Receiver Loop
//!
//! Constraints verified:
//! - Empty lines are never enqueued and never counted
//! - A registration failure skips the dial for that attempt, then retries after the fixed delay
//! - Dial failures retry forever at exactly the fixed delay
//! - No "connected" event is produced for a failed dial
//! - A full queue blocks the reader (back-pressure) without dropping messages

mod common;

use common::*;
use feedrelay_core::{AttemptOutcome, ReceiverState, RelayEvent, Role};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn empty_lines_are_discarded() {
    let dialer = Arc::new(ScriptedDialer::new());
    dialer.script(
        SOURCE_PORT,
        DialScript::Accept(source_connection(&[
            "MSG,3,1,1,4CA2D6\r\n",
            "\n",
            "   \r\n",
            "MSG,8,1,1,4CA2D6\n",
        ])),
    );
    let fetcher = accepting_fetcher("1.2.3.4");
    let mut h = receiver_harness(&dialer, &fetcher, 10);

    let outcome = h.receiver.run_attempt().await;

    assert_eq!(outcome, AttemptOutcome::StreamEnded);
    assert_eq!(h.queue.len(), 2);
    assert_eq!(h.counters.snapshot().received, 2);

    let first = h.queue.dequeue().await.unwrap();
    assert_eq!(first.message().as_str(), "MSG,3,1,1,4CA2D6");
    first.complete();
    let second = h.queue.dequeue().await.unwrap();
    assert_eq!(second.message().as_str(), "MSG,8,1,1,4CA2D6");
    second.complete();
}

#[tokio::test]
async fn registration_failure_skips_dial() {
    let dialer = Arc::new(ScriptedDialer::new());
    dialer.script(SOURCE_PORT, DialScript::Accept(source_connection(&["MSG\n"])));
    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.reply(MY_IP_URL, Reply::Fail);
    let mut h = receiver_harness(&dialer, &fetcher, 10);

    let outcome = h.receiver.run_attempt().await;

    assert_eq!(outcome, AttemptOutcome::RegistrationFailed);
    assert_eq!(dialer.dial_count(SOURCE_PORT), 0);
    assert_eq!(h.receiver.state(), ReceiverState::Disconnected);

    let events = drain_events(&mut h.events);
    assert!(matches!(events.as_slice(), [RelayEvent::RegistrationFailed { .. }]));
}

#[tokio::test(start_paused = true)]
async fn registration_failure_waits_then_resumes() {
    let dialer = Arc::new(ScriptedDialer::new());
    dialer.script(SOURCE_PORT, DialScript::Accept(open_source_connection(&["MSG\n"])));
    let fetcher = accepting_fetcher_after_failure("1.2.3.4");
    let mut h = receiver_harness(&dialer, &fetcher, 10);
    let start = tokio::time::Instant::now();

    let _ = tokio::time::timeout(Duration::from_secs(15), h.receiver.run()).await;

    let times = dialer.dial_times(SOURCE_PORT);
    assert_eq!(times.len(), 1, "the failed cycle must not dial");
    assert_eq!(times[0] - start, RETRY_DELAY);
    assert_eq!(h.counters.snapshot().received, 1);
    assert_eq!(h.receiver.state(), ReceiverState::Streaming);
    assert_eq!(h.receiver.registration().last_known_ip(), "1.2.3.4");

    let events = drain_events(&mut h.events);
    assert!(matches!(events.first(), Some(RelayEvent::RegistrationFailed { .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        RelayEvent::Connected {
            role: Role::Receiver,
            ..
        }
    )));
}

#[tokio::test]
async fn registration_runs_before_every_dial() {
    let dialer = Arc::new(ScriptedDialer::new());
    let fetcher = accepting_fetcher("1.2.3.4");
    let mut h = receiver_harness(&dialer, &fetcher, 10);

    for _ in 0..3 {
        assert_eq!(h.receiver.run_attempt().await, AttemptOutcome::DialFailed);
    }

    assert_eq!(fetcher.calls_to(MY_IP_URL), 3);
    // Only the first attempt saw a changed IP
    assert_eq!(fetcher.calls_to(UPDATE_URL), 1);
    assert_eq!(h.receiver.registration().last_known_ip(), "1.2.3.4");
    assert_eq!(dialer.dial_count(SOURCE_PORT), 3);
}

#[tokio::test(start_paused = true)]
async fn dial_failures_retry_at_fixed_delay() {
    let dialer = Arc::new(ScriptedDialer::new());
    let fetcher = accepting_fetcher("1.2.3.4");
    let mut h = receiver_harness(&dialer, &fetcher, 10);

    // Dials at 0s, 10s, 20s, 30s
    let result = tokio::time::timeout(Duration::from_secs(35), h.receiver.run()).await;
    assert!(result.is_err(), "receiver loop never returns");

    let times = dialer.dial_times(SOURCE_PORT);
    assert_eq!(times.len(), 4);
    for pair in times.windows(2) {
        assert_eq!(pair[1] - pair[0], RETRY_DELAY);
    }

    let events = drain_events(&mut h.events);
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, RelayEvent::Connected { .. })),
        "failed dials must not report a connection"
    );
    let failures = events
        .iter()
        .filter(|e| matches!(e, RelayEvent::DialFailed { role: Role::Receiver, .. }))
        .count();
    assert_eq!(failures, 4);
}

#[tokio::test(start_paused = true)]
async fn reconnects_after_stream_error() {
    let dialer = Arc::new(ScriptedDialer::new());
    dialer.script(SOURCE_PORT, DialScript::Accept(source_connection(&["A\n"])));
    dialer.script(SOURCE_PORT, DialScript::Refuse);
    dialer.script(SOURCE_PORT, DialScript::Accept(open_source_connection(&["B\n"])));
    let fetcher = accepting_fetcher("1.2.3.4");
    let mut h = receiver_harness(&dialer, &fetcher, 10);

    let _ = tokio::time::timeout(Duration::from_secs(25), h.receiver.run()).await;

    assert_eq!(dialer.dial_count(SOURCE_PORT), 3);
    assert_eq!(h.receiver.state(), ReceiverState::Streaming);
    assert_eq!(h.counters.snapshot().received, 2);

    let events = drain_events(&mut h.events);
    let connected = events
        .iter()
        .filter(|e| matches!(e, RelayEvent::Connected { .. }))
        .count();
    let disconnected = events
        .iter()
        .filter(|e| matches!(e, RelayEvent::Disconnected { .. }))
        .count();
    assert_eq!(connected, 2);
    assert_eq!(disconnected, 1);
}

#[tokio::test]
async fn full_queue_blocks_reader() {
    let dialer = Arc::new(ScriptedDialer::new());
    dialer.script(
        SOURCE_PORT,
        DialScript::Accept(open_source_connection(&["1\n", "2\n", "3\n", "4\n", "5\n"])),
    );
    let fetcher = accepting_fetcher("1.2.3.4");
    let h = receiver_harness(&dialer, &fetcher, 2);
    let queue = Arc::clone(&h.queue);
    let counters = Arc::clone(&h.counters);
    let mut receiver = h.receiver;

    let handle = tokio::spawn(async move {
        receiver.run_attempt().await;
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(queue.len(), 2);
    assert_eq!(counters.snapshot().received, 2, "third line must wait for a free slot");

    let mut drained = Vec::new();
    for _ in 0..5 {
        let delivery = queue.dequeue().await.unwrap();
        drained.push(delivery.message().to_string());
        delivery.complete();
    }

    assert_eq!(drained, vec!["1", "2", "3", "4", "5"]);
    assert_eq!(counters.snapshot().received, 5);
    handle.abort();
}
