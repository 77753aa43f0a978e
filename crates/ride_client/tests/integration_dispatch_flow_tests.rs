mod support;

use std::time::Duration;

use ride_client::config::PollingPolicy;
use ride_client::dispatch::{
    AssignmentOutcome, DispatchCoordinator, DispatchError, DriverAction, RespondOutcome,
};
use ride_client::ErrorKind;
use ride_core::booking::{BookingId, BookingStatus};
use ride_core::pricing::PricingEngine;
use ride_core::test_helpers::{test_destination, test_pickup};
use ride_core::tier::TierTable;
use support::api::ScriptedApi;
use tokio::time::Instant;

fn coordinator(api: &ScriptedApi, policy: PollingPolicy) -> DispatchCoordinator<ScriptedApi> {
    DispatchCoordinator::new(
        api.clone(),
        PricingEngine::new(TierTable::standard()),
        policy,
        "rider-1",
    )
}

async fn submitted(api: &ScriptedApi) -> (DispatchCoordinator<ScriptedApi>, BookingId) {
    let mut coordinator = coordinator(api, PollingPolicy::default());
    let id = coordinator
        .submit(test_pickup(), test_destination(), "bike", 10.0, 25.0)
        .await
        .expect("submit");
    (coordinator, id)
}

fn assigned_driver(outcome: &AssignmentOutcome) -> Option<&str> {
    match outcome {
        AssignmentOutcome::Assigned(booking) => booking.driver_id(),
        _ => None,
    }
}

#[tokio::test(start_paused = true)]
async fn submit_prices_the_chosen_tier() {
    let api = ScriptedApi::new("B1");
    let (coordinator, id) = submitted(&api).await;

    assert_eq!(id, BookingId::new("B1"));
    let booking = coordinator.booking().expect("active booking");
    assert_eq!(booking.status(), BookingStatus::Requested);
    assert_eq!(booking.price, 60);
    assert_eq!(booking.tier_key, "bike");
}

#[tokio::test(start_paused = true)]
async fn failed_submit_is_not_retried() {
    let api = ScriptedApi::failing_submit(DispatchError::Status {
        status: 503,
        reason: "maintenance".to_string(),
    });
    let mut coordinator = coordinator(&api, PollingPolicy::default());

    let result = coordinator
        .submit(test_pickup(), test_destination(), "car", 10.0, 25.0)
        .await;

    let error = result.expect_err("submit fails");
    assert_eq!(error.kind(), ErrorKind::Transient);
    assert_eq!(api.submit_calls(), 1);
    assert!(coordinator.booking().is_none());
}

#[tokio::test(start_paused = true)]
async fn unknown_tier_is_rejected_before_submitting() {
    let api = ScriptedApi::new("B1");
    let mut coordinator = coordinator(&api, PollingPolicy::default());

    let result = coordinator
        .submit(test_pickup(), test_destination(), "helicopter", 10.0, 25.0)
        .await;

    assert!(matches!(result, Err(DispatchError::Pricing(_))));
    assert_eq!(api.submit_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn polling_stops_on_the_first_assignment() {
    let api = ScriptedApi::new("B1");
    api.queue_polls("B1", &[("REQUESTED", None); 5]);
    api.queue_polls("B1", &[("ASSIGNED", Some("D9"))]);
    let (mut coordinator, id) = submitted(&api).await;
    let started = Instant::now();

    let outcome = coordinator
        .poll_until_assigned(&id, Duration::from_secs(30))
        .await
        .expect("poll");

    assert_eq!(assigned_driver(&outcome), Some("D9"));
    assert_eq!(api.fetch_calls(), 6);
    assert_eq!(started.elapsed(), Duration::from_secs(5), "first poll is immediate");
}

#[tokio::test(start_paused = true)]
async fn exhausted_budget_reports_no_driver() {
    let api = ScriptedApi::new("B1");
    let (mut coordinator, id) = submitted(&api).await;
    let started = Instant::now();

    let outcome = coordinator
        .poll_until_assigned(&id, Duration::from_secs(30))
        .await
        .expect("poll");

    assert_eq!(outcome, AssignmentOutcome::NoDriverAvailable { attempts: 30 });
    assert_eq!(api.fetch_calls(), 30);
    assert!(started.elapsed() <= Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn slow_backend_stays_within_the_poll_budget() {
    let api = ScriptedApi::new("B1").with_fetch_delay(Duration::from_millis(900));
    let (mut coordinator, id) = submitted(&api).await;
    let started = Instant::now();

    let outcome = coordinator
        .poll_until_assigned(&id, Duration::from_secs(30))
        .await
        .expect("poll");

    assert_eq!(outcome, AssignmentOutcome::NoDriverAvailable { attempts: 30 });
    assert_eq!(api.fetch_calls(), 30);
    assert!(
        started.elapsed() <= Duration::from_secs(30),
        "took {:?}",
        started.elapsed()
    );
}

#[tokio::test(start_paused = true)]
async fn fetches_slower_than_the_interval_are_cut_off() {
    let api = ScriptedApi::new("B1").with_fetch_delay(Duration::from_millis(1500));
    let (mut coordinator, id) = submitted(&api).await;
    let started = Instant::now();

    let outcome = coordinator
        .poll_until_assigned(&id, Duration::from_secs(5))
        .await
        .expect("poll");

    assert_eq!(outcome, AssignmentOutcome::NoDriverAvailable { attempts: 5 });
    assert_eq!(api.fetch_calls(), 5);
    assert!(started.elapsed() <= Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn failed_polls_count_against_the_budget() {
    let api = ScriptedApi::new("B1");
    for _ in 0..3 {
        api.queue_poll_result(Err(DispatchError::Http("connection refused".to_string())));
    }
    api.queue_polls("B1", &[("ASSIGNED", Some("D2"))]);
    let (mut coordinator, id) = submitted(&api).await;

    let short = coordinator
        .poll_until_assigned(&id, Duration::from_secs(3))
        .await
        .expect("poll");
    assert_eq!(short, AssignmentOutcome::NoDriverAvailable { attempts: 3 });

    let next = coordinator
        .poll_until_assigned(&id, Duration::from_secs(3))
        .await
        .expect("poll");
    assert_eq!(assigned_driver(&next), Some("D2"));
    assert_eq!(api.fetch_calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn snapshots_for_other_bookings_are_ignored() {
    let api = ScriptedApi::new("B1");
    api.queue_polls("B0", &[("ASSIGNED", Some("D1"))]);
    api.queue_polls("B1", &[("ASSIGNED", Some("D2"))]);
    let (mut coordinator, id) = submitted(&api).await;

    let outcome = coordinator
        .poll_until_assigned(&id, Duration::from_secs(30))
        .await
        .expect("poll");

    assert_eq!(assigned_driver(&outcome), Some("D2"));
    assert_eq!(api.fetch_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn terminal_status_ends_polling() {
    let api = ScriptedApi::new("B1");
    api.queue_polls("B1", &[("REQUESTED", None), ("CANCELLED", None)]);
    let (mut coordinator, id) = submitted(&api).await;

    let outcome = coordinator
        .poll_until_assigned(&id, Duration::from_secs(30))
        .await
        .expect("poll");

    assert_eq!(outcome, AssignmentOutcome::Ended(BookingStatus::Cancelled));
    assert_eq!(api.fetch_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_polling() {
    let api = ScriptedApi::new("B1");
    let (mut coordinator, id) = submitted(&api).await;
    let cancel = coordinator.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(3500)).await;
        cancel.cancel();
    });

    let result = coordinator
        .poll_until_assigned(&id, Duration::from_secs(30))
        .await;

    assert!(matches!(result, Err(DispatchError::Cancelled)));
    assert_eq!(api.fetch_calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn declined_driver_is_not_offered_again() {
    let api = ScriptedApi::new("B1");
    api.queue_polls("B1", &[("ASSIGNED", Some("D1"))]);
    let (mut coordinator, id) = submitted(&api).await;
    coordinator
        .poll_until_assigned(&id, Duration::from_secs(30))
        .await
        .expect("poll");

    api.queue_polls(
        "B1",
        &[
            ("REQUESTED", None),
            ("ASSIGNED", Some("D1")),
            ("ASSIGNED", Some("D2")),
        ],
    );
    let outcome = coordinator.respond(&id, false).await.expect("decline");

    let next = match outcome {
        RespondOutcome::Declined(next) => next,
        other => panic!("expected a re-poll, got {other:?}"),
    };
    assert_eq!(assigned_driver(&next), Some("D2"));
    assert_eq!(
        api.responses(),
        vec![(id.clone(), "D1".to_string(), DriverAction::Decline)]
    );
    let booking = coordinator.booking().expect("booking");
    assert_eq!(booking.declined_drivers().to_vec(), vec!["D1".to_string()]);
    assert_eq!(booking.reassignments(), 1);
}

#[tokio::test(start_paused = true)]
async fn reassignment_limit_declines_the_booking() {
    let api = ScriptedApi::new("B1");
    api.queue_polls("B1", &[("ASSIGNED", Some("D1"))]);
    let policy = PollingPolicy {
        max_reassignments: 1,
        ..PollingPolicy::default()
    };
    let mut coordinator = coordinator(&api, policy);
    let id = coordinator
        .submit(test_pickup(), test_destination(), "bike", 10.0, 25.0)
        .await
        .expect("submit");
    coordinator
        .poll_until_assigned(&id, Duration::from_secs(30))
        .await
        .expect("poll");

    let outcome = coordinator.respond(&id, false).await.expect("decline");

    assert_eq!(outcome, RespondOutcome::ReassignmentLimitReached { declines: 1 });
    let booking = coordinator.booking().expect("booking");
    assert_eq!(booking.status(), BookingStatus::Declined);
    assert_eq!(api.fetch_calls(), 1, "no polling after the limit");
}

#[tokio::test(start_paused = true)]
async fn accept_then_complete() {
    let api = ScriptedApi::new("B1");
    api.queue_polls("B1", &[("ASSIGNED", Some("D4"))]);
    let (mut coordinator, id) = submitted(&api).await;
    coordinator
        .poll_until_assigned(&id, Duration::from_secs(30))
        .await
        .expect("poll");

    let outcome = coordinator.respond(&id, true).await.expect("accept");
    let (booking, in_progress) = match outcome {
        RespondOutcome::Accepted { booking, in_progress } => (booking, in_progress),
        other => panic!("expected acceptance, got {other:?}"),
    };
    assert!(in_progress);
    assert_eq!(booking.status(), BookingStatus::InProgress);

    coordinator.complete(&id).await.expect("complete");

    assert_eq!(
        coordinator.booking().map(|booking| booking.status()),
        Some(BookingStatus::Completed)
    );
    assert_eq!(api.completions(), vec![(id.clone(), "D4".to_string())]);
    let again = coordinator.cancel(&id).await;
    assert!(matches!(again, Err(DispatchError::Transition(_))));
    assert!(api.cancels().is_empty());
}

#[tokio::test(start_paused = true)]
async fn responding_without_a_driver_is_rejected() {
    let api = ScriptedApi::new("B1");
    let (mut coordinator, id) = submitted(&api).await;

    let result = coordinator.respond(&id, true).await;

    assert!(matches!(result, Err(DispatchError::MissingDriver(_))));
    assert!(api.responses().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancelled_booking_stays_cancelled() {
    let api = ScriptedApi::new("B1");
    let (mut coordinator, id) = submitted(&api).await;

    coordinator.cancel(&id).await.expect("cancel");
    let outcome = coordinator
        .poll_until_assigned(&id, Duration::from_secs(30))
        .await
        .expect("poll");

    assert_eq!(outcome, AssignmentOutcome::Ended(BookingStatus::Cancelled));
    assert_eq!(api.cancels(), vec![id]);
    assert_eq!(api.fetch_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn operations_before_submit_have_no_active_booking() {
    let api = ScriptedApi::new("B1");
    let mut coordinator = coordinator(&api, PollingPolicy::default());
    let id = BookingId::new("B1");

    let polled = coordinator
        .poll_until_assigned(&id, Duration::from_secs(5))
        .await;
    let cancelled = coordinator.cancel(&id).await;

    assert!(matches!(polled, Err(DispatchError::NoActiveBooking(_))));
    assert!(matches!(cancelled, Err(DispatchError::NoActiveBooking(_))));
    assert_eq!(api.fetch_calls(), 0);
    assert!(api.cancels().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unknown_booking_id_is_rejected() {
    let api = ScriptedApi::new("B1");
    let (mut coordinator, _id) = submitted(&api).await;

    let result = coordinator.refresh(&BookingId::new("B2")).await;

    assert!(matches!(result, Err(DispatchError::BookingMismatch { .. })));
}
