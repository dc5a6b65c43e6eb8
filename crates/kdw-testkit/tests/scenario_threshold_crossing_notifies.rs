//! Scenario: Notification gate on cycle-over-cycle ratio changes
//!
//! # Invariants under test
//!
//! 1. previous 1.5 → current 0.8: exactly one notification.
//! 2. previous 0.8 → current 0.3: notifies (still below, but changed).
//! 3. previous 0.8 → current 0.8: no notification.
//! 4. No previous log and current 0.5: no notification.
//! 5. A ratio exactly at the threshold does not notify (exclusive bound).
//! 6. The message goes from the configured number to the owner's phone,
//!    names the player and links the match; with no owner phone it goes to
//!    the configured fallback; with neither it is skipped.

use kdw_reconcile::{EngineSettings, NotificationOutcome};
use kdw_schemas::{GameIdentity, PerformanceLog};
use kdw_testkit::{match_result, match_time, test_settings, Harness, TEST_FROM_NUMBER};

fn seed_previous(h: &Harness, subject_id: i64, ratio: f64) {
    h.store.seed_log(PerformanceLog {
        subject_id,
        match_id: "NA1_1".to_string(),
        ratio,
        observed_at: match_time(),
    });
}

/// Provider answers a match whose ratio is `(k + a) / d`.
async fn notification_after(previous: Option<f64>, k: u32, d: u32, a: u32) -> NotificationOutcome {
    let h = Harness::new();
    let owner = h.store.seed_user("auth", Some("+15559990000"));
    let id = GameIdentity::new("Doublelift", "NA1", "americas");
    let s = h.store.seed_subject(Some(owner.id), "p-dl", id.clone(), true);
    if let Some(r) = previous {
        seed_previous(&h, s.id, r);
    }
    h.provider.set_match(&id, match_result("p-dl", "NA1_2", k, d, a));

    let report = h.engine.run_cycle().await.unwrap();
    report.outcome_for(s.id).unwrap().result.clone().unwrap().notification
}

#[tokio::test]
async fn drop_below_threshold_notifies_once() {
    // 4 / 5 = 0.8
    assert_eq!(notification_after(Some(1.5), 2, 5, 2).await, NotificationOutcome::Sent);
}

#[tokio::test]
async fn further_drop_while_below_notifies() {
    // 3 / 10 = 0.3
    assert_eq!(notification_after(Some(0.8), 1, 10, 2).await, NotificationOutcome::Sent);
}

#[tokio::test]
async fn unchanged_below_threshold_is_silent() {
    assert_eq!(
        notification_after(Some(0.8), 2, 5, 2).await,
        NotificationOutcome::NotTriggered
    );
}

#[tokio::test]
async fn first_observation_is_silent() {
    // 1 / 2 = 0.5
    assert_eq!(notification_after(None, 1, 2, 0).await, NotificationOutcome::NotTriggered);
}

#[tokio::test]
async fn exactly_at_threshold_is_silent() {
    assert_eq!(
        notification_after(Some(2.0), 2, 3, 1).await,
        NotificationOutcome::NotTriggered
    );
}

#[tokio::test]
async fn message_addressing_and_body() {
    let h = Harness::new();
    let owner = h.store.seed_user("auth", Some("+15559990000"));
    let id = GameIdentity::new("Doublelift", "NA1", "americas");
    let s = h.store.seed_subject(Some(owner.id), "p-dl", id.clone(), true);
    seed_previous(&h, s.id, 3.0);
    h.provider
        .set_match(&id, match_result("p-dl", "NA1_5284768552", 0, 4, 1));

    let report = h.engine.run_cycle().await.unwrap();
    assert_eq!(report.notified(), 1);

    let sent = h.sender.delivered();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].from, TEST_FROM_NUMBER);
    assert_eq!(sent[0].to, "+15559990000");
    assert_eq!(
        sent[0].body,
        "Doublelift#NA1 just went negative. You can view the match here: https://www.leagueofgraphs.com/match/na/5284768552"
    );
}

#[tokio::test]
async fn fallback_recipient_then_skip() {
    let with_fallback = Harness::with_settings(EngineSettings {
        default_recipient: Some("+15550001111".to_string()),
        ..test_settings()
    });
    let id = GameIdentity::new("Orphan", "NA1", "americas");
    let s = with_fallback.store.seed_subject(None, "p-o", id.clone(), true);
    seed_previous(&with_fallback, s.id, 3.0);
    with_fallback
        .provider
        .set_match(&id, match_result("p-o", "NA1_3", 0, 2, 0));
    with_fallback.engine.run_cycle().await.unwrap();
    assert_eq!(with_fallback.sender.delivered()[0].to, "+15550001111");

    let without = Harness::new();
    let s = without.store.seed_subject(None, "p-o", id.clone(), true);
    seed_previous(&without, s.id, 3.0);
    without
        .provider
        .set_match(&id, match_result("p-o", "NA1_3", 0, 2, 0));
    let report = without.engine.run_cycle().await.unwrap();
    let update = report.outcome_for(s.id).unwrap().result.clone().unwrap();
    assert!(matches!(update.notification, NotificationOutcome::Skipped(_)));
    assert_eq!(without.sender.attempts(), 0);
    // The log still committed.
    assert_eq!(without.store.log(s.id).unwrap().ratio, 0.0);
}
