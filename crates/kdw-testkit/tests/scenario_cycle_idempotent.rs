//! Scenario: Repeated cycles over an unchanged provider answer
//!
//! # Invariants under test
//!
//! 1. Running a cycle twice with the same provider response leaves the
//!    PerformanceLog unchanged and never sends a notification.
//! 2. A match with zero deaths stores `kills + assists` (denominator floored
//!    to one) rather than failing.
//! 3. Each successful pass advances `last_checked`, and `observed_at` is the
//!    match time, not the check time.
//! 4. At most one PerformanceLog exists per subject; the second pass
//!    overwrites in place (`created_log` is false).

use kdw_reconcile::NotificationOutcome;
use kdw_schemas::GameIdentity;
use kdw_testkit::{match_result, match_time, Harness};

#[tokio::test]
async fn unchanged_response_is_idempotent() -> anyhow::Result<()> {
    let h = Harness::new();
    let owner = h.store.seed_user("auth-1", Some("+15551230000"));
    let id = GameIdentity::new("Sneaky", "NA1", "americas");
    let s = h.store.seed_subject(Some(owner.id), "puuid-sneaky", id.clone(), true);

    // 0.5 ratio: below threshold, but no baseline yet.
    h.provider
        .set_match(&id, match_result("puuid-sneaky", "NA1_100", 1, 4, 1));

    let first = h.engine.run_cycle().await?;
    let u1 = first.outcome_for(s.id).unwrap().result.clone()?;
    assert!(u1.created_log);
    assert_eq!(u1.notification, NotificationOutcome::NotTriggered);
    let log_after_first = h.store.log(s.id).unwrap();
    let checked_after_first = h.store.last_checked(s.id).unwrap();

    let second = h.engine.run_cycle().await?;
    let u2 = second.outcome_for(s.id).unwrap().result.clone()?;
    assert!(!u2.created_log);
    assert_eq!(u2.previous_ratio, Some(0.5));
    assert_eq!(u2.notification, NotificationOutcome::NotTriggered);

    assert_eq!(h.store.log(s.id).unwrap(), log_after_first);
    assert!(h.store.last_checked(s.id).unwrap() >= checked_after_first);
    assert_eq!(h.sender.attempts(), 0);
    Ok(())
}

#[tokio::test]
async fn zero_deaths_floors_to_one() -> anyhow::Result<()> {
    let h = Harness::new();
    let id = GameIdentity::new("Deathless", "EUW", "europe");
    let s = h.store.seed_subject(None, "puuid-d", id.clone(), true);
    h.provider
        .set_match(&id, match_result("puuid-d", "EUW1_7", 5, 0, 2));

    let report = h.engine.run_cycle().await?;
    assert_eq!(report.succeeded(), 1);

    let log = h.store.log(s.id).unwrap();
    assert_eq!(log.ratio, 7.0);
    assert_eq!(log.match_id, "EUW1_7");
    assert_eq!(log.observed_at, match_time());
    assert_ne!(h.store.last_checked(s.id), Some(match_time()));
    Ok(())
}
