//! Scenario: One subject's failure never touches its siblings
//!
//! # Invariants under test
//!
//! 1. Three active subjects, the second one's fetch fails: subjects 1 and 3
//!    get new logs and advanced `last_checked`; subject 2 is untouched and
//!    the cycle still returns `Ok` with one failed outcome.
//! 2. A hung provider is cut off by the call timeout; the cycle completes.
//! 3. A provider answering with a different PUUID fails that subject with
//!    `IdentityMismatch` and commits nothing.
//! 4. Failing to list active subjects is the only error `run_cycle` returns.
//! 5. Per-subject work fans out, bounded by `max_concurrency`.

use std::time::{Duration, Instant};

use kdw_reconcile::{
    CycleError, EngineSettings, ProviderError, StoreError, SubjectError,
};
use kdw_schemas::{GameIdentity, PerformanceLog};
use kdw_testkit::{match_result, match_time, test_settings, Harness};

#[tokio::test]
async fn fetch_failure_is_isolated() -> anyhow::Result<()> {
    let h = Harness::new();
    let ids: Vec<GameIdentity> = (1..=3)
        .map(|n| GameIdentity::new(format!("p{n}"), "NA1", "americas"))
        .collect();
    let subjects: Vec<_> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| h.store.seed_subject(None, &format!("puuid-{i}"), id.clone(), true))
        .collect();

    let stale = PerformanceLog {
        subject_id: subjects[1].id,
        match_id: "NA1_OLD".to_string(),
        ratio: 4.0,
        observed_at: match_time(),
    };
    h.store.seed_log(stale.clone());

    h.provider.set_match(&ids[0], match_result("puuid-0", "NA1_10", 3, 1, 0));
    h.provider.fail_match(
        &ids[1],
        ProviderError::Status {
            status: 503,
            body: "unavailable".to_string(),
        },
    );
    h.provider.set_match(&ids[2], match_result("puuid-2", "NA1_30", 1, 1, 1));

    let report = h.engine.run_cycle().await?;
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 1);
    let order: Vec<i64> = report.outcomes.iter().map(|o| o.subject_id).collect();
    assert_eq!(order, subjects.iter().map(|s| s.id).collect::<Vec<_>>());

    assert_eq!(h.store.log(subjects[0].id).unwrap().ratio, 3.0);
    assert!(h.store.last_checked(subjects[0].id).is_some());
    assert_eq!(h.store.log(subjects[2].id).unwrap().ratio, 2.0);
    assert!(h.store.last_checked(subjects[2].id).is_some());

    assert_eq!(h.store.log(subjects[1].id), Some(stale));
    assert!(h.store.last_checked(subjects[1].id).is_none());
    assert!(matches!(
        report.outcome_for(subjects[1].id).unwrap().result,
        Err(SubjectError::Fetch(ProviderError::Status { status: 503, .. }))
    ));
    Ok(())
}

#[tokio::test]
async fn hung_provider_times_out() -> anyhow::Result<()> {
    let h = Harness::with_settings(EngineSettings {
        call_timeout: Duration::from_millis(50),
        ..test_settings()
    });
    let slow = GameIdentity::new("slow", "NA1", "americas");
    let fast = GameIdentity::new("fast", "NA1", "americas");
    let s_slow = h.store.seed_subject(None, "p-slow", slow.clone(), true);
    let s_fast = h.store.seed_subject(None, "p-fast", fast.clone(), true);
    h.provider.set_match(&slow, match_result("p-slow", "NA1_1", 1, 1, 1));
    h.provider.delay_for(&slow, Duration::from_secs(30));
    h.provider.set_match(&fast, match_result("p-fast", "NA1_2", 1, 1, 1));

    let started = Instant::now();
    let report = h.engine.run_cycle().await?;
    assert!(started.elapsed() < Duration::from_secs(5));

    assert!(matches!(
        report.outcome_for(s_slow.id).unwrap().result,
        Err(SubjectError::Fetch(ProviderError::Timeout(_)))
    ));
    assert!(h.store.log(s_slow.id).is_none());
    assert!(h.store.log(s_fast.id).is_some());
    Ok(())
}

#[tokio::test]
async fn puuid_mismatch_commits_nothing() -> anyhow::Result<()> {
    let h = Harness::new();
    let id = GameIdentity::new("renamed", "NA1", "americas");
    let s = h.store.seed_subject(None, "p-original", id.clone(), true);
    h.provider.set_match(&id, match_result("p-someone-else", "NA1_1", 9, 1, 9));

    let report = h.engine.run_cycle().await?;
    assert!(matches!(
        &report.outcome_for(s.id).unwrap().result,
        Err(SubjectError::Fetch(ProviderError::IdentityMismatch { expected, got }))
            if expected == "p-original" && got == "p-someone-else"
    ));
    assert!(h.store.log(s.id).is_none());
    assert!(h.store.last_checked(s.id).is_none());
    Ok(())
}

#[tokio::test]
async fn list_failure_aborts_cycle() {
    let h = Harness::new();
    let id = GameIdentity::new("x", "NA1", "americas");
    h.store.seed_subject(None, "p", id.clone(), true);
    h.provider.set_match(&id, match_result("p", "NA1_1", 1, 1, 1));
    h.store
        .fail_list_active(Some(StoreError::Unavailable("connection refused".to_string())));

    let err = h.engine.run_cycle().await.unwrap_err();
    assert_eq!(
        err,
        CycleError::ListActive(StoreError::Unavailable("connection refused".to_string()))
    );
    assert_eq!(h.provider.total_fetch_calls(), 0);
}

#[tokio::test]
async fn fan_out_is_bounded() -> anyhow::Result<()> {
    let h = Harness::with_settings(EngineSettings {
        max_concurrency: 2,
        ..test_settings()
    });
    for n in 0..6 {
        let id = GameIdentity::new(format!("c{n}"), "NA1", "americas");
        let puuid = format!("p-{n}");
        h.store.seed_subject(None, &puuid, id.clone(), true);
        h.provider.set_match(&id, match_result(&puuid, "NA1_1", 1, 1, 1));
    }
    h.provider.set_default_delay(Duration::from_millis(20));

    let report = h.engine.run_cycle().await?;
    assert_eq!(report.succeeded(), 6);
    assert!(h.provider.max_in_flight() <= 2);
    assert!(h.provider.max_in_flight() >= 1);
    Ok(())
}
