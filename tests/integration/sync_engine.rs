//! End-to-end sync cycles: HTTP client, JSON state, notifications.

use crate::helpers::{TestEnv, milestone, test_config, test_credentials};
use usage_sync::credentials::CredentialStore;
use usage_sync::notify::Notification;
use usage_sync::service::HISTORY_FILE;
use usage_sync::sync::{CycleJournal, CycleTrigger};
use usage_sync::usage::UsageError;
use wiremock::MockServer;

async fn sync_at(env: &mut TestEnv, percent: f64) -> Vec<Notification> {
    env.serve_session_usage(percent).await;
    let outcome = env.service.sync_now().await;
    assert!(outcome.is_success(), "sync at {percent}% failed: {outcome:?}");
    env.drain_notifications()
}

#[tokio::test]
async fn climb_announces_each_threshold_once() {
    let mut env = TestEnv::start().await;

    assert!(sync_at(&mut env, 70.0).await.is_empty());
    assert_eq!(sync_at(&mut env, 76.0).await, vec![milestone(76, 75)]);
    assert_eq!(sync_at(&mut env, 82.0).await, vec![milestone(82, 80)]);
    // Dipping and recovering inside the same band is silent.
    assert!(sync_at(&mut env, 79.0).await.is_empty());
    assert!(sync_at(&mut env, 83.0).await.is_empty());
    // A jump over several thresholds announces only the highest.
    assert_eq!(sync_at(&mut env, 95.0).await, vec![milestone(95, 90)]);
    assert_eq!(sync_at(&mut env, 100.0).await, vec![milestone(100, 100)]);
    assert!(sync_at(&mut env, 100.0).await.is_empty());

    let prefs = env.service.preferences().unwrap();
    assert_eq!(prefs.last_notified_threshold, Some(100));
}

#[tokio::test]
async fn session_reset_notifies_and_rearms_milestones() {
    let mut env = TestEnv::start().await;

    assert_eq!(sync_at(&mut env, 86.0).await, vec![milestone(86, 85)]);
    assert_eq!(sync_at(&mut env, 0.0).await, vec![Notification::SessionReset]);
    assert_eq!(
        env.service.preferences().unwrap().last_notified_threshold,
        None
    );
    assert_eq!(sync_at(&mut env, 77.0).await, vec![milestone(77, 75)]);
}

#[tokio::test]
async fn disabled_notifications_still_track_watermark() {
    let mut env = TestEnv::start().await;
    env.service.set_notify_on_usage_thresholds(false).unwrap();
    env.service.set_notify_on_reset(false).unwrap();

    assert!(sync_at(&mut env, 92.0).await.is_empty());
    assert_eq!(
        env.service.preferences().unwrap().last_notified_threshold,
        Some(90)
    );

    // Re-enabling does not replay the backlog.
    env.service.set_notify_on_usage_thresholds(true).unwrap();
    assert!(sync_at(&mut env, 93.0).await.is_empty());
    assert_eq!(sync_at(&mut env, 100.0).await, vec![milestone(100, 100)]);

    // Reset stays silent while disabled.
    assert!(sync_at(&mut env, 0.0).await.is_empty());
}

#[tokio::test]
async fn state_survives_restart() {
    let mut env = TestEnv::start().await;
    assert_eq!(sync_at(&mut env, 81.0).await, vec![milestone(81, 80)]);
    env.service.set_refresh_interval(120).unwrap();

    env.service = env.restart();

    let cached = env.service.cached_usage().unwrap().unwrap();
    assert_eq!(cached.session_utilization(), Some(81.0));
    assert_eq!(env.service.subscribe().borrow().clone(), Some(cached));

    let prefs = env.service.preferences().unwrap();
    assert_eq!(prefs.refresh_interval_seconds, 120);
    assert_eq!(prefs.last_notified_threshold, Some(80));

    // Same band after restart: no repeat.
    assert!(sync_at(&mut env, 84.0).await.is_empty());
    assert_eq!(env.service.history().len(), 2);
}

#[tokio::test]
async fn failures_keep_cached_usage_and_are_journaled() {
    let mut env = TestEnv::start().await;
    sync_at(&mut env, 40.0).await;

    env.serve_status(401).await;
    let outcome = env.service.sync_now().await;
    assert_eq!(outcome.error(), Some(&UsageError::Unauthorized));
    assert_eq!(env.service.last_error(), Some(UsageError::Unauthorized));
    assert_eq!(
        env.service
            .cached_usage()
            .unwrap()
            .and_then(|s| s.session_utilization()),
        Some(40.0)
    );

    env.serve_status(503).await;
    let outcome = env.service.sync_now().await;
    assert!(matches!(
        outcome.error(),
        Some(UsageError::ServerError { code: 503, .. })
    ));

    // The next success clears the banner.
    sync_at(&mut env, 41.0).await;
    assert_eq!(env.service.last_error(), None);

    let records = CycleJournal::read(&env.dir.path().join(HISTORY_FILE)).unwrap();
    let errors: Vec<_> = records.iter().map(|r| r.error.clone()).collect();
    assert_eq!(errors.len(), 4);
    assert_eq!(errors[0], None);
    assert_eq!(errors[1], Some(UsageError::Unauthorized));
    assert!(records.iter().all(|r| r.trigger == CycleTrigger::Manual));
}

#[tokio::test]
async fn snapshots_are_published_to_subscribers() {
    let mut env = TestEnv::start().await;
    let mut rx = env.service.subscribe();
    assert!(rx.borrow().is_none());

    sync_at(&mut env, 55.5).await;
    rx.changed().await.unwrap();
    let latest = rx.borrow().clone().unwrap();
    assert_eq!(latest.session_utilization(), Some(55.5));
    assert!(latest.seven_day.is_some());
}

#[tokio::test]
async fn fetch_guard_rejects_back_to_back_syncs() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&server, dir.path());
    config.sync.min_fetch_interval_secs = 60;
    let env = TestEnv::with_config(server, dir, &config);
    env.serve_session_usage(30.0).await;

    assert!(env.service.sync_now().await.is_success());
    let second = env.service.sync_now().await;
    assert_eq!(second.error(), Some(&UsageError::RateLimited));

    let requests = env.server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
}

#[tokio::test]
async fn clearing_credentials_stops_fetching_but_keeps_cache() {
    let mut env = TestEnv::start().await;
    sync_at(&mut env, 20.0).await;
    assert!(env.service.ensure_running());

    env.service.clear_credentials().unwrap();
    assert!(!env.service.has_credentials());
    assert!(env.service.chain_state().is_idle());
    assert!(env.service.fallback_state().is_idle());
    assert!(!env.service.ensure_running());

    let outcome = env.service.sync_now().await;
    assert_eq!(outcome.error(), Some(&UsageError::NoCredentials));
    assert!(env.service.cached_usage().unwrap().is_some());
}

#[tokio::test]
async fn configure_starts_both_strategies() {
    let env = TestEnv::start().await;
    env.credentials.clear().unwrap();
    assert!(env.service.chain_state().is_idle());

    env.service
        .configure(&test_credentials())
        .unwrap();
    assert!(!env.service.chain_state().is_idle());
    assert!(!env.service.fallback_state().is_idle());
    assert_eq!(env.service.scheduler().pending_chain_entries(), 1);

    env.service.shutdown();
    assert!(env.service.chain_state().is_idle());
}
