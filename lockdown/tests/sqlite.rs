#![cfg(feature = "sqlite")]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use lockdown::{
    FailureOutcome, Lockdown, LockdownBuilder, LockdownError, ManualClock, MemoryUserDirectory,
    PolicyConfig, Rejection, SharedPolicy, SqliteRepositoryProvider, UserId,
};

const T0: i64 = 1_750_000_000;

fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(T0, 0).unwrap()
}

async fn setup(policy: PolicyConfig) -> (Lockdown<SqliteRepositoryProvider>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(t0()));
    let users: MemoryUserDirectory = [("admin", UserId::new(1)), ("editor", UserId::new(2))]
        .into_iter()
        .collect();

    let lockdown = LockdownBuilder::new()
        .with_sqlite("sqlite::memory:")
        .await
        .unwrap()
        .with_policy(policy)
        .with_user_directory(Arc::new(users))
        .with_clock(clock.clone())
        .apply_migrations(true)
        .build()
        .await
        .unwrap();

    (lockdown, clock)
}

#[tokio::test]
async fn test_three_failures_lock_the_subnet() {
    let (lockdown, clock) = setup(PolicyConfig::default()).await;

    lockdown.record_failure("admin", "203.0.113.5").await.unwrap();
    clock.advance(Duration::minutes(1));
    lockdown.record_failure("admin", "203.0.113.5").await.unwrap();
    assert!(!lockdown.is_locked("203.0.113.5").await.unwrap());

    clock.advance(Duration::minutes(1));
    let outcome = lockdown.record_failure("admin", "203.0.113.5").await.unwrap();
    assert_eq!(
        outcome,
        FailureOutcome::Locked {
            failures: 3,
            release_at: t0() + Duration::minutes(62),
        }
    );

    assert!(lockdown.is_locked("203.0.113.5").await.unwrap());
    assert!(lockdown.is_locked("203.0.113.9").await.unwrap());
    assert!(!lockdown.is_locked("203.0.114.5").await.unwrap());

    let lockout = lockdown
        .active_lockout("203.0.113.200")
        .await
        .unwrap()
        .expect("subnet should be locked");
    assert_eq!(lockout.user_id, Some(UserId::new(1)));
    assert_eq!(lockout.ip_address, "203.0.113.5");
}

#[tokio::test]
async fn test_lockout_expires_without_unlock() {
    let (lockdown, clock) = setup(PolicyConfig::default()).await;

    for _ in 0..3 {
        lockdown.record_failure("editor", "198.51.100.1").await.unwrap();
    }
    assert!(lockdown.is_locked("198.51.100.1").await.unwrap());

    clock.advance(Duration::minutes(59));
    assert!(lockdown.is_locked("198.51.100.1").await.unwrap());

    clock.advance(Duration::minutes(1));
    assert!(!lockdown.is_locked("198.51.100.1").await.unwrap());
    assert!(lockdown.list_active_lockouts().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failures_outside_window_do_not_count() {
    let (lockdown, clock) = setup(PolicyConfig::default()).await;

    lockdown.record_failure("admin", "192.0.2.1").await.unwrap();
    lockdown.record_failure("admin", "192.0.2.2").await.unwrap();
    clock.advance(Duration::minutes(6));

    let outcome = lockdown.record_failure("admin", "192.0.2.3").await.unwrap();
    assert_eq!(outcome, FailureOutcome::Recorded { failures: 1 });
    assert!(!lockdown.is_locked("192.0.2.3").await.unwrap());
}

#[tokio::test]
async fn test_unknown_usernames_follow_policy() {
    let (lockdown, _) = setup(PolicyConfig::default()).await;
    for _ in 0..5 {
        let outcome = lockdown.record_failure("nobody", "192.0.2.1").await.unwrap();
        assert_eq!(outcome, FailureOutcome::Ignored);
    }
    assert!(!lockdown.is_locked("192.0.2.1").await.unwrap());

    let (lockdown, _) = setup(PolicyConfig::default().with_lockout_invalid_usernames(true)).await;
    for _ in 0..3 {
        lockdown.record_failure("nobody", "192.0.2.1").await.unwrap();
    }
    let lockout = lockdown
        .active_lockout("192.0.2.1")
        .await
        .unwrap()
        .expect("unknown usernames should lock");
    assert_eq!(lockout.user_id, None);
}

#[tokio::test]
async fn test_ipv6_subnets() {
    let (lockdown, _) = setup(PolicyConfig::default()).await;

    lockdown.record_failure("admin", "2001:db8::1").await.unwrap();
    lockdown.record_failure("admin", "2001:DB8::2").await.unwrap();
    lockdown
        .record_failure("admin", "2001:db8:0:0:ffff::3")
        .await
        .unwrap();

    assert!(lockdown.is_locked("2001:db8::dead:beef").await.unwrap());
    assert!(!lockdown.is_locked("2001:db8:0:1::1").await.unwrap());
}

#[tokio::test]
async fn test_list_active_lockouts_reports_minutes_remaining() {
    let (lockdown, clock) = setup(PolicyConfig::default()).await;

    for _ in 0..3 {
        lockdown.record_failure("admin", "10.0.0.1").await.unwrap();
    }
    clock.advance(Duration::seconds(90));

    let active = lockdown.list_active_lockouts().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].ip_address, "10.0.0.1");
    assert_eq!(active[0].minutes_remaining, 58);
}

#[tokio::test]
async fn test_prune_keeps_decisions() {
    let (lockdown, clock) = setup(PolicyConfig::default()).await;

    for _ in 0..3 {
        lockdown.record_failure("admin", "10.0.0.1").await.unwrap();
    }
    clock.advance(Duration::minutes(30));
    lockdown.record_failure("admin", "10.0.5.1").await.unwrap();

    let stats = lockdown.prune(Duration::zero()).await.unwrap();
    assert_eq!(stats.failures, 3);
    assert_eq!(stats.lockouts, 0);
    assert!(lockdown.is_locked("10.0.0.1").await.unwrap());

    clock.advance(Duration::minutes(31));
    let stats = lockdown.prune(Duration::zero()).await.unwrap();
    assert_eq!(stats.failures, 1);
    assert_eq!(stats.lockouts, 1);
    assert!(!lockdown.is_locked("10.0.0.1").await.unwrap());
}

#[tokio::test]
async fn test_invalid_address_is_reported() {
    let (lockdown, _) = setup(PolicyConfig::default()).await;

    let err = lockdown.record_failure("admin", "").await.unwrap_err();
    assert!(matches!(err, LockdownError::InvalidAddress(_)));
    assert!(lockdown.list_active_lockouts().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_shared_policy_changes_apply_immediately() {
    let clock = Arc::new(ManualClock::new(t0()));
    let policy = SharedPolicy::default();
    let users: MemoryUserDirectory = [("admin", UserId::new(1))].into_iter().collect();

    let lockdown = LockdownBuilder::new()
        .with_sqlite("sqlite::memory:")
        .await
        .unwrap()
        .with_policy_provider(Arc::new(policy.clone()))
        .with_user_directory(Arc::new(users))
        .with_clock(clock)
        .apply_migrations(true)
        .build()
        .await
        .unwrap();

    assert_eq!(
        lockdown.rejection_message(Rejection::UnknownUser),
        "Invalid username."
    );

    policy
        .update(
            PolicyConfig::default()
                .with_max_login_retries(1)
                .with_mask_login_errors(true),
        )
        .unwrap();

    assert_eq!(
        lockdown.rejection_message(Rejection::UnknownUser),
        lockdown.rejection_message(Rejection::IncorrectPassword)
    );
    let outcome = lockdown.record_failure("admin", "10.1.1.1").await.unwrap();
    assert!(outcome.is_locked());
}

#[tokio::test]
async fn test_failure_exactly_window_old_does_not_count() {
    let (lockdown, clock) = setup(PolicyConfig::default().with_max_login_retries(2)).await;

    lockdown.record_failure("admin", "192.0.2.1").await.unwrap();
    clock.advance(Duration::minutes(5));

    let outcome = lockdown.record_failure("admin", "192.0.2.1").await.unwrap();
    assert_eq!(outcome, FailureOutcome::Recorded { failures: 1 });
    assert!(!lockdown.is_locked("192.0.2.1").await.unwrap());
}

#[tokio::test]
async fn test_sub_second_release_time_is_honoured() {
    let (lockdown, clock) = setup(PolicyConfig::default()).await;
    clock.advance(Duration::milliseconds(700));

    let mut outcome = FailureOutcome::Ignored;
    for _ in 0..3 {
        outcome = lockdown.record_failure("admin", "203.0.113.5").await.unwrap();
    }
    let release_at = t0() + Duration::milliseconds(700) + Duration::minutes(60);
    assert_eq!(
        outcome,
        FailureOutcome::Locked {
            failures: 3,
            release_at,
        }
    );

    clock.advance(Duration::minutes(60) - Duration::milliseconds(200));
    assert!(lockdown.is_locked("203.0.113.5").await.unwrap());
    let lockout = lockdown.active_lockout("203.0.113.5").await.unwrap().unwrap();
    assert_eq!(lockout.release_at, release_at);

    clock.advance(Duration::milliseconds(200));
    assert!(!lockdown.is_locked("203.0.113.5").await.unwrap());
}
