//! Cross-driver integration tests against the in-memory collaborators.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};

use drlab_core::{DrResult, ProbeConfig, RetryConfig, SnapshotId, SnapshotInfo};
use drlab_drivers::{
    HealthProber, MemoryCredentialStore, MemoryDatabaseControl, MemoryEndpointCheck,
    RecoveryDriver, RecoveryStrategy, RetryPolicy, SecretRotator,
};

fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_backoff_ms: 1,
        max_backoff_ms: 2,
        backoff_multiplier: 2.0,
    }
}

#[tokio::test(start_paused = true)]
async fn rotation_under_retry_policy_survives_a_store_outage() {
    let store = Arc::new(MemoryCredentialStore::new());
    store.seed(
        "dr-lab/database-config",
        r#"{"engine":"postgres","host":"primary-db.example.com","port":5433,"dbname":"drlab","username":"app","password":"s3cret"}"#,
    );
    store.inject_outages(2);

    let rotator = SecretRotator::new(store.clone());
    let policy = RetryPolicy::new(fast_retry(3));

    let result: DrResult<()> = policy
        .run(
            "rotate-secret",
            |_attempt| rotator.rotate("secondary-db.example.com:5433", "dr-lab/database-config"),
            |_, _| {},
        )
        .await;

    assert!(result.is_ok());
    assert!(store
        .current("dr-lab/database-config")
        .unwrap()
        .contains("secondary-db.example.com"));
    // The failed attempts never wrote; the one landed write bumped the version.
    assert_eq!(store.version("dr-lab/database-config"), Some(2));
}

#[tokio::test(start_paused = true)]
async fn rotation_exhausts_policy_when_store_stays_down() {
    let store = Arc::new(MemoryCredentialStore::new());
    store.seed("dr-lab/database-config", r#"{"engine":"postgres","host":"h","port":5433,"dbname":"d","username":"u","password":"p"}"#);
    store.inject_outages(10);

    let rotator = SecretRotator::new(store);
    let policy = RetryPolicy::new(fast_retry(3));

    let mut attempts = Vec::new();
    let result: DrResult<()> = policy
        .run(
            "rotate-secret",
            |_attempt| rotator.rotate("secondary-db.example.com", "dr-lab/database-config"),
            |attempt, _| attempts.push(attempt),
        )
        .await;

    assert!(result.is_err());
    assert_eq!(attempts, vec![1, 2, 3]);
}

#[tokio::test]
async fn prober_counts_a_flapping_endpoint_correctly() {
    // down, down, up, down: the flap resets the streak before the last probe.
    let check = Arc::new(MemoryEndpointCheck::with_statuses(vec![500, 502, 204, 503]));
    let prober = HealthProber::new(check, &ProbeConfig::default());

    let url = "https://app.example.com/healthz";
    assert_eq!(prober.probe(url).await.consecutive_failures, 1);
    assert!(prober.probe(url).await.is_down(2));
    assert_eq!(prober.probe(url).await.consecutive_failures, 0);
    let last = prober.probe(url).await;
    assert!(!last.is_down(2));
    assert_eq!(last.consecutive_failures, 1);
}

#[tokio::test]
async fn snapshot_selection_prefers_t3_of_t1_t2_t3() {
    let db = Arc::new(MemoryDatabaseControl::new());
    let t1 = SnapshotInfo {
        snapshot_id: SnapshotId::new(),
        created_at: Utc::now() - ChronoDuration::hours(9),
    };
    let t2 = SnapshotInfo {
        snapshot_id: SnapshotId::new(),
        created_at: Utc::now() - ChronoDuration::hours(6),
    };
    let t3 = SnapshotInfo {
        snapshot_id: SnapshotId::new(),
        created_at: Utc::now() - ChronoDuration::hours(3),
    };
    let latest = t3.snapshot_id;
    db.set_snapshots(vec![t2, t1, t3]);

    let driver = RecoveryDriver::new(db.clone());
    driver
        .start(&RecoveryStrategy::Snapshot {
            instance_id: "dr-lab-primary-db".into(),
            lookback_hours: 24,
        })
        .await
        .unwrap();

    assert_eq!(db.restored_snapshot(), Some(latest));
}
