use super::*;
use chrono::Duration;
use std::sync::Arc;
use subscout_types::PipelineError;

fn offset() -> FixedOffset {
    FixedOffset::east_opt(8 * 3600).unwrap()
}

fn credential(id: &str, used: u32, quota: u32, reset_in_days: i64) -> Credential {
    Credential {
        id: id.to_string(),
        secret: format!("secret-{}-0123456789", id),
        searches_used: used,
        searches_quota: quota,
        reset_at: Utc::now() + Duration::days(reset_in_days),
        status: CredentialStatus::Active,
        registered_on: None,
        last_error: None,
    }
}

#[tokio::test]
async fn test_selects_largest_headroom() {
    let rotator = QuotaAwareRotator::new(
        vec![credential("a", 90, 100, 3), credential("b", 20, 100, 10), credential("c", 50, 100, 1)],
        0,
    );
    let picked = rotator.acquire_credential().await.unwrap();
    assert_eq!(picked.id, "b");
}

#[tokio::test]
async fn test_tie_prefers_earliest_reset() {
    let rotator = QuotaAwareRotator::new(
        vec![credential("late", 0, 100, 20), credential("soon", 0, 100, 2)],
        0,
    );
    assert_eq!(rotator.acquire_credential().await.unwrap().id, "soon");
}

#[tokio::test]
async fn test_exhausted_credential_never_selected() {
    let mut exhausted = credential("empty", 100, 100, 1);
    exhausted.status = CredentialStatus::Exhausted;
    let rotator = QuotaAwareRotator::new(vec![exhausted, credential("full", 0, 100, 30)], 0);

    for _ in 0..100 {
        let c = rotator.acquire_credential().await.unwrap();
        assert_eq!(c.id, "full");
        rotator.record_usage(&c, 1).await;
    }
    assert!(matches!(
        rotator.acquire_credential().await,
        Err(PipelineError::NoCredentialAvailable)
    ));
    let snapshot = rotator.snapshot().await;
    assert_eq!(snapshot[1].status, CredentialStatus::Exhausted);
    assert_eq!(snapshot[1].searches_used, 100);
}

#[tokio::test]
async fn test_invalid_is_excluded_after_rejection() {
    let rotator = QuotaAwareRotator::new(
        vec![credential("bad", 0, 100, 1), credential("good", 50, 100, 1)],
        0,
    );
    let first = rotator.acquire_credential().await.unwrap();
    assert_eq!(first.id, "bad");
    rotator
        .record_failure(
            &first,
            &PipelineError::CredentialInvalid { credential: first.masked_secret(), message: "401".into() },
        )
        .await;

    for _ in 0..5 {
        let c = rotator.acquire_credential().await.unwrap();
        assert_eq!(c.id, "good");
        rotator.record_usage(&c, 1).await;
    }
    assert_eq!(rotator.snapshot().await[0].status, CredentialStatus::Invalid);
}

#[tokio::test]
async fn test_concurrent_acquires_do_not_overdraw() {
    let rotator = Arc::new(QuotaAwareRotator::new(vec![credential("one", 97, 100, 1)], 0));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let rotator = Arc::clone(&rotator);
        handles.push(tokio::spawn(async move { rotator.acquire_credential().await.is_ok() }));
    }
    let mut granted = 0;
    for h in handles {
        if h.await.unwrap() {
            granted += 1;
        }
    }
    assert_eq!(granted, 3);
}

#[tokio::test]
async fn test_discovery_gate_respects_minimum() {
    let rotator = QuotaAwareRotator::new(vec![credential("a", 95, 100, 1)], 10);
    assert!(matches!(rotator.discovery_gate().await, Err(PipelineError::NoCredentialAvailable)));

    let rotator = QuotaAwareRotator::new(vec![credential("a", 80, 100, 1)], 10);
    assert!(rotator.discovery_gate().await.is_ok());

    let rotator = QuotaAwareRotator::new(Vec::new(), 0);
    assert!(rotator.discovery_gate().await.is_err());
}

#[tokio::test]
async fn test_account_quota_refresh() {
    let rotator = QuotaAwareRotator::new(vec![credential("a", 0, 100, 1)], 0);
    rotator
        .apply_account_quota("a", AccountQuota { searches_left: 0, searches_per_month: 250, active: true })
        .await;
    let snapshot = rotator.snapshot().await;
    let c = &snapshot[0];
    assert_eq!(c.searches_quota, 250);
    assert_eq!(c.searches_used, 250);
    assert_eq!(c.status, CredentialStatus::Exhausted);
}

#[tokio::test]
async fn test_store_ledger_round_trip_and_rollover() {
    let dir = tempfile::tempdir().unwrap();
    let specs = vec![CredentialSpec::new("alpha-secret-key"), CredentialSpec::new("beta-secret-key")];
    let now = Utc::now();

    let mut store = CredentialStore::load(dir.path(), &specs, 100, offset(), now).await.unwrap();
    assert_eq!(store.credentials().len(), 2);

    let rotator = store.rotator(0);
    let c = rotator.acquire_credential().await.unwrap();
    rotator
        .record_failure(&c, &PipelineError::CredentialExhausted { credential: c.masked_secret() })
        .await;
    store.absorb(rotator.snapshot().await);
    store.persist().await.unwrap();

    let raw = std::fs::read_to_string(dir.path().join(LEDGER_FILE)).unwrap();
    assert!(!raw.contains("alpha-secret-key"));

    // Same period: exhausted status survives a reload.
    let reloaded = CredentialStore::load(dir.path(), &specs, 100, offset(), now).await.unwrap();
    let exhausted = reloaded.credentials().iter().find(|x| x.id == c.id).unwrap();
    assert_eq!(exhausted.status, CredentialStatus::Exhausted);
    assert_eq!(exhausted.secret, c.secret);

    // After reset_at: back to active with a fresh period.
    let later = exhausted.reset_at + Duration::hours(1);
    let rolled = CredentialStore::load(dir.path(), &specs, 100, offset(), later).await.unwrap();
    let fresh = rolled.credentials().iter().find(|x| x.id == c.id).unwrap();
    assert_eq!(fresh.status, CredentialStatus::Active);
    assert_eq!(fresh.searches_used, 0);
    assert!(fresh.reset_at > later);
}

#[tokio::test]
async fn test_invalid_survives_rollover_until_manual_reset() {
    let dir = tempfile::tempdir().unwrap();
    let specs = vec![CredentialSpec::new("gamma-secret-key")];
    let now = Utc::now();

    let mut store = CredentialStore::load(dir.path(), &specs, 100, offset(), now).await.unwrap();
    let mut creds = store.credentials().to_vec();
    creds[0].status = CredentialStatus::Invalid;
    let reset_at = creds[0].reset_at;
    store.absorb(creds);
    store.persist().await.unwrap();

    let mut later =
        CredentialStore::load(dir.path(), &specs, 100, offset(), reset_at + Duration::days(1)).await.unwrap();
    assert_eq!(later.credentials()[0].status, CredentialStatus::Invalid);

    let id = later.credentials()[0].id.clone();
    assert_eq!(later.reset(&id[..4]), Some(id));
    assert_eq!(later.credentials()[0].status, CredentialStatus::Active);
}

#[tokio::test]
async fn test_declared_quota_and_malformed_secret() {
    let dir = tempfile::tempdir().unwrap();
    let specs = vec![
        CredentialSpec { quota: Some(250), ..CredentialSpec::new("delta-secret-key") },
        CredentialSpec::new("has space"),
    ];
    let store = CredentialStore::load(dir.path(), &specs, 100, offset(), Utc::now()).await.unwrap();
    assert_eq!(store.credentials()[0].searches_quota, 250);
    assert_eq!(store.credentials()[1].status, CredentialStatus::Invalid);
}

#[tokio::test]
async fn test_corrupt_ledger_is_set_aside() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(LEDGER_FILE), "{ truncated").unwrap();
    let specs = vec![CredentialSpec::new("epsilon-secret-key")];

    let store = CredentialStore::load(dir.path(), &specs, 100, offset(), Utc::now()).await.unwrap();
    assert_eq!(store.credentials().len(), 1);
    assert_eq!(store.credentials()[0].status, CredentialStatus::Active);
    assert_eq!(store.credentials()[0].searches_used, 0);
    assert!(dir.path().join("credentials_state.json.corrupt").exists());

    // The next persist writes a clean ledger in its place.
    store.persist().await.unwrap();
    let reloaded = CredentialStore::load(dir.path(), &specs, 100, offset(), Utc::now()).await.unwrap();
    assert_eq!(reloaded.credentials()[0].id, store.credentials()[0].id);
}
