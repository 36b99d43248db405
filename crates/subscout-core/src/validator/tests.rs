use super::*;
use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use subscout_types::{url_host, DiscoverySource, ProbeFailureKind};

#[derive(Clone)]
enum Behavior {
    Body(u16, &'static str),
    Hang,
    Refuse,
}

struct FakeFetcher {
    routes: HashMap<String, Behavior>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    created: Instant,
    starts: Mutex<Vec<(String, Duration)>>,
    host_in_flight: Mutex<HashMap<String, (usize, usize)>>,
}

impl FakeFetcher {
    fn new(routes: &[(&str, Behavior)]) -> Self {
        Self {
            routes: routes.iter().map(|(u, b)| (u.to_string(), b.clone())).collect(),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            created: Instant::now(),
            starts: Mutex::new(Vec::new()),
            host_in_flight: Mutex::new(HashMap::new()),
        }
    }

    fn started_at(&self, url: &str) -> Duration {
        self.starts.lock().iter().find(|(u, _)| u == url).map(|(_, t)| *t).unwrap()
    }

    fn host_peak(&self, host: &str) -> usize {
        self.host_in_flight.lock().get(host).map_or(0, |(_, peak)| *peak)
    }
}

#[async_trait]
impl SubscriptionFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, PipelineError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.starts.lock().push((url.to_string(), self.created.elapsed()));
        let host = url_host(url);
        {
            let mut hosts = self.host_in_flight.lock();
            let entry = hosts.entry(host.clone()).or_insert((0, 0));
            entry.0 += 1;
            entry.1 = entry.1.max(entry.0);
        }
        let _leave = HostExit { hosts: &self.host_in_flight, host };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let behavior = self.routes.get(url).cloned().unwrap_or(Behavior::Refuse);
        let out = match behavior {
            Behavior::Body(status, body) => {
                Ok(FetchResponse { status, body: body.as_bytes().to_vec(), userinfo: None })
            }
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(FetchResponse { status: 200, body: Vec::new(), userinfo: None })
            }
            Behavior::Refuse => Err(PipelineError::ProbeConnectionError {
                url: url.to_string(),
                message: "connection refused".into(),
            }),
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        out
    }
}

/// Decrements the per-host in-flight count even when the fetch is dropped
/// by a timeout.
struct HostExit<'a> {
    hosts: &'a Mutex<HashMap<String, (usize, usize)>>,
    host: String,
}

impl Drop for HostExit<'_> {
    fn drop(&mut self) {
        if let Some(entry) = self.hosts.lock().get_mut(&self.host) {
            entry.0 -= 1;
        }
    }
}

fn validator(fetcher: Arc<FakeFetcher>, workers: usize, timeout_ms: u64) -> SubscriptionValidator {
    SubscriptionValidator::new(
        fetcher,
        BackoffPolicy::new(60, 3600, 3),
        HostRateLimiter::new(8, Duration::ZERO),
        workers,
        Duration::from_millis(timeout_ms),
    )
}

fn candidate(url: &str) -> CandidateUrl {
    CandidateUrl::new(url, DiscoverySource::History, Utc::now())
}

#[tokio::test]
async fn test_outcomes_are_classified() {
    let fetcher = Arc::new(FakeFetcher::new(&[
        ("https://ok.net/s", Behavior::Body(200, "ss://abc")),
        ("https://empty.net/s", Behavior::Body(200, "  \n")),
        ("https://limited.net/s", Behavior::Body(429, "Too Many Requests")),
        ("https://slow.net/s", Behavior::Hang),
        ("https://down.net/s", Behavior::Refuse),
    ]));
    let v = validator(fetcher, 4, 200);
    let batch = v
        .validate(
            vec![
                candidate("https://ok.net/s"),
                candidate("https://empty.net/s"),
                candidate("https://limited.net/s"),
                candidate("https://slow.net/s"),
                candidate("https://down.net/s"),
            ],
            Utc::now(),
            &CancellationToken::new(),
        )
        .await;

    let by_url: HashMap<&str, &ValidationResult> =
        batch.results.iter().map(|r| (r.url.as_str(), r)).collect();
    assert_eq!(by_url["https://ok.net/s"].outcome, ProbeOutcome::Alive);
    assert_eq!(by_url["https://ok.net/s"].body.as_deref(), Some(b"ss://abc".as_slice()));
    assert_eq!(by_url["https://empty.net/s"].outcome, ProbeOutcome::Dead(ProbeFailureKind::HttpError));
    assert_eq!(by_url["https://limited.net/s"].http_status, Some(429));
    assert!(by_url["https://limited.net/s"].rate_limited);
    assert_eq!(by_url["https://slow.net/s"].outcome, ProbeOutcome::Dead(ProbeFailureKind::Timeout));
    assert_eq!(
        by_url["https://down.net/s"].outcome,
        ProbeOutcome::Dead(ProbeFailureKind::ConnectionRefused)
    );
    assert_eq!(batch.alive().count(), 1);
    assert_eq!(batch.dead_count(), 4);

    let slow = batch.candidates.iter().find(|c| c.url == "https://slow.net/s").unwrap();
    assert_eq!(slow.consecutive_failures, 1);
    assert_eq!(slow.last_failure, Some(ProbeFailureKind::Timeout));
}

#[tokio::test]
async fn test_worker_pool_bound_respected() {
    let routes: Vec<(String, Behavior)> =
        (0..12).map(|i| (format!("https://h{}.net/s", i), Behavior::Body(200, "x"))).collect();
    let refs: Vec<(&str, Behavior)> = routes.iter().map(|(u, b)| (u.as_str(), b.clone())).collect();
    let fetcher = Arc::new(FakeFetcher::new(&refs));
    let v = validator(Arc::clone(&fetcher), 3, 1000);

    let candidates = routes.iter().map(|(u, _)| candidate(u)).collect();
    let batch = v.validate(candidates, Utc::now(), &CancellationToken::new()).await;

    assert_eq!(batch.alive().count(), 12);
    assert!(fetcher.peak.load(Ordering::SeqCst) <= 3);
}

#[tokio::test]
async fn test_deferred_and_quarantined_are_not_probed() {
    let fetcher = Arc::new(FakeFetcher::new(&[
        ("https://a.net/s", Behavior::Body(200, "x")),
        ("https://b.net/s", Behavior::Body(200, "x")),
        ("https://c.net/s", Behavior::Body(200, "x")),
    ]));
    let v = validator(fetcher, 2, 1000);
    let now = Utc::now();

    let mut deferred = candidate("https://b.net/s");
    deferred.next_eligible_probe = Some(now + ChronoDuration::hours(1));
    let mut quarantined = candidate("https://c.net/s");
    quarantined.quarantined = true;
    quarantined.consecutive_failures = 9;

    let batch = v
        .validate(vec![candidate("https://a.net/s"), deferred, quarantined], now, &CancellationToken::new())
        .await;

    assert_eq!(batch.results.len(), 1);
    assert_eq!(batch.deferred, vec!["https://b.net/s".to_string()]);
    assert_eq!(batch.quarantined, vec!["https://c.net/s".to_string()]);
    assert_eq!(batch.candidates.len(), 3);
}

#[tokio::test]
async fn test_cancelled_probes_recorded_as_timeouts() {
    let fetcher = Arc::new(FakeFetcher::new(&[
        ("https://slow1.net/s", Behavior::Hang),
        ("https://slow2.net/s", Behavior::Hang),
    ]));
    let v = validator(fetcher, 2, 60_000);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let batch = v
        .validate(vec![candidate("https://slow1.net/s"), candidate("https://slow2.net/s")], Utc::now(), &cancel)
        .await;

    assert_eq!(batch.results.len(), 2);
    assert!(batch
        .results
        .iter()
        .all(|r| r.outcome == ProbeOutcome::Dead(ProbeFailureKind::Timeout)));
    assert!(batch.candidates.iter().all(|c| c.consecutive_failures == 1));
}

#[tokio::test]
async fn test_repeated_failures_quarantine_but_keep_record() {
    let fetcher = Arc::new(FakeFetcher::new(&[("https://gone.net/s", Behavior::Refuse)]));
    let v = validator(fetcher, 1, 1000);
    let mut c = candidate("https://gone.net/s");
    let mut now = Utc::now();

    for _ in 0..4 {
        let batch = v.validate(vec![c.clone()], now, &CancellationToken::new()).await;
        c = batch.candidates.into_iter().next().unwrap();
        now = c.next_eligible_probe.unwrap_or(now);
    }
    assert!(c.quarantined);
    assert_eq!(c.consecutive_failures, 4);

    let batch = v.validate(vec![c.clone()], now + ChronoDuration::days(30), &CancellationToken::new()).await;
    assert!(batch.results.is_empty());
    assert_eq!(batch.candidates.len(), 1);
}

#[tokio::test]
async fn test_slow_host_does_not_hold_worker_slots() {
    let fetcher = Arc::new(FakeFetcher::new(&[
        ("https://h1.net/a", Behavior::Hang),
        ("https://h1.net/b", Behavior::Hang),
        ("https://h1.net/c", Behavior::Hang),
        ("https://h2.net/d", Behavior::Body(200, "ss://abc")),
    ]));
    let v = SubscriptionValidator::new(
        Arc::clone(&fetcher) as Arc<dyn SubscriptionFetcher>,
        BackoffPolicy::new(60, 3600, 3),
        HostRateLimiter::new(1, Duration::ZERO),
        2,
        Duration::from_millis(200),
    );
    let candidates = ["https://h1.net/a", "https://h1.net/b", "https://h1.net/c", "https://h2.net/d"]
        .into_iter()
        .map(candidate)
        .collect();

    let batch = v.validate(candidates, Utc::now(), &CancellationToken::new()).await;

    let other = fetcher.started_at("https://h2.net/d");
    assert!(other < Duration::from_millis(150), "h2.net started at {:?}", other);
    assert_eq!(fetcher.host_peak("h1.net"), 1);
    assert_eq!(batch.alive().count(), 1);
    assert!(batch
        .results
        .iter()
        .filter(|r| r.url.starts_with("https://h1.net"))
        .all(|r| r.outcome == ProbeOutcome::Dead(ProbeFailureKind::Timeout)));
}

#[tokio::test]
async fn test_per_host_cap_with_mixed_hosts() {
    let mut routes: Vec<String> = (0..4).map(|i| format!("https://busy.net/s{}", i)).collect();
    routes.extend((0..3).map(|i| format!("https://other{}.net/s", i)));
    let refs: Vec<(&str, Behavior)> = routes.iter().map(|u| (u.as_str(), Behavior::Body(200, "x"))).collect();
    let fetcher = Arc::new(FakeFetcher::new(&refs));
    let v = SubscriptionValidator::new(
        Arc::clone(&fetcher) as Arc<dyn SubscriptionFetcher>,
        BackoffPolicy::new(60, 3600, 3),
        HostRateLimiter::new(2, Duration::ZERO),
        3,
        Duration::from_millis(1000),
    );

    let batch =
        v.validate(routes.iter().map(|u| candidate(u)).collect(), Utc::now(), &CancellationToken::new()).await;

    assert_eq!(batch.alive().count(), 7);
    assert_eq!(fetcher.host_peak("busy.net"), 2);
    assert!(fetcher.peak.load(Ordering::SeqCst) <= 3);

    // The first other host starts before busy.net's queued fetches.
    let last_busy = (0..4).map(|i| fetcher.started_at(&format!("https://busy.net/s{}", i))).max().unwrap();
    let first_other = (0..3).map(|i| fetcher.started_at(&format!("https://other{}.net/s", i))).min().unwrap();
    assert!(first_other < last_busy);
}
