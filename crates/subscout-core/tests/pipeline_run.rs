#![allow(unused_crate_dependencies)]
#![allow(clippy::tests_outside_test_module, reason = "integration tests live in tests/ dir")]
#![allow(clippy::expect_used, reason = "panics are the assertion mechanism in integration tests")]

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use subscout_core::pipeline::artifacts::{HEALTH_FILE, NODES_FILE, URL_META_FILE};
use subscout_core::{AppError, Pipeline, RunOptions};
use subscout_types::{
    CanonicalKey, CredentialSpec, DiscoveryConfig, DiscoveryMode, PipelineConfig, ProbeFailureKind,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SUBSCRIBE: &str = "/api/v1/client/subscribe";

fn ss_padded(i: u8) -> String {
    // "aes-256-gcm:pN" is 14 bytes, so the padded form ends with '='
    format!("ss://{}@node{}.example.net:8388#A{}", STANDARD.encode(format!("aes-256-gcm:p{i}")), i, i)
}

fn ss_unpadded(i: u8) -> String {
    format!("ss://{}@NODE{}.example.net:8388#C{}", STANDARD_NO_PAD.encode(format!("aes-256-gcm:p{i}")), i, i)
}

fn config(seeds: Vec<String>) -> PipelineConfig {
    PipelineConfig {
        seed_urls: seeds,
        worker_pool_size: 4,
        per_host_concurrency: 4,
        per_host_interval_ms: 0,
        probe_timeout_secs: 1,
        run_deadline_secs: 30,
        discovery: DiscoveryConfig { enabled: false, ..DiscoveryConfig::default() },
        ..PipelineConfig::default()
    }
}

fn options(root: &Path, credentials: Vec<CredentialSpec>) -> RunOptions {
    RunOptions {
        data_dir: root.join("data"),
        output_dir: root.join("out"),
        emit_health: true,
        discovery_enabled: true,
        credentials,
    }
}

/// A: five SS nodes. B: answers after the probe timeout. C: one of A's nodes
/// with different base64 padding and host case, always slower than A.
async fn mount_abc(server: &MockServer) -> Vec<String> {
    let a_body: Vec<String> = (1..=5).map(ss_padded).collect();
    Mock::given(method("GET"))
        .and(path(SUBSCRIBE))
        .and(query_param("token", "aaa"))
        .respond_with(ResponseTemplate::new(200).set_body_string(a_body.join("\n")))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(SUBSCRIBE))
        .and(query_param("token", "bbb"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(ss_padded(9))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(SUBSCRIBE))
        .and(query_param("token", "ccc"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(ss_unpadded(2))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(server)
        .await;

    ["aaa", "bbb", "ccc"].iter().map(|t| format!("{}{}?token={}", server.uri(), SUBSCRIBE, t)).collect()
}

#[tokio::test]
async fn test_three_source_scenario() {
    let server = MockServer::start().await;
    let urls = mount_abc(&server).await;
    let dir = TempDir::new().expect("tempdir");

    let pipeline = Pipeline::from_config(config(urls.clone())).expect("pipeline");
    let report = pipeline.run(&options(dir.path(), Vec::new())).await.expect("run");

    assert_eq!(report.nodes.len(), 5, "A's unique nodes only");
    assert_eq!(report.health.alive, 2);
    assert_eq!(report.health.dead, 1);
    assert_eq!(report.health.nodes_before_dedup, 6);
    assert_eq!(report.health.nodes_after_dedup, 5);
    assert_eq!(report.health.discovery_mode, DiscoveryMode::Disabled);
    assert_eq!(report.health.errors.count("probe_timeout"), 1);

    let b = report.candidates.iter().find(|c| c.url == urls[1]).expect("B tracked");
    assert_eq!(b.consecutive_failures, 1);
    assert_eq!(b.last_failure, Some(ProbeFailureKind::Timeout));
    assert!(b.next_eligible_probe.is_some());

    let c_meta = report.url_meta.get(&urls[2]).expect("C metadata");
    assert_eq!(c_meta.node_count, 1);

    let published = std::fs::read_to_string(dir.path().join("out").join(NODES_FILE)).expect("all.txt");
    assert_eq!(published.lines().count(), 5);
    assert!(dir.path().join("out").join(HEALTH_FILE).exists());
    assert!(dir.path().join("out").join(URL_META_FILE).exists());
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let server = MockServer::start().await;
    let urls = mount_abc(&server).await;
    let dir = TempDir::new().expect("tempdir");
    let pipeline = Pipeline::from_config(config(urls)).expect("pipeline");

    let first = pipeline.run(&options(dir.path(), Vec::new())).await.expect("first run");
    let second = pipeline.run(&options(dir.path(), Vec::new())).await.expect("second run");

    let keys = |nodes: &[subscout_types::ProxyNode]| -> BTreeSet<CanonicalKey> {
        nodes.iter().map(|n| n.key.clone()).collect()
    };
    assert_eq!(keys(&first.nodes), keys(&second.nodes));
    assert_eq!(
        first.nodes.iter().map(|n| &n.raw).collect::<Vec<_>>(),
        second.nodes.iter().map(|n| &n.raw).collect::<Vec<_>>()
    );
    // B sits in its backoff window on the second run
    assert_eq!(second.health.deferred, 1);
    assert_eq!(second.health.new_sources, 0);
    assert_eq!(second.diff.added_nodes, 0);
}

#[tokio::test]
async fn test_exhausted_credential_never_used() {
    let server = MockServer::start().await;
    let sub_url = format!("{}{}?token=found1", server.uri(), SUBSCRIBE);

    Mock::given(method("GET"))
        .and(path("/account"))
        .and(query_param("api_key", "drained-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "account_status": "Active",
            "searches_per_month": 100,
            "total_searches_left": 0
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/account"))
        .and(query_param("api_key", "fresh-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "account_status": "Active",
            "searches_per_month": 100,
            "total_searches_left": 100
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("api_key", "drained-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("api_key", "fresh-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "organic_results": [{
                "title": "free nodes",
                "link": "https://forum.example.org/t/1",
                "snippet": format!("subscribe: {sub_url}")
            }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(SUBSCRIBE))
        .and(query_param("token", "found1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ss_padded(1)))
        .mount(&server)
        .await;

    let mut cfg = config(Vec::new());
    cfg.discovery = DiscoveryConfig {
        enabled: true,
        search_base_url: server.uri(),
        ..DiscoveryConfig::default()
    };
    let credentials = vec![CredentialSpec::new("drained-key"), CredentialSpec::new("fresh-key")];
    let dir = TempDir::new().expect("tempdir");

    let report = Pipeline::from_config(cfg)
        .expect("pipeline")
        .run(&options(dir.path(), credentials))
        .await
        .expect("run");

    assert_eq!(report.health.discovery_mode, DiscoveryMode::Full);
    assert_eq!(report.health.discovered, 1);
    assert_eq!(report.nodes.len(), 1);

    let usage = &report.health.credentials;
    assert_eq!(usage.len(), 2);
    assert_eq!(usage[0].used, 100, "drained credential untouched");
    assert_eq!(usage[1].used, 3, "one search per signature query");
    assert!(usage.iter().all(|u| !u.masked.contains("fresh-key")));

    let ledger = std::fs::read_to_string(dir.path().join("data").join("credentials_state.json"))
        .expect("ledger");
    assert!(!ledger.contains("fresh-key"));
    assert!(!ledger.contains("drained-key"));
}

#[tokio::test]
async fn test_no_credentials_degrades_to_history_only() {
    let server = MockServer::start().await;
    let urls = mount_abc(&server).await;
    let mut cfg = config(urls);
    cfg.discovery = DiscoveryConfig {
        enabled: true,
        search_base_url: server.uri(),
        ..DiscoveryConfig::default()
    };
    let dir = TempDir::new().expect("tempdir");

    let report = Pipeline::from_config(cfg)
        .expect("pipeline")
        .run(&options(dir.path(), Vec::new()))
        .await
        .expect("run");

    assert_eq!(report.health.discovery_mode, DiscoveryMode::HistoryOnly);
    assert!(report.health.discovery_reason.is_some());
    assert_eq!(report.health.errors.count("no_credential_available"), 1);
    assert_eq!(report.nodes.len(), 5);
}

#[tokio::test]
async fn test_unwritable_output_is_fatal() {
    let dir = TempDir::new().expect("tempdir");
    let blocker = dir.path().join("out");
    std::fs::write(&blocker, b"not a directory").expect("write blocker");

    let pipeline = Pipeline::from_config(config(Vec::new())).expect("pipeline");
    let err = pipeline.run(&options(dir.path(), Vec::new())).await.expect_err("must fail");
    assert!(matches!(err, AppError::Output { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_corrupt_credential_ledger_does_not_abort() {
    let server = MockServer::start().await;
    let urls = mount_abc(&server).await;
    let dir = TempDir::new().expect("tempdir");
    let data = dir.path().join("data");
    std::fs::create_dir_all(&data).expect("data dir");
    std::fs::write(data.join("credentials_state.json"), "{ truncated").expect("write ledger");

    let report = Pipeline::from_config(config(urls))
        .expect("pipeline")
        .run(&options(dir.path(), vec![CredentialSpec::new("kappa-secret-key")]))
        .await
        .expect("run");

    assert_eq!(report.nodes.len(), 5);
    assert!(data.join("credentials_state.json.corrupt").exists());
    let ledger = std::fs::read_to_string(data.join("credentials_state.json")).expect("ledger rewritten");
    assert!(serde_json::from_str::<serde_json::Value>(&ledger).expect("valid json").is_array());
}
