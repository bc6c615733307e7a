use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex};

use vulnscan_ui::api::ScannerApi;
use vulnscan_ui::error::ApiError;
use vulnscan_ui::session::{Operation, Outcome, Rejected, Session};
use vulnscan_ui::types::{
    AnalyzeQuery, Contract, NetworkInfo, ScanForm, ScanQuery, ScanResult, VulnerabilityRecord,
};
use vulnscan_ui::view::{Controls, ViewModel};

struct Step<T> {
    gate: Option<oneshot::Receiver<()>>,
    reply: Result<T, ApiError>,
}

fn now<T>(reply: Result<T, ApiError>) -> Step<T> {
    Step { gate: None, reply }
}

/// Reply only after the returned sender fires (or is dropped).
fn gated<T>(reply: Result<T, ApiError>) -> (Step<T>, oneshot::Sender<()>) {
    let (tx, rx) = oneshot::channel();
    (Step { gate: Some(rx), reply }, tx)
}

/// Scripted service: each call pops the next reply for its endpoint.
struct Scripted {
    network: Mutex<VecDeque<Step<NetworkInfo>>>,
    scans: Mutex<VecDeque<Step<ScanResult>>>,
    analyses: Mutex<VecDeque<Step<ScanResult>>>,
    matches: Mutex<VecDeque<Step<Vec<VulnerabilityRecord>>>>,
    scan_queries: Mutex<Vec<ScanQuery>>,
    matched: Mutex<Vec<ScanResult>>,
    started: mpsc::UnboundedSender<Operation>,
}

impl Scripted {
    fn new() -> (Self, mpsc::UnboundedReceiver<Operation>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let s = Self {
            network: Mutex::default(),
            scans: Mutex::default(),
            analyses: Mutex::default(),
            matches: Mutex::default(),
            scan_queries: Mutex::default(),
            matched: Mutex::default(),
            started: tx,
        };
        (s, rx)
    }

    async fn next<T>(&self, queue: &Mutex<VecDeque<Step<T>>>, op: Operation) -> Result<T, ApiError> {
        let step = queue
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| panic!("unscripted call: {op:?}"));
        let _ = self.started.send(op);
        if let Some(gate) = step.gate {
            let _ = gate.await;
        }
        step.reply
    }
}

impl ScannerApi for Scripted {
    async fn network_info(&self) -> Result<NetworkInfo, ApiError> {
        self.next(&self.network, Operation::NetworkInfo).await
    }

    async fn scan_ports(&self, query: &ScanQuery) -> Result<ScanResult, ApiError> {
        self.scan_queries.lock().await.push(query.clone());
        self.next(&self.scans, Operation::ScanPorts).await
    }

    async fn analyze_web_page(&self, _query: &AnalyzeQuery) -> Result<ScanResult, ApiError> {
        self.next(&self.analyses, Operation::AnalyzeWebPage).await
    }

    async fn match_vulnerabilities(
        &self,
        scan_result: &ScanResult,
    ) -> Result<Vec<VulnerabilityRecord>, ApiError> {
        self.matched.lock().await.push(scan_result.clone());
        self.next(&self.matches, Operation::MatchVulnerabilities).await
    }
}

fn result(v: Value) -> ScanResult {
    ScanResult::from_value(v).unwrap()
}

fn records(v: Value) -> Vec<VulnerabilityRecord> {
    Vec::<VulnerabilityRecord>::from_value(v).unwrap()
}

fn transport() -> ApiError {
    ApiError::Transport {
        endpoint: "/api/portscanner".into(),
        message: "connection refused".into(),
    }
}

async fn session_with_target(api: Scripted) -> Arc<Session<Scripted>> {
    let session = Arc::new(Session::new(api));
    session
        .set_form(ScanForm {
            target: "https://example.com".into(),
            ..ScanForm::default()
        })
        .await;
    session
}

#[tokio::test]
async fn loading_spans_the_scan_request_on_success() {
    let (api, mut started) = Scripted::new();
    let (step, release) = gated(Ok(result(json!({ "open": [80] }))));
    api.scans.lock().await.push_back(step);
    let session = session_with_target(api).await;

    assert!(!session.is_loading().await);
    let task = tokio::spawn({
        let s = session.clone();
        async move { s.scan_ports().await }
    });
    assert_eq!(started.recv().await, Some(Operation::ScanPorts));
    assert!(session.is_loading().await);
    assert!(session.snapshot().await.outcome(Operation::ScanPorts).is_pending());

    release.send(()).unwrap();
    let outcome = task.await.unwrap().unwrap();
    assert!(outcome.is_success());
    assert!(!session.is_loading().await);
    assert_eq!(
        session.snapshot().await.scan_result,
        Some(result(json!({ "open": [80] })))
    );
}

#[tokio::test]
async fn loading_is_cleared_on_failure_and_old_result_stays() {
    let (api, _started) = Scripted::new();
    api.scans.lock().await.push_back(now(Ok(result(json!({ "first": true })))));
    api.scans.lock().await.push_back(now(Err(transport())));
    let session = session_with_target(api).await;

    session.scan_ports().await.unwrap();
    let outcome = session.scan_ports().await.unwrap();

    assert_eq!(outcome.error(), Some(&transport()));
    let snap = session.snapshot().await;
    assert!(!snap.loading);
    assert_eq!(snap.scan_result, Some(result(json!({ "first": true }))));
    assert!(snap.outcome(Operation::ScanPorts).error().is_some());
}

#[tokio::test]
async fn scan_forwards_form_values() {
    let (api, _started) = Scripted::new();
    api.scans.lock().await.push_back(now(Ok(result(json!({})))));
    let session = Arc::new(Session::new(api));
    session
        .set_form(ScanForm {
            target: "https://example.com".into(),
            start_port: 1,
            end_port: 1024,
            timeout_ms: 500,
        })
        .await;

    session.scan_ports().await.unwrap();
    let queries = session.api().scan_queries.lock().await;
    assert_eq!(
        queries.as_slice(),
        &[ScanQuery {
            url: "https://example.com".into(),
            start_port: 1,
            end_port: 1024,
            timeout: 500,
        }]
    );
}

#[tokio::test]
async fn actions_without_target_are_rejected_before_any_request() {
    let (api, _started) = Scripted::new();
    let session = Session::new(api);

    assert_eq!(session.scan_ports().await, Err(Rejected::MissingTarget));
    assert_eq!(session.analyze_web_page().await, Err(Rejected::MissingTarget));
    let snap = session.snapshot().await;
    assert!(!snap.loading);
    assert_eq!(snap.outcome(Operation::ScanPorts), &Outcome::Idle);
}

#[tokio::test]
async fn match_is_gated_on_a_stored_result() {
    let (api, _started) = Scripted::new();
    api.analyses
        .lock()
        .await
        .push_back(now(Ok(result(json!({ "title": "Example" })))));
    api.matches.lock().await.push_back(now(Ok(records(json!([])))));
    let session = session_with_target(api).await;

    let snap = session.snapshot().await;
    assert!(!Controls::from_snapshot(&snap).match_vulnerabilities.enabled);
    assert_eq!(
        session.match_vulnerabilities().await,
        Err(Rejected::NoScanResult)
    );

    session.analyze_web_page().await.unwrap();
    let snap = session.snapshot().await;
    let controls = Controls::from_snapshot(&snap);
    assert!(controls.match_vulnerabilities.visible);
    assert!(controls.match_vulnerabilities.enabled);

    assert!(session.match_vulnerabilities().await.unwrap().is_success());
    assert_eq!(
        session.api().matched.lock().await.as_slice(),
        &[result(json!({ "title": "Example" }))]
    );
}

#[tokio::test]
async fn failed_mount_leaves_network_info_absent() {
    let (api, _started) = Scripted::new();
    api.network.lock().await.push_back(now(Err(ApiError::Transport {
        endpoint: "/network/info".into(),
        message: "connection refused".into(),
    })));
    let session = Session::new(api);

    let outcome = session.mount().await;
    assert!(outcome.error().is_some());
    let snap = session.snapshot().await;
    assert_eq!(snap.network_info, None);
    assert!(ViewModel::from_snapshot(&snap).network_line.is_none());
}

#[tokio::test]
async fn mount_stores_network_range() {
    let (api, _started) = Scripted::new();
    api.network.lock().await.push_back(now(Ok(NetworkInfo {
        network_range: "10.0.0.0/24".into(),
    })));
    let session = Session::new(api);

    assert!(session.mount().await.is_success());
    assert!(!session.is_loading().await);
    assert_eq!(
        session.snapshot().await.network_info.map(|n| n.network_range),
        Some("10.0.0.0/24".to_string())
    );
}

#[tokio::test]
async fn matched_records_render_in_order() {
    let (api, _started) = Scripted::new();
    api.scans.lock().await.push_back(now(Ok(result(json!({ "open": [22] })))));
    api.matches.lock().await.push_back(now(Ok(records(json!([
        { "id": "CVE-1" },
        { "id": "CVE-2" },
        { "id": "CVE-3" }
    ])))));
    let session = session_with_target(api).await;

    session.scan_ports().await.unwrap();
    session.match_vulnerabilities().await.unwrap();

    let vm = ViewModel::from_snapshot(&session.snapshot().await);
    assert_eq!(vm.vulnerabilities.len(), 3);
    for (entry, id) in vm.vulnerabilities.iter().zip(["CVE-1", "CVE-2", "CVE-3"]) {
        assert!(entry.contains(id), "{entry} should mention {id}");
    }
}

#[tokio::test]
async fn failed_match_keeps_previous_vulnerabilities() {
    let (api, _started) = Scripted::new();
    api.scans.lock().await.push_back(now(Ok(result(json!({ "open": [22] })))));
    api.matches
        .lock()
        .await
        .push_back(now(Ok(records(json!([{ "id": "CVE-1" }])))));
    api.matches.lock().await.push_back(now(Err(transport())));
    let session = session_with_target(api).await;

    session.scan_ports().await.unwrap();
    session.match_vulnerabilities().await.unwrap();
    let outcome = session.match_vulnerabilities().await.unwrap();

    assert!(outcome.error().is_some());
    let snap = session.snapshot().await;
    assert!(!snap.loading);
    assert_eq!(snap.vulnerabilities, records(json!([{ "id": "CVE-1" }])));
}

#[tokio::test]
async fn analysis_after_scan_replaces_the_result() {
    let (api, _started) = Scripted::new();
    api.scans
        .lock()
        .await
        .push_back(now(Ok(result(json!({ "openPorts": [22, 80], "host": "a" })))));
    api.analyses
        .lock()
        .await
        .push_back(now(Ok(result(json!({ "title": "Example" })))));
    let session = session_with_target(api).await;

    session.scan_ports().await.unwrap();
    session.analyze_web_page().await.unwrap();

    let stored = session.snapshot().await.scan_result.unwrap();
    assert_eq!(stored.as_value(), &json!({ "title": "Example" }));
}

#[tokio::test]
async fn newer_request_for_the_slot_discards_the_stale_one() {
    let (api, mut started) = Scripted::new();
    let (slow_scan, _hold) = gated(Ok(result(json!({ "stale": true }))));
    api.scans.lock().await.push_back(slow_scan);
    api.analyses
        .lock()
        .await
        .push_back(now(Ok(result(json!({ "fresh": true })))));
    let session = session_with_target(api).await;

    let scan = tokio::spawn({
        let s = session.clone();
        async move { s.scan_ports().await }
    });
    assert_eq!(started.recv().await, Some(Operation::ScanPorts));

    assert!(session.analyze_web_page().await.unwrap().is_success());
    assert_eq!(scan.await.unwrap().unwrap(), Outcome::Superseded);

    let snap = session.snapshot().await;
    assert!(!snap.loading);
    assert_eq!(snap.scan_result, Some(result(json!({ "fresh": true }))));
    assert_eq!(snap.outcome(Operation::ScanPorts), &Outcome::Superseded);
    assert!(snap.outcome(Operation::AnalyzeWebPage).is_success());
}
