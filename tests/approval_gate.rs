//! Approval-gate behavior across tasks and time.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use adjutant::prelude::*;
use common::gate;

#[tokio::test]
async fn wait_sees_an_approval_made_before_timeout() {
    let gate = gate(true);
    let request = gate.create("run_command", json!({"command": "ls"}));

    let waiter = {
        let gate = gate.clone();
        let id = request.id.clone();
        tokio::spawn(async move { gate.wait(&id, Duration::from_secs(5)).await })
    };

    tokio::time::sleep(Duration::from_millis(25)).await;
    assert!(gate.approve(&request.id));
    assert!(waiter.await.unwrap());
}

#[tokio::test]
async fn wait_without_a_decision_returns_false_and_stays_pending() {
    let gate = gate(true);
    let request = gate.create("write_file", json!({"path": "/tmp/x"}));

    assert!(!gate.wait(&request.id, Duration::from_millis(30)).await);

    // The request is still approvable after a mere wait timeout.
    assert!(gate.approve(&request.id));
}

#[tokio::test]
async fn terminal_requests_refuse_further_transitions() {
    let gate = gate(true);

    let approved = gate.create("run_command", json!({}));
    assert!(gate.approve(&approved.id));
    assert!(!gate.approve(&approved.id));
    assert!(!gate.deny(&approved.id));

    let denied = gate.create("send_email", json!({}));
    assert!(gate.deny(&denied.id));
    assert!(!gate.deny(&denied.id));
    assert!(!gate.approve(&denied.id));
}

#[tokio::test]
async fn expiry_sweeps_on_listing() {
    let classifier = Arc::new(RiskClassifier::default());
    let gate = ApprovalGate::new(classifier, true).with_ttl(chrono::Duration::milliseconds(20));
    let request = gate.create("run_command", json!({}));

    assert_eq!(gate.list_pending().len(), 1);
    tokio::time::sleep(Duration::from_millis(40)).await;

    assert!(gate.list_pending().is_empty());
    assert!(!gate.approve(&request.id), "expired request cannot be approved");
}

#[tokio::test]
async fn risk_overrides_change_gating_at_runtime() {
    let classifier = Arc::new(RiskClassifier::default());
    let gate = ApprovalGate::new(classifier.clone(), true);

    assert!(!gate.needs_approval("web_search"));
    classifier.set_risk("web_search", RiskLevel::Dangerous);
    assert!(gate.needs_approval("web_search"));

    classifier.set_risk("run_command", RiskLevel::Safe);
    assert!(!gate.needs_approval("run_command"));
}

#[tokio::test]
async fn unknown_tools_default_to_moderate_and_skip_the_gate() {
    let gate = gate(true);
    assert!(!gate.needs_approval("brand_new_tool"));
    assert_eq!(gate.risk_of("brand_new_tool"), RiskLevel::Moderate);
}
