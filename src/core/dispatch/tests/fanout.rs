use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::support::{Behavior, ScriptedConnection, no_push_agent, scripted_agent};
use crate::core::dispatch::{OperationKind, OperationRequest, dispatch};

fn request(kind: OperationKind) -> Arc<OperationRequest> {
    Arc::new(OperationRequest {
        id: "req-1".into(),
        kind,
        payload: serde_json::json!({"command": "uptime"}),
        initiated_by: "tester".into(),
    })
}

async fn drain(
    mut rx: tokio::sync::mpsc::Receiver<crate::core::dispatch::DispatchResult>,
) -> Vec<crate::core::dispatch::DispatchResult> {
    let mut out = Vec::new();
    while let Some(result) = rx.recv().await {
        out.push(result);
    }
    out
}

#[tokio::test]
async fn every_agent_reports_exactly_once_despite_failures() {
    let agents = vec![
        scripted_agent("ok", ScriptedConnection::new(Behavior::Succeed("done"))),
        scripted_agent("gone", ScriptedConnection::new(Behavior::Disconnect)),
        scripted_agent("old", ScriptedConnection::new(Behavior::UnknownRequest)),
        scripted_agent("picky", ScriptedConnection::new(Behavior::Reject("busy"))),
    ];

    let results = drain(dispatch(request(OperationKind::RunCommand), agents)).await;

    assert_eq!(results.len(), 4);
    let mut ids: Vec<&str> = results.iter().map(|r| r.agent_id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["gone", "ok", "old", "picky"]);

    let by_id = |id: &str| results.iter().find(|r| r.agent_id == id).unwrap();
    assert!(by_id("ok").success);
    assert_eq!(by_id("ok").message, "done");
    assert!(!by_id("gone").success);
    assert_eq!(by_id("gone").message, "agent disconnected");
    assert!(!by_id("picky").success);
    assert_eq!(by_id("picky").message, "agent rejected the request: busy");
}

#[tokio::test]
async fn unknown_request_is_rewritten_into_an_upgrade_hint() {
    let agents = vec![scripted_agent(
        "old",
        ScriptedConnection::new(Behavior::UnknownRequest),
    )];

    let results = drain(dispatch(request(OperationKind::RunCommand), agents)).await;

    assert_eq!(results.len(), 1);
    assert!(!results[0].success);
    assert_eq!(
        results[0].message,
        "agent does not support this operation, please upgrade the agent to the latest version"
    );
}

#[tokio::test(start_paused = true)]
async fn a_slow_agent_never_delays_its_siblings() {
    let agents = vec![
        scripted_agent(
            "slow",
            ScriptedConnection::new(Behavior::SucceedAfter(
                Duration::from_secs(30),
                "finally",
            )),
        ),
        scripted_agent("fast-1", ScriptedConnection::new(Behavior::Succeed("ok"))),
        scripted_agent("fast-2", ScriptedConnection::new(Behavior::Disconnect)),
    ];

    let mut rx = dispatch(request(OperationKind::RunCommand), agents);

    // Results arrive in completion order: both fast agents come through
    // before the slow one resolves.
    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert_ne!(first.agent_id, "slow");
    assert_ne!(second.agent_id, "slow");

    let third = rx.recv().await.unwrap();
    assert_eq!(third.agent_id, "slow");
    assert_eq!(third.message, "finally");
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn push_policy_short_circuits_without_a_remote_call() {
    let blocked_conn = ScriptedConnection::new(Behavior::Succeed("never reached"));
    let open_conn = ScriptedConnection::new(Behavior::Succeed("pushed"));
    let agents = vec![
        no_push_agent("blocked", blocked_conn.clone()),
        scripted_agent("open", open_conn.clone()),
    ];

    let results = drain(dispatch(request(OperationKind::PushFile), agents)).await;

    assert_eq!(results.len(), 2);
    let by_id = |id: &str| results.iter().find(|r| r.agent_id == id).unwrap();
    assert!(!by_id("blocked").success);
    assert_eq!(
        by_id("blocked").message,
        "file pushes are disabled on this agent"
    );
    assert!(by_id("open").success);

    assert_eq!(blocked_conn.calls.load(Ordering::SeqCst), 0);
    assert_eq!(open_conn.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn run_commands_ignore_the_push_capability_flag() {
    let conn = ScriptedConnection::new(Behavior::Succeed("ran"));
    let agents = vec![no_push_agent("no-push", conn.clone())];

    let results = drain(dispatch(request(OperationKind::RunCommand), agents)).await;

    assert!(results[0].success);
    assert_eq!(conn.calls.load(Ordering::SeqCst), 1);
}
