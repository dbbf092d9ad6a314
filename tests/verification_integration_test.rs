//! Verification gate scenarios: a failing verification command must fail
//! the task, the objective, and leave an inspectable status document and
//! memory record behind.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{build_swarm, fast_coordinator_config, TestSwarmOptions};
use swarmflow::domain::models::{StatusDocument, VerificationCommand};
use swarmflow::infrastructure::ScriptedProcessRunner;
use swarmflow::services::VerificationConfig;
use swarmflow::{AgentType, MemoryQuery, ObjectiveStatus, Strategy, TaskStatus};

fn enabled_verification(dir: &std::path::Path) -> VerificationConfig {
    VerificationConfig {
        enabled: true,
        status_dir: dir.to_path_buf(),
        fail_fast: true,
        poll_interval: Duration::from_millis(10),
    }
}

#[tokio::test]
async fn test_verification_gate_fails_task_and_objective() {
    let status_dir = tempfile::tempdir().unwrap();
    let swarm = build_swarm(TestSwarmOptions {
        coordinator: swarmflow::CoordinatorConfig {
            task_max_retries: 1,
            ..fast_coordinator_config()
        },
        verification: enabled_verification(status_dir.path()),
        process_runner: Arc::new(ScriptedProcessRunner::always_exit(0).with_exit_for("typecheck", 2)),
        ..TestSwarmOptions::default()
    });
    let agent_id = swarm
        .coordinator
        .register_agent("a1", AgentType::Researcher)
        .await;
    swarm
        .coordinator
        .set_verification_commands(
            agent_id,
            vec![VerificationCommand::expect_success("npm run typecheck", "types").critical()],
        )
        .await;

    swarm.coordinator.start().await;
    let objective_id = swarm
        .coordinator
        .create_objective("survey X", Strategy::Research)
        .await
        .unwrap();

    let status = swarm
        .coordinator
        .wait_for_objective(objective_id, Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(status, ObjectiveStatus::Failed);

    // The verified task exhausted its retries and failed
    let tasks = swarm.store.tasks_for_objective(objective_id).await;
    let research = tasks.iter().find(|t| t.kind == "research").unwrap();
    assert_eq!(research.status, TaskStatus::Failed);
    assert!(research.error.as_ref().unwrap().contains("Verification failed"));

    // The status document records the failing command
    let raw = tokio::fs::read_to_string(
        status_dir
            .path()
            .join(format!("{agent_id}-status.json")),
    )
    .await
    .unwrap();
    let document: StatusDocument = serde_json::from_str(&raw).unwrap();
    assert!(!document.ok);
    assert_eq!(document.errors, 1);
    assert_eq!(document.verification_commands, vec!["npm run typecheck"]);

    // And memory holds the objective-level enforcement record
    let records = swarm.memory.recall(
        &MemoryQuery::new()
            .for_objective(objective_id)
            .with_tag("objective-verification"),
    );
    assert_eq!(records.len(), 1);
    let payload: serde_json::Value = serde_json::from_str(&records[0].content).unwrap();
    let successful = payload["successful_agents"].as_u64().unwrap();
    let total = payload["total_agents"].as_u64().unwrap();
    assert!(successful < total);

    swarm.coordinator.stop().await;
}

#[tokio::test]
async fn test_passing_verification_accepts_objective() {
    let status_dir = tempfile::tempdir().unwrap();
    let swarm = build_swarm(TestSwarmOptions {
        verification: enabled_verification(status_dir.path()),
        process_runner: Arc::new(ScriptedProcessRunner::always_exit(0)),
        ..TestSwarmOptions::default()
    });
    let agent_id = swarm
        .coordinator
        .register_agent("a1", AgentType::Researcher)
        .await;
    swarm
        .coordinator
        .set_verification_commands(
            agent_id,
            vec![VerificationCommand::expect_success("npm run typecheck", "types").critical()],
        )
        .await;

    swarm.coordinator.start().await;
    let objective_id = swarm
        .coordinator
        .create_objective("survey X", Strategy::Research)
        .await
        .unwrap();
    let status = swarm
        .coordinator
        .wait_for_objective(objective_id, Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(status, ObjectiveStatus::Completed);

    // The status document on disk satisfies the acceptance contract
    let raw = tokio::fs::read_to_string(
        status_dir
            .path()
            .join(format!("{agent_id}-status.json")),
    )
    .await
    .unwrap();
    let document: StatusDocument = serde_json::from_str(&raw).unwrap();
    assert!(document.ok);
    assert_eq!(document.errors, 0);

    // The enforcement record reports unanimous success
    let records = swarm.memory.recall(
        &MemoryQuery::new()
            .for_objective(objective_id)
            .with_tag("objective-verification"),
    );
    assert_eq!(records.len(), 1);
    let payload: serde_json::Value = serde_json::from_str(&records[0].content).unwrap();
    assert_eq!(payload["successful_agents"], payload["total_agents"]);

    swarm.coordinator.stop().await;
}
