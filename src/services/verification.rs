//! Verification pipeline.
//!
//! Runs an agent's declared verification commands through the injected
//! subprocess runner, maintains the agent's on-disk status document, and
//! gates task and objective completion on the results. Verification
//! failures are never recovered here; they propagate to the scheduler.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::error::{SwarmError, SwarmResult, VerificationError};
use crate::domain::models::{
    StatusDocument, VerificationRequirement, VerificationResult,
};
use crate::domain::ports::{CommandSpec, ProcessRunner};
use std::sync::Arc;

/// Configuration for the verification pipeline.
#[derive(Debug, Clone)]
pub struct VerificationConfig {
    /// When false, enforcement short-circuits to success
    pub enabled: bool,
    /// Directory holding `<agent_id>-status.json` documents
    pub status_dir: PathBuf,
    /// Stop executing after a failed critical command
    pub fail_fast: bool,
    /// Poll interval for [`VerificationPipeline::wait_for_status`]
    pub poll_interval: Duration,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            status_dir: PathBuf::from("./.claude-flow/swarm-status"),
            fail_fast: true,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Outcome of per-objective enforcement across all participating agents.
#[derive(Debug, Clone)]
pub struct ObjectiveVerification {
    pub objective_id: Uuid,
    pub total_agents: usize,
    pub successful_agents: usize,
    pub failures: Vec<VerificationError>,
}

impl ObjectiveVerification {
    pub fn all_passed(&self) -> bool {
        self.successful_agents == self.total_agents
    }
}

/// Result of waiting for status documents to appear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusWait {
    pub found: Vec<PathBuf>,
    pub missing: Vec<PathBuf>,
    pub timed_out: bool,
}

/// The verification pipeline.
pub struct VerificationPipeline {
    runner: Arc<dyn ProcessRunner>,
    config: VerificationConfig,
}

impl VerificationPipeline {
    pub fn new(runner: Arc<dyn ProcessRunner>, config: VerificationConfig) -> Self {
        Self { runner, config }
    }

    pub fn config(&self) -> &VerificationConfig {
        &self.config
    }

    /// Conventional status-document path for an agent.
    pub fn status_path(&self, agent_id: Uuid) -> PathBuf {
        self.config.status_dir.join(format!("{agent_id}-status.json"))
    }

    /// Enforce a requirement against one agent.
    ///
    /// Writes the status document up front with the declared commands,
    /// executes each command, folds the results back into the document, and
    /// accepts only when every command matched its expectation.
    pub async fn enforce_agent(
        &self,
        requirement: &VerificationRequirement,
    ) -> SwarmResult<Vec<VerificationResult>> {
        if !self.config.enabled {
            return Ok(Vec::new());
        }
        let agent_id = requirement.agent_id;
        let mut document = StatusDocument::declare(&requirement.required_commands);
        self.write_document(agent_id, &document).await?;

        let mut results = Vec::new();
        for command in &requirement.required_commands {
            let started = Instant::now();
            let spec = {
                let mut spec = CommandSpec::shell(command.command.as_str())
                    .with_env(requirement.env.clone())
                    .with_timeout_ms(command.timeout_ms);
                if let Some(dir) = &requirement.working_dir {
                    spec = spec.with_cwd(dir);
                }
                spec
            };

            let result = match self.runner.run(spec).await {
                Ok(output) => VerificationResult::evaluate(
                    command,
                    output.exit_code,
                    output.stdout,
                    output.stderr,
                    started.elapsed().as_millis() as u64,
                    output.timed_out,
                ),
                Err(spawn_error) => {
                    // A spawn error is a failure, never swallowed
                    warn!(agent_id = %agent_id, command = %command.command, error = %spawn_error,
                          "Verification command failed to spawn");
                    VerificationResult::evaluate(
                        command,
                        None,
                        String::new(),
                        spawn_error.to_string(),
                        started.elapsed().as_millis() as u64,
                        false,
                    )
                }
            };

            let failed_critical = command.critical && !result.matches_expectation;
            results.push(result);
            if failed_critical && self.config.fail_fast {
                debug!(agent_id = %agent_id, command = %command.command,
                       "Critical command failed; stopping remaining verification");
                break;
            }
        }

        document.record_results(&results);
        self.write_document(agent_id, &document).await?;

        let failures: Vec<VerificationResult> = results
            .iter()
            .filter(|r| !r.matches_expectation)
            .cloned()
            .collect();
        let executed = results.len();
        let declared = requirement.required_commands.len();
        if failures.is_empty() && executed == declared {
            info!(agent_id = %agent_id, commands = executed, "Agent verification passed");
            Ok(results)
        } else {
            Err(VerificationError::failed_commands(agent_id, failures).into())
        }
    }

    /// Validate an agent's existing status document against the acceptance
    /// contract: it exists, parses, and reports `ok = true` with zero errors.
    pub async fn check_status_document(&self, agent_id: Uuid) -> SwarmResult<StatusDocument> {
        let path = self.status_path(agent_id);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|_| SwarmError::from(VerificationError::missing_document(agent_id)))?;
        let document: StatusDocument = serde_json::from_str(&raw)
            .map_err(|_| SwarmError::from(VerificationError::missing_document(agent_id)))?;
        if document.is_passing() {
            Ok(document)
        } else {
            Err(VerificationError::failed_commands(agent_id, Vec::new()).into())
        }
    }

    /// Enforce verification across every unique participating agent of an
    /// objective. Any failure fails the objective.
    pub async fn enforce_objective(
        &self,
        objective_id: Uuid,
        requirements: &[VerificationRequirement],
    ) -> ObjectiveVerification {
        let mut seen = HashSet::new();
        let mut outcome = ObjectiveVerification {
            objective_id,
            total_agents: 0,
            successful_agents: 0,
            failures: Vec::new(),
        };
        for requirement in requirements {
            if !seen.insert(requirement.agent_id) {
                continue;
            }
            outcome.total_agents += 1;
            match self.enforce_agent(requirement).await {
                Ok(_) => outcome.successful_agents += 1,
                Err(SwarmError::Verification(e)) => outcome.failures.push(e),
                Err(other) => {
                    warn!(agent_id = %requirement.agent_id, error = %other,
                          "Objective verification hit a non-verification error");
                    outcome
                        .failures
                        .push(VerificationError::missing_document(requirement.agent_id));
                }
            }
        }
        outcome
    }

    /// Poll until every given status-document path exists, or the timeout
    /// elapses.
    pub async fn wait_for_status(&self, paths: &[PathBuf], timeout: Duration) -> StatusWait {
        let deadline = Instant::now() + timeout;
        loop {
            let mut found = Vec::new();
            let mut missing = Vec::new();
            for path in paths {
                if tokio::fs::try_exists(path).await.unwrap_or(false) {
                    found.push(path.clone());
                } else {
                    missing.push(path.clone());
                }
            }
            if missing.is_empty() {
                return StatusWait {
                    found,
                    missing,
                    timed_out: false,
                };
            }
            if Instant::now() >= deadline {
                return StatusWait {
                    found,
                    missing,
                    timed_out: true,
                };
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    async fn write_document(&self, agent_id: Uuid, document: &StatusDocument) -> SwarmResult<()> {
        let path = self.status_path(agent_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(&path, e))?;
        }
        // Pretty-printed for human inspection
        let json = serde_json::to_string_pretty(document)
            .map_err(|e| SwarmError::Persistence {
                backend: "status-document".to_string(),
                message: e.to_string(),
            })?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| io_error(&path, e))?;
        Ok(())
    }
}

fn io_error(path: &Path, e: std::io::Error) -> SwarmError {
    SwarmError::Persistence {
        backend: "status-document".to_string(),
        message: format!("{}: {e}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Expectation, VerificationCommand};
    use crate::infrastructure::mock::ScriptedProcessRunner;

    fn pipeline(runner: ScriptedProcessRunner, dir: &Path) -> VerificationPipeline {
        VerificationPipeline::new(
            Arc::new(runner),
            VerificationConfig {
                enabled: true,
                status_dir: dir.to_path_buf(),
                fail_fast: true,
                poll_interval: Duration::from_millis(10),
            },
        )
    }

    fn requirement(agent: Uuid, commands: Vec<VerificationCommand>) -> VerificationRequirement {
        VerificationRequirement::new(agent, commands)
    }

    #[tokio::test]
    async fn test_passing_verification_writes_passing_document() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedProcessRunner::always_exit(0);
        let pipeline = pipeline(runner, dir.path());
        let agent = Uuid::new_v4();

        let results = pipeline
            .enforce_agent(&requirement(
                agent,
                vec![VerificationCommand::expect_success("npm run typecheck", "types").critical()],
            ))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].matches_expectation);

        let document = pipeline.check_status_document(agent).await.unwrap();
        assert!(document.ok);
        assert_eq!(document.errors, 0);
        assert_eq!(document.verification_commands, vec!["npm run typecheck"]);
    }

    #[tokio::test]
    async fn test_failing_verification_records_errors() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedProcessRunner::always_exit(2);
        let pipeline = pipeline(runner, dir.path());
        let agent = Uuid::new_v4();

        let err = pipeline
            .enforce_agent(&requirement(
                agent,
                vec![VerificationCommand::expect_success("npm run typecheck", "types").critical()],
            ))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "verification-failed");

        // The document on disk records ok=false, errors=1
        let raw = tokio::fs::read_to_string(pipeline.status_path(agent))
            .await
            .unwrap();
        let document: StatusDocument = serde_json::from_str(&raw).unwrap();
        assert!(!document.ok);
        assert_eq!(document.errors, 1);
        assert!(!document.error_details.is_empty());
    }

    #[tokio::test]
    async fn test_fail_fast_stops_after_critical_failure() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedProcessRunner::always_exit(1);
        let calls = runner.call_log();
        let pipeline = pipeline(runner, dir.path());
        let agent = Uuid::new_v4();

        let commands = vec![
            VerificationCommand::expect_success("npm run typecheck", "types").critical(),
            VerificationCommand::expect_success("npm test", "tests").critical(),
        ];
        let _ = pipeline.enforce_agent(&requirement(agent, commands)).await;
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_expected_failure_command_passes_on_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedProcessRunner::always_exit(3);
        let pipeline = pipeline(runner, dir.path());
        let agent = Uuid::new_v4();

        let results = pipeline
            .enforce_agent(&requirement(
                agent,
                vec![VerificationCommand {
                    command: "grep TODO src/".to_string(),
                    expectation: Expectation::Failure,
                    description: "no TODOs".to_string(),
                    critical: false,
                    timeout_ms: 1_000,
                }],
            ))
            .await
            .unwrap();
        assert!(results[0].matches_expectation);
    }

    #[tokio::test]
    async fn test_spawn_error_surfaces_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedProcessRunner::spawn_error("no such binary");
        let pipeline = pipeline(runner, dir.path());
        let agent = Uuid::new_v4();

        let err = pipeline
            .enforce_agent(&requirement(
                agent,
                vec![VerificationCommand::expect_success("missing-tool", "x")],
            ))
            .await
            .unwrap_err();
        match err {
            SwarmError::Verification(e) => {
                assert_eq!(e.failures.len(), 1);
                assert!(e.failures[0].stderr.contains("no such binary"));
            }
            other => panic!("expected verification error, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_result_never_matches() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedProcessRunner::always_timeout();
        let pipeline = pipeline(runner, dir.path());
        let agent = Uuid::new_v4();

        for expectation in [Expectation::Success, Expectation::Failure] {
            let err = pipeline
                .enforce_agent(&requirement(
                    agent,
                    vec![VerificationCommand {
                        command: "sleep 9999".to_string(),
                        expectation,
                        description: "slow".to_string(),
                        critical: false,
                        timeout_ms: 10,
                    }],
                ))
                .await
                .unwrap_err();
            assert_eq!(err.code(), "verification-failed");
        }
    }

    #[tokio::test]
    async fn test_missing_document_is_distinguished() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedProcessRunner::always_exit(0);
        let pipeline = pipeline(runner, dir.path());

        let err = pipeline
            .check_status_document(Uuid::new_v4())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "status-missing");
    }

    #[tokio::test]
    async fn test_malformed_document_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedProcessRunner::always_exit(0);
        let pipeline = pipeline(runner, dir.path());
        let agent = Uuid::new_v4();

        tokio::fs::create_dir_all(dir.path()).await.unwrap();
        tokio::fs::write(pipeline.status_path(agent), "{not json")
            .await
            .unwrap();

        let err = pipeline.check_status_document(agent).await.unwrap_err();
        assert_eq!(err.code(), "status-missing");
    }

    #[tokio::test]
    async fn test_enforce_objective_aggregates_unique_agents() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedProcessRunner::always_exit(0);
        let pipeline = pipeline(runner, dir.path());
        let a1 = Uuid::new_v4();
        let a2 = Uuid::new_v4();

        let reqs = vec![
            requirement(a1, vec![VerificationCommand::expect_success("true", "x")]),
            requirement(a1, vec![VerificationCommand::expect_success("true", "x")]),
            requirement(a2, vec![VerificationCommand::expect_success("true", "x")]),
        ];
        let outcome = pipeline.enforce_objective(Uuid::new_v4(), &reqs).await;
        assert_eq!(outcome.total_agents, 2);
        assert_eq!(outcome.successful_agents, 2);
        assert!(outcome.all_passed());
    }

    #[tokio::test]
    async fn test_wait_for_status() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedProcessRunner::always_exit(0);
        let pipeline = pipeline(runner, dir.path());

        let present = dir.path().join("present.json");
        let absent = dir.path().join("absent.json");
        tokio::fs::write(&present, "{}").await.unwrap();

        let wait = pipeline
            .wait_for_status(&[present.clone(), absent.clone()], Duration::from_millis(50))
            .await;
        assert!(wait.timed_out);
        assert_eq!(wait.found, vec![present.clone()]);
        assert_eq!(wait.missing, vec![absent]);

        let wait = pipeline
            .wait_for_status(&[present], Duration::from_millis(50))
            .await;
        assert!(!wait.timed_out);
        assert!(wait.missing.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_pipeline_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedProcessRunner::always_exit(1);
        let mut config = VerificationConfig {
            status_dir: dir.path().to_path_buf(),
            ..VerificationConfig::default()
        };
        config.enabled = false;
        let pipeline = VerificationPipeline::new(Arc::new(runner), config);

        let results = pipeline
            .enforce_agent(&requirement(
                Uuid::new_v4(),
                vec![VerificationCommand::expect_success("false", "x")],
            ))
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
