//! Verification domain model.
//!
//! Verification commands are external commands whose observed exit status
//! must match a declared expectation. The status document is the on-disk
//! contract an agent signs to claim completion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

/// Expected outcome of a verification command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    /// Command must exit 0
    Success,
    /// Command must exit non-zero
    Failure,
}

impl Expectation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// A declared verification command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationCommand {
    /// Shell command line to execute
    pub command: String,
    /// Expected outcome
    pub expectation: Expectation,
    /// Human-readable description
    pub description: String,
    /// When true, a mismatch may stop subsequent commands (fail-fast)
    pub critical: bool,
    /// Per-command timeout in milliseconds
    pub timeout_ms: u64,
}

impl VerificationCommand {
    /// Declare a command expected to succeed.
    pub fn expect_success(command: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            expectation: Expectation::Success,
            description: description.into(),
            critical: false,
            timeout_ms: 60_000,
        }
    }

    /// Declare a command expected to fail.
    pub fn expect_failure(command: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            expectation: Expectation::Failure,
            description: description.into(),
            critical: false,
            timeout_ms: 60_000,
        }
    }

    /// Mark the command critical.
    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    /// Set the timeout.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// Outcome of one executed verification command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// The command line that was executed
    pub command: String,
    /// Observed exit code; None when the process was killed or timed out
    pub exit_code: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
    /// True when the command was killed for exceeding its timeout
    pub timed_out: bool,
    /// Whether the observed exit matched the declared expectation
    pub matches_expectation: bool,
}

impl VerificationResult {
    /// Evaluate a command outcome against its expectation.
    ///
    /// A timeout never matches, regardless of expectation.
    pub fn evaluate(
        command: &VerificationCommand,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
        duration_ms: u64,
        timed_out: bool,
    ) -> Self {
        let matches_expectation = !timed_out
            && match command.expectation {
                Expectation::Success => exit_code == Some(0),
                Expectation::Failure => matches!(exit_code, Some(code) if code != 0),
            };
        Self {
            command: command.command.clone(),
            exit_code,
            stdout,
            stderr,
            duration_ms,
            timed_out,
            matches_expectation,
        }
    }
}

/// Verification preset applied to an agent based on its working mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationPreset {
    /// Typecheck only
    Typescript,
    /// Typecheck + tests
    Test,
    /// Typecheck + tests + build
    Build,
    /// Typecheck + tests + build + a non-critical spawn-site count
    General,
}

impl VerificationPreset {
    /// Default command set for this preset.
    pub fn commands(&self) -> Vec<VerificationCommand> {
        let mut commands = vec![VerificationCommand::expect_success(
            "npm run typecheck",
            "TypeScript compilation must pass",
        )
        .critical()];
        if matches!(self, Self::Test | Self::Build | Self::General) {
            commands.push(
                VerificationCommand::expect_success("npm test", "Test suite must pass").critical(),
            );
        }
        if matches!(self, Self::Build | Self::General) {
            commands.push(
                VerificationCommand::expect_success("npm run build", "Build must succeed")
                    .critical(),
            );
        }
        if matches!(self, Self::General) {
            commands.push(VerificationCommand::expect_success(
                "grep -rc 'spawn(' src/ || true",
                "Count agent spawn sites",
            ));
        }
        commands
    }
}

/// A verification requirement for one agent.
#[derive(Debug, Clone)]
pub struct VerificationRequirement {
    /// Agent being verified
    pub agent_id: Uuid,
    /// Commands that must all match their expectation
    pub required_commands: Vec<VerificationCommand>,
    /// Working directory for the commands
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables
    pub env: HashMap<String, String>,
}

impl VerificationRequirement {
    pub fn new(agent_id: Uuid, required_commands: Vec<VerificationCommand>) -> Self {
        Self {
            agent_id,
            required_commands,
            working_dir: None,
            env: HashMap::new(),
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// The on-disk contract an agent signs to claim completion.
///
/// Contract: `ok = true ⇒ errors = 0`. An absent or malformed document is a
/// verification failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusDocument {
    /// Whether every declared command matched its expectation
    pub ok: bool,
    /// Count of non-matching commands
    pub errors: u32,
    /// Number of agent spawn sites reported
    pub spawned: u32,
    /// When the document was last written
    pub timestamp: DateTime<Utc>,
    /// The declared command lines
    pub verification_commands: Vec<String>,
    /// Free-form details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Failed commands and their captured output
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub error_details: Vec<String>,
}

impl StatusDocument {
    /// Create a fresh document declaring the given commands, not yet verified.
    pub fn declare(commands: &[VerificationCommand]) -> Self {
        Self {
            ok: false,
            errors: 0,
            spawned: 0,
            timestamp: Utc::now(),
            verification_commands: commands.iter().map(|c| c.command.clone()).collect(),
            details: None,
            error_details: Vec::new(),
        }
    }

    /// Fold command results into the document.
    pub fn record_results(&mut self, results: &[VerificationResult]) {
        let failing: Vec<&VerificationResult> =
            results.iter().filter(|r| !r.matches_expectation).collect();
        self.ok = failing.is_empty();
        self.errors = failing.len() as u32;
        self.timestamp = Utc::now();
        for failure in failing {
            self.error_details.push(format!(
                "{} (exit={:?}, timed_out={}): {}",
                failure.command,
                failure.exit_code,
                failure.timed_out,
                if failure.stderr.is_empty() {
                    &failure.stdout
                } else {
                    &failure.stderr
                }
            ));
        }
    }

    /// Whether this document satisfies the acceptance contract.
    pub fn is_passing(&self) -> bool {
        self.ok && self.errors == 0
    }
}
