//! Workflow state machine types

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

use crate::error::WorkflowError;

/// Phases a coordinator moves through
///
/// Declaration order is the only allowed direction of travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    Start,
    PreflightCheck,
    RepoBaseline,
    RepoTargetConfig,
    Migration,
    Execute,
    Reboot,
    PostValidate,
    SyncCheck,
    Done,
    Aborted,
}

impl WorkflowPhase {
    /// `Done` and `Aborted` accept no further transition
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowPhase::Done | WorkflowPhase::Aborted)
    }

    /// Forward moves only; phases may be skipped
    #[must_use]
    pub fn can_transition_to(self, next: WorkflowPhase) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == WorkflowPhase::Aborted || next > self
    }
}

impl fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowPhase::Start => "start",
            WorkflowPhase::PreflightCheck => "preflight_check",
            WorkflowPhase::RepoBaseline => "repo_baseline",
            WorkflowPhase::RepoTargetConfig => "repo_target_config",
            WorkflowPhase::Migration => "migration",
            WorkflowPhase::Execute => "execute",
            WorkflowPhase::Reboot => "reboot",
            WorkflowPhase::PostValidate => "post_validate",
            WorkflowPhase::SyncCheck => "sync_check",
            WorkflowPhase::Done => "done",
            WorkflowPhase::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// One entry of the phase history
#[derive(Debug, Clone, Serialize)]
pub struct PhaseRecord {
    pub phase: WorkflowPhase,
    pub entered_at: DateTime<Utc>,
}

/// Per-run state owned by a single coordinator
#[derive(Debug)]
pub struct WorkflowState {
    workflow: &'static str,
    phase: WorkflowPhase,
    history: Vec<PhaseRecord>,
    current_host: Option<String>,
}

impl WorkflowState {
    /// Fresh state in `Start`
    #[must_use]
    pub fn new(workflow: &'static str) -> Self {
        Self {
            workflow,
            phase: WorkflowPhase::Start,
            history: vec![PhaseRecord {
                phase: WorkflowPhase::Start,
                entered_at: Utc::now(),
            }],
            current_host: None,
        }
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> WorkflowPhase {
        self.phase
    }

    /// Every phase entered so far, oldest first
    #[must_use]
    pub fn history(&self) -> &[PhaseRecord] {
        &self.history
    }

    /// Host the coordinator is working on
    #[must_use]
    pub fn current_host(&self) -> Option<&str> {
        self.current_host.as_deref()
    }

    /// Record the host subsequent steps act on
    pub fn set_current_host(&mut self, host: impl Into<String>) {
        self.current_host = Some(host.into());
    }

    /// Move to `next`
    ///
    /// # Errors
    /// Returns `WorkflowError::InvalidTransition` for a backwards move or a move out of a terminal phase
    pub fn advance(&mut self, next: WorkflowPhase) -> Result<(), WorkflowError> {
        if !self.phase.can_transition_to(next) {
            return Err(WorkflowError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }

        let previous = self.phase;
        self.enter(next);
        info!(
            workflow = self.workflow,
            host = self.current_host.as_deref().unwrap_or("-"),
            from = %previous,
            to = %next,
            "phase transition"
        );
        Ok(())
    }

    /// Close the run: `Done` on success, `Aborted` (with an error entry) on failure
    ///
    /// # Errors
    /// Hands back the error that aborted the run
    pub fn finish<T>(mut self, outcome: Result<T, WorkflowError>) -> Result<WorkflowReport<T>, WorkflowError> {
        match outcome {
            Ok(value) => {
                self.advance(WorkflowPhase::Done)?;
                info!(workflow = self.workflow, "workflow completed");
                Ok(WorkflowReport {
                    workflow: self.workflow,
                    history: self.history,
                    value,
                })
            }
            Err(err) => {
                let previous = self.phase;
                if !previous.is_terminal() {
                    self.enter(WorkflowPhase::Aborted);
                }
                error!(
                    workflow = self.workflow,
                    host = self.current_host.as_deref().unwrap_or("-"),
                    phase = %previous,
                    error = %err,
                    "workflow aborted"
                );
                Err(err)
            }
        }
    }

    fn enter(&mut self, phase: WorkflowPhase) {
        self.phase = phase;
        self.history.push(PhaseRecord {
            phase,
            entered_at: Utc::now(),
        });
    }
}

/// What a completed workflow hands back
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowReport<T> {
    pub workflow: &'static str,
    pub history: Vec<PhaseRecord>,
    pub value: T,
}

impl<T> WorkflowReport<T> {
    /// Phases entered, oldest first
    #[must_use]
    pub fn phases(&self) -> Vec<WorkflowPhase> {
        self.history.iter().map(|r| r.phase).collect()
    }
}
