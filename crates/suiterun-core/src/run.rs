//! Run lifecycle types.
//!
//! A run is one test-suite execution request against one environment.
//! Status is stored as text in the database; the enum here is the single
//! source of truth for legal values. Transitions are enforced by the
//! guarded UPDATE statements in the run repository.

use serde::{Deserialize, Serialize};

use crate::{Error, ResourceId, Result};

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    Success,
    Failed,
    Error,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
            RunStatus::Error => "error",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Success | RunStatus::Failed | RunStatus::Error | RunStatus::Cancelled
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(RunStatus::Queued),
            "in_progress" => Ok(RunStatus::InProgress),
            "success" => Ok(RunStatus::Success),
            "failed" => Ok(RunStatus::Failed),
            "error" => Ok(RunStatus::Error),
            "cancelled" => Ok(RunStatus::Cancelled),
            other => Err(Error::InvalidInput(format!("unknown run status: {other}"))),
        }
    }
}

/// How a run came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Manual,
    Schedule,
    Webhook,
    Api,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Manual => "manual",
            TriggerKind::Schedule => "schedule",
            TriggerKind::Webhook => "webhook",
            TriggerKind::Api => "api",
        }
    }
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TriggerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "manual" => Ok(TriggerKind::Manual),
            "schedule" => Ok(TriggerKind::Schedule),
            "webhook" => Ok(TriggerKind::Webhook),
            "api" => Ok(TriggerKind::Api),
            other => Err(Error::InvalidInput(format!("unknown trigger kind: {other}"))),
        }
    }
}

/// Parameters for creating a run (and its queue entry) from any trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRun {
    pub environment_id: ResourceId,
    /// Set when the run was created by a cron schedule.
    pub schedule_id: Option<ResourceId>,
    /// Shell command that launches the test suite.
    pub test_command: String,
    /// Opaque key/value map passed through to the test process env.
    pub custom_config: serde_json::Value,
    pub triggered_by: TriggerKind,
    /// Queue priority; higher claims first. None uses the default.
    pub priority: Option<i32>,
}

impl NewRun {
    pub fn new(environment_id: ResourceId, test_command: impl Into<String>) -> Self {
        Self {
            environment_id,
            schedule_id: None,
            test_command: test_command.into(),
            custom_config: serde_json::json!({}),
            triggered_by: TriggerKind::Manual,
            priority: None,
        }
    }
}
