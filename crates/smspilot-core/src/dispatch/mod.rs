//! Dispatch records: one attempt per tier tried, one summary per command.

pub mod coordinator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channel::{ChannelKind, ErrorKind, TierPayload};

pub use coordinator::{Dispatch, DispatchState, FallbackCoordinator, Tier, TierOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failure,
    Timeout,
}

/// Record of one tier invocation. Never mutated after completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionAttempt {
    pub channel: ChannelKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
    /// Captured output on success, error description otherwise (internal only).
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(skip)]
    pub payload: Option<TierPayload>,
}

impl ExecutionAttempt {
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryStatus {
    /// A live channel acted on the editor.
    Completed,
    /// Only the text-prediction tier answered.
    Predicted,
    /// Every tier failed.
    Failed,
}

impl SummaryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryStatus::Completed => "completed",
            SummaryStatus::Predicted => "predicted",
            SummaryStatus::Failed => "failed",
        }
    }
}

/// The single human-readable outcome of a command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub status: SummaryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelKind>,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ErrorKind>,
}
