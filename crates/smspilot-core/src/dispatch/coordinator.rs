//! Fallback coordinator - tries tiers in configured order until one succeeds.
//!
//! `Pending -> Trying(tier 0) -> Trying(tier 1) -> ... -> Done`
//!
//! Success short-circuits: later tiers are never invoked once a tier succeeds.
//! Failure, unavailability and budget overrun all move on to the next tier.
//! A timed-out tier is abandoned, its in-flight side effects are not rolled back.
//! With a deadline, each tier's budget is clamped to the time left; tiers
//! reached after the deadline are recorded as timed out without being run.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::{AttemptOutcome, ExecutionAttempt, ExecutionSummary, SummaryStatus};
use crate::channel::{Channel, ChannelError, ChannelKind, ErrorKind, TierPayload};
use crate::command::{Command, Intent};

/// A channel together with its wall-clock budget.
#[derive(Clone)]
pub struct Tier {
    pub channel: Arc<dyn Channel>,
    pub budget: Duration,
}

impl Tier {
    pub fn new(channel: Arc<dyn Channel>, budget: Duration) -> Self {
        Self { channel, budget }
    }
}

/// Tagged result of one tier.
#[derive(Debug, Clone, PartialEq)]
pub enum TierOutcome {
    Success(TierPayload),
    Unavailable(ChannelError),
    Failed(ChannelError),
    Timeout(Duration),
}

impl TierOutcome {
    fn from_result(result: Result<Result<TierPayload, ChannelError>, tokio::time::error::Elapsed>, budget: Duration) -> Self {
        match result {
            Ok(Ok(payload)) => TierOutcome::Success(payload),
            Ok(Err(ChannelError::Timeout(elapsed))) => TierOutcome::Timeout(elapsed),
            Ok(Err(err)) if err.is_unavailable() => TierOutcome::Unavailable(err),
            Ok(Err(err)) => TierOutcome::Failed(err),
            Err(_) => TierOutcome::Timeout(budget),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Pending,
    /// Index into the tier list.
    Trying(usize),
    Done { succeeded: bool },
}

/// Every attempt made for a command plus its single summary.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub attempts: Vec<ExecutionAttempt>,
    pub summary: ExecutionSummary,
}

impl Dispatch {
    pub fn channels_tried(&self) -> Vec<ChannelKind> {
        self.attempts.iter().map(|a| a.channel).collect()
    }
}

pub struct FallbackCoordinator {
    tiers: Vec<Tier>,
}

impl FallbackCoordinator {
    pub fn new(tiers: Vec<Tier>) -> Self {
        Self { tiers }
    }

    pub fn tier_order(&self) -> Vec<ChannelKind> {
        self.tiers.iter().map(|t| t.channel.kind()).collect()
    }

    pub async fn dispatch(&self, intent: &Intent, command: &Command) -> Dispatch {
        self.dispatch_until(intent, command, None).await
    }

    /// Dispatch, finishing every tier by `deadline`.
    pub async fn dispatch_until(
        &self,
        intent: &Intent,
        command: &Command,
        deadline: Option<Instant>,
    ) -> Dispatch {
        let mut attempts = Vec::with_capacity(self.tiers.len());
        let mut state = DispatchState::Pending;

        loop {
            state = match state {
                DispatchState::Pending if self.tiers.is_empty() => {
                    DispatchState::Done { succeeded: false }
                }
                DispatchState::Pending => DispatchState::Trying(0),
                DispatchState::Trying(index) => {
                    let attempt = self
                        .try_tier(&self.tiers[index], intent, command, deadline)
                        .await;
                    let succeeded = attempt.outcome == AttemptOutcome::Success;
                    attempts.push(attempt);

                    if succeeded {
                        DispatchState::Done { succeeded: true }
                    } else if index + 1 < self.tiers.len() {
                        DispatchState::Trying(index + 1)
                    } else {
                        DispatchState::Done { succeeded: false }
                    }
                }
                DispatchState::Done { succeeded } => {
                    tracing::info!(
                        command_id = %command.id,
                        succeeded,
                        tiers_tried = attempts.len(),
                        "dispatch finished"
                    );
                    break;
                }
            };
        }

        let summary = summarize(intent, &attempts);
        Dispatch { attempts, summary }
    }

    async fn try_tier(
        &self,
        tier: &Tier,
        intent: &Intent,
        command: &Command,
        deadline: Option<Instant>,
    ) -> ExecutionAttempt {
        let channel = tier.channel.kind();
        let budget = match deadline {
            Some(deadline) => tier.budget.min(deadline.saturating_duration_since(Instant::now())),
            None => tier.budget,
        };

        let started_at = Utc::now();
        let outcome = if budget.is_zero() {
            tracing::warn!(command_id = %command.id, %channel, "deadline reached, tier skipped");
            TierOutcome::Timeout(budget)
        } else {
            tracing::debug!(command_id = %command.id, %channel, budget_ms = budget.as_millis() as u64, "trying tier");
            let result = tokio::time::timeout(budget, tier.channel.execute(intent, command)).await;
            TierOutcome::from_result(result, budget)
        };
        let finished_at = Utc::now();

        match outcome {
            TierOutcome::Success(payload) => {
                tracing::info!(command_id = %command.id, %channel, "tier succeeded");
                ExecutionAttempt {
                    channel,
                    started_at,
                    finished_at,
                    outcome: AttemptOutcome::Success,
                    output: payload.text.clone(),
                    error: None,
                    payload: Some(payload),
                }
            }
            TierOutcome::Unavailable(err) | TierOutcome::Failed(err) => {
                tracing::warn!(command_id = %command.id, %channel, error = %err, "tier failed");
                ExecutionAttempt {
                    channel,
                    started_at,
                    finished_at,
                    outcome: AttemptOutcome::Failure,
                    output: err.to_string(),
                    error: Some(err.kind()),
                    payload: None,
                }
            }
            TierOutcome::Timeout(budget) => {
                tracing::warn!(command_id = %command.id, %channel, budget_ms = budget.as_millis() as u64, "tier timed out");
                ExecutionAttempt {
                    channel,
                    started_at,
                    finished_at,
                    outcome: AttemptOutcome::Timeout,
                    output: format!("timed out after {:?}", budget),
                    error: Some(ErrorKind::Timeout),
                    payload: None,
                }
            }
        }
    }
}

fn channel_label(kind: ChannelKind) -> &'static str {
    match kind {
        ChannelKind::ToolProtocol => "tool server",
        ChannelKind::UiAutomation => "editor UI",
        ChannelKind::TextPrediction => "prediction",
    }
}

/// Build the one summary for a command from its attempts.
fn summarize(intent: &Intent, attempts: &[ExecutionAttempt]) -> ExecutionSummary {
    let last_error = attempts.iter().rev().find_map(|a| a.error);
    let success = attempts
        .iter()
        .find(|a| a.outcome == AttemptOutcome::Success);

    let Some(success) = success else {
        let reason = last_error
            .map(|k| k.label())
            .unwrap_or("no channel configured");
        return ExecutionSummary {
            status: SummaryStatus::Failed,
            channel: None,
            description: format!(
                "Could not complete \"{}\" (last error: {})",
                intent.description, reason
            ),
            last_error,
        };
    };

    let headline = success
        .payload
        .as_ref()
        .map(|p| p.headline())
        .unwrap_or_else(|| success.output.clone());

    if success.channel.is_live() {
        let mut description = format!("{} via {}", intent.description, channel_label(success.channel));
        if !headline.is_empty() {
            description.push_str(": ");
            description.push_str(&headline);
        }
        return ExecutionSummary {
            status: SummaryStatus::Completed,
            channel: Some(success.channel),
            description,
            last_error: None,
        };
    }

    let description = match last_error {
        Some(kind) => format!(
            "Could not complete in the editor (last error: {}). Predicted: {}",
            kind.label(),
            headline
        ),
        None => format!("Predicted: {}", headline),
    };
    ExecutionSummary {
        status: SummaryStatus::Predicted,
        channel: Some(success.channel),
        description,
        last_error,
    }
}
