//! One command end to end: classify, dispatch, format, log.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::ai::{PromptsConfig, TextOracle};
use crate::channel::desktop::Desktop;
use crate::channel::{
    Channel, ChannelKind, TextPredictionChannel, ToolProtocolChannel, UiAutomationChannel,
};
use crate::classifier::CommandClassifier;
use crate::command::{Command, Intent, IntentKind};
use crate::config::AppConfig;
use crate::db::ExecutionLog;
use crate::dispatch::{Dispatch, ExecutionSummary, FallbackCoordinator, SummaryStatus, Tier};
use crate::formatter::ReplyFormatter;

/// Everything produced for one command.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub command: Command,
    pub intent: Intent,
    pub dispatch: Dispatch,
    pub reply: String,
}

/// Tiers in configured order, each with its budget.
pub fn build_tiers(
    config: &AppConfig,
    oracle: Arc<dyn TextOracle>,
    prompts: &PromptsConfig,
    desktop: Arc<dyn Desktop>,
) -> Vec<Tier> {
    config
        .dispatch
        .tiers
        .iter()
        .map(|&kind| {
            let channel: Arc<dyn Channel> = match kind {
                ChannelKind::ToolProtocol => {
                    Arc::new(ToolProtocolChannel::new(config.tool_protocol.clone()))
                }
                ChannelKind::UiAutomation => {
                    Arc::new(UiAutomationChannel::new(desktop.clone(), config.ui.clone()))
                }
                ChannelKind::TextPrediction => {
                    Arc::new(TextPredictionChannel::new(oracle.clone(), prompts.clone()))
                }
            };
            Tier::new(channel, config.dispatch.budget(kind))
        })
        .collect()
}

pub struct Pipeline {
    classifier: CommandClassifier,
    coordinator: FallbackCoordinator,
    formatter: ReplyFormatter,
    log: Option<ExecutionLog>,
    /// Overall budget from receipt to reply.
    deadline: Option<Duration>,
}

impl Pipeline {
    pub fn new(
        classifier: CommandClassifier,
        coordinator: FallbackCoordinator,
        formatter: ReplyFormatter,
    ) -> Self {
        Self {
            classifier,
            coordinator,
            formatter,
            log: None,
            deadline: None,
        }
    }

    /// Pipeline wired from configuration.
    pub fn from_config(
        config: &AppConfig,
        oracle: Arc<dyn TextOracle>,
        prompts: PromptsConfig,
        desktop: Arc<dyn Desktop>,
    ) -> Self {
        let tiers = build_tiers(config, oracle.clone(), &prompts, desktop);
        Self::new(
            CommandClassifier::new(oracle, prompts, config.oracle.timeout()),
            FallbackCoordinator::new(tiers),
            ReplyFormatter::new(config.sms.max_reply_chars),
        )
        .with_deadline(config.dispatch.deadline())
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_log(mut self, log: ExecutionLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn log(&self) -> Option<&ExecutionLog> {
        self.log.as_ref()
    }

    pub fn tier_order(&self) -> Vec<ChannelKind> {
        self.coordinator.tier_order()
    }

    /// Run one command. Always yields exactly one reply.
    pub async fn handle(&self, command: Command) -> PipelineOutcome {
        let deadline = self.deadline.map(|d| Instant::now() + d);
        let intent = match deadline {
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                self.classifier.classify_within(&command, left).await
            }
            None => self.classifier.classify(&command).await,
        };

        let dispatch = if intent.kind == IntentKind::Clarify {
            tracing::info!(command_id = %command.id, "request not understood, skipping tiers");
            Dispatch {
                attempts: Vec::new(),
                summary: clarify_summary(&command.text),
            }
        } else {
            self.coordinator.dispatch_until(&intent, &command, deadline).await
        };

        let reply = self.formatter.format(&dispatch.summary);

        if let Some(log) = &self.log {
            if let Err(e) = log.append(&command, &intent, &dispatch, &reply).await {
                tracing::warn!(command_id = %command.id, "failed to write execution log: {:#}", e);
            }
        }

        PipelineOutcome {
            command,
            intent,
            dispatch,
            reply,
        }
    }
}

fn clarify_summary(text: &str) -> ExecutionSummary {
    let description = if text.trim().is_empty() {
        "Empty message. Try something like \"create hello.py that prints hello\".".to_string()
    } else {
        format!(
            "Could not understand \"{}\". Try something like \"create hello.py that prints hello\" or \"run git status\".",
            crate::formatter::safe_truncate(text.trim(), 80)
        )
    };
    ExecutionSummary {
        status: SummaryStatus::Failed,
        channel: None,
        description,
        last_error: None,
    }
}
