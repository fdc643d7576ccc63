use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use tracing::{debug, error, info, warn};

use super::{BatchDefinition, RunResult};
use crate::chat::{DriverOptions, PollTiming, SessionDriver, Transcript, Turn};
use crate::error::Result;
use crate::platform::Platform;
use crate::steps::StepExecutor;

/// Runs one batch definition to a verdict. Never fails: errors end up in the
/// returned result.
#[async_trait]
pub trait RunBatch: Send + Sync {
    async fn run(&self, batch: &BatchDefinition) -> RunResult;
}

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    pub timing: PollTiming,
    pub default_language: String,
    /// Log the conversation at info level instead of debug.
    pub show_chat: bool,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        let driver = DriverOptions::default();
        Self {
            timing: driver.timing,
            default_language: driver.default_language,
            show_chat: false,
        }
    }
}

pub struct BatchRunner {
    platform: Arc<dyn Platform>,
    options: RunnerOptions,
}

impl BatchRunner {
    pub fn new(platform: Arc<dyn Platform>, options: RunnerOptions) -> Self {
        Self { platform, options }
    }

    fn log_turns(&self, batch: &str, turns: &[Turn]) {
        for turn in turns {
            let time = DateTime::<Local>::from(turn.ts).format("%H:%M:%S");
            if self.options.show_chat {
                info!(target: "chatprobe::chat", batch, "[{}] {} {}", turn.actor, time, turn.text);
            } else {
                debug!(target: "chatprobe::chat", batch, "[{}] {} {}", turn.actor, time, turn.text);
            }
        }
    }

    async fn converse(&self, batch: &BatchDefinition, transcript: &mut Transcript) -> Result<()> {
        let mut driver = SessionDriver::connect(
            self.platform.clone(),
            batch.app_id(),
            DriverOptions {
                timing: self.options.timing,
                default_language: self.options.default_language.clone(),
            },
        )
        .await?;
        let session_id = driver.start(batch.settings.language.as_deref()).await?;
        debug!(target: "chatprobe::batch", batch = %batch.name, %session_id, "Awaiting welcome");

        let welcome = driver.await_response().await;
        self.log_turns(&batch.name, &welcome);
        transcript.record_response(welcome);

        for (index, step) in batch.chat.iter().enumerate() {
            let before = transcript.len();
            StepExecutor::new(&mut driver, &batch.settings)
                .execute(step, transcript)
                .await
                .inspect_err(|e| {
                    debug!(target: "chatprobe::batch", batch = %batch.name, step = index, kind = step.kind(), error = %e, "Step failed");
                })?;
            self.log_turns(&batch.name, &transcript.turns()[before..]);

            let response = driver.await_response().await;
            self.log_turns(&batch.name, &response);
            transcript.record_response(response);
        }
        Ok(())
    }
}

#[async_trait]
impl RunBatch for BatchRunner {
    async fn run(&self, batch: &BatchDefinition) -> RunResult {
        let started_at = Utc::now();
        info!(target: "chatprobe::batch", batch = %batch.name, app_id = %batch.app_id(), steps = batch.chat.len(), "Running batch");

        let mut transcript = Transcript::new();
        let outcome = self.converse(batch, &mut transcript).await;
        let transcript = transcript.into_turns();

        match outcome {
            Ok(()) => {
                info!(target: "chatprobe::batch", batch = %batch.name, turns = transcript.len(), "Batch passed");
                RunResult::passed(&batch.name, batch.app_id(), transcript, started_at)
            }
            Err(e) => {
                if e.is_step_failure() {
                    warn!(target: "chatprobe::batch", batch = %batch.name, reason = %e, "Batch failed");
                } else {
                    error!(target: "chatprobe::batch", batch = %batch.name, reason = %e, "Batch failed");
                }
                RunResult::failed(&batch.name, batch.app_id(), e.to_string(), transcript, started_at)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Actor;
    use crate::steps::{SelectMatcher, TestStep};
    use crate::test_utils::{ScriptedPlatform, ScriptedReply};
    use std::time::Duration;

    fn fast() -> RunnerOptions {
        RunnerOptions {
            timing: PollTiming {
                interval: Duration::from_millis(100),
                idle_polls: 5,
                quiet_polls: 3,
            },
            ..RunnerOptions::default()
        }
    }

    fn batch(steps: Vec<TestStep>) -> BatchDefinition {
        BatchDefinition {
            name: "ticket".into(),
            file_path: "tests/ticket.yaml".into(),
            app_id: Some("poa".into()),
            settings: Default::default(),
            settings_overrides: Vec::new(),
            chat: steps,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn select_answers_with_the_chosen_button() {
        let platform = Arc::new(
            ScriptedPlatform::new()
                .with_welcome(ScriptedReply::buttons(&[("a", "Yes"), ("b", "No")]))
                .with_reply("No", ScriptedReply::text(&["Ok, goodbye"])),
        );
        let runner = BatchRunner::new(platform.clone(), fast());

        let result = runner
            .run(&batch(vec![TestStep::Select(SelectMatcher::Text("b".into()))]))
            .await;

        assert!(result.success, "{:?}", result.reason);
        assert_eq!(platform.sent_texts(), vec!["No"]);
        let actors: Vec<Actor> = result.transcript.iter().map(|t| t.actor).collect();
        assert_eq!(actors, vec![Actor::Agent, Actor::User, Actor::Agent]);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_at_the_first_failing_step() {
        let platform = Arc::new(ScriptedPlatform::new());
        let runner = BatchRunner::new(platform.clone(), fast());

        let result = runner
            .run(&batch(vec![
                TestStep::Select(SelectMatcher::Index(0)),
                TestStep::Message("never sent".into()),
            ]))
            .await;

        assert!(!result.success);
        assert!(result.reason.unwrap().contains("no buttons"));
        assert!(platform.sent_texts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn session_start_failure_is_a_failed_result() {
        let platform = Arc::new(ScriptedPlatform::new().without_sessions());
        let runner = BatchRunner::new(platform, fast());

        let result = runner.run(&batch(vec![TestStep::Message("hi".into())])).await;

        assert!(!result.success);
        assert!(result.transcript.is_empty());
        assert_eq!(result.app_id, "poa");
    }

    #[tokio::test(start_paused = true)]
    async fn negative_evaluation_fails_the_batch() {
        let platform = Arc::new(
            ScriptedPlatform::new()
                .with_reply("hi", ScriptedReply::text(&["Hello"]))
                .with_evaluation(serde_json::json!({"success": false, "reason": "rude"})),
        );
        let runner = BatchRunner::new(platform, fast());

        let result = runner
            .run(&batch(vec![
                TestStep::Message("hi".into()),
                TestStep::Evaluate("The agent is polite".into()),
            ]))
            .await;

        assert!(!result.success);
        assert_eq!(result.reason.as_deref(), Some("Evaluation failed: rude"));
        assert_eq!(result.transcript.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn prompt_sends_the_authored_text() {
        let platform = Arc::new(
            ScriptedPlatform::new().with_authored_prompt("Posso avere un biglietto?"),
        );
        let runner = BatchRunner::new(platform.clone(), fast());

        let result = runner
            .run(&batch(vec![TestStep::Prompt("Ask for a ticket".into())]))
            .await;

        assert!(result.success);
        assert_eq!(platform.sent_texts(), vec!["Posso avere un biglietto?"]);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_authored_prompt_fails() {
        let platform = Arc::new(ScriptedPlatform::new());
        let runner = BatchRunner::new(platform, fast());

        let result = runner
            .run(&batch(vec![TestStep::Prompt("Ask for a ticket".into())]))
            .await;

        assert!(!result.success);
        assert!(result.reason.unwrap().contains("Prompt generation failed"));
    }
}
