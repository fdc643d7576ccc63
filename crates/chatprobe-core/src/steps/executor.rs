use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{TestStep, select_option};
use crate::batch::BatchSettings;
use crate::chat::{SessionDriver, Transcript};
use crate::error::{Error, Result};
use crate::platform::{AuthorPromptRequest, EvaluationRequest};

/// Answer expected from the evaluation endpoint.
#[derive(Debug, Deserialize)]
struct Verdict {
    success: bool,
    #[serde(default)]
    reason: Option<String>,
}

/// Runs steps of one batch against a started session.
pub struct StepExecutor<'a> {
    driver: &'a mut SessionDriver,
    settings: &'a BatchSettings,
}

impl<'a> StepExecutor<'a> {
    pub fn new(driver: &'a mut SessionDriver, settings: &'a BatchSettings) -> Self {
        Self { driver, settings }
    }

    fn language(&self) -> Option<&str> {
        self.settings.language.as_deref()
    }

    fn session_id(&self) -> Result<String> {
        self.driver
            .session_id()
            .map(str::to_string)
            .ok_or_else(|| Error::InvalidOperation("session is not started".to_string()))
    }

    /// Executes one step. Messages sent on the user's behalf are recorded in
    /// `transcript`; the agent's answer is not awaited here.
    pub async fn execute(&mut self, step: &TestStep, transcript: &mut Transcript) -> Result<()> {
        debug!(target: "chatprobe::steps", step = step.kind(), "Executing step");
        match step {
            TestStep::Message(text) => self.send(text, transcript).await,
            TestStep::Select(matcher) => {
                let reply = select_option(transcript.latest_response(), matcher)?;
                debug!(target: "chatprobe::steps", %matcher, %reply, "Selected option");
                self.send(&reply, transcript).await
            }
            TestStep::Prompt(instruction) => {
                let text = self.author_prompt(instruction, transcript).await?;
                self.send(&text, transcript).await
            }
            TestStep::Evaluate(criterion) => self.evaluate(criterion, transcript).await,
            TestStep::Wait(pause) => {
                tokio::time::sleep(*pause).await;
                Ok(())
            }
        }
    }

    async fn send(&mut self, text: &str, transcript: &mut Transcript) -> Result<()> {
        let language = self.settings.language.clone();
        let turn = self.driver.send(text, language.as_deref()).await?;
        transcript.record_user(turn);
        Ok(())
    }

    async fn author_prompt(&self, instruction: &str, transcript: &Transcript) -> Result<String> {
        let request = AuthorPromptRequest {
            app_id: self.driver.app_id().to_string(),
            session_id: self.session_id()?,
            instruction: instruction.to_string(),
            history: transcript.history(),
            language: self.language().map(str::to_string),
            llm: self.settings.llm.clone(),
        };

        self.driver
            .platform()
            .author_prompt(request)
            .await?
            .ok_or_else(|| Error::PromptGenerationFailed {
                instruction: instruction.to_string(),
            })
    }

    async fn evaluate(&self, criterion: &str, transcript: &Transcript) -> Result<()> {
        let request = EvaluationRequest {
            app_id: self.driver.app_id().to_string(),
            session_id: self.session_id()?,
            criterion: criterion.to_string(),
            history: transcript.history(),
            language: self.language().map(str::to_string),
            llm: self.settings.llm.clone(),
        };

        let answer = self.driver.platform().evaluate(request).await?;
        interpret_verdict(criterion, answer)
    }
}

/// Only an explicit negative verdict fails the step. Anything else the
/// endpoint answers counts as a pass.
fn interpret_verdict(criterion: &str, answer: Value) -> Result<()> {
    match serde_json::from_value::<Verdict>(answer.clone()) {
        Ok(Verdict {
            success: false,
            reason,
        }) => Err(Error::EvaluationFailed {
            reason: reason
                .filter(|reason| !reason.trim().is_empty())
                .unwrap_or_else(|| format!("criterion not met: {criterion}")),
        }),
        Ok(Verdict { success: true, .. }) => Ok(()),
        Err(e) => {
            warn!(
                target: "chatprobe::steps",
                criterion,
                %answer,
                error = %e,
                "Unexpected evaluation answer, treating as success"
            );
            Ok(())
        }
    }
}
