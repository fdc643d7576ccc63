//! Scripted test steps and their execution.

mod executor;
mod select;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use executor::StepExecutor;
pub use select::select_option;

/// Which button a `select` step picks: by position, or by id, label or value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectMatcher {
    Index(usize),
    Text(String),
}

impl fmt::Display for SelectMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectMatcher::Index(index) => write!(f, "{index}"),
            SelectMatcher::Text(text) => f.write_str(text),
        }
    }
}

/// One scripted action of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStep", into = "RawStep")]
pub enum TestStep {
    /// Send the text verbatim.
    Message(String),
    /// Answer with one of the buttons of the last response.
    Select(SelectMatcher),
    /// Let the platform's LLM write the next user message.
    Prompt(String),
    /// Let the platform's LLM judge the conversation so far.
    Evaluate(String),
    /// Pause.
    Wait(Duration),
}

impl TestStep {
    pub fn kind(&self) -> &'static str {
        match self {
            TestStep::Message(_) => "message",
            TestStep::Select(_) => "select",
            TestStep::Prompt(_) => "prompt",
            TestStep::Evaluate(_) => "evaluate",
            TestStep::Wait(_) => "wait",
        }
    }
}

/// On-disk form of a step: a map with exactly one of the known keys.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    select: Option<SelectMatcher>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prompt: Option<String>,
    #[serde(default, alias = "evaluation", skip_serializing_if = "Option::is_none")]
    evaluate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    wait: Option<f64>,
}

impl TryFrom<RawStep> for TestStep {
    type Error = String;

    fn try_from(raw: RawStep) -> Result<Self, Self::Error> {
        let mut steps = Vec::with_capacity(1);
        if let Some(text) = raw.message {
            steps.push(TestStep::Message(text));
        }
        if let Some(matcher) = raw.select {
            steps.push(TestStep::Select(matcher));
        }
        if let Some(instruction) = raw.prompt {
            steps.push(TestStep::Prompt(instruction));
        }
        if let Some(criterion) = raw.evaluate {
            steps.push(TestStep::Evaluate(criterion));
        }
        if let Some(seconds) = raw.wait {
            let pause = Duration::try_from_secs_f64(seconds).map_err(|_| {
                format!("wait must be a non-negative number of seconds, got {seconds}")
            })?;
            steps.push(TestStep::Wait(pause));
        }

        match steps.len() {
            1 => Ok(steps.remove(0)),
            0 => Err("step must be one of message, select, prompt, evaluate, wait".to_string()),
            _ => Err(format!(
                "step combines {}; use exactly one per step",
                steps.iter().map(TestStep::kind).collect::<Vec<_>>().join(", ")
            )),
        }
    }
}

impl From<TestStep> for RawStep {
    fn from(step: TestStep) -> Self {
        match step {
            TestStep::Message(text) => RawStep {
                message: Some(text),
                ..RawStep::default()
            },
            TestStep::Select(matcher) => RawStep {
                select: Some(matcher),
                ..RawStep::default()
            },
            TestStep::Prompt(instruction) => RawStep {
                prompt: Some(instruction),
                ..RawStep::default()
            },
            TestStep::Evaluate(criterion) => RawStep {
                evaluate: Some(criterion),
                ..RawStep::default()
            },
            TestStep::Wait(pause) => RawStep {
                wait: Some(pause.as_secs_f64()),
                ..RawStep::default()
            },
        }
    }
}
