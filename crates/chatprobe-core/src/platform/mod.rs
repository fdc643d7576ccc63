//! Interface to the remote dialogue platform.
//!
//! Everything the harness needs from the platform goes through [`Platform`]:
//! an event feed per application and four request/response calls. The
//! [`http`] module talks to a real deployment; tests use
//! [`crate::test_utils::ScriptedPlatform`].

pub mod http;
pub mod sse;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

pub use types::{
    Actor, AuthorPromptRequest, Button, ChunkId, DialogueMessage, EvaluationRequest,
    HistoryEntry, OutgoingMessage, RequestStatus, RequestStatusEvent, SessionChangedEvent,
    StartSessionRequest, UiContent, UiContentEvent,
};

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{method} {path} returned {status}: {body}")]
    Status {
        method: String,
        path: String,
        status: u16,
        body: String,
    },

    #[error("Event stream error: {details}")]
    Stream { details: String },

    #[error("Invalid platform URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Events pushed by the platform for one application.
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformEvent {
    DialogueMessage(DialogueMessage),
    UiContent(UiContentEvent),
    RequestStatus(RequestStatusEvent),
    SessionChanged(SessionChangedEvent),
}

/// Receiving half of a subscription. Dropping it ends the subscription.
pub type EventFeed = mpsc::UnboundedReceiver<PlatformEvent>;

#[async_trait]
pub trait Platform: Send + Sync {
    /// Subscribe to dialogue, UI, request-status and session events of an app.
    async fn subscribe(&self, app_id: &str) -> Result<EventFeed, PlatformError>;

    /// Start a new session. `Ok(None)` when the platform answered without an id.
    async fn start_session(
        &self,
        request: StartSessionRequest,
    ) -> Result<Option<String>, PlatformError>;

    async fn send_message(&self, message: OutgoingMessage) -> Result<(), PlatformError>;

    /// Ask the platform's LLM to write the next user utterance.
    async fn author_prompt(
        &self,
        request: AuthorPromptRequest,
    ) -> Result<Option<String>, PlatformError>;

    /// Ask the platform's LLM to judge the conversation. The answer is
    /// returned as received; interpretation is up to the caller.
    async fn evaluate(
        &self,
        request: EvaluationRequest,
    ) -> Result<serde_json::Value, PlatformError>;
}
