use std::sync::Arc;

use tracing::{debug, info};

use super::aggregator::TurnAggregator;
use super::completion::PollTiming;
use super::turn::Turn;
use crate::error::{Error, Result};
use crate::platform::{OutgoingMessage, Platform, StartSessionRequest};

/// Languages the platform's agents are configured for.
pub const LANGUAGES: &[&str] = &["es-ES", "pt-PT", "it-IT", "de-DE", "en-GB", "fr-FR"];

pub const DEFAULT_LANGUAGE: &str = "en-GB";

/// Agent used for every session opened by the harness.
const AGENT_ID: &str = "chatprobe";

#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub timing: PollTiming,
    pub default_language: String,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            timing: PollTiming::default(),
            default_language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

/// Owns one chat session with an application's agent.
pub struct SessionDriver {
    platform: Arc<dyn Platform>,
    app_id: String,
    language: Option<String>,
    default_language: String,
    aggregator: TurnAggregator,
}

impl SessionDriver {
    /// Subscribes to the application's events. The subscription is in place
    /// before any session exists, so the welcome message cannot be missed.
    pub async fn connect(
        platform: Arc<dyn Platform>,
        app_id: impl Into<String>,
        options: DriverOptions,
    ) -> Result<Self> {
        let app_id = app_id.into();
        let events = platform.subscribe(&app_id).await?;
        let aggregator = TurnAggregator::new(app_id.clone(), events, options.timing);

        Ok(Self {
            platform,
            app_id,
            language: None,
            default_language: options.default_language,
            aggregator,
        })
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn session_id(&self) -> Option<&str> {
        self.aggregator.session_id()
    }

    pub fn language(&self) -> &str {
        self.language.as_deref().unwrap_or(&self.default_language)
    }

    /// Starts a session and returns its id.
    pub async fn start(&mut self, language: Option<&str>) -> Result<String> {
        if let Some(language) = language {
            self.language = Some(language.to_string());
        }

        let session_id = self
            .platform
            .start_session(StartSessionRequest {
                app_id: self.app_id.clone(),
                agent_id: AGENT_ID.to_string(),
                language: Some(self.language().to_string()),
            })
            .await?
            .ok_or_else(|| Error::SessionUnavailable {
                app_id: self.app_id.clone(),
            })?;

        info!(target: "chatprobe::driver", app_id = %self.app_id, session_id = %session_id, language = %self.language(), "Session started");
        self.aggregator.bind_session(session_id.clone());
        Ok(session_id)
    }

    /// Sends a user message and returns it as a transcript turn.
    pub async fn send(&mut self, text: &str, language: Option<&str>) -> Result<Turn> {
        let Some(session_id) = self.session_id().map(str::to_string) else {
            return Err(Error::InvalidOperation(
                "cannot send before the session is started".to_string(),
            ));
        };
        let language = language.unwrap_or(self.language()).to_string();

        debug!(target: "chatprobe::driver", session_id = %session_id, %language, "Sending message");
        self.platform
            .send_message(OutgoingMessage {
                app_id: self.app_id.clone(),
                session_id: session_id.clone(),
                text: text.to_string(),
                language,
            })
            .await
            .map_err(|source| Error::SendFailed { source })?;

        Ok(Turn::user(session_id, text))
    }

    /// Waits for the agent's response to whatever was last sent.
    pub async fn await_response(&mut self) -> Vec<Turn> {
        self.aggregator.await_turns().await
    }

    /// Turns that are already complete, without waiting.
    pub fn poll_response(&mut self) -> Vec<Turn> {
        self.aggregator.pump();
        self.aggregator.next_turns()
    }

    pub fn is_done(&self) -> bool {
        self.aggregator.is_session_closed()
    }

    pub(crate) fn platform(&self) -> &Arc<dyn Platform> {
        &self.platform
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptedPlatform;

    #[tokio::test]
    async fn missing_session_id_is_unavailable() {
        let platform = Arc::new(ScriptedPlatform::new().without_sessions());
        let mut driver = SessionDriver::connect(platform, "poa", DriverOptions::default())
            .await
            .unwrap();

        let err = driver.start(None).await.unwrap_err();
        assert!(matches!(err, Error::SessionUnavailable { .. }));
    }

    #[tokio::test]
    async fn send_requires_a_session() {
        let platform = Arc::new(ScriptedPlatform::new());
        let mut driver = SessionDriver::connect(platform, "poa", DriverOptions::default())
            .await
            .unwrap();

        let err = driver.send("hi", None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn send_falls_back_to_session_language() {
        let platform = Arc::new(ScriptedPlatform::new());
        let mut driver =
            SessionDriver::connect(platform.clone(), "poa", DriverOptions::default())
                .await
                .unwrap();
        driver.start(Some("it-IT")).await.unwrap();

        let turn = driver.send("Ciao", None).await.unwrap();
        driver.send("Hello", Some("en-GB")).await.unwrap();

        assert_eq!(turn.text, "Ciao");
        let sent = platform.sent_messages();
        assert_eq!(sent[0].language, "it-IT");
        assert_eq!(sent[1].language, "en-GB");
    }

    #[tokio::test]
    async fn transport_errors_surface_as_send_failed() {
        let platform = Arc::new(ScriptedPlatform::new().failing_sends());
        let mut driver = SessionDriver::connect(platform, "poa", DriverOptions::default())
            .await
            .unwrap();
        driver.start(None).await.unwrap();

        let err = driver.send("hi", None).await.unwrap_err();
        assert!(matches!(err, Error::SendFailed { .. }));
    }
}
