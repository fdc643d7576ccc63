//! Test utilities for chatprobe-core
//!
//! [`ScriptedPlatform`] stands in for a real deployment: it hands out
//! sessions, records what the harness sends, and answers with scripted agent
//! replies streamed over the event feed the way the platform does.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::platform::types::{ButtonsContent, SessionRecord};
use crate::platform::{
    Actor, AuthorPromptRequest, Button, ChunkId, DialogueMessage, EvaluationRequest, EventFeed,
    OutgoingMessage, Platform, PlatformError, PlatformEvent, RequestStatus, RequestStatusEvent,
    SessionChangedEvent, StartSessionRequest, UiContent, UiContentEvent,
};

#[derive(Debug, Clone)]
enum ReplyItem {
    Text(String),
    Content(UiContent),
}

/// An agent reply: one request whose fragments are emitted `gap` apart,
/// followed by an `ended` status.
#[derive(Debug, Clone)]
pub struct ScriptedReply {
    items: Vec<ReplyItem>,
    delay: Duration,
    gap: Duration,
    ends: bool,
}

impl ScriptedReply {
    /// A text message streamed as one chunk per entry.
    pub fn text(chunks: &[&str]) -> Self {
        Self {
            items: chunks
                .iter()
                .map(|chunk| ReplyItem::Text((*chunk).to_string()))
                .collect(),
            delay: Duration::from_millis(50),
            gap: Duration::from_millis(10),
            ends: true,
        }
    }

    /// A buttons UI content, given as `(id, label)` pairs.
    pub fn buttons(buttons: &[(&str, &str)]) -> Self {
        let list = buttons
            .iter()
            .map(|(id, label)| Button {
                id: Some((*id).to_string()),
                label: Some((*label).to_string()),
                value: None,
            })
            .collect();
        Self {
            items: vec![ReplyItem::Content(UiContent::Buttons(ButtonsContent {
                list,
                label: None,
            }))],
            ..Self::text(&[])
        }
    }

    pub fn with_gap(mut self, gap: Duration) -> Self {
        self.gap = gap;
        self
    }

    /// Never send the terminal status for this reply.
    pub fn without_end(mut self) -> Self {
        self.ends = false;
        self
    }
}

type Subscriber = (String, mpsc::UnboundedSender<PlatformEvent>);

/// In-memory [`Platform`] with scripted agent behaviour.
pub struct ScriptedPlatform {
    subscribers: Mutex<Vec<Subscriber>>,
    sent: Mutex<Vec<OutgoingMessage>>,
    welcome: Option<ScriptedReply>,
    replies: HashMap<String, ScriptedReply>,
    default_reply: Option<ScriptedReply>,
    authored_prompt: Option<String>,
    evaluation: Value,
    sessions_enabled: bool,
    sends_fail: bool,
    session_counter: AtomicUsize,
}

impl Default for ScriptedPlatform {
    fn default() -> Self {
        Self::new()
    }
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedPlatform {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            welcome: None,
            replies: HashMap::new(),
            default_reply: None,
            authored_prompt: None,
            evaluation: json!({ "success": true }),
            sessions_enabled: true,
            sends_fail: false,
            session_counter: AtomicUsize::new(0),
        }
    }

    pub fn with_welcome(mut self, reply: ScriptedReply) -> Self {
        self.welcome = Some(reply);
        self
    }

    /// Reply sent when the harness sends exactly `trigger`.
    pub fn with_reply(mut self, trigger: &str, reply: ScriptedReply) -> Self {
        self.replies.insert(trigger.to_string(), reply);
        self
    }

    /// Reply sent for any message without a specific reply.
    pub fn with_default_reply(mut self, reply: ScriptedReply) -> Self {
        self.default_reply = Some(reply);
        self
    }

    pub fn with_authored_prompt(mut self, text: &str) -> Self {
        self.authored_prompt = Some(text.to_string());
        self
    }

    pub fn with_evaluation(mut self, answer: Value) -> Self {
        self.evaluation = answer;
        self
    }

    /// Answer session requests without a session id.
    pub fn without_sessions(mut self) -> Self {
        self.sessions_enabled = false;
        self
    }

    pub fn failing_sends(mut self) -> Self {
        self.sends_fail = true;
        self
    }

    pub fn sent_messages(&self) -> Vec<OutgoingMessage> {
        locked(&self.sent).clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        locked(&self.sent)
            .iter()
            .map(|message| message.text.clone())
            .collect()
    }

    /// Pushes an event to every live subscriber of `app_id`.
    pub fn emit(&self, app_id: &str, event: PlatformEvent) {
        let mut subscribers = locked(&self.subscribers);
        subscribers.retain(|(_, tx)| !tx.is_closed());
        for (subscribed, tx) in subscribers.iter() {
            if subscribed == app_id {
                let _ = tx.send(event.clone());
            }
        }
    }

    pub fn close_session(&self, app_id: &str, session_id: &str) {
        self.emit(
            app_id,
            PlatformEvent::SessionChanged(SessionChangedEvent {
                session_id: session_id.to_string(),
                record: SessionRecord {
                    session_id: Some(session_id.to_string()),
                    app_id: Some(app_id.to_string()),
                    closed_at: Some(Utc::now()),
                },
            }),
        );
    }

    fn play(&self, app_id: &str, session_id: &str, reply: &ScriptedReply) {
        let targets: Vec<mpsc::UnboundedSender<PlatformEvent>> = locked(&self.subscribers)
            .iter()
            .filter(|(subscribed, _)| subscribed == app_id)
            .map(|(_, tx)| tx.clone())
            .collect();
        let reply = reply.clone();
        let app_id = app_id.to_string();
        let session_id = session_id.to_string();

        tokio::spawn(async move {
            let request_id = Uuid::now_v7().to_string();
            let message_id = Uuid::now_v7().to_string();
            let wall_start = Utc::now();
            let clock_start = tokio::time::Instant::now();
            let now = || -> DateTime<Utc> {
                wall_start
                    + chrono::Duration::from_std(clock_start.elapsed())
                        .unwrap_or(chrono::Duration::zero())
            };
            let send = |event: PlatformEvent| {
                for tx in &targets {
                    let _ = tx.send(event.clone());
                }
            };

            tokio::time::sleep(reply.delay).await;
            for (index, item) in reply.items.into_iter().enumerate() {
                if index > 0 {
                    tokio::time::sleep(reply.gap).await;
                }
                let chunk_id = ChunkId::new((index + 1).to_string());
                send(match item {
                    ReplyItem::Text(text) => PlatformEvent::DialogueMessage(DialogueMessage {
                        app_id: app_id.clone(),
                        session_id: session_id.clone(),
                        request_id: Some(request_id.clone()),
                        message_id: Some(message_id.clone()),
                        chunk_id: Some(chunk_id),
                        actor: Actor::Agent,
                        text,
                        ts: Some(now()),
                        language: None,
                    }),
                    ReplyItem::Content(content) => PlatformEvent::UiContent(UiContentEvent {
                        app_id: Some(app_id.clone()),
                        session_id: Some(session_id.clone()),
                        request_id: Some(request_id.clone()),
                        message_id: Some(Uuid::now_v7().to_string()),
                        chunk_id: Some(chunk_id),
                        ts: Some(now()),
                        content,
                    }),
                });
            }

            if reply.ends {
                send(PlatformEvent::RequestStatus(RequestStatusEvent {
                    session_id,
                    request_id: Some(request_id),
                    status: RequestStatus::Ended,
                }));
            }
        });
    }
}

#[async_trait]
impl Platform for ScriptedPlatform {
    async fn subscribe(&self, app_id: &str) -> Result<EventFeed, PlatformError> {
        let (tx, rx) = mpsc::unbounded_channel();
        locked(&self.subscribers).push((app_id.to_string(), tx));
        Ok(rx)
    }

    async fn start_session(
        &self,
        request: StartSessionRequest,
    ) -> Result<Option<String>, PlatformError> {
        if !self.sessions_enabled {
            return Ok(None);
        }
        let n = self.session_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let session_id = format!("session-{n}");
        if let Some(welcome) = &self.welcome {
            self.play(&request.app_id, &session_id, welcome);
        }
        Ok(Some(session_id))
    }

    async fn send_message(&self, message: OutgoingMessage) -> Result<(), PlatformError> {
        if self.sends_fail {
            return Err(PlatformError::Status {
                method: "POST".to_string(),
                path: format!(
                    "/api/dialogue/speech/chat/{}/{}",
                    message.app_id, message.session_id
                ),
                status: 503,
                body: "unavailable".to_string(),
            });
        }

        let reply = self
            .replies
            .get(&message.text)
            .or(self.default_reply.as_ref())
            .cloned();
        if let Some(reply) = reply {
            self.play(&message.app_id, &message.session_id, &reply);
        }
        locked(&self.sent).push(message);
        Ok(())
    }

    async fn author_prompt(
        &self,
        _request: AuthorPromptRequest,
    ) -> Result<Option<String>, PlatformError> {
        Ok(self.authored_prompt.clone())
    }

    async fn evaluate(&self, _request: EvaluationRequest) -> Result<Value, PlatformError> {
        Ok(self.evaluation.clone())
    }
}
