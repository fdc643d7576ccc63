use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::platform::{Actor, Button, ChunkId, DialogueMessage, UiContent, UiContentEvent};

/// Where a fragment came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FragmentSource {
    PlainMessage,
    UiContent { content: UiContent },
}

/// One unit of streamed agent output, as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fragment {
    pub request_id: String,
    pub message_id: String,
    pub chunk_id: ChunkId,
    pub session_id: String,
    pub app_id: String,
    pub actor: Actor,
    pub ts: DateTime<Utc>,
    pub text: String,
    pub source: FragmentSource,
}

fn generated_id() -> String {
    Uuid::now_v7().to_string()
}

impl Fragment {
    pub fn from_dialogue_message(message: DialogueMessage) -> Self {
        Self {
            request_id: message.request_id.unwrap_or_else(generated_id),
            message_id: message.message_id.unwrap_or_else(generated_id),
            chunk_id: message
                .chunk_id
                .unwrap_or_else(|| ChunkId::new(generated_id())),
            session_id: message.session_id,
            app_id: message.app_id,
            actor: message.actor,
            ts: message.ts.unwrap_or_else(Utc::now),
            text: message.text,
            source: FragmentSource::PlainMessage,
        }
    }

    /// Builds an agent fragment from UI content. The event's own app and
    /// session ids win over the fallbacks. Content with no textual summary
    /// yields `None`.
    pub fn from_ui_content(event: UiContentEvent, app_id: &str, session_id: &str) -> Option<Self> {
        let text = event.content.render()?;
        Some(Self {
            request_id: event.request_id.unwrap_or_else(generated_id),
            message_id: event.message_id.unwrap_or_else(generated_id),
            chunk_id: event
                .chunk_id
                .unwrap_or_else(|| ChunkId::new(generated_id())),
            session_id: event.session_id.unwrap_or_else(|| session_id.to_string()),
            app_id: event.app_id.unwrap_or_else(|| app_id.to_string()),
            actor: Actor::Agent,
            ts: event.ts.unwrap_or_else(Utc::now),
            text,
            source: FragmentSource::UiContent {
                content: event.content,
            },
        })
    }

    pub fn is_ui_content(&self) -> bool {
        matches!(self.source, FragmentSource::UiContent { .. })
    }

    pub fn buttons(&self) -> Option<&[Button]> {
        match &self.source {
            FragmentSource::UiContent { content } => content.buttons(),
            FragmentSource::PlainMessage => None,
        }
    }
}
