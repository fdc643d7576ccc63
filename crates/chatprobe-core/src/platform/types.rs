use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Actor {
    User,
    Agent,
}

/// Lifecycle of a dialogue request on the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RequestStatus {
    Started,
    Processing,
    Ended,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl RequestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Ended | RequestStatus::Cancelled)
    }
}

/// Ordering key of a fragment within its message.
///
/// The platform sends chunk ids either as numbers or as sortable strings.
/// Numeric ids sort numerically and before any non-numeric id; the rest sort
/// lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric(&self) -> Option<u128> {
        self.0.parse().ok()
    }
}

impl Ord for ChunkId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for ChunkId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<'de> Deserialize<'de> for ChunkId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(text) => ChunkId(text),
            Raw::Number(n) => ChunkId(n.to_string()),
        })
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogueMessage {
    pub app_id: String,
    pub session_id: String,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub chunk_id: Option<ChunkId>,
    pub actor: Actor,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub ts: Option<DateTime<Utc>>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Button {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Button {
    /// Text sent back to the agent when this button is chosen.
    pub fn reply_text(&self) -> Option<&str> {
        self.label
            .as_deref()
            .filter(|label| !label.is_empty())
            .or(self.value.as_deref())
            .filter(|text| !text.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonsContent {
    #[serde(default)]
    pub list: Vec<Button>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizAnswer {
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizContent {
    pub question: String,
    #[serde(default)]
    pub answers: Vec<QuizAnswer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailContent {
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtmlContent {
    pub html: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkContent {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Structured content pushed to the user interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "contentType", content = "content", rename_all = "kebab-case")]
pub enum UiContent {
    Buttons(ButtonsContent),
    Quiz(QuizContent),
    Text(TextContent),
    Email(EmailContent),
    Html(HtmlContent),
    Link(LinkContent),
    Object(Option<serde_json::Value>),
    Video(Option<serde_json::Value>),
    Image(Option<serde_json::Value>),
    Pdf(Option<serde_json::Value>),
    Webpage(Option<serde_json::Value>),
    DialogueMessage(Option<serde_json::Value>),
    Navigation(Option<serde_json::Value>),
    QrcodeScanner(Option<serde_json::Value>),
    BackgroundAudio(Option<serde_json::Value>),
    ClearScreen(Option<serde_json::Value>),
}

impl UiContent {
    pub fn kind(&self) -> &'static str {
        match self {
            UiContent::Buttons(_) => "buttons",
            UiContent::Quiz(_) => "quiz",
            UiContent::Text(_) => "text",
            UiContent::Email(_) => "email",
            UiContent::Html(_) => "html",
            UiContent::Link(_) => "link",
            UiContent::Object(_) => "object",
            UiContent::Video(_) => "video",
            UiContent::Image(_) => "image",
            UiContent::Pdf(_) => "pdf",
            UiContent::Webpage(_) => "webpage",
            UiContent::DialogueMessage(_) => "dialogue-message",
            UiContent::Navigation(_) => "navigation",
            UiContent::QrcodeScanner(_) => "qrcode-scanner",
            UiContent::BackgroundAudio(_) => "background-audio",
            UiContent::ClearScreen(_) => "clear-screen",
        }
    }

    /// Textual summary shown in transcripts. `None` for content that carries
    /// nothing to read.
    pub fn render(&self) -> Option<String> {
        match self {
            UiContent::Buttons(buttons) => Some(render_buttons(buttons)),
            UiContent::Quiz(quiz) => Some(render_quiz(quiz)),
            UiContent::Text(content) => Some(content.text.clone()),
            UiContent::Email(content) => Some(content.email.clone()),
            UiContent::Html(content) => Some(content.html.clone()),
            UiContent::Link(content) => Some(content.url.clone()),
            UiContent::Object(_)
            | UiContent::Video(_)
            | UiContent::Image(_)
            | UiContent::Pdf(_)
            | UiContent::Webpage(_)
            | UiContent::DialogueMessage(_)
            | UiContent::Navigation(_)
            | UiContent::QrcodeScanner(_)
            | UiContent::BackgroundAudio(_) => Some(format!("[content:{}]", self.kind())),
            UiContent::ClearScreen(_) => None,
        }
    }

    pub fn buttons(&self) -> Option<&[Button]> {
        match self {
            UiContent::Buttons(content) => Some(&content.list),
            _ => None,
        }
    }
}

fn render_buttons(content: &ButtonsContent) -> String {
    content
        .list
        .iter()
        .map(|button| format!("\n- {}", button.label.as_deref().unwrap_or_default()))
        .collect()
}

fn render_quiz(quiz: &QuizContent) -> String {
    let mut text = quiz.question.clone();
    for answer in &quiz.answers {
        text.push_str("\n- ");
        text.push_str(&answer.answer);
    }
    text
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiContentEvent {
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub chunk_id: Option<ChunkId>,
    #[serde(default)]
    pub ts: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub content: UiContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStatusEvent {
    pub session_id: String,
    #[serde(default)]
    pub request_id: Option<String>,
    pub status: RequestStatus,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionChangedEvent {
    pub session_id: String,
    #[serde(default)]
    pub record: SessionRecord,
}

impl SessionChangedEvent {
    pub fn is_closed(&self) -> bool {
        self.record.closed_at.is_some()
    }
}

/// One entry of the conversation history handed to the LLM-backed endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Actor,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    pub app_id: String,
    pub agent_id: String,
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub app_id: String,
    pub session_id: String,
    pub text: String,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorPromptRequest {
    pub app_id: String,
    pub session_id: String,
    pub instruction: String,
    pub history: Vec<HistoryEntry>,
    pub language: Option<String>,
    pub llm: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationRequest {
    pub app_id: String,
    pub session_id: String,
    pub criterion: String,
    pub history: Vec<HistoryEntry>,
    pub language: Option<String>,
    pub llm: Option<serde_json::Map<String, serde_json::Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_chunk_ids_sort_numerically() {
        let mut ids = vec![ChunkId::new("10"), ChunkId::new("9"), ChunkId::new("100")];
        ids.sort();
        let ids: Vec<&str> = ids.iter().map(ChunkId::as_str).collect();
        assert_eq!(ids, vec!["9", "10", "100"]);
    }

    #[test]
    fn mixed_chunk_ids_put_numbers_first() {
        let mut ids = vec![ChunkId::new("1a"), ChunkId::new("10"), ChunkId::new("9")];
        ids.sort();
        let ids: Vec<&str> = ids.iter().map(ChunkId::as_str).collect();
        assert_eq!(ids, vec!["9", "10", "1a"]);
    }

    #[test]
    fn chunk_id_accepts_numbers_and_strings() {
        let from_number: ChunkId = serde_json::from_value(json!(42)).unwrap();
        let from_text: ChunkId = serde_json::from_value(json!("01HX")).unwrap();
        assert_eq!(from_number.as_str(), "42");
        assert_eq!(from_text.as_str(), "01HX");
    }

    #[test]
    fn ui_event_decodes_buttons() {
        let event: UiContentEvent = serde_json::from_value(json!({
            "appId": "poa",
            "sessionId": "s1",
            "requestId": "r1",
            "contentType": "buttons",
            "content": { "list": [{ "id": "a", "label": "Yes" }, { "id": "b", "label": "No" }] }
        }))
        .unwrap();

        assert_eq!(event.content.kind(), "buttons");
        assert_eq!(event.content.buttons().map(<[Button]>::len), Some(2));
        assert_eq!(event.content.render().as_deref(), Some("\n- Yes\n- No"));
    }

    #[test]
    fn ui_event_decodes_opaque_media_without_payload() {
        let event: UiContentEvent = serde_json::from_value(json!({
            "contentType": "image",
        }))
        .unwrap();
        assert_eq!(event.content.render().as_deref(), Some("[content:image]"));
    }

    #[test]
    fn unknown_content_type_is_rejected() {
        let result = serde_json::from_value::<UiContentEvent>(json!({
            "contentType": "hologram",
            "content": {}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn quiz_renders_question_and_answers() {
        let quiz = UiContent::Quiz(QuizContent {
            question: "Capital of Italy?".to_string(),
            answers: vec![
                QuizAnswer {
                    answer: "Rome".to_string(),
                    correct: Some(true),
                },
                QuizAnswer {
                    answer: "Milan".to_string(),
                    correct: None,
                },
            ],
        });
        assert_eq!(
            quiz.render().as_deref(),
            Some("Capital of Italy?\n- Rome\n- Milan")
        );
    }

    #[test]
    fn clear_screen_renders_nothing() {
        assert_eq!(UiContent::ClearScreen(None).render(), None);
    }

    #[test]
    fn button_reply_prefers_label_then_value() {
        let labelled = Button {
            id: Some("a".into()),
            label: Some("Yes".into()),
            value: Some("y".into()),
        };
        let value_only = Button {
            id: Some("b".into()),
            label: Some(String::new()),
            value: Some("n".into()),
        };
        assert_eq!(labelled.reply_text(), Some("Yes"));
        assert_eq!(value_only.reply_text(), Some("n"));
        assert_eq!(Button::default().reply_text(), None);
    }

    #[test]
    fn terminal_statuses() {
        assert!(RequestStatus::Ended.is_terminal());
        assert!(RequestStatus::Cancelled.is_terminal());
        assert!(!RequestStatus::Processing.is_terminal());
        let unknown: RequestStatus = serde_json::from_value(json!("paused")).unwrap();
        assert_eq!(unknown, RequestStatus::Unknown);
    }
}
