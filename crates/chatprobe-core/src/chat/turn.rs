use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::fragment::Fragment;
use crate::platform::{Actor, Button, HistoryEntry};

/// One logical message: the fragments of a message id, in chunk order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub message_id: String,
    pub actor: Actor,
    pub session_id: String,
    pub ts: DateTime<Utc>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fragments: Vec<Fragment>,
}

impl Turn {
    /// Assembles a turn from fragments that share a message id. The
    /// fragments must already be in chunk order; `None` when empty.
    pub fn from_fragments(fragments: Vec<Fragment>) -> Option<Self> {
        let first = fragments.first()?;
        let message_id = first.message_id.clone();
        let actor = first.actor;
        let session_id = first.session_id.clone();
        let ts = first.ts;
        let text = fragments
            .iter()
            .map(|fragment| fragment.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        Some(Self {
            message_id,
            actor,
            session_id,
            ts,
            text,
            fragments,
        })
    }

    /// A turn typed by the harness itself.
    pub fn user(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            message_id: Uuid::now_v7().to_string(),
            actor: Actor::User,
            session_id: session_id.into(),
            ts: Utc::now(),
            text: text.into(),
            fragments: Vec::new(),
        }
    }

    /// Button lists carried by this turn's UI content, in arrival order.
    pub fn button_lists(&self) -> impl Iterator<Item = &[Button]> {
        self.fragments.iter().filter_map(Fragment::buttons)
    }
}

/// Everything said in one session, in the order the harness saw it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    turns: Vec<Turn>,
    #[serde(skip)]
    latest_response: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn into_turns(self) -> Vec<Turn> {
        self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn record_user(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Appends the turns returned by one await. They also become the latest
    /// response, which is what `select` looks at; an empty await clears it.
    pub fn record_response(&mut self, turns: Vec<Turn>) {
        self.turns.extend(turns.iter().cloned());
        self.latest_response = turns;
    }

    pub fn latest_response(&self) -> &[Turn] {
        &self.latest_response
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.turns
            .iter()
            .map(|turn| HistoryEntry {
                role: turn.actor,
                content: turn.text.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::fragment::FragmentSource;
    use crate::platform::ChunkId;

    fn fragment(chunk: &str, text: &str) -> Fragment {
        Fragment {
            request_id: "r1".into(),
            message_id: "m1".into(),
            chunk_id: ChunkId::new(chunk),
            session_id: "s1".into(),
            app_id: "poa".into(),
            actor: Actor::Agent,
            ts: Utc::now(),
            text: text.into(),
            source: FragmentSource::PlainMessage,
        }
    }

    #[test]
    fn joins_fragment_text_with_newlines() {
        let turn = Turn::from_fragments(vec![fragment("1", "Hello"), fragment("2", "world")])
            .unwrap();
        assert_eq!(turn.text, "Hello\nworld");
        assert_eq!(turn.message_id, "m1");
        assert_eq!(turn.fragments.len(), 2);
    }

    #[test]
    fn empty_fragments_make_no_turn() {
        assert!(Turn::from_fragments(Vec::new()).is_none());
    }

    #[test]
    fn empty_await_clears_latest_response_but_keeps_history() {
        let mut transcript = Transcript::new();
        transcript.record_user(Turn::user("s1", "hi"));
        transcript.record_response(vec![Turn::from_fragments(vec![fragment("1", "Hey")]).unwrap()]);
        assert_eq!(transcript.latest_response().len(), 1);

        transcript.record_response(Vec::new());
        assert!(transcript.latest_response().is_empty());
        assert_eq!(transcript.len(), 2);

        let history = transcript.history();
        assert_eq!(history[0].role, Actor::User);
        assert_eq!(history[1].content, "Hey");
    }
}
