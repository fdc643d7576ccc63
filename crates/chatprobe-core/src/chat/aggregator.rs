use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, trace};

use super::completion::{CompletionTracker, Observation, PollTiming};
use super::fragment::Fragment;
use super::turn::Turn;
use crate::platform::{Actor, ChunkId, EventFeed, PlatformEvent, RequestStatus};

#[derive(Debug, Default)]
struct PendingRequest {
    completed: bool,
    status: Option<RequestStatus>,
    fragments: Vec<Fragment>,
}

/// Buffers streamed fragments per request and hands out completed turns.
///
/// The aggregator is the only reader of its session's event feed. Events are
/// moved from the feed into the request arena by [`pump`](Self::pump), which
/// every poll of [`await_turns`](Self::await_turns) calls before deciding
/// anything, so nothing delivered before a poll can be missed by it.
pub struct TurnAggregator {
    app_id: String,
    session_id: Option<String>,
    events: EventFeed,
    feed_closed: bool,
    timing: PollTiming,
    pending: HashMap<String, PendingRequest>,
    /// Requests already drained into turns.
    finished: HashSet<String>,
    accepted: HashSet<(String, ChunkId)>,
    terminal_statuses: u64,
    session_closed: bool,
}

impl TurnAggregator {
    pub fn new(app_id: impl Into<String>, events: EventFeed, timing: PollTiming) -> Self {
        Self {
            app_id: app_id.into(),
            session_id: None,
            events,
            feed_closed: false,
            timing,
            pending: HashMap::new(),
            finished: HashSet::new(),
            accepted: HashSet::new(),
            terminal_statuses: 0,
            session_closed: false,
        }
    }

    /// Scopes the aggregator to one session. Fragments and statuses of any
    /// other session are ignored from here on.
    pub fn bind_session(&mut self, session_id: impl Into<String>) {
        self.session_id = Some(session_id.into());
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn is_session_closed(&self) -> bool {
        self.session_closed
    }

    pub fn add_fragment(&mut self, fragment: Fragment) {
        let key = (fragment.message_id.clone(), fragment.chunk_id.clone());
        if !self.accepted.insert(key) {
            trace!(
                target: "chatprobe::aggregator",
                message_id = %fragment.message_id,
                chunk_id = %fragment.chunk_id,
                "Dropping redelivered chunk"
            );
            return;
        }

        let already_finished = self.finished.contains(&fragment.request_id);
        let delivered_whole = fragment.is_ui_content();
        let request = self
            .pending
            .entry(fragment.request_id.clone())
            .or_insert_with(|| PendingRequest {
                completed: already_finished || delivered_whole,
                ..PendingRequest::default()
            });
        request.fragments.push(fragment);
    }

    /// Records a request status. Terminal statuses complete the request at
    /// most once; returns whether this call completed it.
    pub fn mark_request_status(&mut self, request_id: &str, status: RequestStatus) -> bool {
        let request = self.pending.entry(request_id.to_string()).or_default();
        request.status = Some(status);
        if !status.is_terminal() || request.completed {
            return false;
        }

        request.completed = true;
        self.terminal_statuses += 1;
        debug!(
            target: "chatprobe::aggregator",
            request_id,
            %status,
            fragments = request.fragments.len(),
            "Request completed"
        );
        true
    }

    /// Moves everything currently queued on the event feed into the arena.
    /// Never blocks.
    pub fn pump(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(event) => self.ingest(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.feed_closed {
                        debug!(target: "chatprobe::aggregator", app_id = %self.app_id, "Event feed closed");
                        self.feed_closed = true;
                    }
                    break;
                }
            }
        }
    }

    fn is_current_session(&self, session_id: &str) -> bool {
        self.session_id
            .as_deref()
            .is_none_or(|current| current == session_id)
    }

    fn ingest(&mut self, event: PlatformEvent) {
        match event {
            PlatformEvent::DialogueMessage(message) => {
                self.add_fragment(Fragment::from_dialogue_message(message));
            }
            PlatformEvent::UiContent(content) => {
                let fallback_session = self.session_id.clone().unwrap_or_default();
                let kind = content.content.kind();
                match Fragment::from_ui_content(content, &self.app_id, &fallback_session) {
                    Some(fragment) => self.add_fragment(fragment),
                    None => trace!(target: "chatprobe::aggregator", kind, "Ignoring UI content without text"),
                }
            }
            PlatformEvent::RequestStatus(update) => {
                if !self.is_current_session(&update.session_id) {
                    return;
                }
                match update.request_id {
                    Some(request_id) => {
                        self.mark_request_status(&request_id, update.status);
                    }
                    None => {
                        debug!(target: "chatprobe::aggregator", status = %update.status, "Status update without request id");
                    }
                }
            }
            PlatformEvent::SessionChanged(changed) => {
                if changed.is_closed() && self.is_current_session(&changed.session_id) {
                    debug!(target: "chatprobe::aggregator", session_id = %changed.session_id, "Session closed");
                    self.session_closed = true;
                }
            }
        }
    }

    fn is_presentable(&self, fragment: &Fragment) -> bool {
        fragment.actor == Actor::Agent
            && !fragment.text.trim().is_empty()
            && self.is_current_session(&fragment.session_id)
    }

    fn latest_ready_fragment(&self) -> Option<DateTime<Utc>> {
        self.pending
            .values()
            .filter(|request| request.completed)
            .flat_map(|request| &request.fragments)
            .filter(|fragment| self.is_presentable(fragment))
            .map(|fragment| fragment.ts)
            .max()
    }

    /// Drains every completed request into turns, oldest first. Drained
    /// requests are evicted, so each turn is returned once.
    pub fn next_turns(&mut self) -> Vec<Turn> {
        let ready: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, request)| request.completed)
            .map(|(request_id, _)| request_id.clone())
            .collect();

        let mut by_message: HashMap<String, Vec<Fragment>> = HashMap::new();
        for request_id in ready {
            let Some(request) = self.pending.remove(&request_id) else {
                continue;
            };
            self.finished.insert(request_id);
            for fragment in request.fragments {
                if self.is_presentable(&fragment) {
                    by_message
                        .entry(fragment.message_id.clone())
                        .or_default()
                        .push(fragment);
                }
            }
        }

        let mut turns: Vec<Turn> = by_message
            .into_values()
            .filter_map(|mut fragments| {
                fragments.sort_by(|a, b| a.chunk_id.cmp(&b.chunk_id));
                Turn::from_fragments(fragments)
            })
            .collect();
        turns.sort_by(|a, b| a.ts.cmp(&b.ts).then_with(|| a.message_id.cmp(&b.message_id)));
        turns
    }

    /// Waits until the agent's response looks complete, then returns it.
    ///
    /// An empty result is a normal outcome: the agent may not answer at all,
    /// or may never complete a request.
    pub async fn await_turns(&mut self) -> Vec<Turn> {
        let mut tracker = CompletionTracker::new(self.timing);
        let mut polls = 0u32;

        loop {
            tokio::time::sleep(self.timing.interval).await;
            polls += 1;

            let before = self.terminal_statuses;
            self.pump();
            let phase = tracker.observe(Observation {
                latest_fragment: self.latest_ready_fragment(),
                status_changed: self.terminal_statuses != before,
            });
            trace!(target: "chatprobe::aggregator", polls, ?phase, "Poll");

            if tracker.is_done() || self.session_closed {
                break;
            }
        }

        let turns = self.next_turns();
        debug!(
            target: "chatprobe::aggregator",
            session_id = self.session_id.as_deref().unwrap_or_default(),
            polls,
            phase = ?tracker.phase(),
            turns = turns.len(),
            "Response awaited"
        );
        turns
    }
}
