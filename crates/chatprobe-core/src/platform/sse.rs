use std::pin::Pin;

use eventsource_stream::Eventsource;
use futures_core::Stream;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio_util::bytes::Bytes;

use super::{PlatformError, PlatformEvent};

#[derive(Debug, Clone)]
pub struct SseEvent {
    pub event_type: Option<String>,
    pub data: String,
}

pub type SseStream = Pin<Box<dyn Stream<Item = Result<SseEvent, PlatformError>> + Send>>;

pub fn parse_sse_stream<S, E>(byte_stream: S) -> SseStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + 'static,
{
    let event_stream = byte_stream
        .map(|result| result.map_err(|e| std::io::Error::other(e.to_string())))
        .eventsource()
        .map(|result| {
            result
                .map(|event| SseEvent {
                    event_type: if event.event.is_empty() {
                        None
                    } else {
                        Some(event.event)
                    },
                    data: event.data,
                })
                .map_err(|e| PlatformError::Stream {
                    details: e.to_string(),
                })
        });

    Box::pin(event_stream)
}

/// Envelope used by the platform's event bridge: the broker topic the event
/// was published on and its JSON payload.
#[derive(Debug, Deserialize)]
struct TopicEnvelope {
    topic: String,
    payload: serde_json::Value,
}

/// Decodes one bridged event. Topics follow `app/<appId>/<resource>/<scope>`;
/// events on topics the harness does not consume yield `Ok(None)`.
pub fn decode_event(event: &SseEvent) -> Result<Option<PlatformEvent>, serde_json::Error> {
    let envelope: TopicEnvelope = serde_json::from_str(&event.data)?;
    let mut parts = envelope.topic.splitn(4, '/');
    let (Some("app"), Some(_app_id), Some(resource), Some(scope)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Ok(None);
    };

    let decoded = match (resource, scope) {
        ("dialogue", "messages") => {
            PlatformEvent::DialogueMessage(serde_json::from_value(envelope.payload)?)
        }
        ("dialogue", "request") => {
            PlatformEvent::RequestStatus(serde_json::from_value(envelope.payload)?)
        }
        ("ui", "content") => PlatformEvent::UiContent(serde_json::from_value(envelope.payload)?),
        ("session", "session") => {
            PlatformEvent::SessionChanged(serde_json::from_value(envelope.payload)?)
        }
        _ => return Ok(None),
    };
    Ok(Some(decoded))
}
