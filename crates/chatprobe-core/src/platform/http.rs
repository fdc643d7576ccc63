use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, HeaderValue};
use reqwest::{Client, Method, RequestBuilder};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

use super::sse::{decode_event, parse_sse_stream};
use super::{
    AuthorPromptRequest, EvaluationRequest, EventFeed, OutgoingMessage, Platform, PlatformError,
    StartSessionRequest,
};

/// [`Platform`] over the platform's REST API, with events bridged as
/// Server-Sent Events.
#[derive(Debug, Clone)]
pub struct HttpPlatform {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpPlatform {
    pub fn new(base_url: Url, token: Option<String>) -> Result<Self, PlatformError> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, PlatformError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| PlatformError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Posts `body` and returns the response body, decoded as JSON when it
    /// is JSON and as a string otherwise. An empty body becomes `Null`.
    async fn post<B: Serialize + ?Sized>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<Value, PlatformError> {
        let url = self.endpoint(segments)?;
        let path = url.path().to_string();
        debug!(target: "chatprobe::platform", %path, "POST");

        let response = self.request(Method::POST, url).json(body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(PlatformError::Status {
                method: Method::POST.to_string(),
                path,
                status: status.as_u16(),
                body: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

#[async_trait]
impl Platform for HttpPlatform {
    async fn subscribe(&self, app_id: &str) -> Result<EventFeed, PlatformError> {
        let url = self.endpoint(&["api", "events", "app", app_id])?;
        let path = url.path().to_string();
        let response = self
            .request(Method::GET, url)
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PlatformError::Status {
                method: Method::GET.to_string(),
                path,
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let mut events = parse_sse_stream(response.bytes_stream());
        let (tx, rx) = mpsc::unbounded_channel();
        let app_id = app_id.to_string();
        info!(target: "chatprobe::platform", app_id = %app_id, "Subscribed to app events");

        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    () = tx.closed() => break,
                    next = events.next() => next,
                };

                match next {
                    Some(Ok(event)) => match decode_event(&event) {
                        Ok(Some(decoded)) => {
                            if tx.send(decoded).is_err() {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            debug!(target: "chatprobe::platform", app_id = %app_id, error = %e, "Skipping undecodable event");
                        }
                    },
                    Some(Err(e)) => {
                        warn!(target: "chatprobe::platform", app_id = %app_id, error = %e, "Event stream failed");
                        break;
                    }
                    None => {
                        debug!(target: "chatprobe::platform", app_id = %app_id, "Event stream ended");
                        break;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn start_session(
        &self,
        request: StartSessionRequest,
    ) -> Result<Option<String>, PlatformError> {
        let body = json!({
            "appId": request.app_id,
            "agentId": request.agent_id,
            "settings": {
                "ttsEnabled": false,
                "language": request.language,
            },
        });
        let response = self.post(&["api", "session"], &body).await?;
        Ok(response
            .get("sessionId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string))
    }

    async fn send_message(&self, message: OutgoingMessage) -> Result<(), PlatformError> {
        let body = json!({
            "appId": message.app_id,
            "sessionId": message.session_id,
            "actor": "user",
            "text": message.text,
            "language": message.language,
        });
        self.post(
            &[
                "api",
                "dialogue",
                "speech",
                "chat",
                message.app_id.as_str(),
                message.session_id.as_str(),
            ],
            &body,
        )
        .await?;
        Ok(())
    }

    async fn author_prompt(
        &self,
        request: AuthorPromptRequest,
    ) -> Result<Option<String>, PlatformError> {
        let body = json!({
            "sessionId": request.session_id,
            "task": "author-prompt",
            "instruction": request.instruction,
            "history": request.history,
            "language": request.language,
            "llm": request.llm,
        });
        let response = self
            .post(&["api", "chatbot", request.app_id.as_str(), "chat"], &body)
            .await?;

        let text = match &response {
            Value::String(text) => Some(text.as_str()),
            Value::Object(map) => map.get("text").and_then(Value::as_str),
            _ => None,
        };
        Ok(text
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string))
    }

    async fn evaluate(&self, request: EvaluationRequest) -> Result<Value, PlatformError> {
        let body = json!({
            "sessionId": request.session_id,
            "task": "evaluate",
            "criterion": request.criterion,
            "history": request.history,
            "language": request.language,
            "llm": request.llm,
        });
        self.post(&["api", "chatbot", request.app_id.as_str(), "chat"], &body)
            .await
    }
}
