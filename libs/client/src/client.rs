//! Thin HTTP client for the lounge API.

use chrono::{DateTime, SecondsFormat, Utc};
use lounge_common::wire::ChatMessage;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::ClientError;

const SESSION_STATUS_HEADER: &str = "x-session-status";
const SESSION_MESSAGE_HEADER: &str = "x-session-message";

/// Result of opening a room stream.
#[derive(Debug)]
pub enum StreamOpen {
    /// The stream is live; read its body as `text/event-stream`.
    Live(reqwest::Response),
    /// The room's session is not active. Retrying will not help.
    Inactive { status: String, message: String },
}

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    message: ChatMessage,
}

#[derive(Debug, Clone)]
pub struct LoungeClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl LoungeClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self::with_http(reqwest::Client::new(), base_url, token)
    }

    pub fn with_http(
        http: reqwest::Client,
        base_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Open the room's event stream. `author_id`, when given, must match the
    /// token's identity or the server rejects the request.
    pub async fn open_stream(
        &self,
        room_id: &str,
        author_id: Option<&str>,
    ) -> Result<StreamOpen, ClientError> {
        let mut query = vec![("room_id", room_id)];
        if let Some(author_id) = author_id {
            query.push(("author_id", author_id));
        }

        let response = self
            .http
            .get(self.url("/api/v1/gateway/stream"))
            .bearer_auth(&self.token)
            .header(ACCEPT, "text/event-stream")
            .query(&query)
            .send()
            .await?;

        if response.status() == StatusCode::NO_CONTENT {
            let header = |name: &str| {
                response
                    .headers()
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string()
            };
            return Ok(StreamOpen::Inactive {
                status: header(SESSION_STATUS_HEADER),
                message: header(SESSION_MESSAGE_HEADER),
            });
        }

        Ok(StreamOpen::Live(check(response).await?))
    }

    /// Every message of the room created strictly after `since`, oldest first.
    pub async fn messages_since(
        &self,
        room_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ChatMessage>, ClientError> {
        let since = since.to_rfc3339_opts(SecondsFormat::Micros, true);
        let response = self
            .http
            .get(self.url(&format!("/api/v1/rooms/{room_id}/messages")))
            .bearer_auth(&self.token)
            .query(&[("since", since.as_str())])
            .send()
            .await?;
        let body = check(response).await?.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    pub async fn send_message(&self, room_id: &str, text: &str) -> Result<ChatMessage, ClientError> {
        let response = self
            .http
            .post(self.url(&format!("/api/v1/rooms/{room_id}/messages")))
            .bearer_auth(&self.token)
            .form(&[("text", text)])
            .send()
            .await?;
        let body = check(response).await?.bytes().await?;
        let parsed: SendMessageResponse = serde_json::from_slice(&body)?;
        Ok(parsed.message)
    }
}

/// Turn non-success responses into [`ClientError::Status`].
async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_ignored() {
        let client = LoungeClient::new("http://localhost:4002/", "tok");
        assert_eq!(client.url("/health"), "http://localhost:4002/health");
    }
}
