use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::settings::BasicAuth;

pub const HEALTH_PATH: &str = "/global/health";

const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);
const LIST_TIMEOUT: Duration = Duration::from_secs(5);
const PROMPT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{operation} failed: {status} {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// The session list endpoint has shipped both a wrapped and a bare shape.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SessionsResponse {
    Wrapped { sessions: Vec<SessionInfo> },
    Bare(Vec<SessionInfo>),
}

/// Seam between the components that talk to the server and the concrete HTTP
/// client, so the runner and injector can be exercised without a live server.
#[async_trait]
pub trait SessionClient: Send + Sync + Debug {
    /// POST a message the model should ingest without replying to.
    async fn prompt_no_reply(&self, session_id: &str, text: &str) -> Result<(), ApiError>;
    async fn prompt_no_reply_with_system(
        &self,
        session_id: &str,
        text: &str,
        system: &str,
    ) -> Result<(), ApiError>;
    async fn list_sessions(&self) -> Result<Vec<SessionInfo>, ApiError>;
    /// Never errors; any failure reads as unhealthy.
    async fn health_check(&self) -> bool;
}

/// Stateless-except-config HTTP wrapper around the running server.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    basic_auth: Option<BasicAuth>,
}

impl ApiClient {
    /// `base_url` is kept verbatim: its last path segment is a standard
    /// base64 encoding, so a trailing `/` may be part of the encoding
    /// rather than a separator.
    pub fn new(base_url: impl Into<String>, basic_auth: Option<BasicAuth>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            basic_auth,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn update_base_url(&mut self, base_url: impl Into<String>) {
        self.base_url = base_url.into();
    }

    fn with_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.basic_auth {
            Some(auth) => builder.basic_auth(&auth.username, Some(&auth.password)),
            None => builder,
        }
    }

    async fn post_prompt(
        &self,
        operation: &'static str,
        session_id: &str,
        body: serde_json::Value,
    ) -> Result<(), ApiError> {
        let url = format!("{}/session/{session_id}/message", self.base_url);
        let response = self
            .with_auth(self.http.post(&url))
            .timeout(PROMPT_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|source| ApiError::Request { url: url.clone(), source })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ApiError::Status {
                operation,
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SessionClient for ApiClient {
    async fn prompt_no_reply(&self, session_id: &str, text: &str) -> Result<(), ApiError> {
        let body = json!({
            "parts": [{"type": "text", "text": text}],
            "noReply": true,
        });
        self.post_prompt("promptNoReply", session_id, body).await
    }

    async fn prompt_no_reply_with_system(
        &self,
        session_id: &str,
        text: &str,
        system: &str,
    ) -> Result<(), ApiError> {
        let body = json!({
            "parts": [{"type": "text", "text": text}],
            "noReply": true,
            "system": system,
        });
        self.post_prompt("promptNoReplyWithSystem", session_id, body)
            .await
    }

    async fn list_sessions(&self) -> Result<Vec<SessionInfo>, ApiError> {
        let url = format!("{}/session", self.base_url);
        let response = self
            .with_auth(self.http.get(&url))
            .timeout(LIST_TIMEOUT)
            .send()
            .await
            .map_err(|source| ApiError::Request { url: url.clone(), source })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                operation: "listSessions",
                status: status.as_u16(),
                body,
            });
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|source| ApiError::Request { url, source })?;
        match serde_json::from_value::<SessionsResponse>(value) {
            Ok(SessionsResponse::Wrapped { sessions }) => Ok(sessions),
            Ok(SessionsResponse::Bare(sessions)) => Ok(sessions),
            Err(_) => Ok(Vec::new()),
        }
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}{HEALTH_PATH}", self.base_url);
        match self
            .with_auth(self.http.get(&url))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!(%url, "health check failed: {err}");
                false
            }
        }
    }
}

/// One-shot health probe used by the supervisor before it owns a client.
pub async fn probe_health(http: &reqwest::Client, base_url: &str) -> bool {
    let url = format!("{base_url}{HEALTH_PATH}");
    match http.get(&url).timeout(HEALTH_TIMEOUT).send().await {
        Ok(response) => response.status().is_success(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sessions_response_accepts_both_shapes() {
        let wrapped: SessionsResponse =
            serde_json::from_value(json!({"sessions": [{"id": "s1", "title": "T"}]})).unwrap();
        let SessionsResponse::Wrapped { sessions } = wrapped else {
            panic!("expected wrapped shape");
        };
        assert_eq!(sessions[0].id, "s1");

        let bare: SessionsResponse = serde_json::from_value(json!([{"id": "s2"}])).unwrap();
        let SessionsResponse::Bare(sessions) = bare else {
            panic!("expected bare shape");
        };
        assert_eq!(sessions[0].id, "s2");
    }

    #[test]
    fn base_url_is_stored_verbatim() {
        // btoa("/a?") is "L2E/"; the trailing slash belongs to the encoding.
        let client = ApiClient::new("http://127.0.0.1:14096/L2E/", None);
        assert_eq!(client.base_url(), "http://127.0.0.1:14096/L2E/");
    }
}
