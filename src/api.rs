//! HTTP client for the chat backend.
//!
//! | op       | request                          | success body                |
//! |----------|----------------------------------|-----------------------------|
//! | register | `POST /api/register {username,password}` | `201 {msg}`        |
//! | login    | `POST /api/login {username,password}`    | `200 {access_token}` |
//! | profile  | `GET /api/profile` (bearer)      | `200 {username}`            |
//! | chat     | `POST /api/chat {message}` (bearer) | `200 {response}`         |
//! | history  | `GET /api/history` (bearer)      | `200 {history:[...]}`       |
//!
//! Error bodies carry `{msg}`. A 401 on an authenticated call clears the
//! session and surfaces as [`ChatError::Unauthorized`].

use std::future::Future;
use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::conversation::ChatEntry;
use crate::error::ChatError;
use crate::session::Session;

// -- Wire types --------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct Credentials<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub msg: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Profile {
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub message: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub response: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryResponse {
    #[serde(default)]
    pub history: Vec<ChatEntry>,
}

/// `{msg}` or, for JWT failures, `{msg, error: "jwt_error"}`.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

// -- Backend seam -------------------------------------------------------------

/// The authenticated calls the chat loop needs. [`ApiClient`] is the real
/// implementation; tests substitute a scripted one.
pub trait ChatBackend {
    fn send_message(
        &self,
        session: &mut Session,
        message: &str,
    ) -> impl Future<Output = Result<String, ChatError>> + Send;

    fn fetch_history(
        &self,
        session: &mut Session,
    ) -> impl Future<Output = Result<Vec<ChatEntry>, ChatError>> + Send;

    fn fetch_profile(
        &self,
        session: &mut Session,
    ) -> impl Future<Output = Result<Profile, ChatError>> + Send;
}

// -- Client -------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn builder(base_url: impl Into<String>) -> ApiClientBuilder {
        ApiClientBuilder::new(base_url)
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::builder(&cfg.api_url)
            .connect_timeout(cfg.connect_timeout)
            .request_timeout(cfg.request_timeout)
            .build()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create an account. Returns the backend's confirmation message.
    pub async fn register(&self, username: &str, password: &str) -> Result<String, ChatError> {
        require_credentials(username, password)?;
        let url = self.url("/api/register");
        let resp = self
            .send(
                self.client
                    .post(&url)
                    .json(&Credentials { username, password }),
                &url,
            )
            .await?;
        let body: MessageResponse = decode(resp, "Registration failed").await?;
        info!(username, "registered");
        Ok(body
            .msg
            .unwrap_or_else(|| "Registration successful".to_string()))
    }

    /// Exchange credentials for a token and store it in `session`.
    pub async fn login(
        &self,
        session: &mut Session,
        username: &str,
        password: &str,
    ) -> Result<(), ChatError> {
        require_credentials(username, password)?;
        let url = self.url("/api/login");
        let resp = self
            .send(
                self.client
                    .post(&url)
                    .json(&Credentials { username, password }),
                &url,
            )
            .await?;
        let body: LoginResponse = decode(resp, "Login failed").await?;
        session.acquire(body.access_token)?;
        info!(username, "logged in");
        Ok(())
    }

    /// Drop the local token. The backend keeps no server-side session.
    pub fn logout(&self, session: &mut Session) -> Result<(), ChatError> {
        session.invalidate()
    }

    pub async fn profile(&self, session: &mut Session) -> Result<Profile, ChatError> {
        self.authed(session, "/api/profile", "Failed to fetch profile", |c, url| {
            c.get(url)
        })
        .await
    }

    /// Send one user message and return the bot's reply text (possibly empty).
    pub async fn chat(&self, session: &mut Session, message: &str) -> Result<String, ChatError> {
        if message.trim().is_empty() {
            return Err(ChatError::InvalidArgument("Message required".to_string()));
        }
        let body: ChatResponse = self
            .authed(session, "/api/chat", "Failed to send message", |c, url| {
                c.post(url).json(&ChatRequest { message })
            })
            .await?;
        Ok(body.response.unwrap_or_default())
    }

    pub async fn history(&self, session: &mut Session) -> Result<Vec<ChatEntry>, ChatError> {
        let body: HistoryResponse = self
            .authed(session, "/api/history", "Failed to fetch chats", |c, url| {
                c.get(url)
            })
            .await?;
        debug!(entries = body.history.len(), "history fetched");
        Ok(body.history)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, req: RequestBuilder, url: &str) -> Result<Response, ChatError> {
        req.send().await.map_err(|e| {
            warn!(error = %e, url, "request failed");
            ChatError::Connect {
                url: url.to_string(),
                detail: e.to_string(),
            }
        })
    }

    async fn authed<T, F>(
        &self,
        session: &mut Session,
        path: &str,
        fallback: &str,
        build: F,
    ) -> Result<T, ChatError>
    where
        T: DeserializeOwned,
        F: FnOnce(&reqwest::Client, &str) -> RequestBuilder,
    {
        let token = session.bearer()?.to_string();
        let url = self.url(path);
        let resp = self
            .send(build(&self.client, &url).bearer_auth(token), &url)
            .await?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            warn!(url = %url, "token rejected, clearing session");
            session.invalidate()?;
            return Err(ChatError::Unauthorized);
        }
        decode(resp, fallback).await
    }
}

impl ChatBackend for ApiClient {
    async fn send_message(&self, session: &mut Session, message: &str) -> Result<String, ChatError> {
        self.chat(session, message).await
    }

    async fn fetch_history(&self, session: &mut Session) -> Result<Vec<ChatEntry>, ChatError> {
        self.history(session).await
    }

    async fn fetch_profile(&self, session: &mut Session) -> Result<Profile, ChatError> {
        self.profile(session).await
    }
}

fn require_credentials(username: &str, password: &str) -> Result<(), ChatError> {
    if username.trim().is_empty() || password.is_empty() {
        return Err(ChatError::InvalidArgument(
            "Username and password required".to_string(),
        ));
    }
    Ok(())
}

/// Parse a success body as `T`, or turn an error status into
/// `ChatError::Api` using the body's `msg` (or `fallback` when absent).
async fn decode<T: DeserializeOwned>(resp: Response, fallback: &str) -> Result<T, ChatError> {
    let status = resp.status();
    let bytes = resp.bytes().await.map_err(|e| ChatError::Json {
        detail: e.to_string(),
    })?;

    if status.is_success() {
        return Ok(serde_json::from_slice(&bytes)?);
    }

    let msg = error_message(&bytes).unwrap_or_else(|| fallback.to_string());
    debug!(status = status.as_u16(), msg = %msg, "backend error");
    Err(ChatError::Api {
        status: status.as_u16(),
        msg,
    })
}

/// The non-empty `msg` of an error body, if it has one.
pub fn error_message(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.msg)
        .filter(|m| !m.is_empty())
}

// -- Builder ------------------------------------------------------------------

/// Builder for [`ApiClient`].
pub struct ApiClientBuilder {
    base_url: String,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl ApiClientBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            connect_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn build(self) -> ApiClient {
        // Client::builder() only fails when the TLS backend cannot initialise;
        // fall back to a default client rather than panicking.
        let client = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .build()
            .unwrap_or_default();

        ApiClient {
            base_url: self.base_url.trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_trims_trailing_slash() {
        let c = ApiClient::builder("http://localhost:5000/").build();
        assert_eq!(c.base_url(), "http://localhost:5000");
        assert_eq!(c.url("/api/chat"), "http://localhost:5000/api/chat");
    }

    #[test]
    fn from_config_uses_api_url() {
        let cfg = Config {
            api_url: "https://chat.example.com".to_string(),
            ..Config::default()
        };
        assert_eq!(ApiClient::from_config(&cfg).base_url(), "https://chat.example.com");
    }

    #[test]
    fn credentials_serialize() {
        let json = serde_json::to_value(Credentials {
            username: "ada",
            password: "pw",
        })
        .unwrap();
        assert_eq!(json["username"], "ada");
        assert_eq!(json["password"], "pw");
    }

    #[test]
    fn chat_request_serializes_message_field() {
        let json = serde_json::to_string(&ChatRequest { message: "hi" }).unwrap();
        assert_eq!(json, r#"{"message":"hi"}"#);
    }

    #[test]
    fn chat_response_missing_field_is_none() {
        let r: ChatResponse = serde_json::from_str("{}").unwrap();
        assert!(r.response.is_none());
    }

    #[test]
    fn history_response_defaults_to_empty() {
        let r: HistoryResponse = serde_json::from_str("{}").unwrap();
        assert!(r.history.is_empty());
    }

    #[test]
    fn history_response_parses_backend_entries() {
        let json = r#"{"history":[
            {"sender":"user","message":"hi","timestamp":"2025-01-31T09:15:02.123456"},
            {"sender":"bot","message":"hello","timestamp":"2025-01-31T09:15:04.000001"}
        ]}"#;
        let r: HistoryResponse = serde_json::from_str(json).unwrap();
        assert_eq!(r.history.len(), 2);
        assert_eq!(r.history[1].message, "hello");
    }

    #[test]
    fn error_message_reads_msg() {
        assert_eq!(
            error_message(br#"{"msg":"Invalid credentials"}"#).as_deref(),
            Some("Invalid credentials")
        );
    }

    #[test]
    fn error_message_jwt_shape() {
        let body = br#"{"msg":"Signature has expired","error":"jwt_error"}"#;
        let parsed: ErrorBody = serde_json::from_slice(body).unwrap();
        assert_eq!(parsed.error.as_deref(), Some("jwt_error"));
        assert_eq!(error_message(body).as_deref(), Some("Signature has expired"));
    }

    #[test]
    fn error_message_absent_or_empty_is_none() {
        assert!(error_message(b"<html>500</html>").is_none());
        assert!(error_message(br#"{"msg":""}"#).is_none());
        assert!(error_message(b"{}").is_none());
    }

    #[test]
    fn blank_credentials_rejected() {
        assert!(require_credentials("", "pw").is_err());
        assert!(require_credentials("   ", "pw").is_err());
        assert!(require_credentials("ada", "").is_err());
        assert!(require_credentials("ada", "pw").is_ok());
    }

    #[tokio::test]
    async fn authed_call_without_token_fails_before_network() {
        let c = ApiClient::builder("http://127.0.0.1:1").build();
        let mut s = Session::ephemeral();
        assert!(matches!(c.profile(&mut s).await, Err(ChatError::NotLoggedIn)));
    }

    #[tokio::test]
    async fn empty_chat_message_rejected() {
        let c = ApiClient::builder("http://127.0.0.1:1").build();
        let mut s = Session::ephemeral();
        assert!(matches!(
            c.chat(&mut s, "   ").await,
            Err(ChatError::InvalidArgument(_))
        ));
    }
}
