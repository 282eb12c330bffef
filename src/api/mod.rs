//! Attendance API Client
//!
//! HTTP client for the event attendance backend. Claim endpoints return the
//! raw status and body so the scan flows can classify them; the remaining
//! endpoints decode straight into typed values.

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::app::config::Settings;
use crate::app::types::{AdminSession, CheckinForm, EventInfo, Ticket, TicketDetails};
use crate::error::ScanError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status
    #[error("{message} ({status})")]
    Status { status: StatusCode, message: String },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error(transparent)]
    Input(#[from] ScanError),
}

impl ApiError {
    /// Message suitable for a notice
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Status { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Status and JSON body of a claim-style call, left unclassified
#[derive(Debug, Clone, PartialEq)]
pub struct ApiReply {
    pub status: StatusCode,
    /// Parsed body, `Value::Null` if the body was empty or not JSON
    pub body: Value,
}

impl ApiReply {
    pub fn message(&self) -> Option<&str> {
        self.body.get("message").and_then(Value::as_str)
    }
}

pub struct EventApiClient {
    client: Client,
    base_url: String,
    session: Option<AdminSession>,
}

impl EventApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            session: None,
        }
    }

    /// Client configured from settings (base URL and optional timeout)
    pub fn from_settings(settings: &Settings) -> Result<Self, ApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = settings.request_timeout() {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            session: None,
        })
    }

    /// Attach the admin session used for bearer authentication
    pub fn with_session(mut self, session: Option<AdminSession>) -> Self {
        self.session = session;
        self
    }

    pub fn session(&self) -> Option<&AdminSession> {
        self.session.as_ref()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.session {
            Some(session) => request.bearer_auth(&session.token),
            None => request,
        }
    }

    async fn into_reply(response: reqwest::Response) -> Result<ApiReply, ApiError> {
        let status = response.status();
        let bytes = response.bytes().await?;
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        Ok(ApiReply { status, body })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.url(path);
        debug!("GET {}", url);
        let response = self.authorize(self.client.get(&url)).send().await?;
        let reply = Self::into_reply(response).await?;
        Self::decode(reply)
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, ApiError> {
        let reply = self.post_raw(path, body).await?;
        Self::decode(reply)
    }

    async fn post_raw(&self, path: &str, body: &Value) -> Result<ApiReply, ApiError> {
        let url = self.url(path);
        debug!("POST {}", url);
        let response = self
            .authorize(self.client.post(&url))
            .json(body)
            .send()
            .await?;
        Self::into_reply(response).await
    }

    fn decode<T: DeserializeOwned>(reply: ApiReply) -> Result<T, ApiError> {
        if !reply.status.is_success() {
            let message = reply
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| format!("API error: {}", reply.status));
            error!("Request failed: {} - {}", reply.status, message);
            return Err(ApiError::Status {
                status: reply.status,
                message,
            });
        }
        serde_json::from_value(reply.body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    // ============================================================
    // Claim endpoints (classified by the scan flows)
    // ============================================================

    /// Generic ticket validation
    pub async fn validate_ticket(&self, token: &str) -> Result<ApiReply, ApiError> {
        info!("Validating ticket");
        self.post_raw("/api/validator/validate", &json!({ "token": token }))
            .await
    }

    /// Consumption claim scoped to one event
    pub async fn claim_consumption(&self, event_id: &str, token: &str) -> Result<ApiReply, ApiError> {
        info!("Claiming consumption for event {}", event_id);
        let path = format!("/api/consumption/claim/{}", urlencoding::encode(event_id));
        self.post_raw(&path, &json!({ "token": token })).await
    }

    // ============================================================
    // Public endpoints
    // ============================================================

    /// Events currently open for attendance
    pub async fn active_events(&self) -> Result<Vec<EventInfo>, ApiError> {
        let events: Vec<EventInfo> = self.get_json("/api/active-events").await?;
        info!("Fetched {} active events", events.len());
        Ok(events)
    }

    /// Event behind a check-in code
    pub async fn checkin_event(&self, event_code: &str) -> Result<EventInfo, ApiError> {
        #[derive(serde::Deserialize)]
        struct Envelope {
            event: Option<EventInfo>,
        }

        let code = event_code.trim().to_uppercase();
        let path = format!("/api/checkin/{}", urlencoding::encode(&code));
        let envelope: Envelope = self.get_json(&path).await?;
        envelope.event.ok_or_else(|| ApiError::Status {
            status: StatusCode::NOT_FOUND,
            message: format!("Event {} not found", code),
        })
    }

    /// Self check-in; returns the issued ticket
    pub async fn check_in(&self, event_code: &str, form: &CheckinForm) -> Result<Ticket, ApiError> {
        #[derive(serde::Deserialize)]
        struct Envelope {
            ticket: Ticket,
        }

        let payload = form.to_payload()?;
        let code = event_code.trim().to_uppercase();
        let path = format!("/api/attendance/checkin/{}", urlencoding::encode(&code));
        let body = serde_json::to_value(&payload).map_err(|e| ApiError::Decode(e.to_string()))?;
        let envelope: Envelope = self.post_json(&path, &body).await?;
        info!("Checked in to {}", code);
        Ok(envelope.ticket)
    }

    /// Digital ticket by token
    pub async fn ticket(&self, token: &str) -> Result<TicketDetails, ApiError> {
        let path = format!("/ticket/{}", urlencoding::encode(token.trim()));
        self.get_json(&path).await
    }

    // ============================================================
    // Admin
    // ============================================================

    /// Exchange admin credentials for a session
    pub async fn login(&self, email: &str, password: &str) -> Result<AdminSession, ApiError> {
        if email.trim().is_empty() {
            return Err(ScanError::MissingField("email").into());
        }
        if password.is_empty() {
            return Err(ScanError::MissingField("password").into());
        }
        let session: AdminSession = self
            .post_json(
                "/api/admin/login",
                &json!({ "email": email.trim(), "password": password }),
            )
            .await?;
        info!("Logged in as {}", email.trim());
        Ok(session)
    }
}
