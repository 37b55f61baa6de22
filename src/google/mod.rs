//! Native Google API client.
//!
//! Direct HTTP via `reqwest` against the Gmail v1, Calendar v3 and Tasks v1
//! REST APIs. Each service sits behind a trait so the context fetcher and
//! the dispatcher can be driven by fakes.
//!
//! Modules:
//! - auth: loopback OAuth consent, refresh, revoke, reauthorization
//! - gmail: unread message listing and detail
//! - calendar: calendar list, upcoming events, event insert
//! - tasks: task lists, tasks, task insert

pub mod auth;
pub mod calendar;
pub mod gmail;
pub mod tasks;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use url::Url;

use crate::assistant::contract::{CalendarEventDraft, TaskDraft};
use crate::providers::sanitize_http_error_body;

pub use auth::{GoogleIdentity, GoogleToken, IdentityProvider};
pub use calendar::{CalendarEvent, CalendarListEntry, CreatedEvent, EventTime};
pub use gmail::{MessageDetail, MessageRef};
pub use tasks::{CreatedTask, Task, TaskList};

/// Scopes requested at sign-in.
pub const SIGN_IN_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/calendar.readonly",
    "https://www.googleapis.com/auth/calendar",
    "https://www.googleapis.com/auth/tasks",
];

/// Write scopes re-requested after a permission failure.
pub const REAUTHORIZE_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/calendar",
    "https://www.googleapis.com/auth/calendar.events",
    "https://www.googleapis.com/auth/tasks",
];

// ============================================================================
// Error type
// ============================================================================

/// Errors returned by the Google identity and service clients.
#[derive(Debug, thiserror::Error)]
pub enum GoogleApiError {
    /// HTTP transport failure.
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    /// The caller's token lacks a scope the request needs (HTTP 403).
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// Token expired or revoked (HTTP 401, `invalid_grant`).
    #[error("token expired or revoked")]
    AuthExpired,
    /// No user is signed in.
    #[error("not signed in")]
    NotSignedIn,
    /// Refresh or code exchange failed.
    #[error("token request failed: {0}")]
    TokenRequest(String),
    /// Any other non-success status.
    #[error("API error {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Sanitized response body.
        message: String,
    },
    /// Response body did not match the expected schema.
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// Local listener or socket failure during consent.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// The user denied consent or the redirect carried no code.
    #[error("OAuth flow cancelled: {0}")]
    FlowCancelled(String),
    /// No redirect arrived in time.
    #[error("OAuth consent timed out after {0}s")]
    ConsentTimeout(u64),
    /// A configured endpoint is not a usable base URL.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl GoogleApiError {
    /// Whether this failure should trigger reauthorization.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }
}

/// Map a non-success status to an error, or return the body on success.
///
/// # Errors
///
/// 403 becomes [`GoogleApiError::PermissionDenied`], 401 becomes
/// [`GoogleApiError::AuthExpired`], anything else non-2xx becomes
/// [`GoogleApiError::Api`].
pub async fn check_google_response(response: reqwest::Response) -> Result<String, GoogleApiError> {
    let status = response.status();
    let body = response.text().await?;
    if status.is_success() {
        return Ok(body);
    }
    Err(error_for_status(status.as_u16(), &body))
}

/// Classify a failed response by status.
#[doc(hidden)]
pub fn error_for_status(status: u16, body: &str) -> GoogleApiError {
    let message = sanitize_http_error_body(body);
    match status {
        401 => GoogleApiError::AuthExpired,
        403 => GoogleApiError::PermissionDenied(message),
        _ => GoogleApiError::Api { status, message },
    }
}

/// `base` extended by `segments`, each percent-encoded as one path segment.
///
/// # Errors
///
/// Returns [`GoogleApiError::InvalidEndpoint`] when `base` cannot carry a
/// path.
#[doc(hidden)]
pub fn endpoint_url(base: &str, segments: &[&str]) -> Result<Url, GoogleApiError> {
    let mut url =
        Url::parse(base).map_err(|e| GoogleApiError::InvalidEndpoint(format!("{base}: {e}")))?;
    url.path_segments_mut()
        .map_err(|()| GoogleApiError::InvalidEndpoint(format!("{base} cannot carry a path")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

// ============================================================================
// Service traits
// ============================================================================

/// Message service: unread listing and per-message detail.
#[async_trait]
pub trait MailApi: Send + Sync {
    /// List up to `max_results` unread messages (ids only).
    ///
    /// # Errors
    ///
    /// Returns [`GoogleApiError`] on transport or API failure.
    async fn list_unread(&self, max_results: u32) -> Result<Vec<MessageRef>, GoogleApiError>;

    /// Fetch one message's headers and snippet.
    ///
    /// # Errors
    ///
    /// Returns [`GoogleApiError`] on transport or API failure.
    async fn get_message(&self, id: &str) -> Result<MessageDetail, GoogleApiError>;
}

/// Calendar service: calendar list, upcoming events, insert.
#[async_trait]
pub trait CalendarApi: Send + Sync {
    /// List the user's calendars.
    ///
    /// # Errors
    ///
    /// Returns [`GoogleApiError`] on transport or API failure.
    async fn list_calendars(&self) -> Result<Vec<CalendarListEntry>, GoogleApiError>;

    /// Primary-calendar events from `time_min` on, recurring instances
    /// expanded, ordered by start, capped at `max_results`.
    ///
    /// # Errors
    ///
    /// Returns [`GoogleApiError`] on transport or API failure.
    async fn list_upcoming_events(
        &self,
        time_min: DateTime<Utc>,
        max_results: u32,
    ) -> Result<Vec<CalendarEvent>, GoogleApiError>;

    /// Insert an event into `calendar_id`.
    ///
    /// # Errors
    ///
    /// Returns [`GoogleApiError::PermissionDenied`] when the token lacks
    /// write scope, or another [`GoogleApiError`] on failure.
    async fn insert_event(
        &self,
        calendar_id: &str,
        event: &CalendarEventDraft,
    ) -> Result<CreatedEvent, GoogleApiError>;
}

/// Task service: task lists, tasks, insert.
#[async_trait]
pub trait TasksApi: Send + Sync {
    /// List up to `max_results` task lists.
    ///
    /// # Errors
    ///
    /// Returns [`GoogleApiError`] on transport or API failure.
    async fn list_task_lists(&self, max_results: u32) -> Result<Vec<TaskList>, GoogleApiError>;

    /// Every task in `list_id`, completed ones included.
    ///
    /// # Errors
    ///
    /// Returns [`GoogleApiError`] on transport or API failure.
    async fn list_tasks(&self, list_id: &str) -> Result<Vec<Task>, GoogleApiError>;

    /// Insert a task into `list_id`.
    ///
    /// # Errors
    ///
    /// Returns [`GoogleApiError::PermissionDenied`] when the token lacks
    /// write scope, or another [`GoogleApiError`] on failure.
    async fn insert_task(&self, list_id: &str, task: &TaskDraft)
        -> Result<CreatedTask, GoogleApiError>;
}

// ============================================================================
// Client
// ============================================================================

/// REST roots, overridable for tests against a local server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Gmail v1 root.
    pub gmail: String,
    /// Calendar v3 root.
    pub calendar: String,
    /// Tasks v1 root.
    pub tasks: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            gmail: "https://gmail.googleapis.com/gmail/v1".to_owned(),
            calendar: "https://www.googleapis.com/calendar/v3".to_owned(),
            tasks: "https://tasks.googleapis.com/tasks/v1".to_owned(),
        }
    }
}

/// Google REST client implementing [`MailApi`], [`CalendarApi`] and
/// [`TasksApi`].
///
/// Obtains a bearer token from the identity provider on every call, so a
/// reauthorized token is picked up without rebuilding the client.
#[derive(Clone)]
pub struct GoogleClient {
    http: reqwest::Client,
    identity: Arc<dyn IdentityProvider>,
    endpoints: Endpoints,
}

impl GoogleClient {
    /// Create a client with the public Google endpoints.
    pub fn new(identity: Arc<dyn IdentityProvider>) -> Self {
        Self::with_endpoints(identity, Endpoints::default())
    }

    /// Create a client against custom endpoints.
    pub fn with_endpoints(identity: Arc<dyn IdentityProvider>, endpoints: Endpoints) -> Self {
        Self {
            http: reqwest::Client::new(),
            identity,
            endpoints,
        }
    }

    async fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<String, GoogleApiError> {
        let token = self.identity.access_token().await?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;
        check_google_response(response).await
    }

    async fn post_json<B: serde::Serialize + Sync>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<String, GoogleApiError> {
        let token = self.identity.access_token().await?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        check_google_response(response).await
    }
}
