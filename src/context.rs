//! Context snapshot: unread mail, upcoming events and tasks.
//!
//! The three sources are fetched concurrently and each succeeds or fails
//! on its own. A failed source degrades to an empty list so the others can
//! still reach the model.

use std::sync::Arc;

use chrono::Utc;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::config::ContextConfig;
use crate::google::{CalendarApi, CalendarEvent, GoogleApiError, MailApi, MessageDetail, Task, TasksApi};

/// Placeholder when a message has no `Subject` header.
pub const NO_SUBJECT: &str = "No Subject";
/// Placeholder when a message has no `From` header.
pub const UNKNOWN_SENDER: &str = "Unknown Sender";

/// Flattened unread message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailSummary {
    /// Subject header, or [`NO_SUBJECT`].
    pub subject: String,
    /// From header, or [`UNKNOWN_SENDER`].
    pub from: String,
    /// Preview text.
    pub snippet: String,
}

impl From<MessageDetail> for EmailSummary {
    fn from(detail: MessageDetail) -> Self {
        Self {
            subject: detail.header("Subject").unwrap_or(NO_SUBJECT).to_owned(),
            from: detail.header("From").unwrap_or(UNKNOWN_SENDER).to_owned(),
            snippet: detail.snippet,
        }
    }
}

/// Flattened upcoming event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSummary {
    /// Title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Start instant or all-day date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    /// End instant or all-day date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

impl From<CalendarEvent> for EventSummary {
    fn from(event: CalendarEvent) -> Self {
        Self {
            summary: event.summary,
            start: event.start.as_ref().and_then(|t| t.display()).map(str::to_owned),
            end: event.end.as_ref().and_then(|t| t.display()).map(str::to_owned),
        }
    }
}

/// Flattened task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    /// Title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Due date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<String>,
}

impl From<Task> for TaskSummary {
    fn from(task: Task) -> Self {
        Self {
            title: task.title,
            due: task.due,
        }
    }
}

/// The three-list bundle handed to the model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    /// Unread messages.
    pub unread_emails: Vec<EmailSummary>,
    /// Upcoming events.
    pub upcoming_events: Vec<EventSummary>,
    /// Tasks across all lists.
    pub upcoming_tasks: Vec<TaskSummary>,
}

/// Per-source fetch results, before degradation.
#[derive(Debug)]
pub struct FetchReport {
    /// Message source result.
    pub emails: Result<Vec<EmailSummary>, GoogleApiError>,
    /// Event source result.
    pub events: Result<Vec<EventSummary>, GoogleApiError>,
    /// Task source result.
    pub tasks: Result<Vec<TaskSummary>, GoogleApiError>,
}

impl FetchReport {
    /// Collapse into a snapshot, logging and emptying each failed source.
    pub fn into_snapshot(self) -> ContextSnapshot {
        ContextSnapshot {
            unread_emails: degrade("emails", self.emails),
            upcoming_events: degrade("events", self.events),
            upcoming_tasks: degrade("tasks", self.tasks),
        }
    }
}

fn degrade<T>(source: &'static str, result: Result<Vec<T>, GoogleApiError>) -> Vec<T> {
    match result {
        Ok(items) => {
            debug!(source, count = items.len(), "context source loaded");
            items
        }
        Err(e) => {
            warn!(source, error = %e, "context source failed, continuing without it");
            Vec::new()
        }
    }
}

/// Gathers the context snapshot from the three services.
#[derive(Clone)]
pub struct ContextFetcher {
    mail: Arc<dyn MailApi>,
    calendar: Arc<dyn CalendarApi>,
    tasks: Arc<dyn TasksApi>,
    limits: ContextConfig,
}

impl ContextFetcher {
    /// Create a fetcher over the given services.
    pub fn new(
        mail: Arc<dyn MailApi>,
        calendar: Arc<dyn CalendarApi>,
        tasks: Arc<dyn TasksApi>,
        limits: ContextConfig,
    ) -> Self {
        Self {
            mail,
            calendar,
            tasks,
            limits,
        }
    }

    /// Fetch all three sources and degrade failures to empty lists.
    pub async fn fetch_context(&self) -> ContextSnapshot {
        self.fetch_all().await.into_snapshot()
    }

    /// Fetch all three sources concurrently, keeping each result.
    #[instrument(skip(self))]
    pub async fn fetch_all(&self) -> FetchReport {
        let (emails, events, tasks) =
            tokio::join!(self.fetch_emails(), self.fetch_events(), self.fetch_tasks());
        FetchReport {
            emails,
            events,
            tasks,
        }
    }

    /// Unread messages with their headers, details fetched concurrently.
    ///
    /// # Errors
    ///
    /// Fails if the listing or any detail fetch fails.
    pub async fn fetch_emails(&self) -> Result<Vec<EmailSummary>, GoogleApiError> {
        let refs = self.mail.list_unread(self.limits.max_unread_emails).await?;
        let details =
            try_join_all(refs.iter().map(|r| self.mail.get_message(&r.id))).await?;
        Ok(details.into_iter().map(EmailSummary::from).collect())
    }

    /// Upcoming events from now on.
    ///
    /// # Errors
    ///
    /// Fails if the events listing fails.
    pub async fn fetch_events(&self) -> Result<Vec<EventSummary>, GoogleApiError> {
        let events = self
            .calendar
            .list_upcoming_events(Utc::now(), self.limits.max_upcoming_events)
            .await?;
        Ok(events.into_iter().map(EventSummary::from).collect())
    }

    /// Tasks of every list, flattened in list order.
    ///
    /// # Errors
    ///
    /// Fails if the list listing or any per-list fetch fails.
    pub async fn fetch_tasks(&self) -> Result<Vec<TaskSummary>, GoogleApiError> {
        let lists = self.tasks.list_task_lists(self.limits.max_task_lists).await?;
        let per_list =
            try_join_all(lists.iter().map(|list| self.tasks.list_tasks(&list.id))).await?;
        Ok(per_list
            .into_iter()
            .flatten()
            .map(TaskSummary::from)
            .collect())
    }
}
