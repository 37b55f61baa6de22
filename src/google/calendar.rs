//! Google Calendar API v3: calendar list, upcoming events, event insert.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{endpoint_url, CalendarApi, GoogleApiError, GoogleClient};
use crate::assistant::contract::CalendarEventDraft;

// ============================================================================
// API response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ItemsResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

/// One entry of `calendarList.list`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarListEntry {
    /// Calendar id used in event URLs.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub summary: Option<String>,
    /// Whether this is the user's primary calendar.
    #[serde(default)]
    pub primary: bool,
}

/// Start or end of a listed event. All-day events carry `date` only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    /// RFC 3339 instant for timed events.
    #[serde(default)]
    pub date_time: Option<String>,
    /// `YYYY-MM-DD` for all-day events.
    #[serde(default)]
    pub date: Option<String>,
    /// IANA zone label.
    #[serde(default)]
    pub time_zone: Option<String>,
}

impl EventTime {
    /// The instant if timed, otherwise the date.
    pub fn display(&self) -> Option<&str> {
        self.date_time.as_deref().or(self.date.as_deref())
    }
}

/// An event returned by `events.list`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    /// Event id.
    #[serde(default)]
    pub id: String,
    /// Title.
    #[serde(default)]
    pub summary: Option<String>,
    /// Start.
    #[serde(default)]
    pub start: Option<EventTime>,
    /// End.
    #[serde(default)]
    pub end: Option<EventTime>,
}

/// Identity of an inserted event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedEvent {
    /// New event id.
    #[serde(default)]
    pub id: String,
    /// Link to the event in the web UI.
    #[serde(default)]
    pub html_link: Option<String>,
}

/// Parse a `calendarList.list` or `events.list` body into its items.
///
/// # Errors
///
/// Returns [`GoogleApiError::Json`] when the body does not match.
#[doc(hidden)]
pub fn parse_items<T: serde::de::DeserializeOwned>(body: &str) -> Result<Vec<T>, GoogleApiError> {
    let parsed: ItemsResponse<T> = serde_json::from_str(body)?;
    Ok(parsed.items)
}

// ============================================================================
// Calendar API
// ============================================================================

#[async_trait]
impl CalendarApi for GoogleClient {
    #[instrument(skip(self))]
    async fn list_calendars(&self) -> Result<Vec<CalendarListEntry>, GoogleApiError> {
        let url = format!("{}/users/me/calendarList", self.endpoints.calendar);
        let body = self.get(&url, &[]).await?;
        parse_items(&body)
    }

    #[instrument(skip(self))]
    async fn list_upcoming_events(
        &self,
        time_min: DateTime<Utc>,
        max_results: u32,
    ) -> Result<Vec<CalendarEvent>, GoogleApiError> {
        let url = format!("{}/calendars/primary/events", self.endpoints.calendar);
        let body = self
            .get(
                &url,
                &[
                    (
                        "timeMin",
                        time_min.to_rfc3339_opts(SecondsFormat::Secs, true),
                    ),
                    ("showDeleted", "false".to_owned()),
                    ("singleEvents", "true".to_owned()),
                    ("orderBy", "startTime".to_owned()),
                    ("maxResults", max_results.to_string()),
                ],
            )
            .await?;
        parse_items(&body)
    }

    #[instrument(skip(self, event), fields(summary = %event.summary))]
    async fn insert_event(
        &self,
        calendar_id: &str,
        event: &CalendarEventDraft,
    ) -> Result<CreatedEvent, GoogleApiError> {
        let url = endpoint_url(
            &self.endpoints.calendar,
            &["calendars", calendar_id, "events"],
        )?;
        let body = self.post_json(url.as_str(), event).await?;
        let created: CreatedEvent = serde_json::from_str(&body)?;
        debug!(event_id = %created.id, "calendar event created");
        Ok(created)
    }
}
