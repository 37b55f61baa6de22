//! Reply contract between the assistant model and the dispatcher.
//!
//! The model is told to answer with `{"code", "output", "var"}`:
//! - `1`: informational text only
//! - `2`: create the calendar event in `var`
//! - `3`: create the task in `var`
//!
//! Nothing unchecked leaves this module: callers get a closed
//! [`AiResponse`] or a [`ContractError`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Drafts
// ---------------------------------------------------------------------------

/// Start or end of an event draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    /// RFC 3339 instant, or a local date-time interpreted in `time_zone`.
    pub date_time: String,
    /// IANA zone label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

/// An event attendee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    /// Attendee address.
    pub email: String,
}

/// Reminder delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderMethod {
    /// Email reminder.
    Email,
    /// On-screen popup.
    Popup,
}

/// A reminder overriding the calendar default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderOverride {
    /// Delivery channel.
    pub method: ReminderMethod,
    /// Minutes before start.
    pub minutes: u32,
}

/// Event reminder settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminders {
    /// Use the calendar's default reminders.
    #[serde(default)]
    pub use_default: bool,
    /// Explicit reminders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<Vec<ReminderOverride>>,
}

/// A calendar event proposed by the model. Serializes as the Calendar API
/// insert body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEventDraft {
    /// Title.
    pub summary: String,
    /// Where.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Start.
    pub start: EventDateTime,
    /// End.
    pub end: EventDateTime,
    /// RRULE/EXDATE lines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<Vec<String>>,
    /// Invitees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendees: Option<Vec<Attendee>>,
    /// Reminder settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminders: Option<Reminders>,
}

/// Task completion state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    /// Open.
    NeedsAction,
    /// Done.
    Completed,
}

/// A task proposed by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDraft {
    /// Title.
    pub title: String,
    /// Notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// RFC 3339 due date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<String>,
    /// Completion state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    /// Completion instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<String>,
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// A validated assistant reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiResponse {
    /// `code = 1`: text for the user, no side effect.
    Informational {
        /// Reply text.
        output: String,
    },
    /// `code = 2`: create a calendar event.
    EventRequest {
        /// Reply text shown once the event exists.
        output: String,
        /// The event to create.
        event: CalendarEventDraft,
    },
    /// `code = 3`: create a task.
    TaskRequest {
        /// Reply text shown once the task exists.
        output: String,
        /// The task to create.
        task: TaskDraft,
    },
}

impl AiResponse {
    /// The wire discriminant.
    pub fn code(&self) -> u8 {
        match self {
            Self::Informational { .. } => 1,
            Self::EventRequest { .. } => 2,
            Self::TaskRequest { .. } => 3,
        }
    }

    /// Reply text.
    pub fn output(&self) -> &str {
        match self {
            Self::Informational { output }
            | Self::EventRequest { output, .. }
            | Self::TaskRequest { output, .. } => output,
        }
    }
}

/// Why a reply was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractError {
    /// Not syntactically valid JSON.
    #[error("response is not valid JSON: {0}")]
    Malformed(String),
    /// Valid JSON without the three-field shape.
    #[error("invalid response structure: {0}")]
    Structure(String),
    /// `code = 2` with an unusable event.
    #[error("invalid calendar event: {0}")]
    InvalidEvent(String),
    /// `code = 3` with an unusable task.
    #[error("invalid task: {0}")]
    InvalidTask(String),
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Decode raw model text into JSON without checking its shape.
///
/// # Errors
///
/// Returns [`ContractError::Malformed`] when `raw` is not JSON.
pub fn decode(raw: &str) -> Result<Value, ContractError> {
    serde_json::from_str(raw).map_err(|e| ContractError::Malformed(e.to_string()))
}

/// Parse and validate raw model text.
///
/// Deterministic and side-effect free.
///
/// # Errors
///
/// Returns a [`ContractError`] describing the first violation.
pub fn parse_response(raw: &str) -> Result<AiResponse, ContractError> {
    validate(decode(raw)?)
}

/// Validate a decoded reply.
///
/// Only `summary`, `start.dateTime` and `end.dateTime` (events) or `title`
/// (tasks) are required. Optional draft fields of the wrong type are
/// dropped rather than rejected.
///
/// # Errors
///
/// Returns a [`ContractError`] describing the first violation.
pub fn validate(value: Value) -> Result<AiResponse, ContractError> {
    let Value::Object(object) = value else {
        return Err(ContractError::Structure(
            "response is not a JSON object".to_owned(),
        ));
    };

    let code = object.get("code").and_then(reply_code);
    let output = match object.get("output") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        _ => {
            return Err(ContractError::Structure(
                "output must be a non-empty string".to_owned(),
            ))
        }
    };
    let empty = Map::new();
    let var = object
        .get("var")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    match code {
        Some(1) => Ok(AiResponse::Informational { output }),
        Some(2) => event_draft(var)
            .map(|event| AiResponse::EventRequest { output, event })
            .map_err(ContractError::InvalidEvent),
        Some(3) => task_draft(var)
            .map(|task| AiResponse::TaskRequest { output, task })
            .map_err(ContractError::InvalidTask),
        _ => Err(ContractError::Structure(
            "code must be 1, 2 or 3".to_owned(),
        )),
    }
}

/// `1`, `2` or `3`, written either as an integer or an integral float.
pub(crate) fn reply_code(value: &Value) -> Option<u8> {
    if let Some(n) = value.as_u64() {
        return u8::try_from(n).ok();
    }
    let f = value.as_f64()?;
    [(1.0, 1), (2.0, 2), (3.0, 3)]
        .into_iter()
        .find(|(wire, _)| (f - wire).abs() < f64::EPSILON)
        .map(|(_, code)| code)
}

fn event_draft(var: &Map<String, Value>) -> Result<CalendarEventDraft, String> {
    let summary = required_text(var, "summary", "summary")?;
    let start = event_time(var, "start")?;
    let end = event_time(var, "end")?;
    Ok(CalendarEventDraft {
        summary,
        location: lenient(var, "location"),
        description: lenient(var, "description"),
        start,
        end,
        recurrence: lenient_list(var, "recurrence"),
        attendees: lenient_list(var, "attendees"),
        reminders: lenient(var, "reminders"),
    })
}

fn event_time(var: &Map<String, Value>, key: &str) -> Result<EventDateTime, String> {
    let empty = Map::new();
    let time = var.get(key).and_then(Value::as_object).unwrap_or(&empty);
    Ok(EventDateTime {
        date_time: required_text(time, "dateTime", &format!("{key}.dateTime"))?,
        time_zone: lenient(time, "timeZone"),
    })
}

fn task_draft(var: &Map<String, Value>) -> Result<TaskDraft, String> {
    Ok(TaskDraft {
        title: required_text(var, "title", "title")?,
        notes: lenient(var, "notes"),
        due: lenient(var, "due"),
        status: lenient(var, "status"),
        completed: lenient(var, "completed"),
    })
}

/// A non-empty string under `key`.
fn required_text(fields: &Map<String, Value>, key: &str, field: &str) -> Result<String, String> {
    match fields.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        _ => Err(format!("missing var.{field}")),
    }
}

/// `key` decoded as `T`, or `None` when absent or of another shape.
fn lenient<T: DeserializeOwned>(fields: &Map<String, Value>, key: &str) -> Option<T> {
    fields
        .get(key)
        .and_then(|value| T::deserialize(value).ok())
}

/// Elements of the array under `key` that decode as `T`.
fn lenient_list<T: DeserializeOwned>(fields: &Map<String, Value>, key: &str) -> Option<Vec<T>> {
    let items: Vec<T> = fields
        .get(key)?
        .as_array()?
        .iter()
        .filter_map(|item| T::deserialize(item).ok())
        .collect();
    (!items.is_empty()).then_some(items)
}

/// Non-empty string at `pointer`, if any.
pub(crate) fn text_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}
