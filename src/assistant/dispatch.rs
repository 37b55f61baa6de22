//! Action dispatch: turning a validated reply into at most one write.
//!
//! Event and task inserts that fail with a permission error get exactly one
//! reauthorization and exactly one retry. Everything else surfaces as a
//! [`DispatchError`] without retrying.

use std::future::Future;
use std::sync::Arc;

use chrono_tz::Tz;
use serde_json::{json, Value};
use tracing::{error, info, instrument, warn};

use super::contract::{self, text_at, AiResponse, CalendarEventDraft, ContractError, TaskDraft};
use super::timing::{one_hour_after, parse_instant, parse_zone};
use crate::google::{CalendarApi, CreatedEvent, CreatedTask, GoogleApiError, IdentityProvider, TasksApi};

/// Shown when a turn fails for a reason the user cannot act on.
pub const GENERIC_FAILURE: &str = "Sorry, I couldn't complete that request. Please try again.";

const PRIMARY_CALENDAR: &str = "primary";

/// Dispatcher settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSettings {
    /// Zone applied when a draft carries none.
    pub default_time_zone: Tz,
    /// Preferred calendar name for new events.
    pub events_calendar: String,
    /// Cap on the task-list lookup.
    pub max_task_lists: u32,
}

/// What a dispatch did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Nothing was written.
    Answered {
        /// Reply text.
        output: String,
    },
    /// An event was inserted.
    EventCreated {
        /// Reply text.
        output: String,
        /// Calendar it went into.
        calendar_id: String,
        /// Service acknowledgement.
        event: CreatedEvent,
    },
    /// A task was inserted.
    TaskCreated {
        /// Reply text.
        output: String,
        /// List it went into.
        list_id: String,
        /// Service acknowledgement.
        task: CreatedTask,
    },
}

impl DispatchOutcome {
    /// Text for the model turn.
    pub fn output(&self) -> &str {
        match self {
            Self::Answered { output }
            | Self::EventCreated { output, .. }
            | Self::TaskCreated { output, .. } => output,
        }
    }

    /// Whether the upcoming events should be re-fetched.
    pub fn refreshes_events(&self) -> bool {
        matches!(self, Self::EventCreated { .. })
    }
}

/// Why a dispatch failed.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The draft was rejected before any network call.
    #[error("{0}")]
    Validation(String),
    /// The user has no task list to insert into.
    #[error("no task list available")]
    NoTaskList,
    /// Reauthorization after a permission failure failed.
    #[error("reauthorization failed: {0}")]
    Reauthorization(#[source] GoogleApiError),
    /// The write failed (after the retry, if one was made).
    #[error("{0}")]
    Write(#[source] GoogleApiError),
}

/// Which write a message is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Calendar event insert.
    Event,
    /// Task insert.
    Task,
}

impl Action {
    fn noun(self) -> &'static str {
        match self {
            Self::Event => "calendar event",
            Self::Task => "task",
        }
    }
}

/// User-facing text for a failed dispatch.
pub fn failure_message(action: Action, err: &DispatchError) -> String {
    let noun = action.noun();
    match err {
        DispatchError::Validation(reason) => format!("I couldn't create that {noun}: {reason}."),
        DispatchError::NoTaskList => {
            "I couldn't find a task list to add that task to.".to_owned()
        }
        DispatchError::Reauthorization(e) => {
            format!("I couldn't get permission to create that {noun}: {e}")
        }
        DispatchError::Write(e) => format!("Failed to create {noun}: {e}"),
    }
}

/// User-facing text for a reply the contract rejected.
pub fn rejection_message(err: &ContractError) -> String {
    match err {
        ContractError::Malformed(_) | ContractError::Structure(_) => GENERIC_FAILURE.to_owned(),
        ContractError::InvalidEvent(reason) => {
            format!("I couldn't create that calendar event: {reason}.")
        }
        ContractError::InvalidTask(reason) => format!("I couldn't create that task: {reason}."),
    }
}

/// Executes validated replies against the calendar and task services.
#[derive(Clone)]
pub struct Dispatcher {
    calendar: Arc<dyn CalendarApi>,
    tasks: Arc<dyn TasksApi>,
    identity: Arc<dyn IdentityProvider>,
    settings: DispatchSettings,
}

impl Dispatcher {
    /// Create a dispatcher.
    pub fn new(
        calendar: Arc<dyn CalendarApi>,
        tasks: Arc<dyn TasksApi>,
        identity: Arc<dyn IdentityProvider>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            calendar,
            tasks,
            identity,
            settings,
        }
    }

    /// Decode raw model text, infer a missing event end, then validate.
    ///
    /// # Errors
    ///
    /// Returns a [`ContractError`] when the text is not a valid reply, or
    /// when an event has neither start nor end.
    pub fn prepare(&self, raw: &str) -> Result<AiResponse, ContractError> {
        let mut value = contract::decode(raw)?;
        if value.get("code").and_then(contract::reply_code) == Some(2) {
            if let Some(var) = value.get_mut("var") {
                fill_missing_end(var, self.settings.default_time_zone)?;
            }
        }
        contract::validate(value)
    }

    /// Carry out `response`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when the draft is unusable or the write
    /// fails.
    #[instrument(skip_all, fields(code = response.code()))]
    pub async fn dispatch(&self, response: AiResponse) -> Result<DispatchOutcome, DispatchError> {
        match response {
            AiResponse::Informational { output } => Ok(DispatchOutcome::Answered { output }),
            AiResponse::EventRequest { output, event } => self.create_event(output, event).await,
            AiResponse::TaskRequest { output, task } => self.create_task(output, task).await,
        }
    }

    async fn create_event(
        &self,
        output: String,
        mut draft: CalendarEventDraft,
    ) -> Result<DispatchOutcome, DispatchError> {
        normalize_event(&mut draft, self.settings.default_time_zone)
            .inspect_err(|e| error!(error = %e, "event draft rejected"))?;
        let calendar_id = self.resolve_calendar().await;

        let calendar = &self.calendar;
        let target = calendar_id.as_str();
        let body = &draft;
        let event = self
            .with_reauthorization("insert_event", || calendar.insert_event(target, body))
            .await
            .inspect_err(|e| error!(error = %e, "event creation failed"))?;

        info!(calendar_id = %calendar_id, event_id = %event.id, "event created");
        Ok(DispatchOutcome::EventCreated {
            output,
            calendar_id,
            event,
        })
    }

    async fn create_task(
        &self,
        output: String,
        draft: TaskDraft,
    ) -> Result<DispatchOutcome, DispatchError> {
        if draft.title.trim().is_empty() {
            let err = DispatchError::Validation("the task has no title".to_owned());
            error!(error = %err, "task draft rejected");
            return Err(err);
        }

        let tasks = &self.tasks;
        let max_lists = self.settings.max_task_lists;
        let body = &draft;
        let inserted = self
            .with_reauthorization("insert_task", || async move {
                let lists = tasks.list_task_lists(max_lists).await?;
                let Some(list) = lists.into_iter().next() else {
                    return Ok::<_, GoogleApiError>(None);
                };
                let created = tasks.insert_task(&list.id, body).await?;
                Ok(Some((list.id, created)))
            })
            .await
            .inspect_err(|e| error!(error = %e, "task creation failed"))?;

        let (list_id, task) = inserted.ok_or(DispatchError::NoTaskList)?;
        info!(list_id = %list_id, task_id = %task.id, "task created");
        Ok(DispatchOutcome::TaskCreated {
            output,
            list_id,
            task,
        })
    }

    /// The calendar named by `events_calendar`, else `primary`.
    pub async fn resolve_calendar(&self) -> String {
        match self.calendar.list_calendars().await {
            Ok(calendars) => calendars
                .into_iter()
                .find(|c| c.summary.as_deref() == Some(self.settings.events_calendar.as_str()))
                .map_or_else(|| PRIMARY_CALENDAR.to_owned(), |c| c.id),
            Err(e) => {
                warn!(error = %e, "calendar lookup failed, using primary");
                PRIMARY_CALENDAR.to_owned()
            }
        }
    }

    /// Run `attempt`; on a permission failure reauthorize once and run it
    /// once more.
    async fn with_reauthorization<T, F, Fut>(
        &self,
        operation: &'static str,
        attempt: F,
    ) -> Result<T, DispatchError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, GoogleApiError>>,
    {
        match attempt().await {
            Ok(value) => Ok(value),
            Err(e) if e.is_permission_denied() => {
                warn!(operation, error = %e, "write lacked permission, reauthorizing");
                self.identity
                    .reauthorize()
                    .await
                    .map_err(DispatchError::Reauthorization)?;
                attempt().await.map_err(DispatchError::Write)
            }
            Err(e) => Err(DispatchError::Write(e)),
        }
    }
}

/// Give an event payload without `end` a one-hour end in the start's zone.
fn fill_missing_end(var: &mut Value, default_zone: Tz) -> Result<(), ContractError> {
    if text_at(var, "/end/dateTime").is_some() {
        return Ok(());
    }
    let Some(start) = text_at(var, "/start/dateTime") else {
        return Err(ContractError::InvalidEvent(
            "event has neither start nor end".to_owned(),
        ));
    };
    let label = text_at(var, "/start/timeZone")
        .map_or_else(|| default_zone.name().to_owned(), str::to_owned);
    let zone = parse_zone(&label).map_err(|e| ContractError::InvalidEvent(e.to_string()))?;
    let end = one_hour_after(start, zone).map_err(|e| ContractError::InvalidEvent(e.to_string()))?;

    if let Value::Object(fields) = var {
        fields.insert(
            "end".to_owned(),
            json!({ "dateTime": end, "timeZone": label }),
        );
    }
    Ok(())
}

/// Fill zone defaults and check the event's times.
fn normalize_event(draft: &mut CalendarEventDraft, default_zone: Tz) -> Result<(), DispatchError> {
    let invalid = |e: super::timing::TimingError| DispatchError::Validation(e.to_string());

    if draft.summary.trim().is_empty() {
        return Err(DispatchError::Validation("the event has no title".to_owned()));
    }

    let start_label = draft
        .start
        .time_zone
        .clone()
        .unwrap_or_else(|| default_zone.name().to_owned());
    let end_label = draft
        .end
        .time_zone
        .clone()
        .unwrap_or_else(|| start_label.clone());

    let start = parse_instant(&draft.start.date_time, parse_zone(&start_label).map_err(invalid)?)
        .map_err(invalid)?;
    let end = parse_instant(&draft.end.date_time, parse_zone(&end_label).map_err(invalid)?)
        .map_err(invalid)?;
    if end <= start {
        return Err(DispatchError::Validation(
            "the event must end after it starts".to_owned(),
        ));
    }

    draft.start.time_zone = Some(start_label);
    draft.end.time_zone = Some(end_label);
    Ok(())
}
