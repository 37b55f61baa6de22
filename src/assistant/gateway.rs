//! Request shaping for the assistant model.
//!
//! The gateway wraps the user's message in a fixed instruction prompt that
//! carries the context snapshot, the current time and the reply contract.
//! It returns the model's text untouched; validation belongs to
//! [`super::contract`].

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use tracing::{debug, instrument};

use super::timing::next_day;
use crate::context::ContextSnapshot;
use crate::conversation::ConversationTurn;
use crate::providers::{CompletionRequest, LlmProvider, ProviderError};

/// Gateway settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewaySettings {
    /// The single zone the model must use.
    pub time_zone: Tz,
    /// Output token ceiling.
    pub max_output_tokens: u32,
    /// Ask the endpoint for JSON output.
    pub json_output: bool,
}

/// Sends one augmented prompt per user turn.
#[derive(Clone)]
pub struct AssistantGateway {
    provider: Arc<dyn LlmProvider>,
    settings: GatewaySettings,
}

impl AssistantGateway {
    /// Create a gateway over `provider`.
    pub fn new(provider: Arc<dyn LlmProvider>, settings: GatewaySettings) -> Self {
        Self { provider, settings }
    }

    /// Ask the model about `message` given prior `history` and `context`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the model call fails.
    pub async fn ask(
        &self,
        message: &str,
        history: &[ConversationTurn],
        context: &ContextSnapshot,
    ) -> Result<String, ProviderError> {
        self.ask_at(message, history, context, Utc::now()).await
    }

    /// [`AssistantGateway::ask`] with an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the model call fails.
    #[instrument(skip_all, fields(model = self.provider.model_id(), history = history.len()))]
    pub async fn ask_at(
        &self,
        message: &str,
        history: &[ConversationTurn],
        context: &ContextSnapshot,
        now: DateTime<Utc>,
    ) -> Result<String, ProviderError> {
        let prompt = build_prompt(
            message,
            context,
            now.with_timezone(&self.settings.time_zone),
        );
        let request = CompletionRequest {
            history: history.to_vec(),
            prompt,
            max_output_tokens: self.settings.max_output_tokens,
            json_output: self.settings.json_output,
        };
        let response = self.provider.complete(request).await?;
        debug!(
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            finish_reason = ?response.finish_reason,
            "model replied"
        );
        Ok(response.text)
    }
}

/// Build the instruction prompt for one user message.
pub fn build_prompt(message: &str, context: &ContextSnapshot, now: DateTime<Tz>) -> String {
    let zone = now.timezone().name();
    let current = now.to_rfc3339_opts(SecondsFormat::Secs, false);
    let tomorrow = next_day(now).format("%Y-%m-%d");

    let emails = serde_json::to_string(&context.unread_emails).unwrap_or_else(|_| "[]".to_owned());
    let events =
        serde_json::to_string(&context.upcoming_events).unwrap_or_else(|_| "[]".to_owned());
    let tasks = serde_json::to_string(&context.upcoming_tasks).unwrap_or_else(|_| "[]".to_owned());

    format!(
        "You are a personal assistant with access to the user's unread emails, \
upcoming calendar events and tasks.

Context about your data:
{readable}
Unread emails (JSON): {emails}
Upcoming events (JSON): {events}
Tasks (JSON): {tasks}

Current date and time: {current} ({zone})
Tomorrow's date: {tomorrow}

Rules:
1. Always respond with a single JSON object of the form {{\"code\": number, \"output\": string, \"var\": object}} and nothing else.
2. Use code 1 to answer questions or when you need more information from the user; omit var.
3. Use code 2 only when every calendar event field is known. var must be {{\"summary\": string, \"start\": {{\"dateTime\": string, \"timeZone\": string}}, \"end\": {{\"dateTime\": string, \"timeZone\": string}}}}, optionally with location, description, recurrence, attendees and reminders.
4. Always include both start and end for events. If the user gives no end time, make the event last 1 hour.
5. Use code 3 only when every task field is known. var must be {{\"title\": string}}, optionally with notes and due (RFC 3339).
6. Always use the time zone {zone} for every date and time.
7. output is the message shown to the user.

User's question: {message}",
        readable = readable_context(context),
    )
}

/// Numbered, human-readable rendering of the snapshot.
pub fn readable_context(context: &ContextSnapshot) -> String {
    let mut out = String::new();

    if context.unread_emails.is_empty() {
        out.push_str("No unread emails.\n\n");
    } else {
        out.push_str("Unread Emails:\n");
        for (i, email) in context.unread_emails.iter().enumerate() {
            let _ = writeln!(
                out,
                "{}. Subject: {}\n   From: {}\n   Preview: {}\n",
                i.saturating_add(1),
                email.subject,
                email.from,
                email.snippet
            );
        }
    }

    if context.upcoming_events.is_empty() {
        out.push_str("No upcoming events.\n\n");
    } else {
        out.push_str("Upcoming Calendar Events:\n");
        for (i, event) in context.upcoming_events.iter().enumerate() {
            let _ = writeln!(
                out,
                "{}. {}\n   Start: {}\n   End: {}\n",
                i.saturating_add(1),
                event.summary.as_deref().unwrap_or("Untitled Event"),
                event.start.as_deref().unwrap_or("unknown"),
                event.end.as_deref().unwrap_or("unknown")
            );
        }
    }

    if context.upcoming_tasks.is_empty() {
        out.push_str("No pending tasks.\n");
    } else {
        out.push_str("Tasks:\n");
        for (i, task) in context.upcoming_tasks.iter().enumerate() {
            let _ = writeln!(
                out,
                "{}. {}\n   Due: {}\n",
                i.saturating_add(1),
                task.title.as_deref().unwrap_or("Untitled Task"),
                task.due.as_deref().unwrap_or("no due date")
            );
        }
    }

    out
}
