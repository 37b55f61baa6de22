//! Terminal rendering for transcript turns and the context dashboard.

use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;

use crate::context::ContextSnapshot;
use crate::conversation::{ConversationTurn, Role};

const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

static BOLD_SPAN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*").ok());

/// Turn `**bold**` spans into ANSI bold and split into display lines.
///
/// Splits on real newlines and on the two-character sequence `\n`, which
/// models often emit inside JSON strings.
pub fn format_message_lines(text: &str) -> Vec<String> {
    let bolded = match BOLD_SPAN.as_ref() {
        Some(regex) => regex
            .replace_all(text, format!("{BOLD}$1{RESET}").as_str())
            .into_owned(),
        None => text.to_owned(),
    };
    bolded
        .replace("\\n", "\n")
        .split('\n')
        .map(str::to_owned)
        .collect()
}

/// A transcript turn with a role prefix, one output line per display line.
pub fn render_turn(turn: &ConversationTurn) -> String {
    let prefix = match turn.role {
        Role::User => "you",
        Role::Model => "deskmate",
    };
    let lines = format_message_lines(&turn.text);
    let indent = " ".repeat(prefix.len().saturating_add(2));

    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        if i == 0 {
            let _ = write!(out, "{prefix}> {line}");
        } else {
            let _ = write!(out, "\n{indent}{line}");
        }
    }
    out
}

/// Short dashboard: unread subjects and senders, then upcoming events.
pub fn render_dashboard(context: &ContextSnapshot) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{BOLD}Unread ({}){RESET}", context.unread_emails.len());
    for email in &context.unread_emails {
        let _ = writeln!(out, "  {}  ({})", email.subject, email.from);
    }

    let _ = writeln!(out, "{BOLD}Upcoming ({}){RESET}", context.upcoming_events.len());
    for event in &context.upcoming_events {
        let _ = writeln!(
            out,
            "  {}  {}",
            event.start.as_deref().unwrap_or("?"),
            event.summary.as_deref().unwrap_or("Untitled Event")
        );
    }

    let _ = write!(out, "{BOLD}Tasks ({}){RESET}", context.upcoming_tasks.len());
    out
}
