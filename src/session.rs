//! Top-level session controller.
//!
//! [`Session`] is the single writer of [`SessionState`]: the sign-in flag,
//! the context snapshot and the conversation. Each user submission adds
//! one user turn and exactly one model turn.

use tracing::{info, instrument, warn};

use crate::assistant::dispatch::{failure_message, rejection_message, Action, GENERIC_FAILURE};
use crate::assistant::{AiResponse, AssistantGateway, Dispatcher};
use crate::context::{ContextFetcher, ContextSnapshot};
use crate::conversation::{Conversation, ConversationTurn};

/// Everything a session owns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Whether a user is signed in.
    pub signed_in: bool,
    /// Latest context snapshot.
    pub context: ContextSnapshot,
    /// Transcript.
    pub conversation: Conversation,
}

/// Result of feeding an auth-state notification to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthTransition {
    /// Signed out to signed in; context was fetched.
    SignedIn,
    /// Signed in to signed out; state was cleared.
    SignedOut,
    /// No change.
    Unchanged,
}

/// Rejected submissions. Nothing is appended to the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Blank message.
    #[error("message is empty")]
    EmptyMessage,
    /// No user is signed in.
    #[error("not signed in")]
    NotSignedIn,
}

/// Owns the session state and drives the chat pipeline.
pub struct Session {
    state: SessionState,
    fetcher: ContextFetcher,
    gateway: AssistantGateway,
    dispatcher: Dispatcher,
}

impl Session {
    /// Create a signed-out session.
    pub fn new(fetcher: ContextFetcher, gateway: AssistantGateway, dispatcher: Dispatcher) -> Self {
        Self {
            state: SessionState::default(),
            fetcher,
            gateway,
            dispatcher,
        }
    }

    /// Current state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Apply an auth-state notification.
    ///
    /// Becoming signed in fetches the context. Becoming signed out clears
    /// the context and the conversation.
    pub async fn on_auth_change(&mut self, signed_in: bool) -> AuthTransition {
        match (self.state.signed_in, signed_in) {
            (false, true) => {
                self.state.signed_in = true;
                self.refresh_context().await;
                info!("signed in");
                AuthTransition::SignedIn
            }
            (true, false) => {
                self.state = SessionState::default();
                info!("signed out");
                AuthTransition::SignedOut
            }
            _ => AuthTransition::Unchanged,
        }
    }

    /// Re-fetch all three context sources.
    pub async fn refresh_context(&mut self) {
        self.state.context = self.fetcher.fetch_context().await;
    }

    /// Re-fetch upcoming events, keeping the old list on failure.
    pub async fn refresh_events(&mut self) {
        match self.fetcher.fetch_events().await {
            Ok(events) => self.state.context.upcoming_events = events,
            Err(e) => warn!(error = %e, "events refresh failed, keeping previous list"),
        }
    }

    /// Run one chat turn and return the model turn it produced.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] for a blank message or when signed out.
    #[instrument(skip_all, fields(turns = self.state.conversation.len()))]
    pub async fn submit(&mut self, message: &str) -> Result<&ConversationTurn, SessionError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        if !self.state.signed_in {
            return Err(SessionError::NotSignedIn);
        }

        let history = self.state.conversation.turns().to_vec();
        self.state.conversation.push(ConversationTurn::user(message));

        let reply = self.reply(message, &history).await;
        Ok(self.state.conversation.push(ConversationTurn::model(reply)))
    }

    async fn reply(&mut self, message: &str, history: &[ConversationTurn]) -> String {
        let raw = match self.gateway.ask(message, history, &self.state.context).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "model request failed");
                return GENERIC_FAILURE.to_owned();
            }
        };

        let response = match self.dispatcher.prepare(&raw) {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "model reply rejected");
                return rejection_message(&e);
            }
        };

        let action = match &response {
            AiResponse::TaskRequest { .. } => Action::Task,
            _ => Action::Event,
        };
        match self.dispatcher.dispatch(response).await {
            Ok(outcome) => {
                if outcome.refreshes_events() {
                    self.refresh_events().await;
                }
                outcome.output().to_owned()
            }
            Err(e) => failure_message(action, &e),
        }
    }
}
