//! Gmail API v1: unread message listing and metadata fetch.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::instrument;

use super::{GoogleApiError, GoogleClient, MailApi};

// ============================================================================
// API response types
// ============================================================================

/// `users.messages.list` response body.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageListResponse {
    /// Matching message stubs; absent when nothing matches.
    #[serde(default)]
    pub messages: Vec<MessageRef>,
}

/// A message id as returned by the list call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    /// Message id.
    pub id: String,
    /// Owning thread id.
    #[serde(default)]
    pub thread_id: String,
}

/// One message with headers and preview.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDetail {
    /// Message id.
    #[serde(default)]
    pub id: String,
    /// Preview text.
    #[serde(default)]
    pub snippet: String,
    /// Header container.
    #[serde(default)]
    pub payload: Option<MessagePayload>,
}

/// Message payload; only headers are used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MessagePayload {
    /// RFC 822 headers.
    #[serde(default)]
    pub headers: Vec<Header>,
}

/// A single message header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Header {
    /// Header name.
    #[serde(default)]
    pub name: String,
    /// Header value.
    #[serde(default)]
    pub value: String,
}

impl MessageDetail {
    /// Value of the first header named `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.payload
            .as_ref()?
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

// ============================================================================
// Gmail API
// ============================================================================

#[async_trait]
impl MailApi for GoogleClient {
    #[instrument(skip(self))]
    async fn list_unread(&self, max_results: u32) -> Result<Vec<MessageRef>, GoogleApiError> {
        let url = format!("{}/users/me/messages", self.endpoints.gmail);
        let body = self
            .get(
                &url,
                &[
                    ("q", "is:unread".to_owned()),
                    ("maxResults", max_results.to_string()),
                ],
            )
            .await?;
        let list: MessageListResponse = serde_json::from_str(&body)?;
        Ok(list.messages)
    }

    #[instrument(skip(self))]
    async fn get_message(&self, id: &str) -> Result<MessageDetail, GoogleApiError> {
        let url = format!("{}/users/me/messages/{id}", self.endpoints.gmail);
        let body = self
            .get(
                &url,
                &[
                    ("format", "metadata".to_owned()),
                    ("metadataHeaders", "Subject".to_owned()),
                    ("metadataHeaders", "From".to_owned()),
                ],
            )
            .await?;
        Ok(serde_json::from_str(&body)?)
    }
}
