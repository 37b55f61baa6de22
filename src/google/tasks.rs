//! Google Tasks API v1: task lists, tasks, task insert.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{endpoint_url, GoogleApiError, GoogleClient, TasksApi};
use crate::assistant::contract::TaskDraft;

/// Page size for `tasks.list`; pagination removes any overall cap.
const TASKS_PAGE_SIZE: u32 = 100;

/// A task list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskList {
    /// List id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub title: Option<String>,
}

/// A task within a list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Task id.
    #[serde(default)]
    pub id: String,
    /// Title.
    #[serde(default)]
    pub title: Option<String>,
    /// Free-form notes.
    #[serde(default)]
    pub notes: Option<String>,
    /// RFC 3339 due date.
    #[serde(default)]
    pub due: Option<String>,
    /// `needsAction` or `completed`.
    #[serde(default)]
    pub status: Option<String>,
}

/// Identity of an inserted task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedTask {
    /// New task id.
    #[serde(default)]
    pub id: String,
}

/// One page of `tasklists.list` or `tasks.list`.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Items on this page.
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    /// Token for the next page, if any.
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Body sent to `tasks.insert`; only these fields are submitted.
#[doc(hidden)]
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct TaskInsertBody<'a> {
    /// Title.
    pub title: &'a str,
    /// Notes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<&'a str>,
    /// Due date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due: Option<&'a str>,
}

impl<'a> From<&'a TaskDraft> for TaskInsertBody<'a> {
    fn from(draft: &'a TaskDraft) -> Self {
        Self {
            title: &draft.title,
            notes: draft.notes.as_deref(),
            due: draft.due.as_deref(),
        }
    }
}

#[async_trait]
impl TasksApi for GoogleClient {
    #[instrument(skip(self))]
    async fn list_task_lists(&self, max_results: u32) -> Result<Vec<TaskList>, GoogleApiError> {
        let url = format!("{}/users/@me/lists", self.endpoints.tasks);
        let body = self
            .get(&url, &[("maxResults", max_results.to_string())])
            .await?;
        let page: Page<TaskList> = serde_json::from_str(&body)?;
        Ok(page.items)
    }

    #[instrument(skip(self))]
    async fn list_tasks(&self, list_id: &str) -> Result<Vec<Task>, GoogleApiError> {
        let url = endpoint_url(&self.endpoints.tasks, &["lists", list_id, "tasks"])?;
        let mut tasks = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("showCompleted", "true".to_owned()),
                ("maxResults", TASKS_PAGE_SIZE.to_string()),
            ];
            if let Some(token) = page_token.take() {
                query.push(("pageToken", token));
            }
            let body = self.get(url.as_str(), &query).await?;
            let page: Page<Task> = serde_json::from_str(&body)?;
            tasks.extend(page.items);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(tasks)
    }

    #[instrument(skip(self, task), fields(title = %task.title))]
    async fn insert_task(
        &self,
        list_id: &str,
        task: &TaskDraft,
    ) -> Result<CreatedTask, GoogleApiError> {
        let url = endpoint_url(&self.endpoints.tasks, &["lists", list_id, "tasks"])?;
        let body = self.post_json(url.as_str(), &TaskInsertBody::from(task)).await?;
        let created: CreatedTask = serde_json::from_str(&body)?;
        debug!(task_id = %created.id, "task created");
        Ok(created)
    }
}
