//! list_tasks: show the caller's tasks, optionally filtered.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use taskmate_core::error::ToolError;
use taskmate_core::identity::UserIdentity;
use taskmate_core::task::{Task, TaskFilter, TaskRepository, TaskStatusFilter};
use taskmate_core::tool::Tool;

use crate::{non_blank, parse_args};

#[derive(Debug, Default, Deserialize)]
struct ListTasksArgs {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl ListTasksArgs {
    fn into_filter(self) -> Result<TaskFilter, ToolError> {
        let status = non_blank(self.status)
            // "all" is how models tend to say "no filter"
            .filter(|s| !s.eq_ignore_ascii_case("all"))
            .map(|s| s.parse::<TaskStatusFilter>())
            .transpose()
            .map_err(ToolError::InvalidArguments)?;
        Ok(TaskFilter {
            category: non_blank(self.category),
            status,
        })
    }
}

pub struct ListTasksTool {
    repo: Arc<dyn TaskRepository>,
}

impl ListTasksTool {
    pub fn new(repo: Arc<dyn TaskRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl Tool for ListTasksTool {
    fn name(&self) -> &str {
        "list_tasks"
    }

    fn description(&self) -> &str {
        "List the user's tasks. Optionally filter by category or by status \
         ('pending' or 'complete')."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "category": {
                    "type": "string",
                    "description": "Only tasks in this category"
                },
                "status": {
                    "type": "string",
                    "enum": ["pending", "complete", "all"],
                    "description": "Only tasks with this status"
                }
            }
        })
    }

    async fn execute(
        &self,
        identity: &UserIdentity,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        // Some models send null instead of {} for "no arguments"
        let args: ListTasksArgs = if arguments.is_null() {
            ListTasksArgs::default()
        } else {
            parse_args(arguments)?
        };
        let filter = args.into_filter()?;

        let tasks = self.repo.list(identity, &filter).await?;
        Ok(serde_json::json!({
            "tasks": tasks.iter().map(Task::to_json).collect::<Vec<_>>(),
            "count": tasks.len(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taskmate_core::task::NewTask;
    use taskmate_store::InMemoryStore;

    async fn seeded() -> (Arc<InMemoryStore>, UserIdentity) {
        let store = Arc::new(InMemoryStore::new());
        let user = UserIdentity::from("alice");
        for (title, category) in [("Milk", "groceries"), ("Report", "work"), ("Eggs", "groceries")] {
            store
                .create(
                    &user,
                    NewTask {
                        title: title.into(),
                        description: None,
                        category: Some(category.into()),
                    },
                )
                .await
                .unwrap();
        }
        store.complete(&user, &[3]).await.unwrap();
        (store, user)
    }

    #[tokio::test]
    async fn lists_everything_without_filters() {
        let (store, user) = seeded().await;
        let out = ListTasksTool::new(store).execute(&user, json!({})).await.unwrap();
        assert_eq!(out["count"], 3);
        assert_eq!(out["tasks"][0]["title"], "Milk");
    }

    #[tokio::test]
    async fn filters_by_category_and_status() {
        let (store, user) = seeded().await;
        let tool = ListTasksTool::new(store);

        let out = tool
            .execute(&user, json!({"category": "groceries", "status": "pending"}))
            .await
            .unwrap();
        assert_eq!(out["count"], 1);
        assert_eq!(out["tasks"][0]["title"], "Milk");

        let all = tool.execute(&user, json!({"status": "all"})).await.unwrap();
        assert_eq!(all["count"], 3);
    }

    #[tokio::test]
    async fn other_users_see_nothing() {
        let (store, _) = seeded().await;
        let out = ListTasksTool::new(store)
            .execute(&UserIdentity::from("mallory"), json!({}))
            .await
            .unwrap();
        assert_eq!(out["count"], 0);
    }

    #[tokio::test]
    async fn unknown_status_is_invalid() {
        let (store, user) = seeded().await;
        let err = ListTasksTool::new(store)
            .execute(&user, json!({"status": "someday"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
