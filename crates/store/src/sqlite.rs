//! SQLite backend for conversations and tasks.
//!
//! Three tables:
//! - `conversations`: one row per conversation with its owner
//! - `turns`: append-ordered turns, each stored as a JSON document
//! - `tasks`: the users' to-do items
//!
//! Timestamps are stored as RFC 3339 text.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use taskmate_core::error::StoreError;
use taskmate_core::identity::UserIdentity;
use taskmate_core::store::ConversationStore;
use taskmate_core::task::{NewTask, Task, TaskFilter, TaskPatch, TaskRepository, TaskStatusFilter};
use taskmate_core::turn::{ConversationId, Turn};
use tracing::{debug, info};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations.
    ///
    /// `sqlite::memory:` gives an ephemeral database; the pool is then held
    /// to a single connection so every query sees the same data.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        if !path.contains(":memory:") {
            ensure_parent_dir(path).await?;
        }

        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let max_connections = if path.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id          TEXT PRIMARY KEY NOT NULL,
                owner       TEXT NOT NULL,
                created_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("conversations table: {e}")))?;

        // `seq` fixes the append order across batches
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS turns (
                seq              INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id  TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                kind             TEXT NOT NULL,
                body             TEXT NOT NULL,
                recorded_at      TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("turns table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_turns_conversation ON turns(conversation_id, seq)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("turns index: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                owner        TEXT NOT NULL,
                title        TEXT NOT NULL,
                description  TEXT,
                category     TEXT,
                completed    INTEGER NOT NULL DEFAULT 0,
                created_at   TEXT NOT NULL,
                updated_at   TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("tasks table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_owner ON tasks(owner)")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::MigrationFailed(format!("tasks index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    async fn fetch_task(&self, owner: &UserIdentity, id: i64) -> Result<Option<Task>, StoreError> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?1 AND owner = ?2")
            .bind(id)
            .bind(owner.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("fetch task: {e}")))?;
        row.as_ref().map(row_to_task).transpose()
    }
}

/// `create_if_missing` creates the file but not its directory.
async fn ensure_parent_dir(url: &str) -> Result<(), StoreError> {
    let file = url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let file = file.split('?').next().unwrap_or(file);
    match Path::new(file).parent() {
        Some(dir) if !dir.as_os_str().is_empty() => tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| StoreError::Storage(format!("create {}: {e}", dir.display()))),
        _ => Ok(()),
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("bad timestamp '{raw}': {e}")))
}

fn row_to_task(row: &SqliteRow) -> Result<Task, StoreError> {
    let get_err = |col: &str, e: sqlx::Error| StoreError::QueryFailed(format!("column {col}: {e}"));

    let owner: String = row.try_get("owner").map_err(|e| get_err("owner", e))?;
    let created_at: String = row.try_get("created_at").map_err(|e| get_err("created_at", e))?;
    let updated_at: String = row.try_get("updated_at").map_err(|e| get_err("updated_at", e))?;
    let completed: i64 = row.try_get("completed").map_err(|e| get_err("completed", e))?;

    Ok(Task {
        id: row.try_get("id").map_err(|e| get_err("id", e))?,
        owner: UserIdentity::new(owner),
        title: row.try_get("title").map_err(|e| get_err("title", e))?,
        description: row
            .try_get("description")
            .map_err(|e| get_err("description", e))?,
        category: row.try_get("category").map_err(|e| get_err("category", e))?,
        completed: completed != 0,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn turn_kind(turn: &Turn) -> &'static str {
    match turn {
        Turn::User { .. } => "user",
        Turn::Assistant { .. } => "assistant",
        Turn::ToolRequest { .. } => "tool_request",
        Turn::ToolResult(_) => "tool_result",
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create_conversation(&self, owner: &UserIdentity) -> Result<ConversationId, StoreError> {
        let id = ConversationId::new();
        sqlx::query("INSERT INTO conversations (id, owner, created_at) VALUES (?1, ?2, ?3)")
            .bind(id.as_str())
            .bind(owner.as_str())
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("create conversation: {e}")))?;
        debug!(conversation_id = %id, owner = %owner, "Conversation created");
        Ok(id)
    }

    async fn owner_of(&self, id: &ConversationId) -> Result<Option<UserIdentity>, StoreError> {
        let owner: Option<String> =
            sqlx::query_scalar("SELECT owner FROM conversations WHERE id = ?1")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::QueryFailed(format!("conversation owner: {e}")))?;
        Ok(owner.map(UserIdentity::new))
    }

    async fn append_turns(&self, id: &ConversationId, turns: &[Turn]) -> Result<(), StoreError> {
        if turns.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("begin transaction: {e}")))?;
        let recorded_at = Utc::now().to_rfc3339();

        for turn in turns {
            let body = serde_json::to_string(turn)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            sqlx::query(
                "INSERT INTO turns (conversation_id, kind, body, recorded_at) VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(id.as_str())
            .bind(turn_kind(turn))
            .bind(body)
            .bind(&recorded_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("append turn: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("commit turns: {e}")))?;
        debug!(conversation_id = %id, count = turns.len(), "Turns appended");
        Ok(())
    }

    async fn load_recent_turns(
        &self,
        id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Turn>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT body FROM (
                SELECT seq, body FROM turns
                WHERE conversation_id = ?1
                ORDER BY seq DESC
                LIMIT ?2
            ) ORDER BY seq ASC
            "#,
        )
        .bind(id.as_str())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("load turns: {e}")))?;

        rows.iter()
            .map(|row| {
                let body: String = row
                    .try_get("body")
                    .map_err(|e| StoreError::QueryFailed(format!("column body: {e}")))?;
                serde_json::from_str(&body).map_err(|e| StoreError::Serialization(e.to_string()))
            })
            .collect()
    }
}

#[async_trait]
impl TaskRepository for SqliteStore {
    async fn create(&self, owner: &UserIdentity, task: NewTask) -> Result<Task, StoreError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO tasks (owner, title, description, category, completed, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)
            "#,
        )
        .bind(owner.as_str())
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.category)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("insert task: {e}")))?;

        Ok(Task {
            id: result.last_insert_rowid(),
            owner: owner.clone(),
            title: task.title,
            description: task.description,
            category: task.category,
            completed: false,
            created_at: now,
            updated_at: now,
        })
    }

    async fn list(&self, owner: &UserIdentity, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let completed = filter.status.map(|s| match s {
            TaskStatusFilter::Complete => 1_i64,
            TaskStatusFilter::Incomplete => 0_i64,
        });

        let rows = sqlx::query(
            r#"
            SELECT * FROM tasks
            WHERE owner = ?1
              AND (?2 IS NULL OR category = ?2)
              AND (?3 IS NULL OR completed = ?3)
            ORDER BY id ASC
            "#,
        )
        .bind(owner.as_str())
        .bind(&filter.category)
        .bind(completed)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("list tasks: {e}")))?;

        rows.iter().map(row_to_task).collect()
    }

    async fn complete(&self, owner: &UserIdentity, ids: &[i64]) -> Result<Vec<i64>, StoreError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("begin transaction: {e}")))?;

        let mut matched = Vec::new();
        for &id in ids {
            let result = sqlx::query(
                "UPDATE tasks SET completed = 1, updated_at = ?1 WHERE id = ?2 AND owner = ?3",
            )
            .bind(&now)
            .bind(id)
            .bind(owner.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("complete task: {e}")))?;
            if result.rows_affected() > 0 {
                matched.push(id);
            }
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("commit: {e}")))?;
        matched.sort_unstable();
        matched.dedup();
        Ok(matched)
    }

    async fn delete(&self, owner: &UserIdentity, ids: &[i64]) -> Result<Vec<i64>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("begin transaction: {e}")))?;

        let mut removed = Vec::new();
        for &id in ids {
            let result = sqlx::query("DELETE FROM tasks WHERE id = ?1 AND owner = ?2")
                .bind(id)
                .bind(owner.as_str())
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::QueryFailed(format!("delete task: {e}")))?;
            if result.rows_affected() > 0 {
                removed.push(id);
            }
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("commit: {e}")))?;
        removed.sort_unstable();
        Ok(removed)
    }

    async fn update(
        &self,
        owner: &UserIdentity,
        id: i64,
        patch: &TaskPatch,
    ) -> Result<Option<Task>, StoreError> {
        let Some(mut task) = self.fetch_task(owner, id).await? else {
            return Ok(None);
        };
        if patch.is_empty() {
            return Ok(Some(task));
        }
        patch.apply(&mut task);

        sqlx::query(
            r#"
            UPDATE tasks
            SET title = ?1, description = ?2, category = ?3, completed = ?4, updated_at = ?5
            WHERE id = ?6 AND owner = ?7
            "#,
        )
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.category)
        .bind(i64::from(task.completed))
        .bind(task.updated_at.to_rfc3339())
        .bind(id)
        .bind(owner.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("update task: {e}")))?;

        Ok(Some(task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taskmate_core::tool::{ToolCall, ToolResult};

    async fn test_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    fn alice() -> UserIdentity {
        UserIdentity::from("alice")
    }

    #[tokio::test]
    async fn turns_survive_a_json_round_trip_in_order() {
        let store = test_store().await;
        let id = store.create_conversation(&alice()).await.unwrap();
        let call = ToolCall::new("call_1", "add_task", json!({"title": "Milk"}));
        let turns = vec![
            Turn::user("add milk"),
            Turn::ToolRequest {
                calls: vec![call.clone()],
            },
            Turn::ToolResult(ToolResult::success(&call, json!({"id": 1}))),
            Turn::assistant("Added."),
        ];
        store.append_turns(&id, &turns).await.unwrap();

        assert_eq!(store.load_recent_turns(&id, 10).await.unwrap(), turns);
        assert_eq!(store.load_recent_turns(&id, 2).await.unwrap(), turns[2..].to_vec());
    }

    #[tokio::test]
    async fn owner_lookup() {
        let store = test_store().await;
        let id = store.create_conversation(&alice()).await.unwrap();
        assert_eq!(store.owner_of(&id).await.unwrap(), Some(alice()));
        assert_eq!(
            store.owner_of(&ConversationId::from("missing")).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn appending_to_unknown_conversation_fails() {
        let store = test_store().await;
        let result = store
            .append_turns(&ConversationId::from("missing"), &[Turn::user("hi")])
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn task_lifecycle() {
        let store = test_store().await;
        let bob = UserIdentity::from("bob");

        let milk = store
            .create(
                &alice(),
                NewTask {
                    title: "Milk".into(),
                    description: Some("2 liters".into()),
                    category: Some("groceries".into()),
                },
            )
            .await
            .unwrap();
        let report = store
            .create(
                &alice(),
                NewTask {
                    title: "Report".into(),
                    ..NewTask::default()
                },
            )
            .await
            .unwrap();
        store
            .create(
                &bob,
                NewTask {
                    title: "Bob's".into(),
                    ..NewTask::default()
                },
            )
            .await
            .unwrap();

        let groceries = TaskFilter {
            category: Some("groceries".into()),
            status: None,
        };
        let listed = store.list(&alice(), &groceries).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].description.as_deref(), Some("2 liters"));

        assert_eq!(
            store.complete(&alice(), &[report.id, 999]).await.unwrap(),
            vec![report.id]
        );
        let pending = TaskFilter {
            category: None,
            status: Some(TaskStatusFilter::Incomplete),
        };
        let still_open = store.list(&alice(), &pending).await.unwrap();
        assert_eq!(still_open.len(), 1);
        assert_eq!(still_open[0].id, milk.id);

        let patch = TaskPatch {
            title: Some("Oat milk".into()),
            ..TaskPatch::default()
        };
        let updated = store.update(&alice(), milk.id, &patch).await.unwrap().unwrap();
        assert_eq!(updated.title, "Oat milk");
        assert!(store.update(&bob, milk.id, &patch).await.unwrap().is_none());

        assert!(store.delete(&bob, &[milk.id]).await.unwrap().is_empty());
        assert_eq!(store.delete(&alice(), &[milk.id]).await.unwrap(), vec![milk.id]);
        assert_eq!(store.list(&alice(), &TaskFilter::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn data_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("nested/taskmate.db").display());

        let id = {
            let store = SqliteStore::new(&url).await.unwrap();
            let id = store.create_conversation(&alice()).await.unwrap();
            store.append_turns(&id, &[Turn::user("hello")]).await.unwrap();
            id
        };

        let reopened = SqliteStore::new(&url).await.unwrap();
        assert_eq!(
            reopened.load_recent_turns(&id, 5).await.unwrap(),
            vec![Turn::user("hello")]
        );
    }
}
