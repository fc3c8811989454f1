/// Append-only post change history
///
/// Rows are written exclusively by the post lifecycle and never mutated or
/// deleted. Each row carries only the fields that changed, as before/after
/// JSON objects — enough to reconstruct, small enough to keep.
use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;

/// What kind of change a history row records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ChangeType {
    Update,
    StatusChange,
    Delete,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Update => "update",
            ChangeType::StatusChange => "status_change",
            ChangeType::Delete => "delete",
        }
    }

    pub fn from_str(s: &str) -> AppResult<Self> {
        match s {
            "update" => Ok(ChangeType::Update),
            "status_change" => Ok(ChangeType::StatusChange),
            "delete" => Ok(ChangeType::Delete),
            _ => Err(AppError::Validation(format!("Invalid change type: {}", s))),
        }
    }
}

/// One audit record for a post mutation
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct PostHistory {
    pub id: i64,
    pub post_id: String,
    pub actor_id: String,
    pub old_content: String,
    pub new_content: Option<String>,
    pub change_type: ChangeType,
    pub timestamp: DateTime<Utc>,
}

/// Append one history row inside the caller's transaction
pub(crate) async fn append_on(
    conn: &mut SqliteConnection,
    post_id: &str,
    actor_id: &str,
    old_content: &serde_json::Value,
    new_content: &serde_json::Value,
    change_type: ChangeType,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO post_history (post_id, actor_id, old_content, new_content, change_type, timestamp)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(post_id)
    .bind(actor_id)
    .bind(old_content.to_string())
    .bind(new_content.to_string())
    .bind(change_type)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// All history rows for a post, newest first
pub(crate) async fn list_on(
    conn: &mut SqliteConnection,
    post_id: &str,
) -> AppResult<Vec<PostHistory>> {
    let rows = sqlx::query_as::<_, PostHistory>(
        r#"
        SELECT id, post_id, actor_id, old_content, new_content, change_type, timestamp
        FROM post_history
        WHERE post_id = ?
        ORDER BY timestamp DESC, id DESC
        "#,
    )
    .bind(post_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}
