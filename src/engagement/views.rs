/// Post view tracking
///
/// Append-only view log; guests are recorded with a null user id and an
/// optional session key so repeat visits can be grouped client-side.
use crate::error::{AppError, AppResult};
use chrono::Utc;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

/// Aggregate view count for a post
#[derive(Debug, Clone, Serialize)]
pub struct ViewSummary {
    pub post_id: String,
    pub view_count: i64,
}

#[derive(Clone)]
pub struct ViewManager {
    db: SqlitePool,
}

impl ViewManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Record one view of a visible post. `viewer_id` is None for guests.
    pub async fn record(
        &self,
        post_id: &str,
        viewer_id: Option<&str>,
        session_key: Option<&str>,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> AppResult<i64> {
        let exists = sqlx::query("SELECT 1 AS hit FROM posts WHERE id = ? AND is_deleted = 0")
            .bind(post_id)
            .fetch_optional(&self.db)
            .await?
            .is_some();
        if !exists {
            return Err(AppError::NotFound(format!("Post {} not found", post_id)));
        }

        // User agents can be arbitrarily long; keep the log columns bounded
        let user_agent = user_agent.map(|ua| ua.chars().take(255).collect::<String>());

        let result = sqlx::query(
            r#"
            INSERT INTO post_views (post_id, user_id, session_key, ip_address, user_agent, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(post_id)
        .bind(viewer_id)
        .bind(session_key)
        .bind(ip_address)
        .bind(user_agent)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Total recorded views for a post
    pub async fn summary_for_post(&self, post_id: &str) -> AppResult<ViewSummary> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM post_views WHERE post_id = ?")
            .bind(post_id)
            .fetch_one(&self.db)
            .await?;

        Ok(ViewSummary {
            post_id: post_id.to_string(),
            view_count: row.get("n"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::seed::seed_authz;
    use crate::authz::{AuthzEngine, ROLE_MEMBER};
    use crate::db::create_test_pool;
    use crate::listings::{NewPost, PostManager};

    async fn setup() -> (AuthzEngine, PostManager, ViewManager) {
        let db = create_test_pool().await.unwrap();
        seed_authz(&db).await.unwrap();
        let authz = AuthzEngine::new(db.clone());
        let posts = PostManager::new(db.clone(), authz.clone());
        let views = ViewManager::new(db);
        (authz, posts, views)
    }

    fn sample_post() -> NewPost {
        NewPost {
            title: "Shop front".to_string(),
            description: "Main road".to_string(),
            address: serde_json::json!({"province": "Da Nang"}),
            location: serde_json::json!({"lat": 16.05, "lng": 108.2}),
            details: serde_json::json!({}),
            other_info: None,
            area: 45.0,
            price: 800.0,
            post_type_id: 2,
            category_id: 3,
        }
    }

    #[tokio::test]
    async fn test_records_users_and_guests() {
        let (authz, posts, views) = setup().await;
        authz.assign_role("alice", ROLE_MEMBER, None).await.unwrap();
        let post = posts.create("alice", sample_post()).await.unwrap();

        views
            .record(&post.id, Some("bob"), None, Some("10.0.0.1"), Some("test-agent"))
            .await
            .unwrap();
        views
            .record(&post.id, None, Some("sess-abc"), None, None)
            .await
            .unwrap();
        views
            .record(&post.id, None, Some("sess-abc"), None, None)
            .await
            .unwrap();

        let summary = views.summary_for_post(&post.id).await.unwrap();
        assert_eq!(summary.view_count, 3);
    }

    #[tokio::test]
    async fn test_missing_post_is_not_recorded() {
        let (_authz, _posts, views) = setup().await;
        let err = views
            .record("MISSING001", None, None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_unviewed_post_counts_zero() {
        let (authz, posts, views) = setup().await;
        authz.assign_role("alice", ROLE_MEMBER, None).await.unwrap();
        let post = posts.create("alice", sample_post()).await.unwrap();

        let summary = views.summary_for_post(&post.id).await.unwrap();
        assert_eq!(summary.view_count, 0);
    }
}
