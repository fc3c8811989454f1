/// Star ratings on listings
///
/// One rating per (user, post), 1 to 5 stars with an optional comment.
/// Re-rating overwrites the previous score instead of adding a row.
use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// One user's rating of one post
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Rating {
    pub id: i64,
    pub user_id: String,
    pub post_id: String,
    pub score: i64,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate over all ratings of a post
#[derive(Debug, Clone, Serialize)]
pub struct RatingSummary {
    pub post_id: String,
    pub average: Option<f64>,
    pub count: i64,
}

#[derive(Clone)]
pub struct RatingManager {
    db: SqlitePool,
}

impl RatingManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Rate a post, replacing the actor's previous rating if one exists.
    /// `created_at` survives the upsert; `updated_at` tracks the latest edit.
    pub async fn rate(
        &self,
        actor_id: &str,
        post_id: &str,
        score: i64,
        comment: Option<&str>,
    ) -> AppResult<Rating> {
        if !(1..=5).contains(&score) {
            return Err(AppError::Validation(
                "score must be between 1 and 5".to_string(),
            ));
        }

        let exists = sqlx::query("SELECT 1 AS hit FROM posts WHERE id = ? AND is_deleted = 0")
            .bind(post_id)
            .fetch_optional(&self.db)
            .await?
            .is_some();
        if !exists {
            return Err(AppError::NotFound(format!("Post {} not found", post_id)));
        }

        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO post_ratings (user_id, post_id, score, comment, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, post_id) DO UPDATE SET
                score = excluded.score,
                comment = excluded.comment,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(actor_id)
        .bind(post_id)
        .bind(score)
        .bind(comment)
        .bind(now)
        .bind(now)
        .execute(&self.db)
        .await?;

        let rating = sqlx::query_as::<_, Rating>(
            "SELECT * FROM post_ratings WHERE user_id = ? AND post_id = ?",
        )
        .bind(actor_id)
        .bind(post_id)
        .fetch_one(&self.db)
        .await?;
        Ok(rating)
    }

    /// All ratings of a post, newest edit first
    pub async fn list_for_post(&self, post_id: &str) -> AppResult<Vec<Rating>> {
        let rows = sqlx::query_as::<_, Rating>(
            "SELECT * FROM post_ratings WHERE post_id = ? ORDER BY updated_at DESC, id DESC",
        )
        .bind(post_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    /// Average score and rating count; `average` is None for unrated posts
    pub async fn summary_for_post(&self, post_id: &str) -> AppResult<RatingSummary> {
        let row = sqlx::query(
            "SELECT AVG(score) AS average, COUNT(*) AS count FROM post_ratings WHERE post_id = ?",
        )
        .bind(post_id)
        .fetch_one(&self.db)
        .await?;

        Ok(RatingSummary {
            post_id: post_id.to_string(),
            average: row.get("average"),
            count: row.get("count"),
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

    async fn setup() -> (AuthzEngine, PostManager, RatingManager) {
        let db = create_test_pool().await.unwrap();
        seed_authz(&db).await.unwrap();
        let authz = AuthzEngine::new(db.clone());
        let posts = PostManager::new(db.clone(), authz.clone());
        let ratings = RatingManager::new(db);
        (authz, posts, ratings)
    }

    fn sample_post() -> NewPost {
        NewPost {
            title: "Garden house".to_string(),
            description: "Quiet street".to_string(),
            address: serde_json::json!({"province": "Hoi An"}),
            location: serde_json::json!({"lat": 15.88, "lng": 108.33}),
            details: serde_json::json!({}),
            other_info: None,
            area: 90.0,
            price: 300.0,
            post_type_id: 1,
            category_id: 1,
        }
    }

    #[tokio::test]
    async fn test_rate_upserts_per_user() {
        let (authz, posts, ratings) = setup().await;
        authz.assign_role("alice", ROLE_MEMBER, None).await.unwrap();
        let post = posts.create("alice", sample_post()).await.unwrap();

        let first = ratings
            .rate("bob", &post.id, 5, Some("great location"))
            .await
            .unwrap();
        assert_eq!(first.score, 5);

        // Re-rating replaces, never duplicates
        let second = ratings.rate("bob", &post.id, 2, None).await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.score, 2);
        assert!(second.comment.is_none());
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);

        assert_eq!(ratings.list_for_post(&post.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_score_bounds() {
        let (authz, posts, ratings) = setup().await;
        authz.assign_role("alice", ROLE_MEMBER, None).await.unwrap();
        let post = posts.create("alice", sample_post()).await.unwrap();

        let err = ratings.rate("bob", &post.id, 0, None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let err = ratings.rate("bob", &post.id, 6, None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_rate_requires_visible_post() {
        let (_authz, _posts, ratings) = setup().await;
        let err = ratings.rate("bob", "MISSING001", 3, None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_summary_averages_across_users() {
        let (authz, posts, ratings) = setup().await;
        authz.assign_role("alice", ROLE_MEMBER, None).await.unwrap();
        let post = posts.create("alice", sample_post()).await.unwrap();

        let empty = ratings.summary_for_post(&post.id).await.unwrap();
        assert_eq!(empty.count, 0);
        assert!(empty.average.is_none());

        ratings.rate("bob", &post.id, 4, None).await.unwrap();
        ratings.rate("carol", &post.id, 2, None).await.unwrap();

        let summary = ratings.summary_for_post(&post.id).await.unwrap();
        assert_eq!(summary.count, 2);
        assert_eq!(summary.average, Some(3.0));
    }
}
