/// Engagement: favorites, comments, ratings, and view tracking on listings
///
/// Every manager only ever touches visible (non-deleted) posts. Favorites
/// are idempotent toggles and comments are moderatable via a hide flag;
/// ratings (one per user and post) and the append-only view log live in
/// their own submodules.
pub mod ratings;
pub mod views;

pub use ratings::{Rating, RatingManager, RatingSummary};
pub use views::{ViewManager, ViewSummary};

use crate::authz::AuthzEngine;
use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

/// A saved listing
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Favorite {
    pub id: i64,
    pub user_id: String,
    pub post_id: String,
    pub created_at: DateTime<Utc>,
}

/// A comment on a listing
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: String,
    pub author_id: String,
    pub body: String,
    pub is_hidden: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct FavoriteManager {
    db: SqlitePool,
    authz: AuthzEngine,
}

impl FavoriteManager {
    pub fn new(db: SqlitePool, authz: AuthzEngine) -> Self {
        Self { db, authz }
    }

    /// Save a post for later. Returns false when it was already saved.
    pub async fn add(&self, actor_id: &str, post_id: &str) -> AppResult<bool> {
        if !self
            .authz
            .has_permission(Some(actor_id), "favorite.use")
            .await?
        {
            return Err(AppError::Forbidden {
                permission: "favorite.use".to_string(),
            });
        }
        self.require_visible_post(post_id).await?;

        let result = sqlx::query(
            r#"
            INSERT INTO favorites (user_id, post_id, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT (user_id, post_id) DO NOTHING
            "#,
        )
        .bind(actor_id)
        .bind(post_id)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove a saved post. Returns false when it was not saved.
    pub async fn remove(&self, actor_id: &str, post_id: &str) -> AppResult<bool> {
        if !self
            .authz
            .has_permission(Some(actor_id), "favorite.use")
            .await?
        {
            return Err(AppError::Forbidden {
                permission: "favorite.use".to_string(),
            });
        }

        let result = sqlx::query("DELETE FROM favorites WHERE user_id = ? AND post_id = ?")
            .bind(actor_id)
            .bind(post_id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Saved posts for a user, newest first
    pub async fn list(&self, actor_id: &str) -> AppResult<Vec<Favorite>> {
        let rows = sqlx::query_as::<_, Favorite>(
            "SELECT * FROM favorites WHERE user_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(actor_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn require_visible_post(&self, post_id: &str) -> AppResult<()> {
        let exists = sqlx::query("SELECT 1 AS hit FROM posts WHERE id = ? AND is_deleted = 0")
            .bind(post_id)
            .fetch_optional(&self.db)
            .await?
            .is_some();
        if !exists {
            return Err(AppError::NotFound(format!("Post {} not found", post_id)));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct CommentManager {
    db: SqlitePool,
    authz: AuthzEngine,
}

impl CommentManager {
    pub fn new(db: SqlitePool, authz: AuthzEngine) -> Self {
        Self { db, authz }
    }

    /// Post a comment; requires `comment.create` and a visible post
    pub async fn create(&self, actor_id: &str, post_id: &str, body: &str) -> AppResult<Comment> {
        if !self
            .authz
            .has_permission(Some(actor_id), "comment.create")
            .await?
        {
            return Err(AppError::Forbidden {
                permission: "comment.create".to_string(),
            });
        }

        let body = body.trim();
        if body.is_empty() {
            return Err(AppError::Validation("comment body is empty".to_string()));
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
        let result = sqlx::query(
            r#"
            INSERT INTO comments (post_id, author_id, body, is_hidden, created_at)
            VALUES (?, ?, ?, 0, ?)
            "#,
        )
        .bind(post_id)
        .bind(actor_id)
        .bind(body)
        .bind(now)
        .execute(&self.db)
        .await?;

        Ok(Comment {
            id: result.last_insert_rowid(),
            post_id: post_id.to_string(),
            author_id: actor_id.to_string(),
            body: body.to_string(),
            is_hidden: false,
            created_at: now,
        })
    }

    /// Visible comments on a post, oldest first. Moderators see hidden ones.
    pub async fn list(&self, actor_id: Option<&str>, post_id: &str) -> AppResult<Vec<Comment>> {
        let moderator = self
            .authz
            .has_permission(actor_id, "comment.manage")
            .await?;

        let sql = if moderator {
            "SELECT * FROM comments WHERE post_id = ? ORDER BY created_at ASC, id ASC"
        } else {
            "SELECT * FROM comments WHERE post_id = ? AND is_hidden = 0 ORDER BY created_at ASC, id ASC"
        };

        let rows = sqlx::query_as::<_, Comment>(sql)
            .bind(post_id)
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    /// Hide or unhide a comment; requires `comment.manage`
    pub async fn set_hidden(
        &self,
        actor_id: &str,
        comment_id: i64,
        hidden: bool,
    ) -> AppResult<Comment> {
        if !self
            .authz
            .has_permission(Some(actor_id), "comment.manage")
            .await?
        {
            return Err(AppError::Forbidden {
                permission: "comment.manage".to_string(),
            });
        }

        let result = sqlx::query("UPDATE comments SET is_hidden = ? WHERE id = ?")
            .bind(hidden)
            .bind(comment_id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Comment {} not found",
                comment_id
            )));
        }

        let comment = sqlx::query_as::<_, Comment>("SELECT * FROM comments WHERE id = ?")
            .bind(comment_id)
            .fetch_one(&self.db)
            .await?;
        Ok(comment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::seed::seed_authz;
    use crate::authz::{ROLE_MEMBER, ROLE_STAFF};
    use crate::db::create_test_pool;
    use crate::listings::{NewPost, PostManager};

    async fn setup() -> (AuthzEngine, PostManager, FavoriteManager, CommentManager) {
        let db = create_test_pool().await.unwrap();
        seed_authz(&db).await.unwrap();
        let authz = AuthzEngine::new(db.clone());
        let posts = PostManager::new(db.clone(), authz.clone());
        let favorites = FavoriteManager::new(db.clone(), authz.clone());
        let comments = CommentManager::new(db.clone(), authz.clone());
        (authz, posts, favorites, comments)
    }

    fn sample_post() -> NewPost {
        NewPost {
            title: "Land plot".to_string(),
            description: "Corner lot".to_string(),
            address: serde_json::json!({"province": "Hue"}),
            location: serde_json::json!({"lat": 16.46, "lng": 107.59}),
            details: serde_json::json!({}),
            other_info: None,
            area: 120.0,
            price: 500.0,
            post_type_id: 1,
            category_id: 2,
        }
    }

    #[tokio::test]
    async fn test_favorite_toggle_is_idempotent() {
        let (authz, posts, favorites, _comments) = setup().await;
        authz.assign_role("alice", ROLE_MEMBER, None).await.unwrap();
        authz.assign_role("bob", ROLE_MEMBER, None).await.unwrap();
        let post = posts.create("alice", sample_post()).await.unwrap();

        assert!(favorites.add("bob", &post.id).await.unwrap());
        assert!(!favorites.add("bob", &post.id).await.unwrap());
        assert_eq!(favorites.list("bob").await.unwrap().len(), 1);

        assert!(favorites.remove("bob", &post.id).await.unwrap());
        assert!(!favorites.remove("bob", &post.id).await.unwrap());
        assert!(favorites.list("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_favorite_requires_permission_and_post() {
        let (authz, posts, favorites, _comments) = setup().await;
        authz.assign_role("alice", ROLE_MEMBER, None).await.unwrap();
        let post = posts.create("alice", sample_post()).await.unwrap();

        let err = favorites.add("stranger", &post.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));

        let err = favorites.add("alice", "MISSING001").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_comment_create_and_hidden_filtering() {
        let (authz, posts, _favorites, comments) = setup().await;
        authz.assign_role("alice", ROLE_MEMBER, None).await.unwrap();
        authz.assign_role("staff1", ROLE_STAFF, None).await.unwrap();
        let post = posts.create("alice", sample_post()).await.unwrap();

        let c = comments
            .create("alice", &post.id, "Is the price negotiable?")
            .await
            .unwrap();
        assert!(!c.is_hidden);

        // Members cannot moderate
        let err = comments.set_hidden("alice", c.id, true).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));

        let hidden = comments.set_hidden("staff1", c.id, true).await.unwrap();
        assert!(hidden.is_hidden);

        // Hidden comments disappear for regular viewers, not for moderators
        assert!(comments
            .list(Some("alice"), &post.id)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            comments.list(Some("staff1"), &post.id).await.unwrap().len(),
            1
        );
        assert!(comments.list(None, &post.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_comment_rejected() {
        let (authz, posts, _favorites, comments) = setup().await;
        authz.assign_role("alice", ROLE_MEMBER, None).await.unwrap();
        let post = posts.create("alice", sample_post()).await.unwrap();

        let err = comments.create("alice", &post.id, "   ").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
