/// Post manager: create, update, status changes, soft delete, bump
use crate::authz::AuthzEngine;
use crate::error::{AppError, AppResult};
use crate::listings::history::{self, ChangeType, PostHistory};
use crate::membership::{self, local_today};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};

/// Moderation verdict axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "Pending",
            ApprovalStatus::Approved => "Approved",
            ApprovalStatus::Rejected => "Rejected",
        }
    }

    pub fn from_str(s: &str) -> AppResult<Self> {
        match s {
            "Pending" => Ok(ApprovalStatus::Pending),
            "Approved" => Ok(ApprovalStatus::Approved),
            "Rejected" => Ok(ApprovalStatus::Rejected),
            _ => Err(AppError::Validation(format!(
                "Invalid approval status: {}",
                s
            ))),
        }
    }
}

/// Publication axis, independent of the moderation verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum PostStatus {
    Hidden,
    Published,
    Archived,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Hidden => "Hidden",
            PostStatus::Published => "Published",
            PostStatus::Archived => "Archived",
        }
    }

    pub fn from_str(s: &str) -> AppResult<Self> {
        match s {
            "Hidden" => Ok(PostStatus::Hidden),
            "Published" => Ok(PostStatus::Published),
            "Archived" => Ok(PostStatus::Archived),
            _ => Err(AppError::Validation(format!("Invalid post status: {}", s))),
        }
    }
}

/// Listing record. `owner_id` is an opaque identifier into the accounts
/// boundary, never an owning reference.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub description: String,
    pub address: serde_json::Value,
    pub location: serde_json::Value,
    pub details: serde_json::Value,
    pub other_info: Option<serde_json::Value>,
    pub area: f64,
    pub price: f64,
    pub post_type_id: i64,
    pub category_id: i64,
    pub owner_id: String,
    pub approval_status: ApprovalStatus,
    pub post_status: PostStatus,
    pub bumped_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for creating a post
#[derive(Debug, Clone, Deserialize)]
pub struct NewPost {
    pub title: String,
    pub description: String,
    pub address: serde_json::Value,
    pub location: serde_json::Value,
    pub details: serde_json::Value,
    pub other_info: Option<serde_json::Value>,
    pub area: f64,
    pub price: f64,
    pub post_type_id: i64,
    pub category_id: i64,
}

/// Partial update; `None` leaves the field untouched. `other_info` is the
/// one nullable column, so it is double-wrapped: absent means keep, an
/// explicit JSON null means clear.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub address: Option<serde_json::Value>,
    pub location: Option<serde_json::Value>,
    pub details: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "double_option")]
    pub other_info: Option<Option<serde_json::Value>>,
    pub area: Option<f64>,
    pub price: Option<f64>,
    pub post_type_id: Option<i64>,
    pub category_id: Option<i64>,
}

/// Distinguishes a missing key (keep) from an explicit null (clear)
fn double_option<'de, D>(
    deserializer: D,
) -> Result<Option<Option<serde_json::Value>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    serde::Deserialize::deserialize(deserializer).map(Some)
}

/// Result of a successful bump
#[derive(Debug, Clone, Serialize)]
pub struct BumpOutcome {
    pub post_id: String,
    pub bumped_at: DateTime<Utc>,
    pub bumps_used_today: i64,
    pub daily_limit: i64,
}

const ID_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const ID_LENGTH: usize = 9;

/// Post manager over the shared pool
#[derive(Clone)]
pub struct PostManager {
    db: SqlitePool,
    authz: AuthzEngine,
}

impl PostManager {
    pub fn new(db: SqlitePool, authz: AuthzEngine) -> Self {
        Self { db, authz }
    }

    /// Create a listing. Starts Pending/Hidden; creation writes no history.
    pub async fn create(&self, actor_id: &str, new: NewPost) -> AppResult<Post> {
        if !self.authz.has_permission(Some(actor_id), "post.create").await? {
            return Err(AppError::Forbidden {
                permission: "post.create".to_string(),
            });
        }

        if new.area <= 0.0 {
            return Err(AppError::Validation("area must be positive".to_string()));
        }
        if new.price < 0.0 {
            return Err(AppError::Validation("price must not be negative".to_string()));
        }

        let id = self.generate_unique_id().await?;
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO posts
                (id, title, description, address, location, details, other_info,
                 area, price, post_type_id, category_id, owner_id,
                 approval_status, post_status, is_deleted, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'Pending', 'Hidden', 0, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.address)
        .bind(&new.location)
        .bind(&new.details)
        .bind(&new.other_info)
        .bind(new.area)
        .bind(new.price)
        .bind(new.post_type_id)
        .bind(new.category_id)
        .bind(actor_id)
        .bind(now)
        .bind(now)
        .execute(&self.db)
        .await?;

        self.get(&id)
            .await?
            .ok_or_else(|| AppError::Internal("Post row missing after insert".to_string()))
    }

    /// Public read: non-deleted posts only
    pub async fn get(&self, post_id: &str) -> AppResult<Option<Post>> {
        let mut conn = self.db.acquire().await?;
        fetch_post_on(&mut conn, post_id).await
    }

    /// Update non-status fields. Admin-like actors may edit any post; owners
    /// need `post.update_own`. Changed fields are diffed against the previous
    /// snapshot into one history row; a no-op update writes none.
    pub async fn update(
        &self,
        actor_id: &str,
        post_id: &str,
        update: PostUpdate,
    ) -> AppResult<Post> {
        let admin_like = self.authz.is_admin_like(Some(actor_id)).await?;
        if !admin_like
            && !self
                .authz
                .has_permission(Some(actor_id), "post.update_own")
                .await?
        {
            return Err(AppError::Forbidden {
                permission: "post.update_own".to_string(),
            });
        }

        if let Some(area) = update.area {
            if area <= 0.0 {
                return Err(AppError::Validation("area must be positive".to_string()));
            }
        }
        if let Some(price) = update.price {
            if price < 0.0 {
                return Err(AppError::Validation("price must not be negative".to_string()));
            }
        }

        let mut tx = self.db.begin().await?;

        // Missing and not-owned are indistinguishable on purpose
        let old = fetch_post_on(&mut *tx, post_id)
            .await?
            .ok_or(AppError::NotAllowedOrNotFound)?;
        if !admin_like && old.owner_id != actor_id {
            return Err(AppError::NotAllowedOrNotFound);
        }

        let title = update.title.unwrap_or_else(|| old.title.clone());
        let description = update
            .description
            .unwrap_or_else(|| old.description.clone());
        let address = update.address.unwrap_or_else(|| old.address.clone());
        let location = update.location.unwrap_or_else(|| old.location.clone());
        let details = update.details.unwrap_or_else(|| old.details.clone());
        let other_info = match update.other_info {
            Some(value) => value,
            None => old.other_info.clone(),
        };
        let area = update.area.unwrap_or(old.area);
        let price = update.price.unwrap_or(old.price);
        let post_type_id = update.post_type_id.unwrap_or(old.post_type_id);
        let category_id = update.category_id.unwrap_or(old.category_id);

        let mut old_content = serde_json::Map::new();
        let mut new_content = serde_json::Map::new();
        let mut diff = |field: &str, old_val: serde_json::Value, new_val: serde_json::Value| {
            if old_val != new_val {
                old_content.insert(field.to_string(), old_val);
                new_content.insert(field.to_string(), new_val);
            }
        };

        diff("title", old.title.clone().into(), title.clone().into());
        diff(
            "description",
            old.description.clone().into(),
            description.clone().into(),
        );
        diff("address", old.address.clone(), address.clone());
        diff("location", old.location.clone(), location.clone());
        diff("details", old.details.clone(), details.clone());
        diff(
            "other_info",
            old.other_info.clone().unwrap_or(serde_json::Value::Null),
            other_info.clone().unwrap_or(serde_json::Value::Null),
        );
        diff("area", old.area.into(), area.into());
        diff("price", old.price.into(), price.into());
        diff(
            "post_type_id",
            old.post_type_id.into(),
            post_type_id.into(),
        );
        diff("category_id", old.category_id.into(), category_id.into());

        if old_content.is_empty() {
            // Nothing changed: no write, no history
            return Ok(old);
        }

        sqlx::query(
            r#"
            UPDATE posts
            SET title = ?, description = ?, address = ?, location = ?, details = ?,
                other_info = ?, area = ?, price = ?, post_type_id = ?, category_id = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&title)
        .bind(&description)
        .bind(&address)
        .bind(&location)
        .bind(&details)
        .bind(&other_info)
        .bind(area)
        .bind(price)
        .bind(post_type_id)
        .bind(category_id)
        .bind(Utc::now())
        .bind(post_id)
        .execute(&mut *tx)
        .await?;

        history::append_on(
            &mut *tx,
            post_id,
            actor_id,
            &serde_json::Value::Object(old_content),
            &serde_json::Value::Object(new_content),
            ChangeType::Update,
        )
        .await?;

        let post = fetch_post_on(&mut *tx, post_id)
            .await?
            .ok_or_else(|| AppError::Internal("Post row missing after update".to_string()))?;
        tx.commit().await?;

        Ok(post)
    }

    /// Change approval and/or publication status. Admin-like only; approving
    /// requires `post.approve`, rejecting `post.reject`, anything else
    /// `post.view_all`.
    pub async fn change_status(
        &self,
        actor_id: &str,
        post_id: &str,
        approval_status: Option<ApprovalStatus>,
        post_status: Option<PostStatus>,
    ) -> AppResult<Post> {
        if !self.authz.is_admin_like(Some(actor_id)).await? {
            return Err(AppError::NotAllowedOrNotFound);
        }

        let required_perm = match approval_status {
            Some(ApprovalStatus::Approved) => "post.approve",
            Some(ApprovalStatus::Rejected) => "post.reject",
            _ => "post.view_all",
        };
        if !self
            .authz
            .has_permission(Some(actor_id), required_perm)
            .await?
        {
            return Err(AppError::Forbidden {
                permission: required_perm.to_string(),
            });
        }

        let mut tx = self.db.begin().await?;

        let old = fetch_post_on(&mut *tx, post_id)
            .await?
            .ok_or(AppError::NotAllowedOrNotFound)?;

        let approval = approval_status.unwrap_or(old.approval_status);
        let status = post_status.unwrap_or(old.post_status);

        let mut old_content = serde_json::Map::new();
        let mut new_content = serde_json::Map::new();
        if approval != old.approval_status {
            old_content.insert(
                "approval_status".to_string(),
                old.approval_status.as_str().into(),
            );
            new_content.insert("approval_status".to_string(), approval.as_str().into());
        }
        if status != old.post_status {
            old_content.insert("post_status".to_string(), old.post_status.as_str().into());
            new_content.insert("post_status".to_string(), status.as_str().into());
        }

        if old_content.is_empty() {
            return Ok(old);
        }

        sqlx::query(
            "UPDATE posts SET approval_status = ?, post_status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(approval)
        .bind(status)
        .bind(Utc::now())
        .bind(post_id)
        .execute(&mut *tx)
        .await?;

        history::append_on(
            &mut *tx,
            post_id,
            actor_id,
            &serde_json::Value::Object(old_content),
            &serde_json::Value::Object(new_content),
            ChangeType::StatusChange,
        )
        .await?;

        let post = fetch_post_on(&mut *tx, post_id)
            .await?
            .ok_or_else(|| AppError::Internal("Post row missing after update".to_string()))?;
        tx.commit().await?;

        Ok(post)
    }

    /// Soft delete: sets the monotonic `is_deleted` flag, keeps the row
    pub async fn soft_delete(&self, actor_id: &str, post_id: &str) -> AppResult<()> {
        let admin_like = self.authz.is_admin_like(Some(actor_id)).await?;
        if !admin_like
            && !self
                .authz
                .has_permission(Some(actor_id), "post.delete_soft_own")
                .await?
        {
            return Err(AppError::Forbidden {
                permission: "post.delete_soft_own".to_string(),
            });
        }

        let mut tx = self.db.begin().await?;

        let old = fetch_post_on(&mut *tx, post_id)
            .await?
            .ok_or(AppError::NotAllowedOrNotFound)?;
        if !admin_like && old.owner_id != actor_id {
            return Err(AppError::NotAllowedOrNotFound);
        }

        sqlx::query("UPDATE posts SET is_deleted = 1, updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(post_id)
            .execute(&mut *tx)
            .await?;

        history::append_on(
            &mut *tx,
            post_id,
            actor_id,
            &serde_json::json!({ "is_deleted": false }),
            &serde_json::json!({ "is_deleted": true }),
            ChangeType::Delete,
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Bump a listing: owner-only, gated by the membership daily quota.
    /// The quota consumption and the `bumped_at` write commit together.
    pub async fn bump(&self, actor_id: &str, post_id: &str) -> AppResult<BumpOutcome> {
        let mut tx = self.db.begin().await?;

        let post = fetch_post_on(&mut *tx, post_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Post {} not found", post_id)))?;
        if post.owner_id != actor_id {
            return Err(AppError::NotOwner);
        }

        let today = local_today();
        let (used, limit) = membership::consume_bump_on(&mut *tx, actor_id, today).await?;

        let now = Utc::now();
        sqlx::query("UPDATE posts SET bumped_at = ? WHERE id = ?")
            .bind(now)
            .bind(post_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO post_bump_logs (post_id, actor_id, created_at, note) VALUES (?, ?, ?, NULL)",
        )
        .bind(post_id)
        .bind(actor_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(BumpOutcome {
            post_id: post_id.to_string(),
            bumped_at: now,
            bumps_used_today: used,
            daily_limit: limit,
        })
    }

    /// Posts by owner; the public view filters to approved, published,
    /// non-deleted listings
    pub async fn list_by_owner(
        &self,
        owner_id: &str,
        only_public: bool,
        page: i64,
        page_size: i64,
    ) -> AppResult<Vec<Post>> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 100);
        let offset = (page - 1) * page_size;

        let sql = if only_public {
            r#"
            SELECT * FROM posts
            WHERE owner_id = ? AND is_deleted = 0
              AND approval_status = 'Approved' AND post_status = 'Published'
            ORDER BY COALESCE(bumped_at, created_at) DESC
            LIMIT ? OFFSET ?
            "#
        } else {
            r#"
            SELECT * FROM posts
            WHERE owner_id = ? AND is_deleted = 0
            ORDER BY COALESCE(bumped_at, created_at) DESC
            LIMIT ? OFFSET ?
            "#
        };

        let rows = sqlx::query_as::<_, Post>(sql)
            .bind(owner_id)
            .bind(page_size)
            .bind(offset)
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    /// Audit history for a post, newest first
    pub async fn history(&self, post_id: &str) -> AppResult<Vec<PostHistory>> {
        let mut conn = self.db.acquire().await?;
        history::list_on(&mut conn, post_id).await
    }

    /// Random 9-character identifier, collision-checked against existing rows
    async fn generate_unique_id(&self) -> AppResult<String> {
        loop {
            let candidate: String = {
                let mut rng = rand::thread_rng();
                (0..ID_LENGTH)
                    .map(|_| {
                        let idx = rng.gen_range(0..ID_CHARSET.len());
                        ID_CHARSET[idx] as char
                    })
                    .collect()
            };

            let taken = sqlx::query("SELECT 1 AS hit FROM posts WHERE id = ?")
                .bind(&candidate)
                .fetch_optional(&self.db)
                .await?
                .is_some();

            if !taken {
                return Ok(candidate);
            }
        }
    }
}

async fn fetch_post_on(conn: &mut SqliteConnection, post_id: &str) -> AppResult<Option<Post>> {
    let post = sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE id = ? AND is_deleted = 0")
        .bind(post_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(post)
}
