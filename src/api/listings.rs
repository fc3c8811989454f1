/// Listing endpoints
use crate::{
    auth::AuthContext,
    context::AppContext,
    error::{AppError, AppResult},
    listings::{NewPost, PostUpdate},
};
use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/posts", post(create_post))
        .route(
            "/api/posts/:id",
            get(get_post).patch(update_post).delete(delete_post),
        )
        .route("/api/posts/:id/bump", post(bump_post))
        .route("/api/me/posts", get(my_posts))
        .route("/api/users/:id/posts", get(user_posts))
}

#[derive(Debug, Deserialize)]
struct PageParams {
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default = "default_page_size")]
    page_size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    20
}

async fn create_post(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(new): Json<NewPost>,
) -> AppResult<Json<serde_json::Value>> {
    let post = ctx.posts.create(&auth.user_id, new).await?;
    tracing::info!("Post {} created by {}", post.id, auth.user_id);
    Ok(Json(json!({ "ok": 1, "post": post })))
}

async fn get_post(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let post = ctx
        .posts
        .get(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Post {} not found", id)))?;
    Ok(Json(json!({ "ok": 1, "post": post })))
}

async fn update_post(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(update): Json<PostUpdate>,
) -> AppResult<Json<serde_json::Value>> {
    let post = ctx.posts.update(&auth.user_id, &id, update).await?;
    Ok(Json(json!({ "ok": 1, "post": post })))
}

async fn delete_post(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    ctx.posts.soft_delete(&auth.user_id, &id).await?;
    Ok(Json(json!({ "ok": 1 })))
}

async fn bump_post(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let outcome = ctx.posts.bump(&auth.user_id, &id).await?;
    tracing::info!(
        "Post {} bumped by {} ({}/{} today)",
        id,
        auth.user_id,
        outcome.bumps_used_today,
        outcome.daily_limit
    );
    Ok(Json(json!({ "ok": 1, "bump": outcome })))
}

async fn my_posts(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Query(params): Query<PageParams>,
) -> AppResult<Json<serde_json::Value>> {
    let posts = ctx
        .posts
        .list_by_owner(&auth.user_id, false, params.page, params.page_size)
        .await?;
    Ok(Json(json!({ "ok": 1, "posts": posts })))
}

/// Public listing of another user's posts: approved and published only
async fn user_posts(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Query(params): Query<PageParams>,
) -> AppResult<Json<serde_json::Value>> {
    let posts = ctx
        .posts
        .list_by_owner(&id, true, params.page, params.page_size)
        .await?;
    Ok(Json(json!({ "ok": 1, "posts": posts })))
}
