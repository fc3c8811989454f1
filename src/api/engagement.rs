/// Favorite, comment, rating, and view endpoints
use crate::{
    auth::{AuthContext, OptionalAuthContext},
    context::AppContext,
    error::AppResult,
};
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route(
            "/api/posts/:id/favorite",
            put(add_favorite).delete(remove_favorite),
        )
        .route("/api/me/favorites", get(my_favorites))
        .route(
            "/api/posts/:id/comments",
            post(create_comment).get(list_comments),
        )
        .route("/api/comments/:id/visibility", post(set_comment_visibility))
        .route("/api/posts/:id/rating", post(rate_post))
        .route("/api/posts/:id/ratings", get(list_ratings))
        .route("/api/posts/:id/views", post(record_view).get(view_summary))
}

#[derive(Debug, Deserialize)]
struct CommentRequest {
    body: String,
}

#[derive(Debug, Deserialize)]
struct VisibilityRequest {
    hidden: bool,
}

#[derive(Debug, Deserialize)]
struct RatingRequest {
    score: i64,
    comment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ViewRequest {
    session_key: Option<String>,
}

async fn add_favorite(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let added = ctx.favorites.add(&auth.user_id, &id).await?;
    Ok(Json(json!({ "ok": 1, "added": added })))
}

async fn remove_favorite(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let removed = ctx.favorites.remove(&auth.user_id, &id).await?;
    Ok(Json(json!({ "ok": 1, "removed": removed })))
}

async fn my_favorites(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> AppResult<Json<serde_json::Value>> {
    let favorites = ctx.favorites.list(&auth.user_id).await?;
    Ok(Json(json!({ "ok": 1, "favorites": favorites })))
}

async fn create_comment(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(req): Json<CommentRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let comment = ctx.comments.create(&auth.user_id, &id, &req.body).await?;
    Ok(Json(json!({ "ok": 1, "comment": comment })))
}

/// Anyone may read; moderators also see hidden comments
async fn list_comments(
    State(ctx): State<AppContext>,
    auth: OptionalAuthContext,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let comments = ctx.comments.list(auth.user_id(), &id).await?;
    Ok(Json(json!({ "ok": 1, "comments": comments })))
}

async fn rate_post(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(req): Json<RatingRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let rating = ctx
        .ratings
        .rate(&auth.user_id, &id, req.score, req.comment.as_deref())
        .await?;
    Ok(Json(json!({ "ok": 1, "rating": rating })))
}

async fn list_ratings(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let ratings = ctx.ratings.list_for_post(&id).await?;
    let summary = ctx.ratings.summary_for_post(&id).await?;
    Ok(Json(json!({ "ok": 1, "ratings": ratings, "summary": summary })))
}

/// Guests record views too; the viewer id is taken from the token when present
async fn record_view(
    State(ctx): State<AppContext>,
    auth: OptionalAuthContext,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<ViewRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let ip_address = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim);
    let user_agent = headers.get("user-agent").and_then(|v| v.to_str().ok());

    ctx.views
        .record(
            &id,
            auth.user_id(),
            req.session_key.as_deref(),
            ip_address,
            user_agent,
        )
        .await?;
    Ok(Json(json!({ "ok": 1 })))
}

async fn view_summary(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let summary = ctx.views.summary_for_post(&id).await?;
    Ok(Json(json!({ "ok": 1, "summary": summary })))
}

async fn set_comment_visibility(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<i64>,
    Json(req): Json<VisibilityRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let comment = ctx
        .comments
        .set_hidden(&auth.user_id, id, req.hidden)
        .await?;
    Ok(Json(json!({ "ok": 1, "comment": comment })))
}
