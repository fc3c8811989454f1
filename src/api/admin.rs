/// Admin endpoints: moderation, role management, order back office
use crate::{
    auth::{issue_token, AdminAuthContext},
    context::AppContext,
    error::{AppError, AppResult},
    listings::{ApprovalStatus, PostStatus},
    membership::OrderStatus,
};
use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/admin/posts/:id/status", post(change_post_status))
        .route("/api/admin/posts/:id/history", get(post_history))
        .route("/api/admin/roles", post(assign_role).delete(revoke_role))
        .route("/api/admin/users/:id/roles", get(user_roles))
        .route("/api/admin/orders", get(list_orders))
        .route("/api/admin/orders/:id/confirm", post(confirm_order))
        .route("/api/admin/orders/:id/cancel", post(cancel_order))
        .route("/api/admin/tokens", post(mint_token))
}

#[derive(Debug, Deserialize)]
struct StatusRequest {
    approval_status: Option<String>,
    post_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RoleRequest {
    user_id: String,
    role_name: String,
}

#[derive(Debug, Deserialize)]
struct ConfirmRequest {
    bank_ref: Option<String>,
    paid_amount: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct OrderListParams {
    #[serde(default = "default_status")]
    status: String,
    search: Option<String>,
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default = "default_page_size")]
    page_size: i64,
}

fn default_status() -> String {
    "PENDING".to_string()
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    20
}

#[derive(Debug, Deserialize)]
struct TokenRequest {
    user_id: String,
    #[serde(default = "default_ttl")]
    ttl_seconds: i64,
}

fn default_ttl() -> i64 {
    3600
}

async fn change_post_status(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let approval = req
        .approval_status
        .as_deref()
        .map(ApprovalStatus::from_str)
        .transpose()?;
    let status = req
        .post_status
        .as_deref()
        .map(PostStatus::from_str)
        .transpose()?;

    let post = ctx
        .posts
        .change_status(&auth.user_id, &id, approval, status)
        .await?;
    tracing::info!(
        "Post {} moderated by {}: {} / {}",
        id,
        auth.user_id,
        post.approval_status.as_str(),
        post.post_status.as_str()
    );
    Ok(Json(json!({ "ok": 1, "post": post })))
}

async fn post_history(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let history = ctx.posts.history(&id).await?;
    Ok(Json(json!({ "ok": 1, "history": history })))
}

async fn assign_role(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Json(req): Json<RoleRequest>,
) -> AppResult<Json<serde_json::Value>> {
    if !ctx
        .authz
        .has_permission(Some(&auth.user_id), "user.manage")
        .await?
    {
        return Err(AppError::Forbidden {
            permission: "user.manage".to_string(),
        });
    }

    let assignment = ctx
        .authz
        .assign_role(&req.user_id, &req.role_name, Some(&auth.user_id))
        .await
        .map_err(|e| match e {
            // A bad role name from an admin is a request error, not a
            // broken seed
            AppError::RoleNotFound(name) => {
                AppError::Validation(format!("Unknown role: {}", name))
            }
            other => other,
        })?;
    tracing::info!(
        "Role {} assigned to {} by {}",
        req.role_name,
        req.user_id,
        auth.user_id
    );
    Ok(Json(json!({ "ok": 1, "assignment": assignment })))
}

async fn revoke_role(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Json(req): Json<RoleRequest>,
) -> AppResult<Json<serde_json::Value>> {
    if !ctx
        .authz
        .has_permission(Some(&auth.user_id), "user.manage")
        .await?
    {
        return Err(AppError::Forbidden {
            permission: "user.manage".to_string(),
        });
    }

    ctx.authz.revoke_role(&req.user_id, &req.role_name).await?;
    tracing::info!(
        "Role {} revoked from {} by {}",
        req.role_name,
        req.user_id,
        auth.user_id
    );
    Ok(Json(json!({ "ok": 1 })))
}

async fn user_roles(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    if !ctx
        .authz
        .has_permission(Some(&auth.user_id), "user.view")
        .await?
    {
        return Err(AppError::Forbidden {
            permission: "user.view".to_string(),
        });
    }

    let assignments = ctx.authz.list_assignments(&id).await?;
    let roles = ctx.authz.valid_role_names(&id).await?;
    Ok(Json(json!({
        "ok": 1,
        "roles": roles,
        "assignments": assignments,
    })))
}

async fn list_orders(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
    Query(params): Query<OrderListParams>,
) -> AppResult<Json<serde_json::Value>> {
    let status = OrderStatus::from_str(&params.status)?;
    let orders = ctx
        .orders
        .list(
            status,
            params.search.as_deref(),
            params.page,
            params.page_size,
        )
        .await?;
    Ok(Json(json!({ "ok": 1, "orders": orders })))
}

/// Confirm a bank transfer against a pending order. Replays return the
/// already-settled order.
async fn confirm_order(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(id): Path<i64>,
    Json(req): Json<ConfirmRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let order = ctx
        .orders
        .mark_paid(id, req.bank_ref.as_deref(), req.paid_amount)
        .await?;
    tracing::info!("Order {} confirmed by {}", id, auth.user_id);
    Ok(Json(json!({ "ok": 1, "order": order })))
}

async fn cancel_order(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(id): Path<i64>,
) -> AppResult<Json<serde_json::Value>> {
    let order = ctx.orders.cancel(id).await?;
    tracing::info!("Order {} cancelled by {}", id, auth.user_id);
    Ok(Json(json!({ "ok": 1, "order": order })))
}

/// Mint an access token for a user with their current roles and permissions
/// baked in as advisory claims. Super admin only; used by the back office
/// for support sessions.
async fn mint_token(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Json(req): Json<TokenRequest>,
) -> AppResult<Json<serde_json::Value>> {
    if !ctx.authz.is_super_admin(&auth.user_id).await? {
        return Err(AppError::Authorization(
            "Super admin role required".to_string(),
        ));
    }

    let claims = ctx.authz.resolve_claims(&req.user_id).await?;
    let token = issue_token(
        &req.user_id,
        claims.roles,
        claims.perms,
        &ctx.config.authentication.jwt_secret,
        req.ttl_seconds,
    )?;
    tracing::info!("Token minted for {} by {}", req.user_id, auth.user_id);
    Ok(Json(json!({ "ok": 1, "token": token })))
}
