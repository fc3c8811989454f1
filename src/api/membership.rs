/// Membership and upgrade-order endpoints
use crate::{
    auth::AuthContext,
    context::AppContext,
    error::{AppError, AppResult},
};
use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/membership/plans", get(list_plans))
        .route("/api/membership/upgrade", post(init_upgrade))
        .route("/api/membership/orders/:id", get(get_order))
        .route("/api/me/membership", get(my_membership))
}

#[derive(Debug, Deserialize)]
struct UpgradeRequest {
    plan_code: String,
}

async fn list_plans(State(ctx): State<AppContext>) -> AppResult<Json<serde_json::Value>> {
    let plans = ctx.memberships.list_active_plans().await?;
    Ok(Json(json!({ "ok": 1, "plans": plans })))
}

async fn my_membership(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> AppResult<Json<serde_json::Value>> {
    let membership = ctx.memberships.get_membership(&auth.user_id).await?;
    let body = match membership {
        Some(m) => json!({
            "ok": 1,
            "membership": m,
            "is_active": m.is_active(),
            "remaining_days": m.remaining_days(),
        }),
        None => json!({ "ok": 1, "membership": null }),
    };
    Ok(Json(body))
}

/// Start (or resume) a bank-transfer upgrade; returns the order with its
/// transfer note and QR image URL
async fn init_upgrade(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<UpgradeRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let plan = ctx
        .memberships
        .get_active_plan(&req.plan_code)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Plan {} not found", req.plan_code)))?;

    let outcome = ctx.orders.init_upgrade(&auth.user_id, &plan).await?;
    tracing::info!(
        "Upgrade order {} for user {} (plan {}, new: {})",
        outcome.order.id,
        auth.user_id,
        plan.code,
        outcome.is_new
    );
    Ok(Json(json!({
        "ok": 1,
        "order": outcome.order,
        "is_new": outcome.is_new,
    })))
}

/// Order detail: visible to its owner and to admin-like actors
async fn get_order(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<i64>,
) -> AppResult<Json<serde_json::Value>> {
    let order = ctx
        .orders
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order {} not found", id)))?;

    if order.user_id != auth.user_id && !ctx.authz.is_admin_like(Some(&auth.user_id)).await? {
        // Someone else's order looks like a missing one
        return Err(AppError::NotFound(format!("Order {} not found", id)));
    }

    Ok(Json(json!({ "ok": 1, "order": order })))
}
