/// HTTP API routes
///
/// Success responses are `{ok: 1, ...}`; errors render through `AppError`
/// as `{ok: 0, error, message}`.
use crate::context::AppContext;
use axum::Router;

pub mod admin;
pub mod engagement;
pub mod listings;
pub mod membership;

/// All API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(listings::routes())
        .merge(membership::routes())
        .merge(engagement::routes())
        .merge(admin::routes())
}
