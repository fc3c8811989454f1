/// HTTP rate limiting
use crate::error::{AppError, AppResult};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc, time::Duration};

/// Rate limiter tiers over the whole service
#[derive(Clone)]
pub struct RateLimiter {
    authenticated: Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    unauthenticated: Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    enabled: bool,
}

impl RateLimiter {
    pub fn new(config: &crate::config::RateLimitConfig) -> Self {
        let rps = NonZeroU32::new(config.requests_per_second)
            .unwrap_or(NonZeroU32::new(100).unwrap());
        let burst = NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::new(50).unwrap());

        let auth_quota = Quota::per_second(rps).allow_burst(burst);

        // Unauthenticated traffic gets a tenth of the authenticated budget
        let unauth_rps = NonZeroU32::new(config.requests_per_second / 10)
            .unwrap_or(NonZeroU32::new(10).unwrap());
        let unauth_burst =
            NonZeroU32::new(config.burst_size / 5).unwrap_or(NonZeroU32::new(10).unwrap());
        let unauth_quota = Quota::per_second(unauth_rps).allow_burst(unauth_burst);

        Self {
            authenticated: Arc::new(GovernorLimiter::direct(auth_quota)),
            unauthenticated: Arc::new(GovernorLimiter::direct(unauth_quota)),
            enabled: config.enabled,
        }
    }

    pub fn check_authenticated(&self) -> AppResult<()> {
        if !self.enabled {
            return Ok(());
        }
        self.authenticated
            .check()
            .map_err(|_| AppError::RateLimitExceeded {
                retry_after: Duration::from_secs(1),
            })
    }

    pub fn check_unauthenticated(&self) -> AppResult<()> {
        if !self.enabled {
            return Ok(());
        }
        self.unauthenticated
            .check()
            .map_err(|_| AppError::RateLimitExceeded {
                retry_after: Duration::from_secs(1),
            })
    }
}

/// Rate limiting middleware; keyed only on whether the request carries auth
pub async fn rate_limit_middleware(
    State(ctx): State<crate::context::AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let has_auth_header = request.headers().get("authorization").is_some();

    let result = if has_auth_header {
        ctx.rate_limiter.check_authenticated()
    } else {
        ctx.rate_limiter.check_unauthenticated()
    };

    match result {
        Ok(_) => Ok(next.run(request).await),
        Err(_) => Err(StatusCode::TOO_MANY_REQUESTS),
    }
}
