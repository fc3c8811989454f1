/// Authentication extractors and JWT utilities
///
/// Tokens carry the user id plus advisory role/permission claims for client
/// UI hints. The permission engine re-checks against the database on every
/// protected operation; the claims are never trusted for authorization.
use crate::{context::AppContext, error::AppError};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts, http::HeaderMap};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// JWT claims for an access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User identifier
    pub sub: String,
    /// Role names held at issue time (advisory)
    pub roles: Vec<String>,
    /// Permission codes resolved at issue time (advisory)
    pub perms: Vec<String>,
    pub iat: i64,
    pub exp: i64,
}

/// Issue an access token for a user with their resolved roles and permissions
pub fn issue_token(
    user_id: &str,
    roles: Vec<String>,
    perms: Vec<String>,
    jwt_secret: &str,
    ttl_seconds: i64,
) -> Result<String, AppError> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        roles,
        perms,
        iat: now,
        exp: now + ttl_seconds,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Jwt(e.to_string()))
}

/// Verify a token's signature and expiry
pub fn verify_token(token: &str, jwt_secret: &str) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 300;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::warn!("JWT verification failed: {}", e);
        match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                AppError::Authentication("Token has expired".to_string())
            }
            jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                AppError::Authentication("Invalid token signature".to_string())
            }
            _ => AppError::Authentication(format!("Invalid token: {}", e)),
        }
    })
}

/// Extract a bearer token from request headers
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.to_string())
}

/// Authenticated request context
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
    pub claims: Claims,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

        let claims = verify_token(&token, &state.config.authentication.jwt_secret)?;
        let user_id = claims.sub.clone();

        Ok(AuthContext { user_id, claims })
    }
}

/// Optional authenticated context, never rejects
#[derive(Debug, Clone)]
pub struct OptionalAuthContext {
    pub auth: Option<AuthContext>,
}

impl OptionalAuthContext {
    pub fn user_id(&self) -> Option<&str> {
        self.auth.as_ref().map(|a| a.user_id.as_str())
    }
}

#[async_trait]
impl FromRequestParts<AppContext> for OptionalAuthContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let auth = match extract_bearer_token(&parts.headers) {
            Some(token) => match verify_token(&token, &state.config.authentication.jwt_secret) {
                Ok(claims) => Some(AuthContext {
                    user_id: claims.sub.clone(),
                    claims,
                }),
                Err(_) => None,
            },
            None => None,
        };

        Ok(OptionalAuthContext { auth })
    }
}

/// Admin-only request context. Admin standing is resolved from the database,
/// not from token claims.
#[derive(Debug, Clone)]
pub struct AdminAuthContext {
    pub user_id: String,
    pub claims: Claims,
}

#[async_trait]
impl FromRequestParts<AppContext> for AdminAuthContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let auth = AuthContext::from_request_parts(parts, state).await?;

        if !state.authz.is_admin_like(Some(&auth.user_id)).await? {
            tracing::warn!("Admin endpoint refused for user {}", auth.user_id);
            return Err(AppError::Authorization("Admin role required".to_string()));
        }

        Ok(AdminAuthContext {
            user_id: auth.user_id,
            claims: auth.claims,
        })
    }
}
