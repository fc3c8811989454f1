/// Application context and dependency injection
use crate::{
    authz::{seed::seed_authz, AuthzEngine},
    config::ServerConfig,
    db,
    engagement::{CommentManager, FavoriteManager, RatingManager, ViewManager},
    error::{AppError, AppResult},
    listings::PostManager,
    membership::{seed_plans, MembershipManager, OrderManager},
    rate_limit::RateLimiter,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub authz: AuthzEngine,
    pub memberships: MembershipManager,
    pub orders: OrderManager,
    pub posts: PostManager,
    pub favorites: FavoriteManager,
    pub comments: CommentManager,
    pub ratings: RatingManager,
    pub views: ViewManager,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> AppResult<Self> {
        config.validate()?;

        Self::ensure_directories(&config).await?;

        let pool = db::create_pool(&config.storage.database, db::DatabaseOptions::default()).await?;

        db::run_migrations(&pool).await?;
        db::test_connection(&pool).await?;

        // Seed reference data; both seeders are idempotent
        seed_authz(&pool).await?;
        seed_plans(&pool).await?;

        let authz = AuthzEngine::new(pool.clone());
        let memberships = MembershipManager::new(pool.clone());
        let orders = OrderManager::new(pool.clone(), config.payment.clone());
        let posts = PostManager::new(pool.clone(), authz.clone());
        let favorites = FavoriteManager::new(pool.clone(), authz.clone());
        let comments = CommentManager::new(pool.clone(), authz.clone());
        let ratings = RatingManager::new(pool.clone());
        let views = ViewManager::new(pool.clone());
        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        Ok(Self {
            config: Arc::new(config),
            db: pool,
            authz,
            memberships,
            orders,
            posts,
            favorites,
            comments,
            ratings,
            views,
            rate_limiter,
        })
    }

    /// Ensure required directories exist
    async fn ensure_directories(config: &ServerConfig) -> AppResult<()> {
        let dir = &config.storage.data_directory;
        if !dir.exists() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                AppError::Internal(format!("Failed to create directory {:?}: {}", dir, e))
            })?;
        }
        Ok(())
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
