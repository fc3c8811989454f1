/// Database layer for Landhub
///
/// Manages the SQLite connection pool and embedded migrations. All domain
/// managers share one pool; multi-row invariants run inside transactions.
use crate::error::AppResult;
use sqlx::sqlite::SqlitePool;
use std::path::Path;

/// Embedded migrations, applied at startup and by tests
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Database connection options
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub max_connections: u32,
    pub enable_wal: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            enable_wal: true,
        }
    }
}

/// Create a SQLite connection pool
pub async fn create_pool(path: &Path, options: DatabaseOptions) -> AppResult<SqlitePool> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let pool = sqlx::pool::PoolOptions::new()
        .max_connections(options.max_connections)
        .connect_with(
            sqlx::sqlite::SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(if options.enable_wal {
                    sqlx::sqlite::SqliteJournalMode::Wal
                } else {
                    sqlx::sqlite::SqliteJournalMode::Delete
                })
                .foreign_keys(true)
                .busy_timeout(std::time::Duration::from_secs(5)),
        )
        .await?;

    Ok(pool)
}

/// Run embedded migrations
pub async fn run_migrations(pool: &SqlitePool) -> AppResult<()> {
    MIGRATOR
        .run(pool)
        .await
        .map_err(|e| crate::error::AppError::Internal(format!("Failed to run migrations: {}", e)))
}

/// Open an in-memory database with the full schema (test support)
pub async fn create_test_pool() -> AppResult<SqlitePool> {
    let pool = SqlitePool::connect(":memory:").await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Verify the database connection works
pub async fn test_connection(pool: &SqlitePool) -> AppResult<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
