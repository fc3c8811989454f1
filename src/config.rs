/// Configuration management for the Landhub backend
use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub payment: PaymentConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

/// Bank-transfer / VietQR settings used to build payment QR image URLs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfig {
    pub bank_id: String,
    pub account_no: String,
    pub account_name: String,
    pub qr_template: String,
}

/// HTTP rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_second: u32,
    pub burst_size: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("LANDHUB_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("LANDHUB_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| AppError::Validation("Invalid port number".to_string()))?;
        let version = env::var("LANDHUB_VERSION").unwrap_or_else(|_| "0.1.0".to_string());

        let data_directory: PathBuf = env::var("LANDHUB_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database = env::var("LANDHUB_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("landhub.sqlite"));

        let jwt_secret = env::var("LANDHUB_JWT_SECRET")
            .map_err(|_| AppError::Validation("JWT secret required".to_string()))?;

        let bank_id = env::var("LANDHUB_VIETQR_BANK_ID").unwrap_or_else(|_| "970422".to_string());
        let account_no =
            env::var("LANDHUB_VIETQR_ACCOUNT_NO").unwrap_or_else(|_| "0000000000".to_string());
        let account_name =
            env::var("LANDHUB_VIETQR_ACCOUNT_NAME").unwrap_or_else(|_| "LANDHUB".to_string());
        let qr_template =
            env::var("LANDHUB_VIETQR_TEMPLATE").unwrap_or_else(|_| "compact2".to_string());

        let rate_limit_enabled = env::var("LANDHUB_RATE_LIMITS_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);
        let requests_per_second = env::var("LANDHUB_RATE_LIMIT_RPS")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .unwrap_or(100);
        let burst_size = env::var("LANDHUB_RATE_LIMIT_BURST")
            .unwrap_or_else(|_| "50".to_string())
            .parse()
            .unwrap_or(50);

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                version,
            },
            storage: StorageConfig {
                data_directory,
                database,
            },
            authentication: AuthConfig { jwt_secret },
            payment: PaymentConfig {
                bank_id,
                account_no,
                account_name,
                qr_template,
            },
            rate_limit: RateLimitConfig {
                enabled: rate_limit_enabled,
                requests_per_second,
                burst_size,
            },
            logging: LoggingConfig { level: log_level },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.service.hostname.is_empty() {
            return Err(AppError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(AppError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        Ok(())
    }
}
