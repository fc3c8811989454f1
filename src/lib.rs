/// Landhub - real estate classifieds backend
///
/// Role-based access control, listing lifecycle with append-only audit
/// history, VIP memberships with a daily bump quota, and bank-transfer
/// upgrade orders reconciled through VietQR transfer notes.
pub mod api;
pub mod auth;
pub mod authz;
pub mod config;
pub mod context;
pub mod db;
pub mod engagement;
pub mod error;
pub mod listings;
pub mod membership;
pub mod rate_limit;
pub mod server;

pub use config::ServerConfig;
pub use context::AppContext;
pub use error::{AppError, AppResult};
