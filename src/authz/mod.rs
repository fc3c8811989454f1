/// Role-Based Access Control
///
/// Roles hold sets of permission codes; users hold time-bounded, revocable
/// role assignments. SUPER_ADMIN is a wildcard role that bypasses the
/// permission tables entirely. Every check reads live assignment rows —
/// token claims are advisory only.
pub mod engine;
pub mod seed;

pub use engine::{AuthzEngine, Decision, ResolvedClaims, RoleAssignment, RoleRecord};

/// Reserved role names
pub const ROLE_SUPER_ADMIN: &str = "SUPER_ADMIN";
pub const ROLE_STAFF: &str = "STAFF";
pub const ROLE_AGENT: &str = "AGENT";
pub const ROLE_MEMBER: &str = "MEMBER";
