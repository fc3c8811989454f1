/// Authorization engine: permission checks and role assignment
use crate::authz::{ROLE_STAFF, ROLE_SUPER_ADMIN};
use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqliteConnection, SqlitePool};

/// Outcome of a permission check. The SUPER_ADMIN wildcard is a first-class
/// branch rather than a string comparison scattered through call sites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    /// Actor holds a valid SUPER_ADMIN assignment; no permission rows consulted
    SuperAdminBypass,
    /// Granted through the named role's permission set
    GrantedByRole(String),
    /// No valid assignment grants the permission (includes unauthenticated)
    Denied,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Decision::Denied)
    }
}

/// Registered role
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct RoleRecord {
    pub id: i64,
    pub role_name: String,
    pub description: Option<String>,
}

/// A user-role grant. Valid iff `is_active` and not past `expires_at`.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub id: i64,
    pub user_id: String,
    pub role_id: i64,
    pub assigned_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub granted_by: Option<String>,
}

/// Role names and permission codes resolved for embedding in session tokens.
/// Holders of already-issued tokens keep stale claims until refresh; the
/// engine's own row-level checks remain authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedClaims {
    pub roles: Vec<String>,
    pub perms: Vec<String>,
}

/// Authorization engine over the shared pool
#[derive(Clone)]
pub struct AuthzEngine {
    db: SqlitePool,
}

impl AuthzEngine {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Resolve "does this user hold this permission" to a Decision.
    /// Unauthenticated callers are always denied; this never fails for
    /// authorization reasons, only for infrastructure ones.
    pub async fn check(&self, user_id: Option<&str>, code: &str) -> AppResult<Decision> {
        let user_id = match user_id {
            Some(id) if !id.is_empty() => id,
            _ => return Ok(Decision::Denied),
        };

        if self.holds_valid_role(user_id, ROLE_SUPER_ADMIN).await? {
            return Ok(Decision::SuperAdminBypass);
        }

        let now = Utc::now();
        let row = sqlx::query(
            r#"
            SELECT r.role_name
            FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id
            JOIN role_permissions rp ON rp.role_id = r.id
            JOIN permissions p ON p.id = rp.permission_id
            WHERE ur.user_id = ?
              AND ur.is_active = 1
              AND (ur.expires_at IS NULL OR ur.expires_at >= ?)
              AND p.code = ?
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(now)
        .bind(code)
        .fetch_optional(&self.db)
        .await?;

        match row {
            Some(row) => Ok(Decision::GrantedByRole(row.get("role_name"))),
            None => Ok(Decision::Denied),
        }
    }

    /// Boolean form of `check`
    pub async fn has_permission(&self, user_id: Option<&str>, code: &str) -> AppResult<bool> {
        Ok(self.check(user_id, code).await?.is_allowed())
    }

    /// True iff the user holds a valid SUPER_ADMIN or STAFF assignment
    pub async fn is_admin_like(&self, user_id: Option<&str>) -> AppResult<bool> {
        let user_id = match user_id {
            Some(id) if !id.is_empty() => id,
            _ => return Ok(false),
        };
        Ok(self.holds_valid_role(user_id, ROLE_SUPER_ADMIN).await?
            || self.holds_valid_role(user_id, ROLE_STAFF).await?)
    }

    /// True iff the user holds a valid SUPER_ADMIN assignment
    pub async fn is_super_admin(&self, user_id: &str) -> AppResult<bool> {
        self.holds_valid_role(user_id, ROLE_SUPER_ADMIN).await
    }

    /// Role names from valid (active, unexpired) assignments
    pub async fn valid_role_names(&self, user_id: &str) -> AppResult<Vec<String>> {
        let now = Utc::now();
        let rows = sqlx::query(
            r#"
            SELECT r.role_name
            FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id
            WHERE ur.user_id = ?
              AND ur.is_active = 1
              AND (ur.expires_at IS NULL OR ur.expires_at >= ?)
            ORDER BY r.role_name
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(|r| r.get("role_name")).collect())
    }

    /// Resolve role names and permission codes for session-token claims.
    /// SUPER_ADMIN claims carry every registered code; its permission set in
    /// the database stays empty (the wildcard is never enumerated there).
    pub async fn resolve_claims(&self, user_id: &str) -> AppResult<ResolvedClaims> {
        let roles = self.valid_role_names(user_id).await?;

        let perms: Vec<String> = if roles.iter().any(|r| r == ROLE_SUPER_ADMIN) {
            let rows = sqlx::query("SELECT code FROM permissions ORDER BY code")
                .fetch_all(&self.db)
                .await?;
            rows.into_iter().map(|r| r.get("code")).collect()
        } else {
            let now = Utc::now();
            let rows = sqlx::query(
                r#"
                SELECT DISTINCT p.code
                FROM user_roles ur
                JOIN role_permissions rp ON rp.role_id = ur.role_id
                JOIN permissions p ON p.id = rp.permission_id
                WHERE ur.user_id = ?
                  AND ur.is_active = 1
                  AND (ur.expires_at IS NULL OR ur.expires_at >= ?)
                ORDER BY p.code
                "#,
            )
            .bind(user_id)
            .bind(now)
            .fetch_all(&self.db)
            .await?;
            rows.into_iter().map(|r| r.get("code")).collect()
        };

        Ok(ResolvedClaims { roles, perms })
    }

    /// Look up a registered role by name
    pub async fn get_role(&self, role_name: &str) -> AppResult<Option<RoleRecord>> {
        let role = sqlx::query_as::<_, RoleRecord>(
            "SELECT id, role_name, description FROM roles WHERE role_name = ?",
        )
        .bind(role_name)
        .fetch_optional(&self.db)
        .await?;
        Ok(role)
    }

    /// Grant (or reactivate) a role for a user. Idempotent per (user, role):
    /// an existing row is reactivated with a fresh `assigned_at` instead of
    /// being duplicated.
    pub async fn assign_role(
        &self,
        user_id: &str,
        role_name: &str,
        granted_by: Option<&str>,
    ) -> AppResult<RoleAssignment> {
        let mut conn = self.db.acquire().await?;
        assign_role_on(&mut conn, user_id, role_name, granted_by).await
    }

    /// Deactivate a user's role assignment
    pub async fn revoke_role(&self, user_id: &str, role_name: &str) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE user_roles
            SET is_active = 0
            WHERE user_id = ?
              AND role_id = (SELECT id FROM roles WHERE role_name = ?)
              AND is_active = 1
            "#,
        )
        .bind(user_id)
        .bind(role_name)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "No active {} assignment for user {}",
                role_name, user_id
            )));
        }

        Ok(())
    }

    /// All assignments (active or not) held by a user
    pub async fn list_assignments(&self, user_id: &str) -> AppResult<Vec<RoleAssignment>> {
        let rows = sqlx::query_as::<_, RoleAssignment>(
            r#"
            SELECT id, user_id, role_id, assigned_at, expires_at, is_active, granted_by
            FROM user_roles
            WHERE user_id = ?
            ORDER BY assigned_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn holds_valid_role(&self, user_id: &str, role_name: &str) -> AppResult<bool> {
        let now = Utc::now();
        let row = sqlx::query(
            r#"
            SELECT 1 AS hit
            FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id
            WHERE ur.user_id = ?
              AND r.role_name = ?
              AND ur.is_active = 1
              AND (ur.expires_at IS NULL OR ur.expires_at >= ?)
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(role_name)
        .bind(now)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.is_some())
    }
}

/// Connection-scoped role grant, reused inside membership/order transactions
pub(crate) async fn assign_role_on(
    conn: &mut SqliteConnection,
    user_id: &str,
    role_name: &str,
    granted_by: Option<&str>,
) -> AppResult<RoleAssignment> {
    let role_id: i64 = match sqlx::query("SELECT id FROM roles WHERE role_name = ?")
        .bind(role_name)
        .fetch_optional(&mut *conn)
        .await?
    {
        Some(row) => row.get("id"),
        None => return Err(AppError::RoleNotFound(role_name.to_string())),
    };

    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO user_roles (user_id, role_id, assigned_at, is_active, granted_by)
        VALUES (?, ?, ?, 1, ?)
        ON CONFLICT (user_id, role_id) DO UPDATE SET
            is_active = 1,
            assigned_at = excluded.assigned_at,
            granted_by = COALESCE(excluded.granted_by, user_roles.granted_by)
        "#,
    )
    .bind(user_id)
    .bind(role_id)
    .bind(now)
    .bind(granted_by)
    .execute(&mut *conn)
    .await?;

    let assignment = sqlx::query_as::<_, RoleAssignment>(
        r#"
        SELECT id, user_id, role_id, assigned_at, expires_at, is_active, granted_by
        FROM user_roles
        WHERE user_id = ? AND role_id = ?
        "#,
    )
    .bind(user_id)
    .bind(role_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(assignment)
}
