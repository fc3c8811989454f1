/// Default roles and permissions
///
/// Idempotent: safe to run on every startup. SUPER_ADMIN gets no
/// role_permissions rows — the wildcard lives in the engine, not the tables.
use crate::authz::{ROLE_AGENT, ROLE_MEMBER, ROLE_STAFF, ROLE_SUPER_ADMIN};
use crate::error::AppResult;
use sqlx::SqlitePool;
use tracing::info;

pub const ROLE_DEFS: &[(&str, &str)] = &[
    (ROLE_SUPER_ADMIN, "System administrator, full access"),
    (ROLE_STAFF, "Content operations, approves listings"),
    (ROLE_AGENT, "Broker / listing owner"),
    (ROLE_MEMBER, "Regular user"),
];

pub const PERM_DEFS: &[(&str, &str, &str)] = &[
    ("post.create", "Create post", "Allows creating new listings"),
    ("post.update_own", "Update own post", "Only posts created by the user"),
    ("post.delete_soft_own", "Soft-delete own post", "Hides the post, keeps the row"),
    ("post.view_all", "View all posts", "Including drafts and pending posts"),
    ("post.approve", "Approve post", "Make a listing publishable"),
    ("post.reject", "Reject post", "Reject a violating listing"),
    ("user.view", "View user list", "For admin/staff screens"),
    ("user.manage", "Manage users", "Lock/unlock, grant roles"),
    ("favorite.use", "Save favorites", "Add/remove posts from the favorite list"),
    ("comment.create", "Comment", "Create comments under listings"),
    ("comment.manage", "Manage comments", "Hide/remove violating comments"),
    ("report.view", "View reports", "System statistics"),
];

pub const ROLE_PERMS_MAP: &[(&str, &[&str])] = &[
    // SUPER_ADMIN is intentionally absent: the wildcard is never enumerated
    (
        ROLE_STAFF,
        &[
            "post.view_all",
            "post.approve",
            "post.reject",
            "comment.manage",
            "user.view",
            "user.manage",
            "report.view",
        ],
    ),
    (
        ROLE_AGENT,
        &[
            "post.create",
            "post.update_own",
            "post.delete_soft_own",
            "favorite.use",
            "comment.create",
        ],
    ),
    (
        ROLE_MEMBER,
        &[
            "post.create",
            "post.update_own",
            "post.delete_soft_own",
            "favorite.use",
            "comment.create",
        ],
    ),
];

/// Seed roles, permissions, and the role-permission map
pub async fn seed_authz(db: &SqlitePool) -> AppResult<()> {
    for (code, name, description) in PERM_DEFS {
        sqlx::query(
            "INSERT INTO permissions (code, name, description) VALUES (?, ?, ?)
             ON CONFLICT (code) DO NOTHING",
        )
        .bind(code)
        .bind(name)
        .bind(description)
        .execute(db)
        .await?;
    }

    for (role_name, description) in ROLE_DEFS {
        sqlx::query(
            "INSERT INTO roles (role_name, description) VALUES (?, ?)
             ON CONFLICT (role_name) DO NOTHING",
        )
        .bind(role_name)
        .bind(description)
        .execute(db)
        .await?;
    }

    for (role_name, perm_codes) in ROLE_PERMS_MAP {
        for code in *perm_codes {
            sqlx::query(
                r#"
                INSERT INTO role_permissions (role_id, permission_id)
                SELECT r.id, p.id FROM roles r, permissions p
                WHERE r.role_name = ? AND p.code = ?
                ON CONFLICT (role_id, permission_id) DO NOTHING
                "#,
            )
            .bind(role_name)
            .bind(code)
            .execute(db)
            .await?;
        }
    }

    info!("Seeded roles and permissions");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use sqlx::Row;

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let db = create_test_pool().await.unwrap();
        seed_authz(&db).await.unwrap();
        seed_authz(&db).await.unwrap();

        let roles: i64 = sqlx::query("SELECT COUNT(*) AS n FROM roles")
            .fetch_one(&db)
            .await
            .unwrap()
            .get("n");
        assert_eq!(roles, ROLE_DEFS.len() as i64);

        let perms: i64 = sqlx::query("SELECT COUNT(*) AS n FROM permissions")
            .fetch_one(&db)
            .await
            .unwrap()
            .get("n");
        assert_eq!(perms, PERM_DEFS.len() as i64);
    }

    #[tokio::test]
    async fn test_super_admin_has_no_permission_rows() {
        let db = create_test_pool().await.unwrap();
        seed_authz(&db).await.unwrap();

        let n: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) AS n
            FROM role_permissions rp
            JOIN roles r ON r.id = rp.role_id
            WHERE r.role_name = 'SUPER_ADMIN'
            "#,
        )
        .fetch_one(&db)
        .await
        .unwrap()
        .get("n");
        assert_eq!(n, 0);
    }
}
