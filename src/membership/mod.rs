/// VIP membership and daily bump quota tracking
///
/// One membership row per user. Active iff `expired_at > now`. The per-day
/// bump counter is only meaningful for `last_bump_date == today` (local
/// calendar date); it is reset-then-checked-then-incremented inside a single
/// transaction so concurrent bumps for one user serialize.
pub mod orders;
pub mod vietqr;

use crate::authz::{engine::assign_role_on, ROLE_AGENT};
use crate::error::{AppError, AppResult};
use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::warn;

pub use orders::{MembershipOrder, OrderManager, OrderStatus};

/// Seeded plan codes
pub const PLAN_AGENT_1M: &str = "AGENT_1M";
pub const PLAN_AGENT_3M: &str = "AGENT_3M";

/// Purchasable VIP plan. Immutable after creation except `is_active`.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct MembershipPlan {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub price_vnd: i64,
    pub duration_days: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Current VIP state of one user
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct UserMembership {
    pub id: i64,
    pub user_id: String,
    pub plan_id: i64,
    pub started_at: DateTime<Utc>,
    pub expired_at: DateTime<Utc>,
    pub last_bump_date: Option<NaiveDate>,
    pub bumps_used_today: i64,
}

impl UserMembership {
    pub fn is_active(&self) -> bool {
        self.expired_at > Utc::now()
    }

    pub fn remaining_days(&self) -> i64 {
        if !self.is_active() {
            return 0;
        }
        (self.expired_at - Utc::now()).num_days().max(0)
    }
}

/// Daily bump entitlement by plan code. Unrecognized active plans fall back
/// to the base tier.
pub fn daily_bump_limit(plan_code: &str) -> i64 {
    match plan_code.to_uppercase().as_str() {
        PLAN_AGENT_3M => 20,
        PLAN_AGENT_1M => 10,
        _ => 10,
    }
}

/// Today in the server's local calendar, the date the bump counter keys on
pub fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

/// Membership manager over the shared pool
#[derive(Clone)]
pub struct MembershipManager {
    db: SqlitePool,
}

impl MembershipManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Look up an active (purchasable) plan by code
    pub async fn get_active_plan(&self, code: &str) -> AppResult<Option<MembershipPlan>> {
        let plan = sqlx::query_as::<_, MembershipPlan>(
            "SELECT id, code, name, price_vnd, duration_days, is_active, created_at
             FROM membership_plans WHERE code = ? AND is_active = 1",
        )
        .bind(code)
        .fetch_optional(&self.db)
        .await?;
        Ok(plan)
    }

    /// All purchasable plans, cheapest first
    pub async fn list_active_plans(&self) -> AppResult<Vec<MembershipPlan>> {
        let plans = sqlx::query_as::<_, MembershipPlan>(
            "SELECT id, code, name, price_vnd, duration_days, is_active, created_at
             FROM membership_plans WHERE is_active = 1 ORDER BY price_vnd ASC",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(plans)
    }

    /// The user's membership row, active or not
    pub async fn get_membership(&self, user_id: &str) -> AppResult<Option<UserMembership>> {
        let mut conn = self.db.acquire().await?;
        get_membership_on(&mut conn, user_id).await
    }

    /// The user's membership iff still in effect
    pub async fn get_active_membership(&self, user_id: &str) -> AppResult<Option<UserMembership>> {
        Ok(self
            .get_membership(user_id)
            .await?
            .filter(UserMembership::is_active))
    }

    /// Activate or extend VIP for a user.
    ///
    /// No row: create one starting now. Active row: stack the plan duration
    /// onto the current expiry. Expired row: restart from now. The plan
    /// reference is always overwritten (upgrades and downgrades alike).
    /// Grants AGENT as a side effect; a missing AGENT role definition is
    /// logged and skipped so a direct activation never aborts over seed data.
    pub async fn activate_for_user(
        &self,
        user_id: &str,
        plan: &MembershipPlan,
    ) -> AppResult<UserMembership> {
        let mut tx = self.db.begin().await?;

        let membership = activate_on(&mut *tx, user_id, plan).await?;

        match assign_role_on(&mut *tx, user_id, ROLE_AGENT, None).await {
            Ok(_) => {}
            Err(AppError::RoleNotFound(_)) => {
                warn!(user_id, "AGENT role not seeded; membership activated without grant");
            }
            Err(e) => return Err(e),
        }

        tx.commit().await?;
        Ok(membership)
    }
}

/// Connection-scoped membership activation (no role grant), reused by the
/// order-paid transaction
pub(crate) async fn activate_on(
    conn: &mut SqliteConnection,
    user_id: &str,
    plan: &MembershipPlan,
) -> AppResult<UserMembership> {
    let now = Utc::now();
    let duration = Duration::days(plan.duration_days);

    match get_membership_on(conn, user_id).await? {
        None => {
            sqlx::query(
                "INSERT INTO user_memberships (user_id, plan_id, started_at, expired_at)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(user_id)
            .bind(plan.id)
            .bind(now)
            .bind(now + duration)
            .execute(&mut *conn)
            .await?;
        }
        Some(existing) => {
            // Still in effect: stack. Expired: restart from now.
            let (started_at, expired_at) = if existing.expired_at > now {
                (existing.started_at, existing.expired_at + duration)
            } else {
                (now, now + duration)
            };

            sqlx::query(
                "UPDATE user_memberships
                 SET plan_id = ?, started_at = ?, expired_at = ?
                 WHERE user_id = ?",
            )
            .bind(plan.id)
            .bind(started_at)
            .bind(expired_at)
            .bind(user_id)
            .execute(&mut *conn)
            .await?;
        }
    }

    get_membership_on(conn, user_id)
        .await?
        .ok_or_else(|| AppError::Internal("Membership row missing after activation".to_string()))
}

pub(crate) async fn get_membership_on(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> AppResult<Option<UserMembership>> {
    let membership = sqlx::query_as::<_, UserMembership>(
        "SELECT id, user_id, plan_id, started_at, expired_at, last_bump_date, bumps_used_today
         FROM user_memberships WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(membership)
}

/// Consume one bump from the user's daily quota, resetting the counter first
/// if the local date has rolled over. Must run inside the caller's
/// transaction together with the post mutation it gates.
///
/// Returns `(bumps_used_today, daily_limit)` after the increment.
pub(crate) async fn consume_bump_on(
    conn: &mut SqliteConnection,
    user_id: &str,
    today: NaiveDate,
) -> AppResult<(i64, i64)> {
    let row = sqlx::query(
        r#"
        SELECT m.expired_at, m.last_bump_date, m.bumps_used_today, p.code AS plan_code
        FROM user_memberships m
        JOIN membership_plans p ON p.id = m.plan_id
        WHERE m.user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    let row = row.ok_or(AppError::NoActiveMembership)?;
    let expired_at: DateTime<Utc> = row.get("expired_at");
    if expired_at <= Utc::now() {
        return Err(AppError::NoActiveMembership);
    }

    let last_bump_date: Option<NaiveDate> = row.get("last_bump_date");
    let mut used: i64 = row.get("bumps_used_today");
    let plan_code: String = row.get("plan_code");

    // Date rollover resets the counter before any quota math
    if last_bump_date != Some(today) {
        used = 0;
    }

    let limit = daily_bump_limit(&plan_code);
    if limit <= 0 {
        return Err(AppError::NoBumpAllowed);
    }
    if used >= limit {
        return Err(AppError::MaxDailyBumpReached { limit });
    }

    used += 1;
    sqlx::query(
        "UPDATE user_memberships SET bumps_used_today = ?, last_bump_date = ? WHERE user_id = ?",
    )
    .bind(used)
    .bind(today)
    .bind(user_id)
    .execute(&mut *conn)
    .await?;

    Ok((used, limit))
}

/// Seed the default plan catalog. Idempotent.
pub async fn seed_plans(db: &SqlitePool) -> AppResult<()> {
    let plans: &[(&str, &str, i64, i64)] = &[
        (PLAN_AGENT_1M, "VIP Agent 1 month", 100_000, 30),
        (PLAN_AGENT_3M, "VIP Agent 3 months", 250_000, 90),
    ];

    for (code, name, price_vnd, duration_days) in plans {
        sqlx::query(
            "INSERT INTO membership_plans (code, name, price_vnd, duration_days, is_active, created_at)
             VALUES (?, ?, ?, ?, 1, ?)
             ON CONFLICT (code) DO NOTHING",
        )
        .bind(code)
        .bind(name)
        .bind(price_vnd)
        .bind(duration_days)
        .bind(Utc::now())
        .execute(db)
        .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::seed::seed_authz;
    use crate::db::create_test_pool;

    async fn setup() -> (SqlitePool, MembershipManager) {
        let db = create_test_pool().await.unwrap();
        seed_authz(&db).await.unwrap();
        seed_plans(&db).await.unwrap();
        (db.clone(), MembershipManager::new(db))
    }

    #[test]
    fn test_daily_bump_limit_table() {
        assert_eq!(daily_bump_limit("AGENT_1M"), 10);
        assert_eq!(daily_bump_limit("agent_3m"), 20);
        // Unrecognized active plan falls back to the base tier
        assert_eq!(daily_bump_limit("AGENT_12M"), 10);
    }

    #[tokio::test]
    async fn test_activation_creates_membership_and_grants_agent() {
        let (db, manager) = setup().await;
        let plan = manager.get_active_plan(PLAN_AGENT_1M).await.unwrap().unwrap();

        let membership = manager.activate_for_user("u1", &plan).await.unwrap();
        assert!(membership.is_active());
        assert!(membership.remaining_days() >= 29);

        let granted: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) AS n FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id
            WHERE ur.user_id = 'u1' AND r.role_name = 'AGENT' AND ur.is_active = 1
            "#,
        )
        .fetch_one(&db)
        .await
        .unwrap()
        .get("n");
        assert_eq!(granted, 1);
    }

    #[tokio::test]
    async fn test_activation_stacks_while_active() {
        let (_db, manager) = setup().await;
        let plan = manager.get_active_plan(PLAN_AGENT_1M).await.unwrap().unwrap();

        let first = manager.activate_for_user("u2", &plan).await.unwrap();
        let second = manager.activate_for_user("u2", &plan).await.unwrap();

        // Two back-to-back 30-day activations end about 60 days out
        let stacked = second.expired_at - first.started_at;
        assert!(stacked >= Duration::days(59) && stacked <= Duration::days(61));
        assert_eq!(first.started_at, second.started_at);
    }

    #[tokio::test]
    async fn test_activation_resets_when_expired() {
        let (db, manager) = setup().await;
        let plan = manager.get_active_plan(PLAN_AGENT_1M).await.unwrap().unwrap();

        manager.activate_for_user("u3", &plan).await.unwrap();
        let past = Utc::now() - Duration::days(10);
        sqlx::query("UPDATE user_memberships SET started_at = ?, expired_at = ? WHERE user_id = 'u3'")
            .bind(past - Duration::days(30))
            .bind(past)
            .execute(&db)
            .await
            .unwrap();
        assert!(manager.get_active_membership("u3").await.unwrap().is_none());

        let renewed = manager.activate_for_user("u3", &plan).await.unwrap();
        assert!(renewed.started_at > past);
        assert!(renewed.is_active());
        assert!(renewed.remaining_days() <= 30);
    }

    #[tokio::test]
    async fn test_activation_overwrites_plan() {
        let (_db, manager) = setup().await;
        let one_month = manager.get_active_plan(PLAN_AGENT_1M).await.unwrap().unwrap();
        let three_month = manager.get_active_plan(PLAN_AGENT_3M).await.unwrap().unwrap();

        manager.activate_for_user("u4", &one_month).await.unwrap();
        let upgraded = manager.activate_for_user("u4", &three_month).await.unwrap();
        assert_eq!(upgraded.plan_id, three_month.id);
    }

    #[tokio::test]
    async fn test_activation_survives_missing_agent_role() {
        let db = create_test_pool().await.unwrap();
        seed_plans(&db).await.unwrap();
        // No seed_authz: AGENT role does not exist
        let manager = MembershipManager::new(db);
        let plan = manager.get_active_plan(PLAN_AGENT_1M).await.unwrap().unwrap();

        let membership = manager.activate_for_user("u5", &plan).await.unwrap();
        assert!(membership.is_active());
    }

    #[tokio::test]
    async fn test_consume_bump_quota_and_rollover() {
        let (db, manager) = setup().await;
        let plan = manager.get_active_plan(PLAN_AGENT_1M).await.unwrap().unwrap();
        manager.activate_for_user("u6", &plan).await.unwrap();

        let today = local_today();
        let mut conn = db.acquire().await.unwrap();

        for i in 1..=10 {
            let (used, limit) = consume_bump_on(&mut conn, "u6", today).await.unwrap();
            assert_eq!(used, i);
            assert_eq!(limit, 10);
        }

        let err = consume_bump_on(&mut conn, "u6", today).await.unwrap_err();
        assert!(matches!(err, AppError::MaxDailyBumpReached { limit: 10 }));

        // Next calendar day: counter resets, first bump lands on 1
        let tomorrow = today.succ_opt().unwrap();
        let (used, _) = consume_bump_on(&mut conn, "u6", tomorrow).await.unwrap();
        assert_eq!(used, 1);
    }

    #[tokio::test]
    async fn test_consume_bump_requires_active_membership() {
        let (db, _manager) = setup().await;
        let mut conn = db.acquire().await.unwrap();
        let err = consume_bump_on(&mut conn, "nobody", local_today())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoActiveMembership));
    }
}
