/// Membership upgrade orders: PENDING → PAID | CANCELLED
///
/// Confirmation is idempotent: marking a PAID order paid again returns the
/// settled order without re-running activation. Marking paid and activating
/// the membership happen in one transaction — never half-applied.
use crate::authz::engine::assign_role_on;
use crate::authz::ROLE_AGENT;
use crate::config::PaymentConfig;
use crate::error::{AppError, AppResult};
use crate::membership::{activate_on, vietqr, MembershipPlan};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};

/// Order lifecycle states. PAID and CANCELLED are terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Pending,
    Paid,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Paid => "PAID",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_str(s: &str) -> AppResult<Self> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(OrderStatus::Pending),
            "PAID" => Ok(OrderStatus::Paid),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            _ => Err(AppError::Validation(format!("Invalid order status: {}", s))),
        }
    }
}

/// Bank-transfer upgrade order
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct MembershipOrder {
    pub id: i64,
    pub user_id: String,
    pub plan_id: i64,
    pub amount_vnd: i64,
    pub status: OrderStatus,
    pub bank_ref: Option<String>,
    pub transfer_note: String,
    pub qr_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Result of an upgrade-init call
#[derive(Debug, Clone, Serialize)]
pub struct InitOrderOutcome {
    pub order: MembershipOrder,
    pub is_new: bool,
}

/// Order manager over the shared pool
#[derive(Clone)]
pub struct OrderManager {
    db: SqlitePool,
    payment: PaymentConfig,
}

impl OrderManager {
    pub fn new(db: SqlitePool, payment: PaymentConfig) -> Self {
        Self { db, payment }
    }

    /// Initialize (or reuse) an upgrade order for a user and plan.
    ///
    /// An existing PENDING order for the same (user, plan) pair is returned
    /// as-is, regenerating the transfer note / QR URL only when missing. The
    /// transfer note is derived from user and order identifiers so a manual
    /// bank transfer can be reconciled against the order.
    pub async fn init_upgrade(
        &self,
        user_id: &str,
        plan: &MembershipPlan,
    ) -> AppResult<InitOrderOutcome> {
        let mut tx = self.db.begin().await?;

        let existing = sqlx::query_as::<_, MembershipOrder>(
            r#"
            SELECT id, user_id, plan_id, amount_vnd, status, bank_ref,
                   transfer_note, qr_image_url, created_at, paid_at
            FROM membership_orders
            WHERE user_id = ? AND plan_id = ? AND status = 'PENDING'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(plan.id)
        .fetch_optional(&mut *tx)
        .await?;

        let (order_id, is_new) = match existing {
            Some(order) => {
                let mut transfer_note = order.transfer_note.clone();
                let mut qr_image_url = order.qr_image_url.clone();

                if transfer_note.is_empty() || transfer_note == "TEMP" {
                    transfer_note = transfer_note_for(user_id, order.id);
                }
                if qr_image_url.is_none() {
                    qr_image_url = Some(vietqr::build_qr_url(
                        &self.payment,
                        order.amount_vnd,
                        &transfer_note,
                    ));
                }

                sqlx::query(
                    "UPDATE membership_orders SET transfer_note = ?, qr_image_url = ? WHERE id = ?",
                )
                .bind(&transfer_note)
                .bind(&qr_image_url)
                .bind(order.id)
                .execute(&mut *tx)
                .await?;

                (order.id, false)
            }
            None => {
                // The note embeds the order id, so insert first and fill in after
                let result = sqlx::query(
                    r#"
                    INSERT INTO membership_orders
                        (user_id, plan_id, amount_vnd, status, transfer_note, created_at)
                    VALUES (?, ?, ?, 'PENDING', 'TEMP', ?)
                    "#,
                )
                .bind(user_id)
                .bind(plan.id)
                .bind(plan.price_vnd)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;
                let order_id = result.last_insert_rowid();

                let transfer_note = transfer_note_for(user_id, order_id);
                let qr_image_url =
                    vietqr::build_qr_url(&self.payment, plan.price_vnd, &transfer_note);

                sqlx::query(
                    "UPDATE membership_orders SET transfer_note = ?, qr_image_url = ? WHERE id = ?",
                )
                .bind(&transfer_note)
                .bind(&qr_image_url)
                .bind(order_id)
                .execute(&mut *tx)
                .await?;

                (order_id, true)
            }
        };

        let order = fetch_order_on(&mut *tx, order_id)
            .await?
            .ok_or_else(|| AppError::Internal("Order row missing after init".to_string()))?;
        tx.commit().await?;

        Ok(InitOrderOutcome { order, is_new })
    }

    /// Confirm payment on a PENDING order and activate the membership.
    ///
    /// Already-PAID orders are returned unchanged (duplicate confirmations
    /// and webhook replays are no-ops). CANCELLED orders conflict. When the
    /// caller reports the amount actually received, it must match the order
    /// amount; absent it, confirmation proceeds (manual admin flow). In this
    /// path a missing AGENT role aborts the whole transaction rather than
    /// silently dropping the grant.
    pub async fn mark_paid(
        &self,
        order_id: i64,
        bank_ref: Option<&str>,
        paid_amount: Option<i64>,
    ) -> AppResult<MembershipOrder> {
        let mut tx = self.db.begin().await?;

        let order = fetch_order_on(&mut *tx, order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_id)))?;

        match order.status {
            OrderStatus::Paid => {
                // Idempotent: settled once, no second activation
                tx.commit().await?;
                return Ok(order);
            }
            OrderStatus::Cancelled => return Err(AppError::OrderNotPending(order_id)),
            OrderStatus::Pending => {}
        }

        if let Some(paid) = paid_amount {
            if paid != order.amount_vnd {
                return Err(AppError::AmountMismatch {
                    paid,
                    expected: order.amount_vnd,
                });
            }
        }

        let now = Utc::now();
        sqlx::query(
            "UPDATE membership_orders SET status = 'PAID', bank_ref = ?, paid_at = ? WHERE id = ?",
        )
        .bind(bank_ref)
        .bind(now)
        .bind(order_id)
        .execute(&mut *tx)
        .await?;

        let plan = sqlx::query_as::<_, MembershipPlan>(
            "SELECT id, code, name, price_vnd, duration_days, is_active, created_at
             FROM membership_plans WHERE id = ?",
        )
        .bind(order.plan_id)
        .fetch_one(&mut *tx)
        .await?;

        activate_on(&mut *tx, &order.user_id, &plan).await?;

        // Unlike direct activation, the paid flow refuses to drop the grant:
        // a missing AGENT role surfaces as RoleNotFound and aborts the
        // whole transaction
        assign_role_on(&mut *tx, &order.user_id, ROLE_AGENT, None).await?;

        let order = fetch_order_on(&mut *tx, order_id)
            .await?
            .ok_or_else(|| AppError::Internal("Order row missing after update".to_string()))?;
        tx.commit().await?;

        Ok(order)
    }

    /// Cancel a PENDING order. Terminal; not reachable from PAID.
    pub async fn cancel(&self, order_id: i64) -> AppResult<MembershipOrder> {
        let mut tx = self.db.begin().await?;

        let order = fetch_order_on(&mut *tx, order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_id)))?;
        if order.status != OrderStatus::Pending {
            return Err(AppError::OrderNotPending(order_id));
        }

        sqlx::query("UPDATE membership_orders SET status = 'CANCELLED' WHERE id = ?")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;

        let order = fetch_order_on(&mut *tx, order_id)
            .await?
            .ok_or_else(|| AppError::Internal("Order row missing after update".to_string()))?;
        tx.commit().await?;

        Ok(order)
    }

    pub async fn get(&self, order_id: i64) -> AppResult<Option<MembershipOrder>> {
        let mut conn = self.db.acquire().await?;
        fetch_order_on(&mut conn, order_id).await
    }

    /// Admin order list, filtered by status, optionally searched by
    /// transfer note or user id
    pub async fn list(
        &self,
        status: OrderStatus,
        search: Option<&str>,
        page: i64,
        page_size: i64,
    ) -> AppResult<Vec<MembershipOrder>> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 100);
        let offset = (page - 1) * page_size;

        let rows = match search {
            Some(term) => {
                let pattern = format!("%{}%", term);
                sqlx::query_as::<_, MembershipOrder>(
                    r#"
                    SELECT id, user_id, plan_id, amount_vnd, status, bank_ref,
                           transfer_note, qr_image_url, created_at, paid_at
                    FROM membership_orders
                    WHERE status = ? AND (transfer_note LIKE ? OR user_id LIKE ?)
                    ORDER BY created_at DESC
                    LIMIT ? OFFSET ?
                    "#,
                )
                .bind(status)
                .bind(&pattern)
                .bind(&pattern)
                .bind(page_size)
                .bind(offset)
                .fetch_all(&self.db)
                .await?
            }
            None => {
                sqlx::query_as::<_, MembershipOrder>(
                    r#"
                    SELECT id, user_id, plan_id, amount_vnd, status, bank_ref,
                           transfer_note, qr_image_url, created_at, paid_at
                    FROM membership_orders
                    WHERE status = ?
                    ORDER BY created_at DESC
                    LIMIT ? OFFSET ?
                    "#,
                )
                .bind(status)
                .bind(page_size)
                .bind(offset)
                .fetch_all(&self.db)
                .await?
            }
        };

        Ok(rows)
    }
}

fn transfer_note_for(user_id: &str, order_id: i64) -> String {
    format!("UPGRADE_USER_{}_ORDER_{}", user_id, order_id)
}

async fn fetch_order_on(
    conn: &mut SqliteConnection,
    order_id: i64,
) -> AppResult<Option<MembershipOrder>> {
    let order = sqlx::query_as::<_, MembershipOrder>(
        r#"
        SELECT id, user_id, plan_id, amount_vnd, status, bank_ref,
               transfer_note, qr_image_url, created_at, paid_at
        FROM membership_orders WHERE id = ?
        "#,
    )
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(order)
}
