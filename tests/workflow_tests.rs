/// End-to-end workflow tests over the manager layer
///
/// Exercises the full listing lifecycle against an in-memory database:
/// creation, moderation, audited edits, the paid-upgrade path, and the
/// daily bump quota.
use landhub::authz::seed::seed_authz;
use landhub::authz::{AuthzEngine, ROLE_MEMBER, ROLE_STAFF, ROLE_SUPER_ADMIN};
use landhub::config::PaymentConfig;
use landhub::db::create_test_pool;
use landhub::engagement::{CommentManager, FavoriteManager, RatingManager, ViewManager};
use landhub::error::AppError;
use landhub::listings::{ApprovalStatus, ChangeType, NewPost, PostManager, PostStatus, PostUpdate};
use landhub::membership::{
    seed_plans, MembershipManager, OrderManager, OrderStatus, PLAN_AGENT_1M,
};
use sqlx::SqlitePool;

struct Harness {
    db: SqlitePool,
    authz: AuthzEngine,
    posts: PostManager,
    memberships: MembershipManager,
    orders: OrderManager,
    favorites: FavoriteManager,
    comments: CommentManager,
    ratings: RatingManager,
    views: ViewManager,
}

async fn harness() -> Harness {
    let db = create_test_pool().await.unwrap();
    seed_authz(&db).await.unwrap();
    seed_plans(&db).await.unwrap();

    let authz = AuthzEngine::new(db.clone());
    let payment = PaymentConfig {
        bank_id: "970422".to_string(),
        account_no: "123456789".to_string(),
        account_name: "LANDHUB".to_string(),
        qr_template: "compact2".to_string(),
    };

    Harness {
        posts: PostManager::new(db.clone(), authz.clone()),
        memberships: MembershipManager::new(db.clone()),
        orders: OrderManager::new(db.clone(), payment),
        favorites: FavoriteManager::new(db.clone(), authz.clone()),
        comments: CommentManager::new(db.clone(), authz.clone()),
        ratings: RatingManager::new(db.clone()),
        views: ViewManager::new(db.clone()),
        authz,
        db,
    }
}

fn riverside_listing() -> NewPost {
    NewPost {
        title: "Riverside apartment".to_string(),
        description: "Two bedrooms, river view".to_string(),
        address: serde_json::json!({"province": "Da Nang", "district": "Son Tra"}),
        location: serde_json::json!({"lat": 16.08, "lng": 108.25}),
        details: serde_json::json!({"bedrooms": 2}),
        other_info: None,
        area: 72.0,
        price: 100.0,
        post_type_id: 1,
        category_id: 1,
    }
}

#[tokio::test]
async fn full_listing_lifecycle_with_audit_trail() {
    let h = harness().await;
    h.authz.assign_role("agent1", ROLE_MEMBER, None).await.unwrap();
    h.authz.assign_role("mod1", ROLE_STAFF, None).await.unwrap();

    // Creation starts Pending/Hidden and writes no history
    let post = h.posts.create("agent1", riverside_listing()).await.unwrap();
    assert_eq!(post.approval_status, ApprovalStatus::Pending);
    assert_eq!(post.post_status, PostStatus::Hidden);
    assert!(h.posts.history(&post.id).await.unwrap().is_empty());

    // Staff approval and publication: exactly one status_change row
    h.posts
        .change_status(
            "mod1",
            &post.id,
            Some(ApprovalStatus::Approved),
            Some(PostStatus::Published),
        )
        .await
        .unwrap();
    let history = h.posts.history(&post.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].change_type, ChangeType::StatusChange);

    // Owner price edit 100 -> 120: one update row carrying only the price
    h.posts
        .update(
            "agent1",
            &post.id,
            PostUpdate {
                price: Some(120.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let history = h.posts.history(&post.id).await.unwrap();
    assert_eq!(history.len(), 2);
    let edit = &history[0];
    assert_eq!(edit.change_type, ChangeType::Update);
    let old: serde_json::Value = serde_json::from_str(&edit.old_content).unwrap();
    let new: serde_json::Value =
        serde_json::from_str(edit.new_content.as_deref().unwrap()).unwrap();
    assert_eq!(old, serde_json::json!({"price": 100.0}));
    assert_eq!(new, serde_json::json!({"price": 120.0}));

    // Soft delete hides the post from public reads and adds a delete row
    h.posts.soft_delete("agent1", &post.id).await.unwrap();
    assert!(h.posts.get(&post.id).await.unwrap().is_none());
    let history = h.posts.history(&post.id).await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].change_type, ChangeType::Delete);
}

#[tokio::test]
async fn paid_upgrade_unlocks_daily_bump_quota() {
    let h = harness().await;
    h.authz.assign_role("agent1", ROLE_MEMBER, None).await.unwrap();
    let post = h.posts.create("agent1", riverside_listing()).await.unwrap();

    // No membership yet: bump refused
    let err = h.posts.bump("agent1", &post.id).await.unwrap_err();
    assert!(matches!(err, AppError::NoActiveMembership));

    // Upgrade order with reconcilable transfer note and QR URL
    let plan = h
        .memberships
        .get_active_plan(PLAN_AGENT_1M)
        .await
        .unwrap()
        .unwrap();
    let outcome = h.orders.init_upgrade("agent1", &plan).await.unwrap();
    assert_eq!(
        outcome.order.transfer_note,
        format!("UPGRADE_USER_agent1_ORDER_{}", outcome.order.id)
    );
    assert!(outcome
        .order
        .qr_image_url
        .as_deref()
        .unwrap()
        .contains("img.vietqr.io"));

    // Admin confirms the transfer: membership activates, AGENT granted
    let paid = h
        .orders
        .mark_paid(outcome.order.id, Some("FT230811"), Some(plan.price_vnd))
        .await
        .unwrap();
    assert_eq!(paid.status, OrderStatus::Paid);
    assert!(h
        .memberships
        .get_active_membership("agent1")
        .await
        .unwrap()
        .is_some());
    let roles = h.authz.valid_role_names("agent1").await.unwrap();
    assert!(roles.iter().any(|r| r == "AGENT"));

    // Quota: 10 bumps on the 1-month plan, the 11th is refused
    for i in 1..=10 {
        let bump = h.posts.bump("agent1", &post.id).await.unwrap();
        assert_eq!(bump.bumps_used_today, i);
        assert_eq!(bump.daily_limit, 10);
    }
    let err = h.posts.bump("agent1", &post.id).await.unwrap_err();
    assert!(matches!(err, AppError::MaxDailyBumpReached { limit: 10 }));

    // Replayed confirmation changes nothing
    let replay = h
        .orders
        .mark_paid(outcome.order.id, Some("FT999999"), None)
        .await
        .unwrap();
    assert_eq!(replay.bank_ref, paid.bank_ref);
    assert_eq!(replay.paid_at, paid.paid_at);
}

#[tokio::test]
async fn super_admin_bypasses_permission_rows() {
    let h = harness().await;
    h.authz.assign_role("root", ROLE_SUPER_ADMIN, None).await.unwrap();

    // No permission rows exist for SUPER_ADMIN, yet everything is allowed
    assert!(h
        .authz
        .has_permission(Some("root"), "post.approve")
        .await
        .unwrap());
    assert!(h
        .authz
        .has_permission(Some("root"), "user.manage")
        .await
        .unwrap());

    // And the engine still refuses anonymous callers
    assert!(!h.authz.has_permission(None, "post.create").await.unwrap());
}

#[tokio::test]
async fn engagement_follows_post_visibility() {
    let h = harness().await;
    h.authz.assign_role("agent1", ROLE_MEMBER, None).await.unwrap();
    h.authz.assign_role("viewer", ROLE_MEMBER, None).await.unwrap();
    h.authz.assign_role("mod1", ROLE_STAFF, None).await.unwrap();

    let post = h.posts.create("agent1", riverside_listing()).await.unwrap();

    assert!(h.favorites.add("viewer", &post.id).await.unwrap());
    let comment = h
        .comments
        .create("viewer", &post.id, "Still available?")
        .await
        .unwrap();

    // Moderation hides the comment from regular viewers
    h.comments.set_hidden("mod1", comment.id, true).await.unwrap();
    assert!(h
        .comments
        .list(Some("viewer"), &post.id)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        h.comments.list(Some("mod1"), &post.id).await.unwrap().len(),
        1
    );

    // Ratings upsert per user; views accumulate for users and guests alike
    h.ratings.rate("viewer", &post.id, 5, None).await.unwrap();
    h.ratings
        .rate("viewer", &post.id, 3, Some("price went up"))
        .await
        .unwrap();
    h.ratings.rate("mod1", &post.id, 1, None).await.unwrap();
    let summary = h.ratings.summary_for_post(&post.id).await.unwrap();
    assert_eq!(summary.count, 2);
    assert_eq!(summary.average, Some(2.0));

    h.views
        .record(&post.id, Some("viewer"), None, None, None)
        .await
        .unwrap();
    h.views
        .record(&post.id, None, Some("sess-1"), None, None)
        .await
        .unwrap();
    assert_eq!(
        h.views.summary_for_post(&post.id).await.unwrap().view_count,
        2
    );

    // Once the post is soft-deleted, new engagement is refused
    h.posts.soft_delete("agent1", &post.id).await.unwrap();
    let err = h.favorites.add("viewer", &post.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    let err = h
        .comments
        .create("viewer", &post.id, "ping")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    let err = h.ratings.rate("viewer", &post.id, 4, None).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    let err = h
        .views
        .record(&post.id, None, None, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn role_revocation_takes_effect_immediately() {
    let h = harness().await;
    h.authz.assign_role("agent1", ROLE_MEMBER, None).await.unwrap();
    assert!(h
        .authz
        .has_permission(Some("agent1"), "post.create")
        .await
        .unwrap());

    h.authz.revoke_role("agent1", ROLE_MEMBER).await.unwrap();
    assert!(!h
        .authz
        .has_permission(Some("agent1"), "post.create")
        .await
        .unwrap());

    let err = h
        .posts
        .create("agent1", riverside_listing())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden { .. }));

    // Sanity: the pool serves other reads fine afterwards
    landhub::db::test_connection(&h.db).await.unwrap();
}
