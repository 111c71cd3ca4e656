// tests/webhook_tests.rs

mod common;

use axum::http::StatusCode;
use billing_backend::api::{create_router, AppState};
use billing_backend::config::{AppConfig, StripeConfig};
use billing_backend::domain::{customer_model, subscription_model};
use billing_backend::repository::customer_repository::CustomerRepository;
use billing_backend::repository::invoice_repository::InvoiceRepository;
use billing_backend::domain::subscription_status::SubscriptionStatus;
use billing_backend::repository::subscription_item_repository::SubscriptionItemRepository;
use billing_backend::repository::subscription_repository::{
    SubscriptionRepository, UpsertSubscription,
};
use billing_backend::service::billing_provider::DevelopmentBillingProvider;
use chrono::{DateTime, Utc};
use common::app_helper::{post_signed_webhook, post_webhook, setup_app};
use common::db::TestDatabase;
use common::stripe_helper::{
    checkout_session_object, create_test_webhook_payload, generate_test_webhook_signature,
    generate_webhook_signature_at, invoice_object, subscription_object, PERIOD_1_END,
    PERIOD_2_END,
};
use sea_orm::{DatabaseConnection, EntityTrait, PaginatorTrait};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

async fn link_customer(db: &DatabaseConnection, user_id: Uuid, customer_id: &str) {
    CustomerRepository::new(db.clone())
        .create_if_absent(user_id, customer_id)
        .await
        .unwrap();
}

async fn all_subscriptions(db: &DatabaseConnection) -> Vec<subscription_model::Model> {
    subscription_model::Entity::find().all(db).await.unwrap()
}

fn ts(timestamp: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(timestamp, 0)
}

#[tokio::test]
async fn test_webhook_missing_signature() {
    // Arrange
    let (app, db) = setup_app().await;
    let user_id = Uuid::new_v4();
    let payload = create_test_webhook_payload(
        "customer.subscription.created",
        subscription_object("sub_nosig", "cus_nosig", "active", PERIOD_1_END, Some(user_id)),
    );

    // Act
    let (status, body) = post_webhook(&app, &payload, None).await;

    // Assert
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_type"], "invalid_signature");
    assert!(all_subscriptions(&db.connection).await.is_empty());
    assert_eq!(
        customer_model::Entity::find().count(&db.connection).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn test_webhook_invalid_signature() {
    // Arrange
    let (app, db) = setup_app().await;
    let payload = create_test_webhook_payload(
        "customer.subscription.updated",
        subscription_object("sub_badsig", "cus_badsig", "active", PERIOD_1_END, None),
    );

    // Act
    let (status, _) = post_webhook(&app, &payload, Some("invalid-signature")).await;

    // Assert
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(all_subscriptions(&db.connection).await.is_empty());
}

#[tokio::test]
async fn test_webhook_signed_with_wrong_secret_or_stale_timestamp() {
    // Arrange
    let (app, db) = setup_app().await;
    let user_id = Uuid::new_v4();
    let payload = create_test_webhook_payload(
        "customer.subscription.updated",
        subscription_object("sub_wrong", "cus_wrong", "active", PERIOD_1_END, Some(user_id)),
    );
    let now = Utc::now().timestamp();
    let wrong_secret = generate_webhook_signature_at(&payload, "whsec_someone_else", now);
    let stale = generate_webhook_signature_at(
        &payload,
        &StripeConfig::for_testing().webhook_secret,
        now - 3600,
    );

    // Act
    let (wrong_secret_status, _) = post_webhook(&app, &payload, Some(&wrong_secret)).await;
    let (stale_status, _) = post_webhook(&app, &payload, Some(&stale)).await;

    // Assert
    assert_eq!(wrong_secret_status, StatusCode::BAD_REQUEST);
    assert_eq!(stale_status, StatusCode::BAD_REQUEST);
    assert!(all_subscriptions(&db.connection).await.is_empty());
}

#[tokio::test]
async fn test_signature_is_checked_before_database_access() {
    // Arrange - テーブルのないDBを使い、DBに触れたら失敗として観測できるようにする
    let db = TestDatabase::without_schema().await;
    let app_config = AppConfig::for_testing();
    let provider = Arc::new(DevelopmentBillingProvider::new(&app_config.site_url));
    let app_state = AppState::new(
        db.connection.clone(),
        app_config,
        StripeConfig::for_testing(),
        provider,
    )
    .unwrap();
    let app = create_router(app_state);
    let payload = create_test_webhook_payload(
        "customer.subscription.updated",
        subscription_object("sub_order", "cus_order", "active", PERIOD_1_END, None),
    );

    // Act
    let (unsigned_status, unsigned_body) =
        post_webhook(&app, &payload, Some("t=1,v1=00")).await;
    let (signed_status, signed_body) = post_signed_webhook(&app, &payload).await;

    // Assert - 署名不正はDBに到達する前に拒否され、正しい署名はDBまで到達する
    assert_eq!(unsigned_status, StatusCode::BAD_REQUEST);
    assert_eq!(unsigned_body["error_type"], "invalid_signature");
    // 保存の失敗は受信確認（200）として返す
    assert_eq!(signed_status, StatusCode::OK);
    assert_eq!(signed_body["received"], true);
    assert_eq!(signed_body["outcome"], "store_write_failure");
}

#[tokio::test]
async fn test_webhook_malformed_payload() {
    // Arrange
    let (app, _db) = setup_app().await;
    let payload = "this is not an event";

    // Act
    let (status, body) = post_signed_webhook(&app, payload).await;

    // Assert
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_type"], "malformed_payload");
}

#[tokio::test]
async fn test_subscription_created_then_past_due_keeps_single_row() {
    // Arrange
    let (app, db) = setup_app().await;
    let user_id = Uuid::new_v4();
    link_customer(&db.connection, user_id, "cus_123").await;

    let active = create_test_webhook_payload(
        "customer.subscription.updated",
        subscription_object("sub_123", "cus_123", "active", PERIOD_1_END, None),
    );
    let past_due = create_test_webhook_payload(
        "customer.subscription.updated",
        subscription_object("sub_123", "cus_123", "past_due", PERIOD_1_END, None),
    );

    // Act
    let (status, body) = post_signed_webhook(&app, &active).await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);
    assert_eq!(body["event_type"], "customer.subscription.updated");
    assert_eq!(body["outcome"], "upserted");

    let rows = all_subscriptions(&db.connection).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, "active");
    assert_eq!(rows[0].user_id, user_id);
    assert_eq!(rows[0].stripe_customer_id, "cus_123");
    assert_eq!(rows[0].tier.as_deref(), Some("pro"));
    assert_eq!(rows[0].current_period_end, ts(PERIOD_1_END));

    // Act
    let (status, _) = post_signed_webhook(&app, &past_due).await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    let rows = all_subscriptions(&db.connection).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].stripe_subscription_id, "sub_123");
    assert_eq!(rows[0].status, "past_due");
}

#[tokio::test]
async fn test_replaying_event_is_idempotent() {
    // Arrange
    let (app, db) = setup_app().await;
    let user_id = Uuid::new_v4();
    link_customer(&db.connection, user_id, "cus_replay").await;
    let payload = create_test_webhook_payload(
        "customer.subscription.created",
        subscription_object("sub_replay", "cus_replay", "trialing", PERIOD_1_END, None),
    );

    // Act
    let (first_status, _) = post_signed_webhook(&app, &payload).await;
    let after_first = all_subscriptions(&db.connection).await;
    let (second_status, _) = post_signed_webhook(&app, &payload).await;
    let after_second = all_subscriptions(&db.connection).await;

    // Assert
    assert_eq!(first_status, StatusCode::OK);
    assert_eq!(second_status, StatusCode::OK);
    assert_eq!(after_first.len(), 1);
    assert_eq!(after_second.len(), 1);

    let (a, b) = (&after_first[0], &after_second[0]);
    assert_eq!(a.id, b.id);
    assert_eq!(a.status, b.status);
    assert_eq!(a.current_period_start, b.current_period_start);
    assert_eq!(a.current_period_end, b.current_period_end);
    assert_eq!(a.stripe_price_id, b.stripe_price_id);
    assert_eq!(a.quantity, b.quantity);
    assert_eq!(a.created_at, b.created_at);

    let items = SubscriptionItemRepository::new(db.connection.clone())
        .find_by_stripe_subscription_id("sub_replay")
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].stripe_subscription_item_id, "si_sub_replay");
}

#[tokio::test]
async fn test_unknown_customer_is_acknowledged_without_record() {
    // Arrange
    let (app, db) = setup_app().await;
    let payload = create_test_webhook_payload(
        "customer.subscription.updated",
        subscription_object("sub_orphan", "cus_unknown", "active", PERIOD_1_END, None),
    );

    // Act
    let (status, body) = post_signed_webhook(&app, &payload).await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);
    assert_eq!(body["outcome"], "unresolved_user");
    assert!(all_subscriptions(&db.connection).await.is_empty());
}

#[tokio::test]
async fn test_metadata_user_id_creates_customer_mapping() {
    // Arrange
    let (app, db) = setup_app().await;
    let user_id = Uuid::new_v4();
    let payload = create_test_webhook_payload(
        "customer.subscription.created",
        subscription_object("sub_meta", "cus_meta", "active", PERIOD_1_END, Some(user_id)),
    );

    // Act
    let (status, body) = post_signed_webhook(&app, &payload).await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "upserted");

    let customer = CustomerRepository::new(db.connection.clone())
        .find_by_stripe_customer_id("cus_meta")
        .await
        .unwrap()
        .expect("mapping created");
    assert_eq!(customer.user_id, user_id);

    let rows = all_subscriptions(&db.connection).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].user_id, user_id);
    assert_eq!(rows[0].metadata, Some(json!({ "user_id": user_id.to_string() })));
}

#[tokio::test]
async fn test_subscription_deleted_without_timestamps_uses_processing_time() {
    // Arrange
    let (app, db) = setup_app().await;
    let user_id = Uuid::new_v4();
    link_customer(&db.connection, user_id, "cus_cancel").await;

    let created = create_test_webhook_payload(
        "customer.subscription.created",
        subscription_object("sub_cancel", "cus_cancel", "active", PERIOD_1_END, None),
    );
    post_signed_webhook(&app, &created).await;

    // canceled_at / ended_at が null のまま届く削除イベント
    let deleted = create_test_webhook_payload(
        "customer.subscription.deleted",
        subscription_object("sub_cancel", "cus_cancel", "active", PERIOD_1_END, None),
    );
    let started = Utc::now() - chrono::Duration::seconds(1);

    // Act
    let (status, body) = post_signed_webhook(&app, &deleted).await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "canceled");

    let rows = all_subscriptions(&db.connection).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, "canceled");
    let canceled_at = rows[0].canceled_at.expect("canceled_at stamped");
    let ended_at = rows[0].ended_at.expect("ended_at stamped");
    assert!(canceled_at >= started);
    assert!(ended_at >= started);
}

#[tokio::test]
async fn test_replaying_deletion_keeps_first_cancellation_time() {
    // Arrange
    let (app, db) = setup_app().await;
    let user_id = Uuid::new_v4();
    link_customer(&db.connection, user_id, "cus_cancel_replay").await;

    let deleted = create_test_webhook_payload(
        "customer.subscription.deleted",
        subscription_object(
            "sub_cancel_replay",
            "cus_cancel_replay",
            "active",
            PERIOD_1_END,
            None,
        ),
    );

    // Act
    let (first_status, _) = post_signed_webhook(&app, &deleted).await;
    let first = all_subscriptions(&db.connection).await.remove(0);

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let (second_status, second_body) = post_signed_webhook(&app, &deleted).await;
    let second = all_subscriptions(&db.connection).await.remove(0);

    // Assert
    assert_eq!(first_status, StatusCode::OK);
    assert_eq!(second_status, StatusCode::OK);
    assert_eq!(second_body["outcome"], "canceled");
    assert!(first.canceled_at.is_some());
    assert!(first.ended_at.is_some());
    assert_eq!(second.canceled_at, first.canceled_at);
    assert_eq!(second.ended_at, first.ended_at);
    assert_eq!(second.status, "canceled");
}

#[tokio::test]
async fn test_subscription_deleted_keeps_provider_timestamp() {
    // Arrange
    let (app, db) = setup_app().await;
    let user_id = Uuid::new_v4();
    link_customer(&db.connection, user_id, "cus_cancel_ts").await;

    let mut object =
        subscription_object("sub_cancel_ts", "cus_cancel_ts", "canceled", PERIOD_1_END, None);
    object["canceled_at"] = json!(PERIOD_1_END - 100);
    object["ended_at"] = json!(PERIOD_1_END);
    let deleted = create_test_webhook_payload("customer.subscription.deleted", object);

    // Act
    let (status, _) = post_signed_webhook(&app, &deleted).await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    let rows = all_subscriptions(&db.connection).await;
    assert_eq!(rows[0].canceled_at, ts(PERIOD_1_END - 100));
    assert_eq!(rows[0].ended_at, ts(PERIOD_1_END));
}

#[tokio::test]
async fn test_sequential_events_leave_last_status() {
    // Arrange
    let (app, db) = setup_app().await;
    let user_id = Uuid::new_v4();
    link_customer(&db.connection, user_id, "cus_seq").await;

    // Act
    for status in ["incomplete", "trialing", "active", "unpaid", "active"] {
        let payload = create_test_webhook_payload(
            "customer.subscription.updated",
            subscription_object("sub_seq", "cus_seq", status, PERIOD_1_END, None),
        );
        let (code, _) = post_signed_webhook(&app, &payload).await;
        assert_eq!(code, StatusCode::OK);
    }

    // Assert
    let rows = all_subscriptions(&db.connection).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, "active");
}

#[tokio::test]
async fn test_event_for_earlier_period_is_skipped() {
    // Arrange
    let (app, db) = setup_app().await;
    let user_id = Uuid::new_v4();
    link_customer(&db.connection, user_id, "cus_stale").await;

    let renewed = create_test_webhook_payload(
        "customer.subscription.updated",
        subscription_object("sub_stale", "cus_stale", "active", PERIOD_2_END, None),
    );
    let late_old = create_test_webhook_payload(
        "customer.subscription.updated",
        subscription_object("sub_stale", "cus_stale", "past_due", PERIOD_1_END, None),
    );

    // Act
    post_signed_webhook(&app, &renewed).await;
    let (status, body) = post_signed_webhook(&app, &late_old).await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "skipped_stale");

    let rows = all_subscriptions(&db.connection).await;
    assert_eq!(rows[0].status, "active");
    assert_eq!(rows[0].current_period_end, ts(PERIOD_2_END));
}

fn pro_upsert(user_id: Uuid, status: SubscriptionStatus, period_end: i64) -> UpsertSubscription {
    UpsertSubscription {
        user_id,
        stripe_subscription_id: "sub_guard".to_string(),
        stripe_customer_id: "cus_guard".to_string(),
        status,
        tier: Some("pro".to_string()),
        stripe_price_id: Some("price_test_pro".to_string()),
        stripe_product_id: None,
        quantity: 1,
        current_period_start: ts(period_end - (PERIOD_2_END - PERIOD_1_END)),
        current_period_end: ts(period_end),
        trial_start: None,
        trial_end: None,
        cancel_at: None,
        cancel_at_period_end: false,
        canceled_at: None,
        ended_at: None,
        metadata: None,
    }
}

#[tokio::test]
async fn test_period_guard_is_part_of_upsert() {
    // Arrange
    let db = TestDatabase::new().await;
    let repo = SubscriptionRepository::new(db.connection.clone());
    let user_id = Uuid::new_v4();

    // Act
    let newer = repo
        .upsert_unless_older_period(pro_upsert(user_id, SubscriptionStatus::Active, PERIOD_2_END))
        .await
        .unwrap();
    let older = repo
        .upsert_unless_older_period(pro_upsert(user_id, SubscriptionStatus::PastDue, PERIOD_1_END))
        .await
        .unwrap();
    let same_period = repo
        .upsert_unless_older_period(pro_upsert(user_id, SubscriptionStatus::Unpaid, PERIOD_2_END))
        .await
        .unwrap();

    // Assert
    assert!(newer.is_some());
    assert!(older.is_none());
    let same_period = same_period.expect("same period applies");
    assert_eq!(same_period.status, "unpaid");
    assert_eq!(same_period.current_period_end, ts(PERIOD_2_END));

    let stored = repo
        .find_by_stripe_subscription_id("sub_guard")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, "unpaid");
}

#[tokio::test]
async fn test_payment_failed_marks_past_due() {
    // Arrange
    let (app, db) = setup_app().await;
    let user_id = Uuid::new_v4();
    link_customer(&db.connection, user_id, "cus_fail").await;
    let created = create_test_webhook_payload(
        "customer.subscription.created",
        subscription_object("sub_fail", "cus_fail", "active", PERIOD_1_END, None),
    );
    post_signed_webhook(&app, &created).await;

    let failed = create_test_webhook_payload(
        "invoice.payment_failed",
        invoice_object("in_fail", "cus_fail", Some("sub_fail")),
    );

    // Act
    let (status, body) = post_signed_webhook(&app, &failed).await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "marked_past_due");
    let rows = all_subscriptions(&db.connection).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, "past_due");
}

#[tokio::test]
async fn test_payment_failed_for_unknown_subscription() {
    // Arrange
    let (app, db) = setup_app().await;
    let failed = create_test_webhook_payload(
        "invoice.payment_failed",
        invoice_object("in_unknown", "cus_unknown", Some("sub_unknown")),
    );

    // Act
    let (status, body) = post_signed_webhook(&app, &failed).await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "subscription_not_found");
    assert!(all_subscriptions(&db.connection).await.is_empty());
}

#[tokio::test]
async fn test_invoice_redelivery_is_recorded_once() {
    // Arrange
    let (app, db) = setup_app().await;
    let user_id = Uuid::new_v4();
    link_customer(&db.connection, user_id, "cus_inv").await;
    let created = create_test_webhook_payload(
        "customer.subscription.created",
        subscription_object("sub_inv", "cus_inv", "active", PERIOD_1_END, None),
    );
    post_signed_webhook(&app, &created).await;

    let paid = create_test_webhook_payload(
        "invoice.paid",
        invoice_object("in_once", "cus_inv", Some("sub_inv")),
    );
    let succeeded = create_test_webhook_payload(
        "invoice.payment_succeeded",
        invoice_object("in_once", "cus_inv", Some("sub_inv")),
    );

    // Act
    let (_, first) = post_signed_webhook(&app, &paid).await;
    let (_, again) = post_signed_webhook(&app, &paid).await;
    let (_, other_type) = post_signed_webhook(&app, &succeeded).await;

    // Assert
    assert_eq!(first["outcome"], "invoice_recorded");
    assert_eq!(again["outcome"], "invoice_already_recorded");
    assert_eq!(other_type["outcome"], "invoice_already_recorded");

    let invoices = InvoiceRepository::new(db.connection.clone())
        .find_by_user_id(user_id)
        .await
        .unwrap();
    assert_eq!(invoices.len(), 1);

    let invoice = &invoices[0];
    assert_eq!(invoice.stripe_invoice_id, "in_once");
    assert_eq!(invoice.amount_paid, 2000);
    assert_eq!(invoice.currency, "usd");

    let subscription = &all_subscriptions(&db.connection).await[0];
    assert_eq!(invoice.subscription_id, Some(subscription.id));
}

#[tokio::test]
async fn test_checkout_completed_links_customer() {
    // Arrange
    let (app, db) = setup_app().await;
    let user_id = Uuid::new_v4();
    let payload = create_test_webhook_payload(
        "checkout.session.completed",
        checkout_session_object("cs_test_123", "cus_checkout", user_id),
    );

    // Act
    let (status, body) = post_signed_webhook(&app, &payload).await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "customer_linked");

    let customer = CustomerRepository::new(db.connection.clone())
        .find_by_user_id(user_id)
        .await
        .unwrap()
        .expect("mapping created");
    assert_eq!(customer.stripe_customer_id, "cus_checkout");

    // 対応ができた後はメタデータなしのイベントでも解決できる
    let subscription = create_test_webhook_payload(
        "customer.subscription.created",
        subscription_object("sub_after_checkout", "cus_checkout", "active", PERIOD_1_END, None),
    );
    let (_, body) = post_signed_webhook(&app, &subscription).await;
    assert_eq!(body["outcome"], "upserted");
    assert_eq!(all_subscriptions(&db.connection).await[0].user_id, user_id);
}

#[tokio::test]
async fn test_unhandled_event_is_acknowledged() {
    // Arrange
    let (app, db) = setup_app().await;
    let payload = create_test_webhook_payload(
        "customer.created",
        json!({ "id": "cus_new", "object": "customer" }),
    );

    // Act
    let (status, body) = post_signed_webhook(&app, &payload).await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);
    assert_eq!(body["outcome"], "ignored");
    assert!(body["event_id"].as_str().unwrap().starts_with("evt_test_"));
    assert!(all_subscriptions(&db.connection).await.is_empty());
}

#[tokio::test]
async fn test_undecodable_object_is_acknowledged() {
    // Arrange
    let (app, db) = setup_app().await;
    let payload = create_test_webhook_payload(
        "customer.subscription.updated",
        json!({ "id": "sub_broken", "object": "subscription" }),
    );

    // Act
    let (status, body) = post_signed_webhook(&app, &payload).await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "undecodable_object");
    assert!(all_subscriptions(&db.connection).await.is_empty());
}

#[tokio::test]
async fn test_unknown_status_is_acknowledged_without_write() {
    // Arrange
    let (app, db) = setup_app().await;
    let user_id = Uuid::new_v4();
    link_customer(&db.connection, user_id, "cus_status").await;
    let payload = create_test_webhook_payload(
        "customer.subscription.updated",
        subscription_object("sub_status", "cus_status", "mystery", PERIOD_1_END, None),
    );
    let signature = generate_test_webhook_signature(&payload);

    // Act
    let (status, body) = post_webhook(&app, &payload, Some(&signature)).await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "undecodable_object");
    assert!(all_subscriptions(&db.connection).await.is_empty());
}
