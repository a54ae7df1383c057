mod common;

use axum::http::StatusCode;
use common::{session, TestApp};
use delivery_service::reconciler::{Confirmation, PaymentReconciler};
use delivery_service::store::{InMemoryStore, ParcelStore, PaymentStore, Result as StoreResult};
use async_trait::async_trait;
use shared::tracking::is_tracking_id;
use shared::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[tokio::test]
async fn first_confirmation_marks_parcel_paid_and_records_payment() {
    let app = TestApp::new();
    let parcel = app.seed_parcel("a@x.com", "Box").await;
    app.gateway.put_session(session(
        "cs_test_1",
        SessionPaymentStatus::Paid,
        Some("pi_1"),
        parcel.id,
        "Box",
    ));

    let (status, body) = app.confirm("cs_test_1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["transactionId"], "pi_1");
    let tracking_id = body["trackingId"].as_str().unwrap().to_string();
    assert!(is_tracking_id(&tracking_id));
    assert_eq!(body["paymentInfo"]["parcelName"], "Box");
    assert_eq!(body["paymentInfo"]["amount"], "25.50");
    assert_eq!(body["paymentInfo"]["paymentStatus"], "paid");

    let stored = app.store.get_parcel(parcel.id).await.unwrap().unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::Paid);
    assert_eq!(stored.tracking_id.as_deref(), Some(tracking_id.as_str()));

    let record = app.store.find_by_transaction("pi_1").await.unwrap().unwrap();
    assert_eq!(record.parcel_id, parcel.id);
    assert_eq!(record.tracking_id, tracking_id);
    assert_eq!(record.customer_email, "a@x.com");
}

#[tokio::test]
async fn repeated_confirmation_reuses_tracking_id() {
    let app = TestApp::new();
    let parcel = app.seed_parcel("a@x.com", "Box").await;
    app.gateway.put_session(session(
        "cs_test_1",
        SessionPaymentStatus::Paid,
        Some("pi_1"),
        parcel.id,
        "Box",
    ));

    let (_, first) = app.confirm("cs_test_1").await;
    let (status, second) = app.confirm("cs_test_1").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["message"], "Payment already processed");
    assert_eq!(second["transactionId"], "pi_1");
    assert_eq!(second["trackingId"], first["trackingId"]);
    assert_eq!(app.store.payments_by_email("a@x.com").await.unwrap().len(), 1);
}

#[tokio::test]
async fn unpaid_session_has_no_side_effects() {
    let app = TestApp::new();
    let parcel = app.seed_parcel("a@x.com", "Box").await;
    app.gateway.put_session(session(
        "cs_test_1",
        SessionPaymentStatus::Unpaid,
        None,
        parcel.id,
        "Box",
    ));

    let (status, body) = app.confirm("cs_test_1").await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Payment not completed");
    assert_eq!(body["paymentStatus"], "unpaid");

    let stored = app.store.get_parcel(parcel.id).await.unwrap().unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::Unpaid);
    assert!(stored.tracking_id.is_none());
    assert!(app.store.payments_by_email("a@x.com").await.unwrap().is_empty());
}

#[tokio::test]
async fn pending_session_with_intent_writes_nothing() {
    let app = TestApp::new();
    let parcel = app.seed_parcel("a@x.com", "Box").await;
    app.gateway.put_session(session(
        "cs_test_1",
        SessionPaymentStatus::Unknown,
        Some("pi_1"),
        parcel.id,
        "Box",
    ));

    let (status, _) = app.confirm("cs_test_1").await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert!(app.store.find_by_transaction("pi_1").await.unwrap().is_none());
}

#[tokio::test]
async fn concurrent_confirmations_commit_once() {
    let app = TestApp::new();
    let parcel = app.seed_parcel("a@x.com", "Box").await;
    app.gateway.put_session(session(
        "cs_test_1",
        SessionPaymentStatus::Paid,
        Some("pi_1"),
        parcel.id,
        "Box",
    ));

    let (a, b) = tokio::join!(app.confirm("cs_test_1"), app.confirm("cs_test_1"));
    assert_eq!(a.0, StatusCode::OK);
    assert_eq!(b.0, StatusCode::OK);
    assert_eq!(a.1["trackingId"], b.1["trackingId"]);
    assert_eq!(app.store.payments_by_email("a@x.com").await.unwrap().len(), 1);
}

/// Hides existing payments from the next lookup, as if a concurrent commit had
/// not landed yet when the idempotency check ran.
struct LaggingLookup {
    inner: InMemoryStore,
    stale: AtomicBool,
}

#[async_trait]
impl PaymentStore for LaggingLookup {
    async fn find_by_transaction(&self, transaction_id: &str) -> StoreResult<Option<PaymentRecord>> {
        if self.stale.swap(false, Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner.find_by_transaction(transaction_id).await
    }

    async fn commit_payment(&self, payment: NewPaymentRecord) -> StoreResult<PaymentRecord> {
        self.inner.commit_payment(payment).await
    }

    async fn payments_by_email(&self, customer_email: &str) -> StoreResult<Vec<PaymentRecord>> {
        self.inner.payments_by_email(customer_email).await
    }
}

#[tokio::test]
async fn uniqueness_violation_is_treated_as_already_processed() {
    let store = InMemoryStore::new();
    let parcel = store.insert_parcel(common::new_parcel("a@x.com", "Box")).await.unwrap();
    let gateway = Arc::new(common::FakeGateway::default());
    gateway.put_session(session(
        "cs_test_1",
        SessionPaymentStatus::Paid,
        Some("pi_1"),
        parcel.id,
        "Box",
    ));
    let payments = Arc::new(LaggingLookup {
        inner: store.clone(),
        stale: AtomicBool::new(false),
    });
    let reconciler = PaymentReconciler::new(gateway, payments.clone());

    let first = match reconciler.confirm("cs_test_1").await.unwrap() {
        Confirmation::Committed(record) => record,
        other => panic!("expected commit, got {:?}", other),
    };

    payments.stale.store(true, Ordering::SeqCst);
    match reconciler.confirm("cs_test_1").await.unwrap() {
        Confirmation::Replayed {
            transaction_id,
            tracking_id,
        } => {
            assert_eq!(transaction_id, "pi_1");
            assert_eq!(tracking_id, first.tracking_id);
        }
        other => panic!("expected replay, got {:?}", other),
    }
    assert_eq!(store.payments_by_email("a@x.com").await.unwrap().len(), 1);
}

#[tokio::test]
async fn confirmation_for_deleted_parcel_is_not_found() {
    let app = TestApp::new();
    let parcel = app.seed_parcel("a@x.com", "Box").await;
    app.store.delete_parcel(parcel.id).await.unwrap();
    app.gateway.put_session(session(
        "cs_test_1",
        SessionPaymentStatus::Paid,
        Some("pi_1"),
        parcel.id,
        "Box",
    ));

    let (status, body) = app.confirm("cs_test_1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert!(app.store.find_by_transaction("pi_1").await.unwrap().is_none());
}

#[tokio::test]
async fn gateway_failure_is_a_server_error() {
    let app = TestApp::new();
    app.gateway.fail_requests(true);

    let (status, body) = app.confirm("cs_test_1").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["message"], "Payment gateway error");
}

#[tokio::test]
async fn unknown_session_is_a_gateway_error() {
    let app = TestApp::new();
    let (status, _) = app.confirm("cs_test_missing").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn missing_or_malformed_session_id_is_rejected_before_gateway() {
    let app = TestApp::new();

    let (status, _) = app
        .send(
            axum::http::Request::patch("/payment-success")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.confirm("cs%2F..%2Fcharges").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.gateway.retrievals(), 0);
}

#[tokio::test]
async fn checkout_then_confirm_round_trip() {
    let app = TestApp::new();
    let parcel = app.seed_parcel("a@x.com", "Box").await;

    let (status, body) = app
        .send_json(
            "POST",
            "/create-checkout-session",
            serde_json::json!({
                "cost": 25.50,
                "parcelName": "Box",
                "senderEmail": "a@x.com",
                "parcelId": parcel.id.to_string(),
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["url"], "https://checkout.example/pay/cs_test_1");

    // Not paid yet: the client came back before finishing at the gateway.
    let (status, _) = app.confirm("cs_test_1").await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);

    let mut paid = session("cs_test_1", SessionPaymentStatus::Paid, Some("pi_9"), parcel.id, "Box");
    paid.amount_total = Some(app.gateway.created()[0].amount_minor);
    app.gateway.put_session(paid);

    let (status, body) = app.confirm("cs_test_1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["paymentInfo"]["amount"], "25.50");

    let stored = app.store.get_parcel(parcel.id).await.unwrap().unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::Paid);
}
