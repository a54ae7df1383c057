#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use delivery_service::api::{create_router, AppState};
use delivery_service::auth::{AuthError, TokenVerifier, VerifiedIdentity};
use delivery_service::checkout::CheckoutConfig;
use delivery_service::gateway::{CheckoutGateway, GatewayError};
use delivery_service::store::{InMemoryStore, ParcelStore};
use shared::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use uuid::Uuid;

/// Scripted stand-in for the hosted checkout gateway.
#[derive(Default)]
pub struct FakeGateway {
    sessions: Mutex<HashMap<String, CheckoutSession>>,
    created: Mutex<Vec<SessionRequest>>,
    retrievals: AtomicUsize,
    failing: AtomicBool,
}

impl FakeGateway {
    pub fn put_session(&self, session: CheckoutSession) {
        self.sessions.lock().unwrap().insert(session.id.clone(), session);
    }

    pub fn fail_requests(&self, fail: bool) {
        self.failing.store(fail, Ordering::SeqCst);
    }

    pub fn created(&self) -> Vec<SessionRequest> {
        self.created.lock().unwrap().clone()
    }

    pub fn retrievals(&self) -> usize {
        self.retrievals.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CheckoutGateway for FakeGateway {
    async fn create_session(&self, request: &SessionRequest) -> Result<CheckoutSession, GatewayError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("connection refused".to_string()));
        }

        let mut created = self.created.lock().unwrap();
        created.push(request.clone());
        let id = format!("cs_test_{}", created.len());

        let session = CheckoutSession {
            id: id.clone(),
            url: Some(format!("https://checkout.example/pay/{}", id)),
            payment_status: SessionPaymentStatus::Unpaid,
            payment_intent: None,
            amount_total: Some(request.amount_minor),
            currency: Some(request.currency.clone()),
            customer_email: Some(request.customer_email.clone()),
            metadata: request.metadata.clone(),
        };
        self.sessions.lock().unwrap().insert(id, session.clone());
        Ok(session)
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, GatewayError> {
        // Give concurrent confirmations a chance to interleave.
        tokio::task::yield_now().await;
        self.retrievals.fetch_add(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::Timeout);
        }
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| GatewayError::Api {
                status: 404,
                message: format!("No such checkout.session: '{}'", session_id),
            })
    }
}

/// Accepts a fixed set of tokens.
#[derive(Default)]
pub struct FakeVerifier {
    tokens: HashMap<String, String>,
}

impl FakeVerifier {
    pub fn with_token(mut self, token: &str, email: &str) -> Self {
        self.tokens.insert(token.to_string(), email.to_string());
        self
    }
}

#[async_trait]
impl TokenVerifier for FakeVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
        self.tokens
            .get(token)
            .map(|email| VerifiedIdentity {
                email: email.clone(),
            })
            .ok_or(AuthError::InvalidCredential)
    }
}

pub fn checkout_config() -> CheckoutConfig {
    CheckoutConfig {
        site_domain: "https://zapshift.example".to_string(),
        currency: "usd".to_string(),
    }
}

pub fn session(id: &str, status: SessionPaymentStatus, intent: Option<&str>, parcel_id: Uuid, name: &str) -> CheckoutSession {
    CheckoutSession {
        id: id.to_string(),
        url: None,
        payment_status: status,
        payment_intent: intent.map(str::to_string),
        amount_total: Some(2550),
        currency: Some("usd".to_string()),
        customer_email: Some("a@x.com".to_string()),
        metadata: SessionMetadata {
            parcel_id: Some(parcel_id.to_string()),
            parcel_name: Some(name.to_string()),
        },
    }
}

pub fn new_parcel(email: &str, name: &str) -> Parcel {
    Parcel::new(
        NewParcel {
            parcel_name: name.to_string(),
            sender_email: email.to_string(),
            cost: 25.5,
            details: Default::default(),
        },
        "25.50".parse().unwrap(),
    )
}

pub struct TestApp {
    pub router: Router,
    pub store: InMemoryStore,
    pub gateway: Arc<FakeGateway>,
}

impl TestApp {
    pub fn new() -> Self {
        let store = InMemoryStore::new();
        let gateway = Arc::new(FakeGateway::default());
        let verifier = FakeVerifier::default()
            .with_token("token-a", "a@x.com")
            .with_token("token-b", "b@x.com");

        let state = AppState::new(store.clone(), gateway.clone(), Arc::new(verifier), checkout_config());
        Self {
            router: create_router(state),
            store,
            gateway,
        }
    }

    pub async fn seed_parcel(&self, email: &str, name: &str) -> Parcel {
        self.store.insert_parcel(new_parcel(email, name)).await.unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, body)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn get_with_token(&self, uri: &str, token: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::get(uri)
            .header("authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn send_json(&self, method: &str, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn confirm(&self, session_id: &str) -> (StatusCode, serde_json::Value) {
        let uri = format!("/payment-success?session_id={}", session_id);
        self.send(Request::patch(uri).body(Body::empty()).unwrap()).await
    }
}
