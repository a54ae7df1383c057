//! Payment gateway port and its Stripe Checkout adapter.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use shared::*;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request timed out")]
    Timeout,
    #[error("gateway transport error: {0}")]
    Transport(String),
    #[error("gateway rejected request ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("malformed checkout session: {0}")]
    MalformedSession(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GatewayError::Timeout
        } else if e.is_decode() {
            GatewayError::MalformedSession(e.to_string())
        } else {
            GatewayError::Transport(e.to_string())
        }
    }
}

#[async_trait]
pub trait CheckoutGateway: Send + Sync {
    async fn create_session(&self, request: &SessionRequest) -> Result<CheckoutSession, GatewayError>;
    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, GatewayError>;
}

pub type CheckoutGatewayRef = Arc<dyn CheckoutGateway>;

#[derive(Debug, Deserialize)]
struct StripeSession {
    id: String,
    url: Option<String>,
    payment_status: SessionPaymentStatus,
    payment_intent: Option<String>,
    amount_total: Option<i64>,
    currency: Option<String>,
    customer_email: Option<String>,
    customer_details: Option<StripeCustomerDetails>,
    #[serde(default)]
    metadata: SessionMetadata,
}

#[derive(Debug, Deserialize)]
struct StripeCustomerDetails {
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

impl From<StripeSession> for CheckoutSession {
    fn from(session: StripeSession) -> Self {
        let customer_email = session
            .customer_email
            .or_else(|| session.customer_details.and_then(|d| d.email));

        Self {
            id: session.id,
            url: session.url,
            payment_status: session.payment_status,
            payment_intent: session.payment_intent,
            amount_total: session.amount_total,
            currency: session.currency,
            customer_email,
            metadata: session.metadata,
        }
    }
}

#[derive(Clone)]
pub struct StripeGateway {
    http: Client,
    api_base: String,
    secret_key: String,
}

impl StripeGateway {
    pub fn new(secret_key: String, api_base: String, timeout: Duration) -> Result<Self, GatewayError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            secret_key,
        })
    }

    async fn read_session(response: reqwest::Response) -> Result<CheckoutSession, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<StripeErrorBody>(&body)
                .ok()
                .and_then(|b| b.error.message)
                .unwrap_or(body);
            error!("Stripe returned {}: {}", status, message);
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let session: StripeSession = response.json().await?;
        Ok(session.into())
    }
}

/// Stripe's bracketed form encoding for a single-line-item payment session.
pub fn session_form(request: &SessionRequest) -> Vec<(String, String)> {
    let mut form = vec![
        ("mode".to_string(), "payment".to_string()),
        ("line_items[0][quantity]".to_string(), "1".to_string()),
        (
            "line_items[0][price_data][currency]".to_string(),
            request.currency.clone(),
        ),
        (
            "line_items[0][price_data][unit_amount]".to_string(),
            request.amount_minor.to_string(),
        ),
        (
            "line_items[0][price_data][product_data][name]".to_string(),
            request.product_name.clone(),
        ),
        ("customer_email".to_string(), request.customer_email.clone()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
    ];

    if let Some(parcel_id) = &request.metadata.parcel_id {
        form.push((format!("metadata[{}]", METADATA_PARCEL_ID), parcel_id.clone()));
    }
    if let Some(parcel_name) = &request.metadata.parcel_name {
        form.push((format!("metadata[{}]", METADATA_PARCEL_NAME), parcel_name.clone()));
    }

    form
}

#[async_trait]
impl CheckoutGateway for StripeGateway {
    async fn create_session(&self, request: &SessionRequest) -> Result<CheckoutSession, GatewayError> {
        let response = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&session_form(request))
            .send()
            .await?;

        let session = Self::read_session(response).await?;
        info!("Created checkout session {}", session.id);
        Ok(session)
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, GatewayError> {
        let response = self
            .http
            .get(format!("{}/v1/checkout/sessions/{}", self.api_base, session_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        Self::read_session(response).await
    }
}
