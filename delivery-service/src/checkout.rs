use shared::*;
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::gateway::{CheckoutGatewayRef, GatewayError};
use crate::store::ParcelStoreRef;

#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    pub site_domain: String,
    pub currency: String,
}

impl CheckoutConfig {
    // `{CHECKOUT_SESSION_ID}` is substituted by the gateway on redirect.
    pub fn success_url(&self) -> String {
        format!(
            "{}/dashboard/payment-success?session_id={{CHECKOUT_SESSION_ID}}",
            self.site_domain.trim_end_matches('/')
        )
    }

    pub fn cancel_url(&self) -> String {
        format!(
            "{}/dashboard/payment-cancelled?session_id={{CHECKOUT_SESSION_ID}}",
            self.site_domain.trim_end_matches('/')
        )
    }
}

/// Turns a checkout request into a gateway-hosted payment session. Nothing is
/// written locally; the ledger row appears only once payment is confirmed.
#[derive(Clone)]
pub struct CheckoutInitiator {
    gateway: CheckoutGatewayRef,
    parcels: ParcelStoreRef,
    config: CheckoutConfig,
}

impl CheckoutInitiator {
    pub fn new(gateway: CheckoutGatewayRef, parcels: ParcelStoreRef, config: CheckoutConfig) -> Self {
        Self {
            gateway,
            parcels,
            config,
        }
    }

    pub fn session_request(&self, checkout: ValidatedCheckout) -> SessionRequest {
        SessionRequest {
            amount_minor: checkout.amount_minor,
            currency: self.config.currency.clone(),
            product_name: checkout.parcel_name.clone(),
            customer_email: checkout.sender_email,
            metadata: SessionMetadata {
                parcel_id: Some(checkout.parcel_id.to_string()),
                parcel_name: Some(checkout.parcel_name),
            },
            success_url: self.config.success_url(),
            cancel_url: self.config.cancel_url(),
        }
    }

    /// Returns the URL the client should be redirected to.
    pub async fn create_session(&self, request: CheckoutRequest) -> Result<String> {
        let checkout = request.validate().map_err(AppError::Validation)?;
        let parcel_id = checkout.parcel_id;

        let parcel = self
            .parcels
            .get_parcel(parcel_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Parcel not found".to_string()))?;
        if parcel.payment_status == PaymentStatus::Paid {
            warn!("Refusing checkout for parcel {}, already paid", parcel_id);
            return Err(AppError::Conflict(format!("parcel {} is already paid", parcel_id)));
        }

        let session_request = self.session_request(checkout);

        let session = self.gateway.create_session(&session_request).await?;
        let url = session.url.ok_or_else(|| {
            GatewayError::MalformedSession(format!("session {} has no redirect url", session.id))
        })?;

        info!(
            "Checkout session {} opened for parcel {} ({} minor units)",
            session.id, parcel_id, session_request.amount_minor
        );
        Ok(url)
    }
}
