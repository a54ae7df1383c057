//! Payment confirmation.
//!
//! A parcel moves from unpaid to paid exactly once. `confirm` is safe to call
//! any number of times for the same checkout session: the gateway transaction
//! id is the idempotency key, and the store's uniqueness constraint on it is
//! what actually prevents double commits when two confirmations race.

use shared::tracking::generate_tracking_id;
use shared::*;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::gateway::{CheckoutGatewayRef, GatewayError};
use crate::store::{PaymentStoreRef, StoreError};

#[derive(Debug, Clone, PartialEq)]
pub enum Confirmation {
    /// This call committed the payment.
    Committed(PaymentRecord),
    /// The transaction had already been committed, possibly by a concurrent call.
    Replayed {
        transaction_id: String,
        tracking_id: String,
    },
    /// The gateway does not consider the session paid; nothing was written.
    NotPaid {
        session_id: String,
        payment_status: SessionPaymentStatus,
    },
}

#[derive(Clone)]
pub struct PaymentReconciler {
    gateway: CheckoutGatewayRef,
    payments: PaymentStoreRef,
}

pub fn is_session_id(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 255
        && value.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

impl PaymentReconciler {
    pub fn new(gateway: CheckoutGatewayRef, payments: PaymentStoreRef) -> Self {
        Self { gateway, payments }
    }

    pub async fn confirm(&self, session_id: &str) -> Result<Confirmation> {
        if !is_session_id(session_id) {
            return Err(AppError::Validation(format!(
                "session_id '{}' is not a valid checkout session id",
                session_id
            )));
        }

        let session = self.gateway.retrieve_session(session_id).await?;

        if let Some(transaction_id) = session.payment_intent.as_deref() {
            if let Some(existing) = self.payments.find_by_transaction(transaction_id).await? {
                info!("Transaction {} already processed, returning cached result", transaction_id);
                return Ok(Confirmation::Replayed {
                    transaction_id: existing.transaction_id,
                    tracking_id: existing.tracking_id,
                });
            }
        }

        if session.payment_status != SessionPaymentStatus::Paid {
            warn!(
                "Session {} not paid yet (status {})",
                session.id,
                session.payment_status.as_str()
            );
            return Ok(Confirmation::NotPaid {
                session_id: session.id,
                payment_status: session.payment_status,
            });
        }

        let payment = payment_from_session(&session, generate_tracking_id())?;
        let transaction_id = payment.transaction_id.clone();

        match self.payments.commit_payment(payment).await {
            Ok(record) => {
                info!(
                    "Parcel {} paid via {}, tracking id {}",
                    record.parcel_id, record.transaction_id, record.tracking_id
                );
                Ok(Confirmation::Committed(record))
            }
            Err(StoreError::DuplicateTransaction(_)) => {
                warn!("Transaction {} committed concurrently, reusing result", transaction_id);
                let existing = self
                    .payments
                    .find_by_transaction(&transaction_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::Internal(format!(
                            "transaction {} reported as duplicate but not found",
                            transaction_id
                        ))
                    })?;
                Ok(Confirmation::Replayed {
                    transaction_id: existing.transaction_id,
                    tracking_id: existing.tracking_id,
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Builds the ledger row from a paid session. Only the session metadata links
/// the payment back to its parcel.
pub fn payment_from_session(
    session: &CheckoutSession,
    tracking_id: String,
) -> std::result::Result<NewPaymentRecord, GatewayError> {
    let malformed = |what: &str| {
        GatewayError::MalformedSession(format!("session {} has no {}", session.id, what))
    };

    let transaction_id = session
        .payment_intent
        .clone()
        .ok_or_else(|| malformed("payment intent"))?;
    let parcel_id = session
        .metadata
        .parcel_id
        .as_deref()
        .ok_or_else(|| malformed("parcelId metadata"))?;
    let parcel_id = Uuid::parse_str(parcel_id).map_err(|_| {
        GatewayError::MalformedSession(format!(
            "session {} carries invalid parcelId '{}'",
            session.id, parcel_id
        ))
    })?;
    let amount_total = session.amount_total.ok_or_else(|| malformed("amount"))?;
    let currency = session.currency.clone().ok_or_else(|| malformed("currency"))?;
    let customer_email = session
        .customer_email
        .clone()
        .ok_or_else(|| malformed("customer email"))?;

    Ok(NewPaymentRecord {
        amount: to_major_units(amount_total),
        currency,
        customer_email,
        parcel_id,
        parcel_name: session.metadata.parcel_name.clone().unwrap_or_default(),
        transaction_id,
        tracking_id,
    })
}
