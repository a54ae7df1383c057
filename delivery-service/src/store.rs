//! Persistence ports and the in-memory adapter.
//!
//! The store holds three independent collections (parcels, payments and
//! accounts). Referential integrity between a payment and its parcel is kept by
//! [`PaymentStore::commit_payment`], which is the only writer that touches both.

use async_trait::async_trait;
use shared::*;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transaction {0} has already been recorded")]
    DuplicateTransaction(String),
    #[error("parcel {0} not found")]
    ParcelNotFound(Uuid),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("connection pool error: {0}")]
    Pool(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait ParcelStore: Send + Sync {
    async fn insert_parcel(&self, parcel: Parcel) -> Result<Parcel>;
    /// Newest first, optionally restricted to one sender.
    async fn list_parcels(&self, sender_email: Option<&str>) -> Result<Vec<Parcel>>;
    async fn get_parcel(&self, id: Uuid) -> Result<Option<Parcel>>;
    /// Returns the number of parcels removed (0 or 1).
    async fn delete_parcel(&self, id: Uuid) -> Result<u64>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn find_by_transaction(&self, transaction_id: &str) -> Result<Option<PaymentRecord>>;

    /// Marks the parcel paid and appends the ledger row as one unit of work.
    ///
    /// Fails with [`StoreError::DuplicateTransaction`] when a row for the same
    /// transaction already exists and with [`StoreError::ParcelNotFound`] when
    /// the parcel is gone; neither case writes anything. A parcel that is
    /// already paid keeps its tracking id and the new row reuses it.
    async fn commit_payment(&self, payment: NewPaymentRecord) -> Result<PaymentRecord>;

    /// Newest first.
    async fn payments_by_email(&self, customer_email: &str) -> Result<Vec<PaymentRecord>>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Returns false when a user with the same email already exists.
    async fn insert_user(&self, user: User) -> Result<bool>;
    async fn insert_rider(&self, rider: Rider) -> Result<Rider>;
    async fn list_riders(&self, status: Option<RiderStatus>) -> Result<Vec<Rider>>;
    async fn update_rider_status(&self, id: Uuid, status: RiderStatus) -> Result<Option<Rider>>;
}

pub type ParcelStoreRef = Arc<dyn ParcelStore>;
pub type PaymentStoreRef = Arc<dyn PaymentStore>;
pub type AccountStoreRef = Arc<dyn AccountStore>;

#[derive(Default)]
struct Collections {
    parcels: HashMap<Uuid, Parcel>,
    payments: Vec<PaymentRecord>,
    users: HashMap<String, User>,
    riders: HashMap<Uuid, Rider>,
}

/// A store kept entirely in process memory.
///
/// All collections sit behind one lock so that `commit_payment` is atomic with
/// respect to every other operation, matching the transactional adapter.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Collections>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ParcelStore for InMemoryStore {
    async fn insert_parcel(&self, parcel: Parcel) -> Result<Parcel> {
        let mut inner = self.inner.write().await;
        inner.parcels.insert(parcel.id, parcel.clone());
        Ok(parcel)
    }

    async fn list_parcels(&self, sender_email: Option<&str>) -> Result<Vec<Parcel>> {
        let inner = self.inner.read().await;
        let mut parcels: Vec<Parcel> = inner
            .parcels
            .values()
            .filter(|p| sender_email.map_or(true, |email| p.sender_email == email))
            .cloned()
            .collect();
        parcels.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(parcels)
    }

    async fn get_parcel(&self, id: Uuid) -> Result<Option<Parcel>> {
        let inner = self.inner.read().await;
        Ok(inner.parcels.get(&id).cloned())
    }

    async fn delete_parcel(&self, id: Uuid) -> Result<u64> {
        let mut inner = self.inner.write().await;
        Ok(inner.parcels.remove(&id).map_or(0, |_| 1))
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn find_by_transaction(&self, transaction_id: &str) -> Result<Option<PaymentRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .payments
            .iter()
            .find(|p| p.transaction_id == transaction_id)
            .cloned())
    }

    async fn commit_payment(&self, payment: NewPaymentRecord) -> Result<PaymentRecord> {
        let mut inner = self.inner.write().await;

        if inner
            .payments
            .iter()
            .any(|p| p.transaction_id == payment.transaction_id)
        {
            return Err(StoreError::DuplicateTransaction(payment.transaction_id));
        }

        let parcel = inner
            .parcels
            .get_mut(&payment.parcel_id)
            .ok_or(StoreError::ParcelNotFound(payment.parcel_id))?;

        let already_paid = parcel
            .tracking_id
            .clone()
            .filter(|_| parcel.payment_status == PaymentStatus::Paid);
        let tracking_id = match already_paid {
            Some(existing) => {
                warn!(
                    "Parcel {} already paid, recording transaction {} under {}",
                    parcel.id, payment.transaction_id, existing
                );
                existing
            }
            None => {
                parcel.payment_status = PaymentStatus::Paid;
                parcel.tracking_id = Some(payment.tracking_id.clone());
                payment.tracking_id.clone()
            }
        };

        let record = payment.into_record(tracking_id);
        inner.payments.push(record.clone());
        Ok(record)
    }

    async fn payments_by_email(&self, customer_email: &str) -> Result<Vec<PaymentRecord>> {
        let inner = self.inner.read().await;
        let mut payments: Vec<PaymentRecord> = inner
            .payments
            .iter()
            .filter(|p| p.customer_email == customer_email)
            .cloned()
            .collect();
        payments.sort_by(|a, b| b.paid_at.cmp(&a.paid_at));
        Ok(payments)
    }
}

#[async_trait]
impl AccountStore for InMemoryStore {
    async fn insert_user(&self, user: User) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if inner.users.contains_key(&user.email) {
            return Ok(false);
        }
        inner.users.insert(user.email.clone(), user);
        Ok(true)
    }

    async fn insert_rider(&self, rider: Rider) -> Result<Rider> {
        let mut inner = self.inner.write().await;
        inner.riders.insert(rider.id, rider.clone());
        Ok(rider)
    }

    async fn list_riders(&self, status: Option<RiderStatus>) -> Result<Vec<Rider>> {
        let inner = self.inner.read().await;
        let mut riders: Vec<Rider> = inner
            .riders
            .values()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        riders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(riders)
    }

    async fn update_rider_status(&self, id: Uuid, status: RiderStatus) -> Result<Option<Rider>> {
        let mut inner = self.inner.write().await;
        Ok(inner.riders.get_mut(&id).map(|rider| {
            rider.status = status;
            rider.clone()
        }))
    }
}
