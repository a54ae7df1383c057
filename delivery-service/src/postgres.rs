use async_trait::async_trait;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use shared::*;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::*;
use crate::schema::*;
use crate::store::{AccountStore, ParcelStore, PaymentStore, Result, StoreError};

pub type DbPool = Pool<AsyncPgConnection>;

/// Postgres-backed store. The pool is created once at startup and shared by
/// every request task.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        let pool = bb8::Pool::builder()
            .max_size(max_connections)
            .connection_timeout(Duration::from_secs(10))
            .build(manager)
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))?;
        Ok(Self::new(pool))
    }

    async fn conn(&self) -> Result<PooledConnection<'_, AsyncPgConnection>> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))
    }
}

#[async_trait]
impl ParcelStore for PgStore {
    async fn insert_parcel(&self, parcel: Parcel) -> Result<Parcel> {
        let mut conn = self.conn().await?;
        let row = DbParcel::from(parcel.clone());

        diesel::insert_into(parcels::table)
            .values(&row)
            .execute(&mut conn)
            .await?;

        Ok(parcel)
    }

    async fn list_parcels(&self, sender_email: Option<&str>) -> Result<Vec<Parcel>> {
        let mut conn = self.conn().await?;

        let mut query = parcels::table
            .order(parcels::created_at.desc())
            .into_boxed();
        if let Some(email) = sender_email {
            query = query.filter(parcels::sender_email.eq(email.to_string()));
        }

        query
            .load::<DbParcel>(&mut conn)
            .await?
            .into_iter()
            .map(Parcel::try_from)
            .collect()
    }

    async fn get_parcel(&self, id: Uuid) -> Result<Option<Parcel>> {
        let mut conn = self.conn().await?;

        parcels::table
            .find(id)
            .first::<DbParcel>(&mut conn)
            .await
            .optional()?
            .map(Parcel::try_from)
            .transpose()
    }

    async fn delete_parcel(&self, id: Uuid) -> Result<u64> {
        let mut conn = self.conn().await?;

        let deleted = diesel::delete(parcels::table.find(id))
            .execute(&mut conn)
            .await?;

        Ok(deleted as u64)
    }
}

#[async_trait]
impl PaymentStore for PgStore {
    async fn find_by_transaction(&self, transaction_id: &str) -> Result<Option<PaymentRecord>> {
        let mut conn = self.conn().await?;

        payments::table
            .filter(payments::transaction_id.eq(transaction_id))
            .first::<DbPayment>(&mut conn)
            .await
            .optional()?
            .map(PaymentRecord::try_from)
            .transpose()
    }

    async fn commit_payment(&self, payment: NewPaymentRecord) -> Result<PaymentRecord> {
        let mut conn = self.conn().await?;

        conn.transaction::<_, StoreError, _>(|conn| {
            Box::pin(async move {
                let parcel = parcels::table
                    .find(payment.parcel_id)
                    .for_update()
                    .first::<DbParcel>(conn)
                    .await
                    .optional()?
                    .ok_or(StoreError::ParcelNotFound(payment.parcel_id))?;

                let already_paid = parcel
                    .tracking_id
                    .clone()
                    .filter(|_| parcel.payment_status == PaymentStatus::Paid.as_str());

                let tracking_id = match already_paid {
                    Some(existing) => {
                        warn!(
                            "Parcel {} already paid, recording transaction {} under {}",
                            parcel.id, payment.transaction_id, existing
                        );
                        existing
                    }
                    None => {
                        diesel::update(parcels::table.find(parcel.id))
                            .set((
                                parcels::payment_status.eq(PaymentStatus::Paid.as_str()),
                                parcels::tracking_id.eq(&payment.tracking_id),
                            ))
                            .execute(conn)
                            .await?;
                        payment.tracking_id.clone()
                    }
                };

                let record = payment.into_record(tracking_id);
                let row = DbPayment::from(record.clone());

                match diesel::insert_into(payments::table)
                    .values(&row)
                    .execute(conn)
                    .await
                {
                    Ok(_) => Ok(record),
                    Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                        Err(StoreError::DuplicateTransaction(record.transaction_id))
                    }
                    Err(e) => Err(e.into()),
                }
            })
        })
        .await
    }

    async fn payments_by_email(&self, customer_email: &str) -> Result<Vec<PaymentRecord>> {
        let mut conn = self.conn().await?;

        payments::table
            .filter(payments::customer_email.eq(customer_email))
            .order(payments::paid_at.desc())
            .load::<DbPayment>(&mut conn)
            .await?
            .into_iter()
            .map(PaymentRecord::try_from)
            .collect()
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn insert_user(&self, user: User) -> Result<bool> {
        let mut conn = self.conn().await?;
        let row = DbUser::from(user);

        let inserted = diesel::insert_into(users::table)
            .values(&row)
            .on_conflict(users::email)
            .do_nothing()
            .execute(&mut conn)
            .await?;

        if inserted > 0 {
            info!("Registered user {}", row.email);
        }
        Ok(inserted > 0)
    }

    async fn insert_rider(&self, rider: Rider) -> Result<Rider> {
        let mut conn = self.conn().await?;
        let row = DbRider::from(rider.clone());

        diesel::insert_into(riders::table)
            .values(&row)
            .execute(&mut conn)
            .await?;

        Ok(rider)
    }

    async fn list_riders(&self, status: Option<RiderStatus>) -> Result<Vec<Rider>> {
        let mut conn = self.conn().await?;

        let mut query = riders::table.order(riders::created_at.desc()).into_boxed();
        if let Some(status) = status {
            query = query.filter(riders::status.eq(status.as_str()));
        }

        query
            .load::<DbRider>(&mut conn)
            .await?
            .into_iter()
            .map(Rider::try_from)
            .collect()
    }

    async fn update_rider_status(&self, id: Uuid, status: RiderStatus) -> Result<Option<Rider>> {
        let mut conn = self.conn().await?;

        diesel::update(riders::table.find(id))
            .set(riders::status.eq(status.as_str()))
            .get_result::<DbRider>(&mut conn)
            .await
            .optional()?
            .map(Rider::try_from)
            .transpose()
    }
}
