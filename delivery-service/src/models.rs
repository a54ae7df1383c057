use chrono::{DateTime, Utc};
use diesel::prelude::*;
use shared::*;
use uuid::Uuid;

use crate::store::StoreError;

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = crate::schema::parcels)]
pub struct DbParcel {
    pub id: Uuid,
    pub sender_email: String,
    pub parcel_name: String,
    pub cost: bigdecimal::BigDecimal,
    pub payment_status: String,
    pub tracking_id: Option<String>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = crate::schema::payments)]
pub struct DbPayment {
    pub id: Uuid,
    pub amount: bigdecimal::BigDecimal,
    pub currency: String,
    pub customer_email: String,
    pub parcel_id: Uuid,
    pub parcel_name: String,
    pub transaction_id: String,
    pub payment_status: String,
    pub paid_at: DateTime<Utc>,
    pub tracking_id: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::users)]
pub struct DbUser {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = crate::schema::riders)]
pub struct DbRider {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub region: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<Parcel> for DbParcel {
    fn from(parcel: Parcel) -> Self {
        Self {
            id: parcel.id,
            sender_email: parcel.sender_email,
            parcel_name: parcel.parcel_name,
            cost: parcel.cost,
            payment_status: parcel.payment_status.as_str().to_string(),
            tracking_id: parcel.tracking_id,
            details: serde_json::Value::Object(parcel.details),
            created_at: parcel.created_at,
        }
    }
}

impl TryFrom<DbParcel> for Parcel {
    type Error = StoreError;

    fn try_from(row: DbParcel) -> Result<Self, Self::Error> {
        let payment_status = PaymentStatus::parse(&row.payment_status).ok_or_else(|| {
            StoreError::Corrupt(format!("parcel {} has status '{}'", row.id, row.payment_status))
        })?;
        let details = match row.details {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };

        Ok(Self {
            id: row.id,
            sender_email: row.sender_email,
            parcel_name: row.parcel_name,
            cost: row.cost,
            payment_status,
            tracking_id: row.tracking_id,
            created_at: row.created_at,
            details,
        })
    }
}

impl From<PaymentRecord> for DbPayment {
    fn from(record: PaymentRecord) -> Self {
        Self {
            id: record.id,
            amount: record.amount,
            currency: record.currency,
            customer_email: record.customer_email,
            parcel_id: record.parcel_id,
            parcel_name: record.parcel_name,
            transaction_id: record.transaction_id,
            payment_status: record.payment_status.as_str().to_string(),
            paid_at: record.paid_at,
            tracking_id: record.tracking_id,
        }
    }
}

impl TryFrom<DbPayment> for PaymentRecord {
    type Error = StoreError;

    fn try_from(row: DbPayment) -> Result<Self, Self::Error> {
        let payment_status = PaymentStatus::parse(&row.payment_status).ok_or_else(|| {
            StoreError::Corrupt(format!("payment {} has status '{}'", row.id, row.payment_status))
        })?;

        Ok(Self {
            id: row.id,
            amount: row.amount,
            currency: row.currency,
            customer_email: row.customer_email,
            parcel_id: row.parcel_id,
            parcel_name: row.parcel_name,
            transaction_id: row.transaction_id,
            payment_status,
            paid_at: row.paid_at,
            tracking_id: row.tracking_id,
        })
    }
}

impl From<User> for DbUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            display_name: user.display_name,
            photo_url: user.photo_url,
            role: user.role,
            created_at: user.created_at,
        }
    }
}

impl From<Rider> for DbRider {
    fn from(rider: Rider) -> Self {
        Self {
            id: rider.id,
            name: rider.name,
            email: rider.email,
            phone: rider.phone,
            region: rider.region,
            status: rider.status.as_str().to_string(),
            created_at: rider.created_at,
        }
    }
}

impl TryFrom<DbRider> for Rider {
    type Error = StoreError;

    fn try_from(row: DbRider) -> Result<Self, Self::Error> {
        let status = RiderStatus::parse(&row.status).ok_or_else(|| {
            StoreError::Corrupt(format!("rider {} has status '{}'", row.id, row.status))
        })?;

        Ok(Self {
            id: row.id,
            name: row.name,
            email: row.email,
            phone: row.phone,
            region: row.region,
            status,
            created_at: row.created_at,
        })
    }
}
