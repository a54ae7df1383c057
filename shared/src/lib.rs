use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod tracking;

/// Metadata keys the reconciler trusts to re-associate a payment with its parcel.
pub const METADATA_PARCEL_ID: &str = "parcelId";
pub const METADATA_PARCEL_NAME: &str = "parcelName";

/// Serialized parcel fields owned by the server. Free-form details may not
/// carry these keys, or they would shadow the real fields on output.
pub const RESERVED_PARCEL_FIELDS: &[&str] = &[
    "id",
    "senderEmail",
    "parcelName",
    "cost",
    "paymentStatus",
    "trackingId",
    "createdAt",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paid => "paid",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "unpaid" => Some(PaymentStatus::Unpaid),
            "paid" => Some(PaymentStatus::Paid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parcel {
    pub id: Uuid,
    pub sender_email: String,
    pub parcel_name: String,
    pub cost: BigDecimal,
    pub payment_status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_id: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Free-form delivery details supplied by the client (addresses, weight, ...).
    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewParcel {
    pub parcel_name: String,
    pub sender_email: String,
    pub cost: f64,
    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl NewParcel {
    pub fn reserved_detail(&self) -> Option<&str> {
        self.details
            .keys()
            .map(String::as_str)
            .find(|key| RESERVED_PARCEL_FIELDS.contains(key))
    }
}

impl Parcel {
    pub fn new(data: NewParcel, cost: BigDecimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_email: data.sender_email,
            parcel_name: data.parcel_name,
            cost,
            payment_status: PaymentStatus::Unpaid,
            tracking_id: None,
            created_at: Utc::now(),
            details: data.details,
        }
    }
}

/// A committed payment. Rows are append-only: one per gateway transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub id: Uuid,
    pub amount: BigDecimal,
    pub currency: String,
    pub customer_email: String,
    pub parcel_id: Uuid,
    pub parcel_name: String,
    pub transaction_id: String,
    pub payment_status: PaymentStatus,
    pub paid_at: DateTime<Utc>,
    pub tracking_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPaymentRecord {
    pub amount: BigDecimal,
    pub currency: String,
    pub customer_email: String,
    pub parcel_id: Uuid,
    pub parcel_name: String,
    pub transaction_id: String,
    pub tracking_id: String,
}

impl NewPaymentRecord {
    /// Materialises the ledger row. `tracking_id` is whatever the store decided
    /// the parcel carries, which may differ from the one proposed.
    pub fn into_record(self, tracking_id: String) -> PaymentRecord {
        PaymentRecord {
            id: Uuid::new_v4(),
            amount: self.amount,
            currency: self.currency,
            customer_email: self.customer_email,
            parcel_id: self.parcel_id,
            parcel_name: self.parcel_name,
            transaction_id: self.transaction_id,
            payment_status: PaymentStatus::Paid,
            paid_at: Utc::now(),
            tracking_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub cost: f64,
    pub parcel_name: String,
    pub sender_email: String,
    pub parcel_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedCheckout {
    pub amount_minor: i64,
    pub parcel_name: String,
    pub sender_email: String,
    pub parcel_id: Uuid,
}

impl CheckoutRequest {
    pub fn validate(self) -> Result<ValidatedCheckout, String> {
        if !is_chargeable_cost(self.cost) {
            return Err("cost must be at least one cent".to_string());
        }
        let parcel_name = self.parcel_name.trim().to_string();
        if parcel_name.is_empty() {
            return Err("parcelName must not be empty".to_string());
        }
        let sender_email = self.sender_email.trim().to_string();
        if !is_plausible_email(&sender_email) {
            return Err("senderEmail is not a valid email address".to_string());
        }
        let parcel_id = Uuid::parse_str(self.parcel_id.trim())
            .map_err(|_| format!("parcelId '{}' is not a valid identifier", self.parcel_id))?;

        Ok(ValidatedCheckout {
            amount_minor: to_minor_units(self.cost),
            parcel_name,
            sender_email,
            parcel_id,
        })
    }
}

/// A cost the gateway can charge: finite and worth at least one cent once rounded.
pub fn is_chargeable_cost(cost: f64) -> bool {
    cost.is_finite() && to_minor_units(cost) > 0
}

/// Nearest integer number of cents.
pub fn to_minor_units(cost: f64) -> i64 {
    (cost * 100.0).round() as i64
}

pub fn to_major_units(amount_minor: i64) -> BigDecimal {
    BigDecimal::new(amount_minor.into(), 2)
}

pub fn is_plausible_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    #[serde(rename = "parcelId", default, skip_serializing_if = "Option::is_none")]
    pub parcel_id: Option<String>,
    #[serde(rename = "parcelName", default, skip_serializing_if = "Option::is_none")]
    pub parcel_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
    #[serde(other)]
    Unknown,
}

impl SessionPaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPaymentStatus::Paid => "paid",
            SessionPaymentStatus::Unpaid => "unpaid",
            SessionPaymentStatus::NoPaymentRequired => "no_payment_required",
            SessionPaymentStatus::Unknown => "unknown",
        }
    }
}

/// Gateway-hosted checkout session, as seen by this service.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
    pub payment_status: SessionPaymentStatus,
    pub payment_intent: Option<String>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub customer_email: Option<String>,
    pub metadata: SessionMetadata,
}

/// What the service asks the gateway to host.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRequest {
    pub amount_minor: i64,
    pub currency: String,
    pub product_name: String,
    pub customer_email: String,
    pub metadata: SessionMetadata,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

impl User {
    pub fn new(data: NewUser) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: data.email,
            display_name: data.display_name,
            photo_url: data.photo_url,
            role: "user".to_string(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiderStatus {
    Pending,
    Approved,
    Rejected,
}

impl RiderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiderStatus::Pending => "pending",
            RiderStatus::Approved => "approved",
            RiderStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(RiderStatus::Pending),
            "approved" => Some(RiderStatus::Approved),
            "rejected" => Some(RiderStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rider {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub region: String,
    pub status: RiderStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRider {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub region: String,
}

impl Rider {
    pub fn new(data: NewRider) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: data.name,
            email: data.email,
            phone: data.phone,
            region: data.region,
            status: RiderStatus::Pending,
            created_at: Utc::now(),
        }
    }
}
