use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{FromRef, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, patch, post},
    Router,
};
use serde::{Deserialize, Serialize};
use shared::*;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::auth::{AuthenticatedUser, TokenVerifierRef};
use crate::checkout::{CheckoutConfig, CheckoutInitiator};
use crate::error::{AppError, Result};
use crate::gateway::CheckoutGatewayRef;
use crate::reconciler::{Confirmation, PaymentReconciler};
use crate::store::{AccountStore, AccountStoreRef, ParcelStore, ParcelStoreRef, PaymentStore, PaymentStoreRef};

#[derive(Clone)]
pub struct AppState {
    pub parcels: ParcelStoreRef,
    pub payments: PaymentStoreRef,
    pub accounts: AccountStoreRef,
    pub checkout: CheckoutInitiator,
    pub reconciler: PaymentReconciler,
    pub verifier: TokenVerifierRef,
}

impl AppState {
    pub fn new<S>(
        store: S,
        gateway: CheckoutGatewayRef,
        verifier: TokenVerifierRef,
        config: CheckoutConfig,
    ) -> Self
    where
        S: ParcelStore + PaymentStore + AccountStore + 'static,
    {
        let store = Arc::new(store);
        let payments: PaymentStoreRef = store.clone();
        let parcels: ParcelStoreRef = store.clone();

        Self {
            checkout: CheckoutInitiator::new(gateway.clone(), parcels.clone(), config),
            parcels,
            accounts: store,
            reconciler: PaymentReconciler::new(gateway, payments.clone()),
            payments,
            verifier,
        }
    }
}

impl FromRef<AppState> for TokenVerifierRef {
    fn from_ref(state: &AppState) -> Self {
        state.verifier.clone()
    }
}

#[derive(Debug, Deserialize)]
pub struct EmailQuery {
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentSuccessQuery {
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RiderQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRiderRequest {
    pub status: RiderStatus,
}

#[derive(Debug, Serialize)]
pub struct CreatedResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: T,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub deleted_count: u64,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfirmedResponse {
    pub success: bool,
    pub tracking_id: String,
    pub transaction_id: String,
    pub payment_info: PaymentRecord,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReplayedResponse {
    pub message: String,
    pub transaction_id: String,
    pub tracking_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPendingResponse {
    pub success: bool,
    pub message: String,
    pub payment_status: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub message: String,
    pub inserted: bool,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/parcels", get(list_parcels).post(create_parcel))
        .route("/parcels/:id", get(get_parcel).delete(delete_parcel))
        .route("/create-checkout-session", post(create_checkout_session))
        .route("/payment-success", patch(payment_success))
        .route("/payments", get(list_payments))
        .route("/users", post(create_user))
        .route("/riders", get(list_riders).post(create_rider))
        .route("/riders/:id", patch(update_rider))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| AppError::Validation(e.body_text()))
}

fn query_params<T>(query: std::result::Result<Query<T>, QueryRejection>) -> Result<T> {
    query
        .map(|Query(params)| params)
        .map_err(|e| AppError::Validation(e.body_text()))
}

fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::Validation(format!("'{}' is not a valid id", raw)))
}

fn require_email(value: &str, field: &str) -> Result<()> {
    if is_plausible_email(value) {
        Ok(())
    } else {
        Err(AppError::Validation(format!("{} is not a valid email address", field)))
    }
}

fn require_text(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(AppError::Validation(format!("{} must not be empty", field)))
    } else {
        Ok(())
    }
}

pub async fn root() -> &'static str {
    "zap shift server is running!"
}

pub async fn health_check() -> &'static str {
    "OK"
}

pub async fn list_parcels(
    State(state): State<AppState>,
    query: std::result::Result<Query<EmailQuery>, QueryRejection>,
) -> Result<Json<Vec<Parcel>>> {
    let query = query_params(query)?;
    let parcels = state.parcels.list_parcels(query.email.as_deref()).await?;
    Ok(Json(parcels))
}

pub async fn create_parcel(
    State(state): State<AppState>,
    payload: std::result::Result<Json<NewParcel>, JsonRejection>,
) -> Result<Json<CreatedResponse<Parcel>>> {
    let request = json_body(payload)?;
    require_text(&request.parcel_name, "parcelName")?;
    require_email(&request.sender_email, "senderEmail")?;
    if !is_chargeable_cost(request.cost) {
        return Err(AppError::Validation("cost must be at least one cent".to_string()));
    }
    if let Some(key) = request.reserved_detail() {
        return Err(AppError::Validation(format!("{} cannot be set by the client", key)));
    }
    let cost = format!("{:.2}", request.cost)
        .parse::<bigdecimal::BigDecimal>()
        .map_err(|_| AppError::Validation("cost is not a valid amount".to_string()))?;

    let parcel = state.parcels.insert_parcel(Parcel::new(request, cost)).await?;
    info!("Parcel {} created for {}", parcel.id, parcel.sender_email);

    Ok(Json(CreatedResponse {
        success: true,
        message: "The parcel is added successfully".to_string(),
        data: parcel,
    }))
}

pub async fn get_parcel(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Parcel>> {
    let id = parse_id(&id)?;
    let parcel = state
        .parcels
        .get_parcel(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Parcel not found".to_string()))?;
    Ok(Json(parcel))
}

pub async fn delete_parcel(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<DeleteResponse>> {
    let id = parse_id(&id)?;
    let deleted_count = state.parcels.delete_parcel(id).await?;
    if deleted_count > 0 {
        info!("Parcel {} deleted", id);
    }
    Ok(Json(DeleteResponse { deleted_count }))
}

pub async fn create_checkout_session(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<Json<CheckoutResponse>> {
    let request = json_body(payload)?;
    let url = state.checkout.create_session(request).await?;
    Ok(Json(CheckoutResponse { url }))
}

pub async fn payment_success(
    State(state): State<AppState>,
    query: std::result::Result<Query<PaymentSuccessQuery>, QueryRejection>,
) -> Result<Response> {
    let session_id = query_params(query)?
        .session_id
        .ok_or_else(|| AppError::Validation("session_id is required".to_string()))?;

    let response = match state.reconciler.confirm(&session_id).await? {
        Confirmation::Committed(record) => Json(PaymentConfirmedResponse {
            success: true,
            tracking_id: record.tracking_id.clone(),
            transaction_id: record.transaction_id.clone(),
            payment_info: record,
        })
        .into_response(),
        Confirmation::Replayed {
            transaction_id,
            tracking_id,
        } => Json(PaymentReplayedResponse {
            message: "Payment already processed".to_string(),
            transaction_id,
            tracking_id,
        })
        .into_response(),
        Confirmation::NotPaid { payment_status, .. } => (
            StatusCode::PAYMENT_REQUIRED,
            Json(PaymentPendingResponse {
                success: false,
                message: "Payment not completed".to_string(),
                payment_status: payment_status.as_str().to_string(),
            }),
        )
            .into_response(),
    };

    Ok(response)
}

pub async fn list_payments(
    user: AuthenticatedUser,
    State(state): State<AppState>,
    query: std::result::Result<Query<EmailQuery>, QueryRejection>,
) -> Result<Json<Vec<PaymentRecord>>> {
    let email = query_params(query)?
        .email
        .ok_or_else(|| AppError::Validation("email is required".to_string()))?;
    user.ensure_owns(&email)?;

    let payments = state.payments.payments_by_email(&email).await?;
    Ok(Json(payments))
}

pub async fn create_user(
    State(state): State<AppState>,
    payload: std::result::Result<Json<NewUser>, JsonRejection>,
) -> Result<Json<UserResponse>> {
    let request = json_body(payload)?;
    require_email(&request.email, "email")?;

    let inserted = state.accounts.insert_user(User::new(request)).await?;
    let message = if inserted { "user created" } else { "user already exists" };

    Ok(Json(UserResponse {
        message: message.to_string(),
        inserted,
    }))
}

pub async fn create_rider(
    State(state): State<AppState>,
    payload: std::result::Result<Json<NewRider>, JsonRejection>,
) -> Result<Json<CreatedResponse<Rider>>> {
    let request = json_body(payload)?;
    require_text(&request.name, "name")?;
    require_email(&request.email, "email")?;
    require_text(&request.phone, "phone")?;
    require_text(&request.region, "region")?;

    let rider = state.accounts.insert_rider(Rider::new(request)).await?;
    info!("Rider application {} received from {}", rider.id, rider.email);

    Ok(Json(CreatedResponse {
        success: true,
        message: "Rider application submitted".to_string(),
        data: rider,
    }))
}

pub async fn list_riders(
    State(state): State<AppState>,
    query: std::result::Result<Query<RiderQuery>, QueryRejection>,
) -> Result<Json<Vec<Rider>>> {
    let status = match query_params(query)?.status {
        Some(raw) => Some(
            RiderStatus::parse(&raw)
                .ok_or_else(|| AppError::Validation(format!("unknown rider status '{}'", raw)))?,
        ),
        None => None,
    };

    let riders = state.accounts.list_riders(status).await?;
    Ok(Json(riders))
}

pub async fn update_rider(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: std::result::Result<Json<UpdateRiderRequest>, JsonRejection>,
) -> Result<Json<Rider>> {
    let id = parse_id(&id)?;
    let request = json_body(payload)?;

    let rider = state
        .accounts
        .update_rider_status(id, request.status)
        .await?
        .ok_or_else(|| AppError::NotFound("Rider not found".to_string()))?;
    info!("Rider {} is now {}", rider.id, rider.status.as_str());

    Ok(Json(rider))
}
