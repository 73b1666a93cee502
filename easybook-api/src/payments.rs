use axum::{
    extract::{Query, State},
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use easybook_core::payment::{CallbackParams, PaymentRedirect};
use easybook_core::{Actor, BookingStatus, PaymentOutcome, PaymentProvider, PaymentStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;
use crate::extract::{ClientIp, ValidPath, ValidatedJson};
use crate::middleware::{require_auth, CurrentUser};
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub booking_id: Uuid,
    #[validate(url(message = "Return URL must be a valid URL"))]
    pub return_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStarted {
    pub booking_id: Uuid,
    #[serde(flatten)]
    pub redirect: PaymentRedirect,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackOutcome {
    pub booking_id: Uuid,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
}

pub fn routes(state: &AppState) -> Router<AppState> {
    let initiate = Router::new()
        .route("/api/payment/{provider}", post(initiate_payment))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/api/payment/callback/vnpay", get(vnpay_callback))
        .route("/api/payment/callback/momo", post(momo_callback))
        .route("/api/payment/callback/paypal", get(paypal_callback))
        .merge(initiate)
}

async fn initiate_payment(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ClientIp(client_ip): ClientIp,
    ValidPath(provider): ValidPath<PaymentProvider>,
    ValidatedJson(payload): ValidatedJson<PaymentRequest>,
) -> Result<Json<ApiResponse<PaymentStarted>>, AppError> {
    let redirect = state
        .payments
        .initialize_payment(
            provider,
            payload.booking_id,
            &Actor::from(&user),
            &payload.return_url,
            &client_ip,
            Utc::now(),
        )
        .await?;

    Ok(ApiResponse::ok(
        format!("{} payment created", provider.as_str().to_uppercase()),
        PaymentStarted { booking_id: payload.booking_id, redirect },
    ))
}

async fn apply_callback(
    state: &AppState,
    provider: PaymentProvider,
    params: CallbackParams,
) -> Result<Json<ApiResponse<CallbackOutcome>>, AppError> {
    let result = state.payments.handle_callback(provider, &params, Utc::now()).await?;
    let outcome = CallbackOutcome {
        booking_id: result.booking.id,
        status: result.booking.status,
        payment_status: result.booking.payment_status,
    };

    let success = result.payment.outcome == PaymentOutcome::Paid;
    let message = if success { "Payment successful" } else { "Payment failed" };
    let Json(mut body) = ApiResponse::ok(message, outcome);
    body.success = success;
    Ok(Json(body))
}

async fn vnpay_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<ApiResponse<CallbackOutcome>>, AppError> {
    apply_callback(&state, PaymentProvider::Vnpay, params).await
}

async fn paypal_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<ApiResponse<CallbackOutcome>>, AppError> {
    apply_callback(&state, PaymentProvider::Paypal, params).await
}

/// Momo posts typed JSON (`resultCode: 0`); the signature is computed over
/// the textual form of each value.
async fn momo_callback(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<ApiResponse<CallbackOutcome>>, AppError> {
    let fields = body
        .as_object()
        .ok_or_else(|| AppError::bad_request("Momo callback body must be a JSON object"))?;
    apply_callback(&state, PaymentProvider::Momo, stringify_fields(fields)).await
}

fn stringify_fields(fields: &serde_json::Map<String, Value>) -> CallbackParams {
    fields
        .iter()
        .filter_map(|(key, value)| {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => String::new(),
                Value::Array(_) | Value::Object(_) => return None,
            };
            Some((key.clone(), text))
        })
        .collect()
}
