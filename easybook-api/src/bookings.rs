use axum::{
    extract::State,
    handler::Handler,
    http::StatusCode,
    middleware,
    routing::get,
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use easybook_core::booking::MAX_BOOKING_AMOUNT;
use easybook_core::repository::{BookingFilter, BookingSort, BookingStats, PageRequest, SortOrder, DEFAULT_PAGE_SIZE};
use easybook_core::{Actor, Booking, BookingStatus, CustomerInfo, NewBooking, PaymentMethod};
use easybook_order::BookingUpdate;
use easybook_shared::Masked;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;
use crate::extract::{validate_phone, ValidPath, ValidatedJson, ValidatedQuery};
use crate::middleware::{require_admin, require_auth, CurrentUser};
use crate::response::{ApiResponse, Pagination};
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CustomerInfoRequest {
    #[validate(length(min = 2, max = 50, message = "Customer name must be 2-50 characters"))]
    pub name: String,
    #[validate(custom(function = "validate_phone"))]
    pub phone: String,
    #[validate(email(message = "Email is invalid"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(max = 500, message = "Note must be at most 500 characters"))]
    pub note: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub service_id: Uuid,
    pub time: DateTime<Utc>,
    pub payment_method: PaymentMethod,
    #[validate(range(min = 0, max = MAX_BOOKING_AMOUNT, message = "Amount must be between 0 and 1,000,000,000,000"))]
    pub amount: i64,
    #[validate(nested)]
    pub customer_info: CustomerInfoRequest,
}

impl From<CreateBookingRequest> for NewBooking {
    fn from(req: CreateBookingRequest) -> Self {
        NewBooking {
            service_id: req.service_id,
            time: req.time,
            payment_method: req.payment_method,
            amount: req.amount,
            customer_info: CustomerInfo {
                name: req.customer_info.name.trim().to_string(),
                phone: Masked(req.customer_info.phone),
                email: Masked(req.customer_info.email.trim().to_lowercase()),
                note: req.customer_info.note,
            },
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BookingQuery {
    pub status: Option<BookingStatus>,
    #[validate(range(min = 1, message = "Page must be a positive integer"))]
    pub page: Option<u32>,
    #[validate(range(min = 1, max = 50, message = "Limit must be between 1 and 50"))]
    pub limit: Option<u32>,
    pub sort_by: Option<BookingSort>,
    pub sort_order: Option<SortOrder>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBookingRequest {
    pub status: Option<BookingStatus>,
    #[validate(length(max = 500, message = "Admin note must be at most 500 characters"))]
    pub admin_note: Option<String>,
}

#[derive(Serialize)]
pub struct BookingEnvelope {
    pub booking: Booking,
}

#[derive(Serialize)]
pub struct BookingList {
    pub bookings: Vec<Booking>,
    pub pagination: Pagination,
}

pub fn routes(state: &AppState) -> Router<AppState> {
    let admin = middleware::from_fn_with_state(state.clone(), require_admin);

    let customer = Router::new()
        .route("/api/booking", get(list_bookings).post(create_booking))
        .route(
            "/api/booking/{id}",
            get(get_booking).put(update_booking).delete(cancel_booking),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/api/booking/stats/overview", get(stats.layer(admin)))
        .merge(customer)
}

async fn create_booking(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ValidatedJson(payload): ValidatedJson<CreateBookingRequest>,
) -> Result<(StatusCode, Json<ApiResponse<BookingEnvelope>>), AppError> {
    let booking = state.manager.create_booking(&user, payload.into(), Utc::now()).await?;
    Ok(ApiResponse::created("Booking created", BookingEnvelope { booking }))
}

async fn list_bookings(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ValidatedQuery(query): ValidatedQuery<BookingQuery>,
) -> Result<Json<ApiResponse<BookingList>>, AppError> {
    let page = PageRequest {
        page: query.page.unwrap_or(1),
        limit: query.limit.unwrap_or(DEFAULT_PAGE_SIZE),
    };
    let filter = BookingFilter {
        user_id: None,
        status: query.status,
        page,
        sort_by: query.sort_by.unwrap_or_default(),
        sort_order: query.sort_order.unwrap_or_default(),
    };

    let result = state.manager.list_bookings(&Actor::from(&user), filter).await?;
    Ok(ApiResponse::ok(
        "Bookings loaded",
        BookingList {
            bookings: result.items,
            pagination: Pagination {
                page: page.page,
                limit: page.limit,
                total: result.total,
                pages: page.pages(result.total),
            },
        },
    ))
}

async fn get_booking(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<Json<ApiResponse<BookingEnvelope>>, AppError> {
    let booking = state.manager.get_booking(id, &Actor::from(&user)).await?;
    Ok(ApiResponse::ok("Booking loaded", BookingEnvelope { booking }))
}

async fn update_booking(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ValidPath(id): ValidPath<Uuid>,
    ValidatedJson(payload): ValidatedJson<UpdateBookingRequest>,
) -> Result<Json<ApiResponse<BookingEnvelope>>, AppError> {
    let update = BookingUpdate { status: payload.status, admin_note: payload.admin_note };
    let booking = state
        .manager
        .update_booking(id, &Actor::from(&user), update, Utc::now())
        .await?;
    Ok(ApiResponse::ok("Booking updated", BookingEnvelope { booking }))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<Json<ApiResponse<BookingEnvelope>>, AppError> {
    let booking = state.manager.cancel_booking(id, &Actor::from(&user), Utc::now()).await?;
    Ok(ApiResponse::ok("Booking cancelled", BookingEnvelope { booking }))
}

async fn stats(State(state): State<AppState>) -> Result<Json<ApiResponse<BookingStats>>, AppError> {
    let stats = state.manager.stats(Utc::now()).await?;
    Ok(ApiResponse::ok("Booking statistics", stats))
}
