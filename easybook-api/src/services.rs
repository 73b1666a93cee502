use axum::{
    extract::State,
    handler::Handler,
    http::StatusCode,
    middleware,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use easybook_catalog::{generate_default_slots, ContactInfo, Service, ServiceDraft, ServiceType};
use easybook_core::repository::{PageRequest, ServiceFilter, ServiceSort, SortOrder, DEFAULT_PAGE_SIZE};
use easybook_core::CoreError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;
use crate::extract::{validate_phone, ValidPath, ValidatedJson, ValidatedQuery};
use crate::middleware::require_admin;
use crate::response::{ApiResponse, Pagination};
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ServiceQuery {
    #[serde(rename = "type")]
    pub service_type: Option<ServiceType>,
    #[validate(length(min = 1, message = "Location must not be empty"))]
    pub location: Option<String>,
    #[validate(range(min = 0, message = "Minimum price must not be negative"))]
    pub min_price: Option<i64>,
    #[validate(range(min = 0, message = "Maximum price must not be negative"))]
    pub max_price: Option<i64>,
    #[validate(range(min = 1, message = "Page must be a positive integer"))]
    pub page: Option<u32>,
    #[validate(range(min = 1, max = 50, message = "Limit must be between 1 and 50"))]
    pub limit: Option<u32>,
    pub sort_by: Option<ServiceSort>,
    pub sort_order: Option<SortOrder>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ContactInfoRequest {
    #[validate(custom(function = "validate_phone"))]
    pub phone: Option<String>,
    #[validate(email(message = "Email is invalid"))]
    pub email: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest {
    #[validate(length(min = 2, max = 100, message = "Name must be 2-100 characters"))]
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: ServiceType,
    #[validate(length(min = 1, message = "Location is required"))]
    pub location: String,
    #[validate(range(min = 0, message = "Price must not be negative"))]
    pub price: i64,
    #[validate(url(message = "Image must be a valid URL"))]
    pub image: String,
    #[validate(length(min = 10, max = 1000, message = "Description must be 10-1000 characters"))]
    pub description: String,
    #[serde(default = "default_capacity")]
    #[validate(range(min = 1, message = "Capacity must be a positive integer"))]
    pub capacity: i32,
    #[serde(default)]
    #[validate(range(min = 0.0, max = 5.0, message = "Rating must be between 0 and 5"))]
    pub rating: f64,
    #[serde(default)]
    #[validate(range(min = 0, message = "Review count must not be negative"))]
    pub review_count: i32,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    #[validate(nested)]
    pub contact_info: ContactInfoRequest,
    pub available_slots: Option<Vec<DateTime<Utc>>>,
}

fn default_capacity() -> i32 {
    1
}

impl From<ServiceRequest> for ServiceDraft {
    fn from(req: ServiceRequest) -> Self {
        ServiceDraft {
            name: req.name.trim().to_string(),
            service_type: req.service_type,
            location: req.location.trim().to_string(),
            price: req.price,
            image: req.image,
            description: req.description,
            capacity: req.capacity,
            rating: req.rating,
            review_count: req.review_count,
            amenities: req.amenities,
            contact_info: ContactInfo {
                phone: req.contact_info.phone,
                email: req.contact_info.email,
                address: req.contact_info.address,
            },
            available_slots: req.available_slots,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddSlotsRequest {
    #[validate(length(min = 1, message = "At least one slot is required"))]
    pub slots: Vec<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct ServiceList {
    pub services: Vec<Service>,
    pub pagination: Pagination,
}

#[derive(Serialize)]
pub struct ServiceEnvelope {
    pub service: Service,
}

#[derive(Serialize)]
pub struct SlotList {
    pub slots: Vec<DateTime<Utc>>,
    pub count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotsAdded {
    pub added_slots: usize,
    pub total_slots: usize,
}

pub fn routes(state: &AppState) -> Router<AppState> {
    let admin = middleware::from_fn_with_state(state.clone(), require_admin);

    Router::new()
        .route(
            "/api/service",
            get(list_services).post(create_service.layer(admin.clone())),
        )
        .route(
            "/api/service/{id}",
            get(get_service)
                .put(update_service.layer(admin.clone()))
                .delete(delete_service.layer(admin.clone())),
        )
        .route(
            "/api/service/{id}/slots",
            get(list_slots).post(add_slots.layer(admin)),
        )
}

async fn load(state: &AppState, id: Uuid) -> Result<Service, AppError> {
    state
        .services
        .get_service(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError("Service not found".to_string()))
}

/// The stored registry keeps past slots; responses only ever offer future ones.
fn with_upcoming_slots(mut service: Service, now: DateTime<Utc>) -> Service {
    let upcoming = service.upcoming_slots(now);
    service.available_slots = easybook_catalog::SlotRegistry::from_slots(upcoming);
    service
}

async fn list_services(
    State(state): State<AppState>,
    ValidatedQuery(query): ValidatedQuery<ServiceQuery>,
) -> Result<Json<ApiResponse<ServiceList>>, AppError> {
    if let (Some(min), Some(max)) = (query.min_price, query.max_price) {
        if min > max {
            return Err(CoreError::Validation("Minimum price must not exceed maximum price".to_string()).into());
        }
    }

    let page = PageRequest {
        page: query.page.unwrap_or(1),
        limit: query.limit.unwrap_or(DEFAULT_PAGE_SIZE),
    };
    let filter = ServiceFilter {
        service_type: query.service_type,
        location: query.location,
        min_price: query.min_price,
        max_price: query.max_price,
        page,
        sort_by: query.sort_by.unwrap_or_default(),
        sort_order: query.sort_order.unwrap_or_default(),
    };

    let result = state.services.list_services(&filter).await?;
    let now = Utc::now();
    Ok(ApiResponse::ok(
        "Services loaded",
        ServiceList {
            services: result.items.into_iter().map(|s| with_upcoming_slots(s, now)).collect(),
            pagination: Pagination {
                page: page.page,
                limit: page.limit,
                total: result.total,
                pages: page.pages(result.total),
            },
        },
    ))
}

async fn get_service(
    State(state): State<AppState>,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<Json<ApiResponse<ServiceEnvelope>>, AppError> {
    let service = load(&state, id).await?;
    Ok(ApiResponse::ok(
        "Service loaded",
        ServiceEnvelope { service: with_upcoming_slots(service, Utc::now()) },
    ))
}

async fn create_service(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<ServiceRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ServiceEnvelope>>), AppError> {
    let draft = ServiceDraft::from(payload);
    let defaults = if draft.available_slots.is_some() {
        Vec::new()
    } else {
        generate_default_slots(
            Utc::now(),
            state.catalog.utc_offset,
            state.catalog.default_slot_days,
            &state.catalog.default_slot_hours,
        )
    };

    let service = Service::new(draft, defaults);
    state.services.create_service(&service).await?;
    tracing::info!(service_id = %service.id, slots = service.available_slots.len(), "Service created");

    Ok(ApiResponse::created("Service created", ServiceEnvelope { service }))
}

async fn update_service(
    State(state): State<AppState>,
    ValidPath(id): ValidPath<Uuid>,
    ValidatedJson(payload): ValidatedJson<ServiceRequest>,
) -> Result<Json<ApiResponse<ServiceEnvelope>>, AppError> {
    let mut draft = ServiceDraft::from(payload);
    let slots = draft.available_slots.take();

    let mut service = load(&state, id).await?;
    service.apply(draft);
    if !state.services.update_details(&service).await? {
        return Err(AppError::NotFoundError("Service not found".to_string()));
    }
    if let Some(slots) = slots {
        let total = state
            .services
            .replace_slots(id, &slots)
            .await?
            .ok_or_else(|| AppError::NotFoundError("Service not found".to_string()))?;
        tracing::info!(service_id = %id, total, "Service slots replaced");
    }
    tracing::info!(service_id = %id, "Service updated");

    let service = load(&state, id).await?;
    Ok(ApiResponse::ok(
        "Service updated",
        ServiceEnvelope { service: with_upcoming_slots(service, Utc::now()) },
    ))
}

async fn delete_service(
    State(state): State<AppState>,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    if !state.services.deactivate_service(id).await? {
        return Err(AppError::NotFoundError("Service not found".to_string()));
    }
    tracing::info!(service_id = %id, "Service deactivated");

    Ok(ApiResponse::ok("Service deleted", ()))
}

async fn list_slots(
    State(state): State<AppState>,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<Json<ApiResponse<SlotList>>, AppError> {
    let service = load(&state, id).await?;
    let slots = service.upcoming_slots(Utc::now());
    let count = slots.len();
    Ok(ApiResponse::ok("Slots loaded", SlotList { slots, count }))
}

async fn add_slots(
    State(state): State<AppState>,
    ValidPath(id): ValidPath<Uuid>,
    ValidatedJson(payload): ValidatedJson<AddSlotsRequest>,
) -> Result<Json<ApiResponse<SlotsAdded>>, AppError> {
    let (added, total) = state
        .services
        .add_slots(id, &payload.slots)
        .await?
        .ok_or_else(|| AppError::NotFoundError("Service not found".to_string()))?;
    tracing::info!(service_id = %id, added, total, "Slots added");

    Ok(ApiResponse::ok("Slots added", SlotsAdded { added_slots: added, total_slots: total }))
}
