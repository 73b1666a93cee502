use chrono::FixedOffset;
use easybook_core::repository::{BookingRepository, ServiceRepository, UserRepository};
use easybook_order::{BookingManager, PaymentOrchestrator};
use easybook_store::RedisClient;
use std::sync::Arc;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    /// Token lifetime in seconds
    pub expiration: u64,
    pub password_cost: u32,
}

/// How new services get their default schedule.
#[derive(Clone)]
pub struct CatalogRules {
    pub utc_offset: FixedOffset,
    pub default_slot_days: u32,
    pub default_slot_hours: Vec<u32>,
}

#[derive(Clone)]
pub struct AppState {
    pub services: Arc<dyn ServiceRepository>,
    pub bookings: Arc<dyn BookingRepository>,
    pub users: Arc<dyn UserRepository>,
    pub manager: Arc<BookingManager>,
    pub payments: Arc<PaymentOrchestrator>,
    /// Rate limiting is skipped without Redis
    pub redis: Option<Arc<RedisClient>>,
    pub auth: AuthConfig,
    pub catalog: CatalogRules,
    pub frontend_url: String,
    pub environment: String,
}
