use async_trait::async_trait;
use chrono::{DateTime, Utc};
use easybook_catalog::{Service, ServiceType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::booking::{Booking, BookingState, BookingStatus};
use crate::user::User;
use crate::CoreResult;

pub const MAX_PAGE_SIZE: u32 = 50;
pub const DEFAULT_PAGE_SIZE: u32 = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// One page of results plus the unpaged total.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn offset(&self) -> u64 {
        (self.page.saturating_sub(1) as u64) * self.limit as u64
    }

    pub fn pages(&self, total: u64) -> u64 {
        if self.limit == 0 {
            return 0;
        }
        total.div_ceil(self.limit as u64)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 1, limit: DEFAULT_PAGE_SIZE }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum ServiceSort {
    #[default]
    #[serde(rename = "createdAt")]
    CreatedAt,
    #[serde(rename = "price")]
    Price,
    #[serde(rename = "rating")]
    Rating,
    #[serde(rename = "name")]
    Name,
}

/// Catalog query; only active services are ever listed.
#[derive(Debug, Clone, Default)]
pub struct ServiceFilter {
    pub service_type: Option<ServiceType>,
    /// Case-insensitive substring match
    pub location: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub page: PageRequest,
    pub sort_by: ServiceSort,
    pub sort_order: SortOrder,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum BookingSort {
    #[default]
    #[serde(rename = "createdAt")]
    CreatedAt,
    #[serde(rename = "time")]
    Time,
    #[serde(rename = "amount")]
    Amount,
    #[serde(rename = "status")]
    Status,
}

#[derive(Debug, Clone, Default)]
pub struct BookingFilter {
    /// Restrict to one owner; `None` lists everyone's bookings (admin)
    pub user_id: Option<Uuid>,
    pub status: Option<BookingStatus>,
    pub page: PageRequest,
    pub sort_by: BookingSort,
    pub sort_order: SortOrder,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BookingOverview {
    pub total: u64,
    pub pending: u64,
    pub paid: u64,
    pub cancelled: u64,
    pub completed: u64,
    /// Bookings created in the current month
    pub monthly: u64,
    /// Sum of amounts over paid bookings
    pub revenue: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceTypeStats {
    #[serde(rename = "type")]
    pub service_type: ServiceType,
    pub count: u64,
    pub revenue: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingStats {
    pub overview: BookingOverview,
    pub service_stats: Vec<ServiceTypeStats>,
}

/// Service documents and their slot registries
#[async_trait]
pub trait ServiceRepository: Send + Sync {
    async fn create_service(&self, service: &Service) -> CoreResult<()>;

    async fn get_service(&self, id: Uuid) -> CoreResult<Option<Service>>;

    /// Overwrite the descriptive fields only. Slots and the active flag are
    /// left to their own operations. Returns false when the service does not
    /// exist.
    async fn update_details(&self, service: &Service) -> CoreResult<bool>;

    /// Replace the slot list under the service row lock. Slots held by a
    /// pending or paid booking are dropped from `slots`. Returns the new
    /// slot count, or `None` when the service does not exist.
    async fn replace_slots(&self, id: Uuid, slots: &[DateTime<Utc>]) -> CoreResult<Option<usize>>;

    /// Soft delete. Returns false when the service does not exist.
    async fn deactivate_service(&self, id: Uuid) -> CoreResult<bool>;

    async fn list_services(&self, filter: &ServiceFilter) -> CoreResult<Page<Service>>;

    /// Append slots with set semantics. Returns (added, total) or `None` when
    /// the service does not exist.
    async fn add_slots(
        &self,
        id: Uuid,
        slots: &[DateTime<Utc>],
    ) -> CoreResult<Option<(usize, usize)>>;
}

/// Booking documents. Every method that touches a slot does so atomically
/// with the booking write it belongs to.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Active (pending or paid) booking for this exact slot, if any.
    async fn find_active_booking(
        &self,
        service_id: Uuid,
        time: DateTime<Utc>,
    ) -> CoreResult<Option<Booking>>;

    /// Reserve-if-available: removes `booking.time` from the service's slots
    /// and inserts the booking as a single operation. Fails with
    /// `SlotUnavailable` when the slot is gone (or the service is inactive) and
    /// `DuplicateBooking` when another active booking holds the slot; in both
    /// cases nothing is written.
    async fn create_reserved(&self, booking: &Booking) -> CoreResult<()>;

    async fn get_booking(&self, id: Uuid) -> CoreResult<Option<Booking>>;

    async fn list_bookings(&self, filter: &BookingFilter) -> CoreResult<Page<Booking>>;

    /// Persist status, payment and admin-note fields, only if the stored
    /// status pair still equals `expected`. Returns false (and changes
    /// nothing) when another write got there first. Reminder fields are left
    /// untouched.
    async fn save_booking(&self, booking: &Booking, expected: BookingState) -> CoreResult<bool>;

    /// Set `cancelled` only if the stored status is one of `allowed_from`,
    /// and push the slot back into the service in the same operation.
    /// Returns false (and changes nothing) when the status had already moved.
    async fn cancel_and_release(
        &self,
        booking: &Booking,
        allowed_from: &[BookingStatus],
    ) -> CoreResult<bool>;

    /// Pending or paid bookings in `[from, to]` whose reminder is not sent yet.
    async fn due_for_reminder(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> CoreResult<Vec<Booking>>;

    async fn mark_reminder_sent(&self, id: Uuid, at: DateTime<Utc>) -> CoreResult<()>;

    async fn stats(
        &self,
        month_start: DateTime<Utc>,
        month_end: DateTime<Utc>,
    ) -> CoreResult<BookingStats>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Fails with `Conflict` when the email is taken.
    async fn create_user(&self, user: &User) -> CoreResult<()>;

    async fn get_user(&self, id: Uuid) -> CoreResult<Option<User>>;

    async fn find_by_email(&self, email: &str) -> CoreResult<Option<User>>;

    async fn update_user(&self, user: &User) -> CoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_math() {
        let page = PageRequest { page: 3, limit: 10 };
        assert_eq!(page.offset(), 20);
        assert_eq!(page.pages(0), 0);
        assert_eq!(page.pages(21), 3);
        assert_eq!(page.pages(30), 3);
    }
}
