//! In-process repositories for tests and local runs without Postgres.
//!
//! Services, bookings and users live behind a single mutex, so the
//! reserve-if-available and cancel-and-release operations are atomic in the
//! same way the Postgres transactions are.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use easybook_catalog::{Service, SlotRegistry};
use easybook_core::repository::{
    BookingFilter, BookingOverview, BookingRepository, BookingSort, BookingStats, Page,
    ServiceFilter, ServiceRepository, ServiceSort, ServiceTypeStats, SortOrder, UserRepository,
};
use easybook_core::{Booking, BookingState, BookingStatus, CoreError, CoreResult, User};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    services: HashMap<Uuid, Service>,
    bookings: HashMap<Uuid, Booking>,
    users: HashMap<Uuid, User>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> CoreResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| CoreError::Storage("memory store lock poisoned".to_string()))
    }
}

fn paginate<T: Clone>(items: Vec<T>, page: &easybook_core::repository::PageRequest) -> Page<T> {
    let total = items.len() as u64;
    let items = items
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit as usize)
        .collect();
    Page { items, total }
}

fn directed(ordering: Ordering, order: SortOrder) -> Ordering {
    match order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    }
}

fn matches_service(service: &Service, filter: &ServiceFilter) -> bool {
    if !service.is_active {
        return false;
    }
    if let Some(service_type) = filter.service_type {
        if service.service_type != service_type {
            return false;
        }
    }
    if let Some(location) = filter.location.as_deref().filter(|l| !l.is_empty()) {
        if !service.location.to_lowercase().contains(&location.to_lowercase()) {
            return false;
        }
    }
    if filter.min_price.is_some_and(|min| service.price < min) {
        return false;
    }
    if filter.max_price.is_some_and(|max| service.price > max) {
        return false;
    }
    true
}

fn compare_services(a: &Service, b: &Service, sort: ServiceSort) -> Ordering {
    match sort {
        ServiceSort::CreatedAt => a.created_at.cmp(&b.created_at),
        ServiceSort::Price => a.price.cmp(&b.price),
        ServiceSort::Rating => a.rating.partial_cmp(&b.rating).unwrap_or(Ordering::Equal),
        ServiceSort::Name => a.name.cmp(&b.name),
    }
}

fn compare_bookings(a: &Booking, b: &Booking, sort: BookingSort) -> Ordering {
    match sort {
        BookingSort::CreatedAt => a.created_at.cmp(&b.created_at),
        BookingSort::Time => a.time.cmp(&b.time),
        BookingSort::Amount => a.amount.cmp(&b.amount),
        BookingSort::Status => a.status.as_str().cmp(b.status.as_str()),
    }
}

#[async_trait]
impl ServiceRepository for MemoryStore {
    async fn create_service(&self, service: &Service) -> CoreResult<()> {
        self.lock()?.services.insert(service.id, service.clone());
        Ok(())
    }

    async fn get_service(&self, id: Uuid) -> CoreResult<Option<Service>> {
        Ok(self.lock()?.services.get(&id).cloned())
    }

    async fn update_details(&self, service: &Service) -> CoreResult<bool> {
        let mut tables = self.lock()?;
        let Some(existing) = tables.services.get_mut(&service.id) else {
            return Ok(false);
        };
        let slots = std::mem::take(&mut existing.available_slots);
        let is_active = existing.is_active;
        *existing = service.clone();
        existing.available_slots = slots;
        existing.is_active = is_active;
        Ok(true)
    }

    async fn replace_slots(&self, id: Uuid, slots: &[DateTime<Utc>]) -> CoreResult<Option<usize>> {
        let mut tables = self.lock()?;
        let held: Vec<DateTime<Utc>> = tables
            .bookings
            .values()
            .filter(|b| b.service_id == id && b.status.holds_slot())
            .map(|b| b.time)
            .collect();

        let Some(service) = tables.services.get_mut(&id) else {
            return Ok(None);
        };
        let mut registry = SlotRegistry::from_slots(slots.iter().copied());
        for time in held {
            registry.remove(time);
        }
        service.available_slots = registry;
        service.updated_at = Utc::now();
        Ok(Some(service.available_slots.len()))
    }

    async fn deactivate_service(&self, id: Uuid) -> CoreResult<bool> {
        let mut tables = self.lock()?;
        match tables.services.get_mut(&id) {
            Some(service) => {
                service.deactivate();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_services(&self, filter: &ServiceFilter) -> CoreResult<Page<Service>> {
        let tables = self.lock()?;
        let mut matched: Vec<Service> = tables
            .services
            .values()
            .filter(|s| matches_service(s, filter))
            .cloned()
            .collect();
        drop(tables);

        matched.sort_by(|a, b| {
            directed(compare_services(a, b, filter.sort_by), filter.sort_order).then(a.id.cmp(&b.id))
        });
        Ok(paginate(matched, &filter.page))
    }

    async fn add_slots(
        &self,
        id: Uuid,
        slots: &[DateTime<Utc>],
    ) -> CoreResult<Option<(usize, usize)>> {
        let mut tables = self.lock()?;
        let Some(service) = tables.services.get_mut(&id) else {
            return Ok(None);
        };
        let added = service.available_slots.extend(slots.iter().copied());
        if added > 0 {
            service.updated_at = Utc::now();
        }
        Ok(Some((added, service.available_slots.len())))
    }
}

#[async_trait]
impl BookingRepository for MemoryStore {
    async fn find_active_booking(
        &self,
        service_id: Uuid,
        time: DateTime<Utc>,
    ) -> CoreResult<Option<Booking>> {
        let tables = self.lock()?;
        Ok(tables
            .bookings
            .values()
            .find(|b| b.service_id == service_id && b.time == time && b.status.holds_slot())
            .cloned())
    }

    async fn create_reserved(&self, booking: &Booking) -> CoreResult<()> {
        let mut tables = self.lock()?;

        let duplicate = tables.bookings.values().any(|b| {
            b.service_id == booking.service_id && b.time == booking.time && b.status.holds_slot()
        });

        let service = tables
            .services
            .get_mut(&booking.service_id)
            .filter(|s| s.is_active)
            .ok_or(CoreError::SlotUnavailable(booking.time))?;
        if !service.is_slot_available(booking.time) {
            return Err(CoreError::SlotUnavailable(booking.time));
        }
        if duplicate {
            return Err(CoreError::DuplicateBooking(booking.time));
        }

        service.reserve_slot(booking.time)?;
        service.updated_at = Utc::now();
        tables.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> CoreResult<Option<Booking>> {
        Ok(self.lock()?.bookings.get(&id).cloned())
    }

    async fn list_bookings(&self, filter: &BookingFilter) -> CoreResult<Page<Booking>> {
        let tables = self.lock()?;
        let mut matched: Vec<Booking> = tables
            .bookings
            .values()
            .filter(|b| filter.user_id.map_or(true, |user_id| b.user_id == user_id))
            .filter(|b| filter.status.map_or(true, |status| b.status == status))
            .cloned()
            .collect();
        drop(tables);

        matched.sort_by(|a, b| {
            directed(compare_bookings(a, b, filter.sort_by), filter.sort_order).then(a.id.cmp(&b.id))
        });
        Ok(paginate(matched, &filter.page))
    }

    async fn save_booking(&self, booking: &Booking, expected: BookingState) -> CoreResult<bool> {
        let mut tables = self.lock()?;
        let stored = tables
            .bookings
            .get_mut(&booking.id)
            .ok_or_else(|| CoreError::NotFound(format!("Booking {}", booking.id)))?;
        if stored.state() != expected {
            return Ok(false);
        }

        stored.status = booking.status;
        stored.payment_status = booking.payment_status;
        stored.payment_id = booking.payment_id.clone();
        stored.admin_note = booking.admin_note.clone();
        stored.updated_at = booking.updated_at;
        Ok(true)
    }

    async fn cancel_and_release(
        &self,
        booking: &Booking,
        allowed_from: &[BookingStatus],
    ) -> CoreResult<bool> {
        let mut tables = self.lock()?;
        let stored = tables
            .bookings
            .get_mut(&booking.id)
            .ok_or_else(|| CoreError::NotFound(format!("Booking {}", booking.id)))?;

        let previous = stored.status;
        if !allowed_from.contains(&previous) {
            return Ok(false);
        }
        stored.status = BookingStatus::Cancelled;
        stored.updated_at = Utc::now();
        let (service_id, time) = (stored.service_id, stored.time);

        if previous.holds_slot() {
            if let Some(service) = tables.services.get_mut(&service_id) {
                service.release_slot(time);
            }
        }
        Ok(true)
    }

    async fn due_for_reminder(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> CoreResult<Vec<Booking>> {
        let tables = self.lock()?;
        let mut due: Vec<Booking> = tables
            .bookings
            .values()
            .filter(|b| b.time >= from && b.time <= to)
            .filter(|b| b.status.holds_slot() && !b.is_reminder_sent)
            .cloned()
            .collect();
        due.sort_by_key(|b| b.time);
        Ok(due)
    }

    async fn mark_reminder_sent(&self, id: Uuid, at: DateTime<Utc>) -> CoreResult<()> {
        let mut tables = self.lock()?;
        if let Some(booking) = tables.bookings.get_mut(&id) {
            if !booking.is_reminder_sent {
                booking.mark_reminder_sent(at);
            }
        }
        Ok(())
    }

    async fn stats(
        &self,
        month_start: DateTime<Utc>,
        month_end: DateTime<Utc>,
    ) -> CoreResult<BookingStats> {
        let tables = self.lock()?;
        let mut overview = BookingOverview::default();
        let mut per_type: BTreeMap<&'static str, ServiceTypeStats> = BTreeMap::new();

        for booking in tables.bookings.values() {
            overview.total += 1;
            match booking.status {
                BookingStatus::Pending => overview.pending += 1,
                BookingStatus::Paid => {
                    overview.paid += 1;
                    overview.revenue += booking.amount;
                }
                BookingStatus::Cancelled => overview.cancelled += 1,
                BookingStatus::Completed => overview.completed += 1,
            }
            if booking.created_at >= month_start && booking.created_at < month_end {
                overview.monthly += 1;
            }

            if let Some(service) = tables.services.get(&booking.service_id) {
                let entry = per_type
                    .entry(service.service_type.as_str())
                    .or_insert(ServiceTypeStats {
                        service_type: service.service_type,
                        count: 0,
                        revenue: 0,
                    });
                entry.count += 1;
                entry.revenue += booking.amount;
            }
        }

        Ok(BookingStats {
            overview,
            service_stats: per_type.into_values().collect(),
        })
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create_user(&self, user: &User) -> CoreResult<()> {
        let mut tables = self.lock()?;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(CoreError::Conflict("Email is already registered".to_string()));
        }
        tables.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> CoreResult<Option<User>> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> CoreResult<Option<User>> {
        let email = easybook_core::user::normalize_email(email);
        Ok(self.lock()?.users.values().find(|u| u.email == email).cloned())
    }

    async fn update_user(&self, user: &User) -> CoreResult<()> {
        let mut tables = self.lock()?;
        match tables.users.get_mut(&user.id) {
            Some(existing) => {
                *existing = user.clone();
                Ok(())
            }
            None => Err(CoreError::NotFound(format!("User {}", user.id))),
        }
    }
}
