use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use easybook_catalog::normalize_slot;
use easybook_core::booking::DEFAULT_CANCELLATION_WINDOW_HOURS;
use easybook_core::notify::{Notification, NotificationKind, Notifier, Recipient};
use easybook_core::repository::{BookingFilter, BookingRepository, BookingStats, Page, ServiceRepository};
use easybook_core::{Actor, Booking, BookingStatus, CoreError, CoreResult, NewBooking, User};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct BookingRules {
    /// Minimum lead time for a customer cancellation
    pub cancellation_window: Duration,
    /// Upper bound on a confirmation email before it is abandoned
    pub notify_timeout: std::time::Duration,
}

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            cancellation_window: Duration::hours(DEFAULT_CANCELLATION_WINDOW_HOURS),
            notify_timeout: std::time::Duration::from_secs(5),
        }
    }
}

/// Fields a `PUT /booking/{id}` may change.
#[derive(Debug, Clone, Default)]
pub struct BookingUpdate {
    pub status: Option<BookingStatus>,
    pub admin_note: Option<String>,
}

/// Booking lifecycle: reserve, cancel, administrative updates.
pub struct BookingManager {
    services: Arc<dyn ServiceRepository>,
    bookings: Arc<dyn BookingRepository>,
    notifier: Arc<dyn Notifier>,
    rules: BookingRules,
}

impl BookingManager {
    pub fn new(
        services: Arc<dyn ServiceRepository>,
        bookings: Arc<dyn BookingRepository>,
        notifier: Arc<dyn Notifier>,
        rules: BookingRules,
    ) -> Self {
        Self { services, bookings, notifier, rules }
    }

    pub fn rules(&self) -> &BookingRules {
        &self.rules
    }

    /// Reserve a slot for `user`. The checks run in order (service exists,
    /// is active, slot listed and still ahead of `now`, no live booking) and
    /// the final write removes the slot and inserts the booking atomically,
    /// so a lost race still surfaces as `SlotUnavailable` or
    /// `DuplicateBooking`.
    pub async fn create_booking(
        &self,
        user: &User,
        mut request: NewBooking,
        now: DateTime<Utc>,
    ) -> CoreResult<Booking> {
        request.time = normalize_slot(request.time);

        let service = self
            .services
            .get_service(request.service_id)
            .await?
            .ok_or_else(|| CoreError::NotFound("Service".to_string()))?;

        if !service.is_active {
            return Err(CoreError::ServiceInactive(service.id));
        }
        // A past slot would be created pending and never expire; refuse it.
        if request.time <= now || !service.is_slot_available(request.time) {
            return Err(CoreError::SlotUnavailable(request.time));
        }
        if self.bookings.find_active_booking(service.id, request.time).await?.is_some() {
            return Err(CoreError::DuplicateBooking(request.time));
        }

        let booking = Booking::new(user.id, request);
        self.bookings.create_reserved(&booking).await?;

        info!(
            booking_id = %booking.id,
            service_id = %service.id,
            time = %booking.time,
            method = %booking.payment_method,
            "Booking created"
        );

        self.notify_best_effort(Notification {
            kind: NotificationKind::BookingConfirmation,
            recipient: Recipient { name: user.name.clone(), email: user.email.clone() },
            booking: booking.clone(),
            service,
        })
        .await;

        Ok(booking)
    }

    /// Non-admins may only read their own bookings.
    pub async fn get_booking(&self, id: Uuid, actor: &Actor) -> CoreResult<Booking> {
        let booking = self
            .bookings
            .get_booking(id)
            .await?
            .ok_or_else(|| CoreError::NotFound("Booking".to_string()))?;

        if !actor.is_admin() && !booking.is_owned_by(actor.user_id) {
            return Err(CoreError::Forbidden("You can only access your own bookings".to_string()));
        }
        Ok(booking)
    }

    pub async fn list_bookings(&self, actor: &Actor, mut filter: BookingFilter) -> CoreResult<Page<Booking>> {
        if !actor.is_admin() {
            filter.user_id = Some(actor.user_id);
        }
        self.bookings.list_bookings(&filter).await
    }

    /// Customer cancellation: pending and at least the configured window
    /// ahead. The slot goes back to the service.
    pub async fn cancel_booking(&self, id: Uuid, actor: &Actor, now: DateTime<Utc>) -> CoreResult<Booking> {
        let booking = self.get_booking(id, actor).await?;
        self.cancel_within_window(booking, now).await
    }

    async fn cancel_within_window(&self, mut booking: Booking, now: DateTime<Utc>) -> CoreResult<Booking> {
        let window_hours = self.rules.cancellation_window.num_hours();
        if !booking.can_cancel(now, self.rules.cancellation_window) {
            return Err(CoreError::CancellationNotAllowed(window_hours));
        }
        // Conditional on still being pending, so a concurrent cancel or
        // payment cannot release the slot twice.
        if !self.bookings.cancel_and_release(&booking, &[BookingStatus::Pending]).await? {
            return Err(CoreError::CancellationNotAllowed(window_hours));
        }

        booking.status = BookingStatus::Cancelled;
        booking.updated_at = now;
        info!(booking_id = %booking.id, "Booking cancelled");
        Ok(booking)
    }

    /// Admins may set any status and the admin note; cancelling as admin
    /// skips the lead-time rule but still releases the slot. Everyone else
    /// may only cancel, under the usual rule.
    pub async fn update_booking(
        &self,
        id: Uuid,
        actor: &Actor,
        update: BookingUpdate,
        now: DateTime<Utc>,
    ) -> CoreResult<Booking> {
        let mut booking = self.get_booking(id, actor).await?;
        let mut expected = booking.state();
        let mut dirty = false;

        match update.status {
            None => {}
            Some(BookingStatus::Cancelled) if !actor.is_admin() => {
                booking = self.cancel_within_window(booking, now).await?;
                expected = booking.state();
            }
            Some(status) if !actor.is_admin() => {
                return Err(CoreError::Forbidden(format!(
                    "Only administrators can set booking status to {}",
                    status
                )));
            }
            Some(BookingStatus::Cancelled) => match booking.status {
                BookingStatus::Cancelled => {}
                BookingStatus::Completed => {
                    return Err(CoreError::Conflict("Completed bookings cannot be cancelled".to_string()));
                }
                BookingStatus::Pending | BookingStatus::Paid => {
                    let released = self
                        .bookings
                        .cancel_and_release(&booking, &[BookingStatus::Pending, BookingStatus::Paid])
                        .await?;
                    if !released {
                        return Err(stale_booking());
                    }
                    booking.set_status(BookingStatus::Cancelled);
                    expected = booking.state();
                    info!(booking_id = %booking.id, admin_id = %actor.user_id, "Booking cancelled by admin");
                }
            },
            Some(status) => {
                if booking.status == BookingStatus::Cancelled {
                    return Err(CoreError::Conflict("Cancelled bookings cannot be reopened".to_string()));
                }
                booking.set_status(status);
                dirty = true;
                info!(booking_id = %booking.id, admin_id = %actor.user_id, status = %status, "Booking status set");
            }
        }

        if actor.is_admin() {
            if let Some(note) = update.admin_note {
                booking.admin_note = Some(note);
                booking.updated_at = now;
                dirty = true;
            }
        }

        if booking.expire_if_past(now) {
            debug!(booking_id = %booking.id, "Pending booking in the past, cancelled on save");
            dirty = true;
        }
        if dirty && !self.bookings.save_booking(&booking, expected).await? {
            return Err(stale_booking());
        }
        Ok(booking)
    }

    /// Totals over all bookings; `monthly` counts bookings created in the
    /// calendar month (UTC) containing `now`.
    pub async fn stats(&self, now: DateTime<Utc>) -> CoreResult<BookingStats> {
        let (start, end) = month_bounds(now)
            .ok_or_else(|| CoreError::Internal(format!("no month boundaries for {}", now)))?;
        self.bookings.stats(start, end).await
    }

    async fn notify_best_effort(&self, notification: Notification) {
        let send = self.notifier.send(&notification);
        match tokio::time::timeout(self.rules.notify_timeout, send).await {
            Ok(Ok(())) => debug!(booking_id = %notification.booking.id, kind = notification.kind.as_str(), "Notification sent"),
            Ok(Err(e)) => warn!(booking_id = %notification.booking.id, error = %e, "Notification failed"),
            Err(_) => warn!(booking_id = %notification.booking.id, "Notification timed out"),
        }
    }
}

fn stale_booking() -> CoreError {
    CoreError::Conflict("Booking status changed, reload and retry".to_string())
}

fn month_bounds(now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = NaiveDate::from_ymd_opt(now.year(), now.month(), 1)?;
    let next = if now.month() == 12 {
        NaiveDate::from_ymd_opt(now.year() + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(now.year(), now.month() + 1, 1)?
    };
    Some((start.and_hms_opt(0, 0, 0)?.and_utc(), next.and_hms_opt(0, 0, 0)?.and_utc()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{new_booking, sample_service, sample_user, FailingNotifier, RecordingNotifier};
    use easybook_core::{PaymentStatus, Role};
    use easybook_store::MemoryStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        notifier: Arc<RecordingNotifier>,
        manager: BookingManager,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let manager = BookingManager::new(store.clone(), store.clone(), notifier.clone(), BookingRules::default());
        Fixture { store, notifier, manager }
    }

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[tokio::test]
    async fn test_booking_removes_slot_and_notifies() {
        let f = fixture();
        let slot = at("2099-06-01T09:00:00Z");
        let service = sample_service(vec![slot]);
        f.store.create_service(&service).await.unwrap();
        let user = sample_user(Role::User);

        let booking = f.manager.create_booking(&user, new_booking(service.id, slot, 800_000), Utc::now()).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.payment_status, PaymentStatus::Pending);
        assert_eq!(booking.amount, 800_000);

        let stored = f.store.get_service(service.id).await.unwrap().unwrap();
        assert!(!stored.is_slot_available(slot));

        let sent = f.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, NotificationKind::BookingConfirmation);

        let again = f.manager.create_booking(&user, new_booking(service.id, slot, 800_000), Utc::now()).await;
        assert!(matches!(again, Err(CoreError::SlotUnavailable(_))));
    }

    #[tokio::test]
    async fn test_booking_preconditions() {
        let f = fixture();
        let slot = Utc::now() + Duration::days(1);
        let user = sample_user(Role::User);

        let missing = f.manager.create_booking(&user, new_booking(Uuid::new_v4(), slot, 1), Utc::now()).await;
        assert!(matches!(missing, Err(CoreError::NotFound(_))));

        let mut inactive = sample_service(vec![slot]);
        inactive.deactivate();
        f.store.create_service(&inactive).await.unwrap();
        let result = f.manager.create_booking(&user, new_booking(inactive.id, slot, 1), Utc::now()).await;
        assert!(matches!(result, Err(CoreError::ServiceInactive(id)) if id == inactive.id));

        let service = sample_service(vec![slot]);
        f.store.create_service(&service).await.unwrap();
        let unlisted = f.manager.create_booking(&user, new_booking(service.id, slot + Duration::hours(1), 1), Utc::now()).await;
        assert!(matches!(unlisted, Err(CoreError::SlotUnavailable(_))));
    }

    #[tokio::test]
    async fn test_past_slot_cannot_be_booked() {
        let f = fixture();
        let now = Utc::now();
        let past = normalize_slot(now - Duration::hours(3));
        let service = sample_service(vec![past]);
        f.store.create_service(&service).await.unwrap();
        let user = sample_user(Role::User);

        let result = f.manager.create_booking(&user, new_booking(service.id, past, 1), now).await;
        assert!(matches!(result, Err(CoreError::SlotUnavailable(_))));
        assert!(f.store.find_active_booking(service.id, past).await.unwrap().is_none());
        assert!(f.store.get_service(service.id).await.unwrap().unwrap().is_slot_available(past));
    }

    #[tokio::test]
    async fn test_live_booking_on_relisted_slot_is_duplicate() {
        let f = fixture();
        let slot = normalize_slot(Utc::now() + Duration::days(1));
        let service = sample_service(vec![slot]);
        f.store.create_service(&service).await.unwrap();
        let user = sample_user(Role::User);

        f.manager.create_booking(&user, new_booking(service.id, slot, 1), Utc::now()).await.unwrap();
        // An admin re-adds the slot while the first booking is still live.
        f.store.add_slots(service.id, &[slot]).await.unwrap();

        let result = f.manager.create_booking(&user, new_booking(service.id, slot, 1), Utc::now()).await;
        assert!(matches!(result, Err(CoreError::DuplicateBooking(_))));
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_fail_booking() {
        let store = Arc::new(MemoryStore::new());
        let manager = BookingManager::new(
            store.clone(),
            store.clone(),
            Arc::new(FailingNotifier),
            BookingRules::default(),
        );
        let slot = Utc::now() + Duration::days(1);
        let service = sample_service(vec![slot]);
        store.create_service(&service).await.unwrap();

        let booking = manager.create_booking(&sample_user(Role::User), new_booking(service.id, slot, 1), Utc::now()).await;
        assert!(booking.is_ok());
    }

    #[tokio::test]
    async fn test_cancellation_window() {
        let f = fixture();
        let now = Utc::now();
        let soon = normalize_slot(now + Duration::hours(1));
        let later = normalize_slot(now + Duration::hours(3));
        let service = sample_service(vec![soon, later]);
        f.store.create_service(&service).await.unwrap();
        let user = sample_user(Role::User);
        let actor = Actor::from(&user);

        let near = f.manager.create_booking(&user, new_booking(service.id, soon, 1), Utc::now()).await.unwrap();
        let result = f.manager.cancel_booking(near.id, &actor, now).await;
        assert!(matches!(result, Err(CoreError::CancellationNotAllowed(2))));
        let unchanged = f.store.get_booking(near.id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, BookingStatus::Pending);

        let far = f.manager.create_booking(&user, new_booking(service.id, later, 1), Utc::now()).await.unwrap();
        let cancelled = f.manager.cancel_booking(far.id, &actor, now).await.unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        let stored = f.store.get_service(service.id).await.unwrap().unwrap();
        assert!(stored.is_slot_available(later));

        // Second cancel: no longer pending
        let again = f.manager.cancel_booking(far.id, &actor, now).await;
        assert!(matches!(again, Err(CoreError::CancellationNotAllowed(_))));
        assert_eq!(f.store.get_service(service.id).await.unwrap().unwrap().available_slots.len(), 1);
    }

    #[tokio::test]
    async fn test_other_users_cannot_touch_booking() {
        let f = fixture();
        let slot = Utc::now() + Duration::days(2);
        let service = sample_service(vec![slot]);
        f.store.create_service(&service).await.unwrap();
        let owner = sample_user(Role::User);
        let booking = f.manager.create_booking(&owner, new_booking(service.id, slot, 1), Utc::now()).await.unwrap();

        let stranger = Actor { user_id: Uuid::new_v4(), role: Role::User };
        assert!(matches!(f.manager.get_booking(booking.id, &stranger).await, Err(CoreError::Forbidden(_))));
        assert!(matches!(
            f.manager.cancel_booking(booking.id, &stranger, Utc::now()).await,
            Err(CoreError::Forbidden(_))
        ));

        let admin = Actor { user_id: Uuid::new_v4(), role: Role::Admin };
        assert!(f.manager.get_booking(booking.id, &admin).await.is_ok());
    }

    #[tokio::test]
    async fn test_admin_paid_sets_payment_status() {
        let f = fixture();
        let slot = at("2099-06-01T09:00:00Z");
        let service = sample_service(vec![slot]);
        f.store.create_service(&service).await.unwrap();
        let booking = f.manager.create_booking(&sample_user(Role::User), new_booking(service.id, slot, 800_000), Utc::now()).await.unwrap();

        let admin = Actor { user_id: Uuid::new_v4(), role: Role::Admin };
        let update = BookingUpdate { status: Some(BookingStatus::Paid), admin_note: Some("Paid at the counter".to_string()) };
        f.manager.update_booking(booking.id, &admin, update, Utc::now()).await.unwrap();

        let stored = f.manager.get_booking(booking.id, &admin).await.unwrap();
        assert_eq!(stored.status, BookingStatus::Paid);
        assert_eq!(stored.payment_status, PaymentStatus::Paid);
        assert_eq!(stored.admin_note.as_deref(), Some("Paid at the counter"));
    }

    #[tokio::test]
    async fn test_admin_cancel_bypasses_window_and_releases_slot() {
        let f = fixture();
        let now = Utc::now();
        let slot = normalize_slot(now + Duration::minutes(30));
        let service = sample_service(vec![slot]);
        f.store.create_service(&service).await.unwrap();
        let booking = f.manager.create_booking(&sample_user(Role::User), new_booking(service.id, slot, 1), Utc::now()).await.unwrap();

        let admin = Actor { user_id: Uuid::new_v4(), role: Role::Admin };
        let paid = BookingUpdate { status: Some(BookingStatus::Paid), admin_note: None };
        f.manager.update_booking(booking.id, &admin, paid, now).await.unwrap();

        let cancel = BookingUpdate { status: Some(BookingStatus::Cancelled), admin_note: None };
        let cancelled = f.manager.update_booking(booking.id, &admin, cancel, now).await.unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert!(f.store.get_service(service.id).await.unwrap().unwrap().is_slot_available(slot));

        let reopen = BookingUpdate { status: Some(BookingStatus::Pending), admin_note: None };
        let result = f.manager.update_booking(booking.id, &admin, reopen, now).await;
        assert!(matches!(result, Err(CoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_non_admin_update_rules() {
        let f = fixture();
        let now = Utc::now();
        let slot = normalize_slot(now + Duration::days(1));
        let service = sample_service(vec![slot]);
        f.store.create_service(&service).await.unwrap();
        let user = sample_user(Role::User);
        let actor = Actor::from(&user);
        let booking = f.manager.create_booking(&user, new_booking(service.id, slot, 1), Utc::now()).await.unwrap();

        let pay = BookingUpdate { status: Some(BookingStatus::Paid), admin_note: None };
        assert!(matches!(
            f.manager.update_booking(booking.id, &actor, pay, now).await,
            Err(CoreError::Forbidden(_))
        ));

        let note_only = BookingUpdate { status: None, admin_note: Some("let me in".to_string()) };
        let unchanged = f.manager.update_booking(booking.id, &actor, note_only, now).await.unwrap();
        assert!(unchanged.admin_note.is_none());

        let cancel = BookingUpdate { status: Some(BookingStatus::Cancelled), admin_note: None };
        let cancelled = f.manager.update_booking(booking.id, &actor, cancel, now).await.unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert!(f.store.get_service(service.id).await.unwrap().unwrap().is_slot_available(slot));
    }

    #[tokio::test]
    async fn test_list_is_scoped_to_owner() {
        let f = fixture();
        let slots: Vec<_> = (1..=3).map(|d| normalize_slot(Utc::now() + Duration::days(d))).collect();
        let service = sample_service(slots.clone());
        f.store.create_service(&service).await.unwrap();
        let alice = sample_user(Role::User);
        let bob = sample_user(Role::User);
        f.manager.create_booking(&alice, new_booking(service.id, slots[0], 1), Utc::now()).await.unwrap();
        f.manager.create_booking(&alice, new_booking(service.id, slots[1], 1), Utc::now()).await.unwrap();
        f.manager.create_booking(&bob, new_booking(service.id, slots[2], 1), Utc::now()).await.unwrap();

        let page = f.manager.list_bookings(&Actor::from(&alice), BookingFilter::default()).await.unwrap();
        assert_eq!(page.total, 2);
        assert!(page.items.iter().all(|b| b.user_id == alice.id));

        let admin = Actor { user_id: Uuid::new_v4(), role: Role::Admin };
        assert_eq!(f.manager.list_bookings(&admin, BookingFilter::default()).await.unwrap().total, 3);
    }

    #[tokio::test]
    async fn test_stats_overview() {
        let f = fixture();
        let slots: Vec<_> = (1..=3).map(|d| normalize_slot(Utc::now() + Duration::days(d))).collect();
        let service = sample_service(slots.clone());
        f.store.create_service(&service).await.unwrap();
        let user = sample_user(Role::User);
        let admin = Actor { user_id: Uuid::new_v4(), role: Role::Admin };

        let first = f.manager.create_booking(&user, new_booking(service.id, slots[0], 800_000), Utc::now()).await.unwrap();
        f.manager.create_booking(&user, new_booking(service.id, slots[1], 500_000), Utc::now()).await.unwrap();
        let third = f.manager.create_booking(&user, new_booking(service.id, slots[2], 300_000), Utc::now()).await.unwrap();
        let paid = BookingUpdate { status: Some(BookingStatus::Paid), admin_note: None };
        f.manager.update_booking(first.id, &admin, paid, Utc::now()).await.unwrap();
        f.manager.cancel_booking(third.id, &Actor::from(&user), Utc::now()).await.unwrap();

        let stats = f.manager.stats(Utc::now()).await.unwrap();
        assert_eq!(stats.overview.total, 3);
        assert_eq!(stats.overview.pending, 1);
        assert_eq!(stats.overview.paid, 1);
        assert_eq!(stats.overview.cancelled, 1);
        assert_eq!(stats.overview.monthly, 3);
        assert_eq!(stats.overview.revenue, 800_000);
        assert_eq!(stats.service_stats.len(), 1);
        assert_eq!(stats.service_stats[0].count, 3);
    }

    #[test]
    fn test_month_bounds_roll_over_year() {
        let (start, end) = month_bounds(at("2025-12-15T10:00:00Z")).unwrap();
        assert_eq!(start, at("2025-12-01T00:00:00Z"));
        assert_eq!(end, at("2026-01-01T00:00:00Z"));
    }
}
