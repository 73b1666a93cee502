use chrono::{DateTime, Duration, Utc};
use easybook_core::notify::{Notification, NotificationKind, Notifier, Recipient};
use easybook_core::repository::{BookingRepository, ServiceRepository, UserRepository};
use easybook_core::{Booking, CoreError, CoreResult};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Bookings starting between `LEAD - SLACK` and `LEAD + SLACK` from now are due.
const REMINDER_LEAD_HOURS: i64 = 24;
const REMINDER_SLACK_HOURS: i64 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub sent: usize,
    pub failed: usize,
}

/// One pass of the day-before reminder job. Each booking is reminded at most
/// once: the flag is set only after a successful send, and a failure on one
/// booking never stops the rest of the batch.
pub struct ReminderSweep {
    services: Arc<dyn ServiceRepository>,
    bookings: Arc<dyn BookingRepository>,
    users: Arc<dyn UserRepository>,
    notifier: Arc<dyn Notifier>,
    send_timeout: std::time::Duration,
}

impl ReminderSweep {
    pub fn new(
        services: Arc<dyn ServiceRepository>,
        bookings: Arc<dyn BookingRepository>,
        users: Arc<dyn UserRepository>,
        notifier: Arc<dyn Notifier>,
        send_timeout: std::time::Duration,
    ) -> Self {
        Self { services, bookings, users, notifier, send_timeout }
    }

    pub async fn run_once(&self, now: DateTime<Utc>) -> CoreResult<SweepReport> {
        let target = now + Duration::hours(REMINDER_LEAD_HOURS);
        let slack = Duration::hours(REMINDER_SLACK_HOURS);
        let due = self.bookings.due_for_reminder(target - slack, target + slack).await?;

        let mut report = SweepReport { scanned: due.len(), ..Default::default() };
        for booking in &due {
            match self.remind(booking, now).await {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    warn!(booking_id = %booking.id, error = %e, "Reminder failed");
                    report.failed += 1;
                }
            }
        }

        if report.scanned > 0 {
            info!(scanned = report.scanned, sent = report.sent, failed = report.failed, "Reminder sweep finished");
        }
        Ok(report)
    }

    async fn remind(&self, booking: &Booking, now: DateTime<Utc>) -> CoreResult<()> {
        let service = self
            .services
            .get_service(booking.service_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Service {}", booking.service_id)))?;

        // Fall back to the contact snapshot if the account is gone.
        let recipient = match self.users.get_user(booking.user_id).await? {
            Some(user) => Recipient { name: user.name, email: user.email },
            None => Recipient {
                name: booking.customer_info.name.clone(),
                email: booking.customer_info.email.inner().clone(),
            },
        };

        let notification = Notification {
            kind: NotificationKind::BookingReminder,
            recipient,
            booking: booking.clone(),
            service,
        };
        match tokio::time::timeout(self.send_timeout, self.notifier.send(&notification)).await {
            Err(_) => return Err(CoreError::Internal("reminder delivery timed out".to_string())),
            Ok(Err(e)) => return Err(CoreError::Internal(e.to_string())),
            Ok(Ok(())) => {}
        }

        self.bookings.mark_reminder_sent(booking.id, now).await
    }
}
