use async_trait::async_trait;
use easybook_catalog::Service;
use easybook_shared::mask_email;

use crate::booking::Booking;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    BookingConfirmation,
    BookingReminder,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::BookingConfirmation => "booking_confirmation",
            NotificationKind::BookingReminder => "booking_reminder",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Recipient {
    pub name: String,
    pub email: String,
}

/// Everything a template needs to render one message.
#[derive(Debug, Clone)]
pub struct Notification {
    pub kind: NotificationKind,
    pub recipient: Recipient,
    pub booking: Booking,
    pub service: Service,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Invalid recipient address: {0}")]
    InvalidAddress(String),
    #[error("Message could not be built: {0}")]
    Message(String),
    #[error("Transport failed: {0}")]
    Transport(String),
    #[error("Delivery timed out")]
    Timeout,
}

/// Outbound customer notifications. Callers treat every send as best-effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Used when no SMTP relay is configured: the message is only logged.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            kind = notification.kind.as_str(),
            booking_id = %notification.booking.id,
            to = %mask_email(&notification.recipient.email),
            "SMTP disabled, notification logged only"
        );
        Ok(())
    }
}
