pub mod booking;
pub mod notify;
pub mod payment;
pub mod repository;
pub mod user;

use chrono::{DateTime, Utc};
use easybook_catalog::SlotError;
use uuid::Uuid;

pub use booking::{Booking, BookingState, BookingStatus, CustomerInfo, NewBooking, PaymentMethod, PaymentStatus};
pub use payment::{PaymentGateway, PaymentOutcome, PaymentProvider, VerifiedPayment};
pub use user::{Actor, Role, User};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Access denied: {0}")]
    Forbidden(String),
    #[error("Authentication failed: {0}")]
    Unauthenticated(String),
    #[error("Service {0} is not active")]
    ServiceInactive(Uuid),
    #[error("Slot {0} is already booked or not available")]
    SlotUnavailable(DateTime<Utc>),
    #[error("Slot {0} already has an active booking")]
    DuplicateBooking(DateTime<Utc>),
    #[error("Booking can only be cancelled while pending and at least {0} hours in advance")]
    CancellationNotAllowed(i64),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid {0} signature")]
    SignatureInvalid(PaymentProvider),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Internal service error: {0}")]
    Internal(String),
}

impl From<SlotError> for CoreError {
    fn from(err: SlotError) -> Self {
        match err {
            SlotError::NotAvailable(time) => CoreError::SlotUnavailable(time),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
