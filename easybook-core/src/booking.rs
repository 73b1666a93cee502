use chrono::{DateTime, Duration, Utc};
use easybook_shared::Masked;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Minimum lead time for a customer cancellation.
pub const DEFAULT_CANCELLATION_WINDOW_HOURS: i64 = 2;

/// Upper bound on a booking amount, in VND. Gateways scale amounts (VNPAY
/// by 100), so this keeps every provider payload within `i64`.
pub const MAX_BOOKING_AMOUNT: i64 = 1_000_000_000_000;

/// Booking status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Paid,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 4] = [
        BookingStatus::Pending,
        BookingStatus::Paid,
        BookingStatus::Cancelled,
        BookingStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Paid => "paid",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    /// Statuses that hold a slot
    pub fn holds_slot(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Paid)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BookingStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Unknown booking status: {}", s))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(format!("Unknown payment status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Vnpay,
    Paypal,
    Momo,
    Cash,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Vnpay => "vnpay",
            PaymentMethod::Paypal => "paypal",
            PaymentMethod::Momo => "momo",
            PaymentMethod::Cash => "cash",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vnpay" => Ok(PaymentMethod::Vnpay),
            "paypal" => Ok(PaymentMethod::Paypal),
            "momo" => Ok(PaymentMethod::Momo),
            "cash" => Ok(PaymentMethod::Cash),
            other => Err(format!("Unknown payment method: {}", other)),
        }
    }
}

/// Contact snapshot taken at booking time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomerInfo {
    pub name: String,
    pub phone: Masked<String>,
    pub email: Masked<String>,
    #[serde(default)]
    pub note: String,
}

/// Validated input for a new booking
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub service_id: Uuid,
    pub time: DateTime<Utc>,
    pub payment_method: PaymentMethod,
    pub amount: i64,
    pub customer_info: CustomerInfo,
}

/// Status pair a conditional save is checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingState {
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
}

/// A user's reservation of one slot, with payment tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub service_id: Uuid,
    pub time: DateTime<Utc>,
    pub status: BookingStatus,
    pub payment_method: PaymentMethod,
    pub amount: i64,
    pub payment_status: PaymentStatus,
    pub payment_id: Option<String>,
    pub customer_info: CustomerInfo,
    pub admin_note: Option<String>,
    pub is_reminder_sent: bool,
    pub reminder_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(user_id: Uuid, request: NewBooking) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            service_id: request.service_id,
            time: easybook_catalog::normalize_slot(request.time),
            status: BookingStatus::Pending,
            payment_method: request.payment_method,
            amount: request.amount,
            payment_status: PaymentStatus::Pending,
            payment_id: None,
            customer_info: request.customer_info,
            admin_note: None,
            is_reminder_sent: false,
            reminder_sent_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn state(&self) -> BookingState {
        BookingState { status: self.status, payment_status: self.payment_status }
    }

    pub fn can_cancel(&self, now: DateTime<Utc>, window: Duration) -> bool {
        cancellation_permitted(self.status, self.time, now, window)
    }

    /// Set a new status. `paid` drags `paymentStatus` along so the two never
    /// disagree.
    pub fn set_status(&mut self, status: BookingStatus) {
        self.status = status;
        if status == BookingStatus::Paid {
            self.payment_status = PaymentStatus::Paid;
        }
        self.updated_at = Utc::now();
    }

    /// Record a verified successful payment. A cancelled booking keeps its
    /// status; the payment is still recorded so it can be refunded.
    pub fn mark_paid(&mut self, reference: &str) {
        if self.status != BookingStatus::Cancelled {
            self.status = BookingStatus::Paid;
        }
        self.payment_status = PaymentStatus::Paid;
        self.payment_id = Some(reference.to_string());
        self.updated_at = Utc::now();
    }

    /// Record a verified failed payment. Status is left alone so a pending
    /// booking can be paid again.
    pub fn mark_payment_failed(&mut self) {
        self.payment_status = PaymentStatus::Failed;
        self.updated_at = Utc::now();
    }

    pub fn mark_reminder_sent(&mut self, at: DateTime<Utc>) {
        self.is_reminder_sent = true;
        self.reminder_sent_at = Some(at);
    }

    /// Runs before every save: a pending booking whose time has passed is
    /// cancelled. Returns true when the status changed.
    pub fn expire_if_past(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == BookingStatus::Pending && self.time < now {
            self.status = BookingStatus::Cancelled;
            self.updated_at = now;
            return true;
        }
        false
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.user_id == user_id
    }
}

/// Cancellation is permitted iff the booking is pending and starts at least
/// `window` after `now`.
pub fn cancellation_permitted(
    status: BookingStatus,
    time: DateTime<Utc>,
    now: DateTime<Utc>,
    window: Duration,
) -> bool {
    status == BookingStatus::Pending && time - now >= window
}
