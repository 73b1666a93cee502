use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::booking::PaymentMethod;
use crate::CoreResult;

/// Online payment providers. Cash bookings never go through a gateway.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider {
    Vnpay,
    Momo,
    Paypal,
}

impl PaymentProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentProvider::Vnpay => "vnpay",
            PaymentProvider::Momo => "momo",
            PaymentProvider::Paypal => "paypal",
        }
    }

    pub fn method(&self) -> PaymentMethod {
        match self {
            PaymentProvider::Vnpay => PaymentMethod::Vnpay,
            PaymentProvider::Momo => PaymentMethod::Momo,
            PaymentProvider::Paypal => PaymentMethod::Paypal,
        }
    }
}

impl fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vnpay" => Ok(PaymentProvider::Vnpay),
            "momo" => Ok(PaymentProvider::Momo),
            "paypal" => Ok(PaymentProvider::Paypal),
            other => Err(format!("Unknown payment provider: {}", other)),
        }
    }
}

/// What a gateway needs to build the outbound redirect for one booking.
#[derive(Debug, Clone)]
pub struct RedirectRequest {
    pub booking_id: Uuid,
    pub amount: i64,
    pub return_url: String,
    pub client_ip: String,
    pub requested_at: DateTime<Utc>,
}

/// Signed redirect handed back to the client.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRedirect {
    pub provider: PaymentProvider,
    pub payment_url: String,
    /// Transaction reference sent to the provider
    pub reference: String,
    /// Request body for providers that expect a POST (Momo)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_data: Option<serde_json::Value>,
}

/// Raw callback fields as received, signature included.
pub type CallbackParams = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentOutcome {
    Paid,
    Failed,
}

/// A callback whose signature checked out.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedPayment {
    pub provider: PaymentProvider,
    pub booking_id: Uuid,
    pub reference: String,
    pub outcome: PaymentOutcome,
    /// Amount reported by the provider, in booking units
    pub amount: Option<i64>,
}

/// One provider's signing scheme.
///
/// `verify_callback` must fail closed with `CoreError::SignatureInvalid`
/// whenever the recomputed signature differs from the one supplied.
pub trait PaymentGateway: Send + Sync {
    fn provider(&self) -> PaymentProvider;

    fn build_redirect(&self, request: &RedirectRequest) -> CoreResult<PaymentRedirect>;

    fn verify_callback(&self, params: &CallbackParams) -> CoreResult<VerifiedPayment>;
}

/// `booking_<id>_<millis>`; unique per attempt so a retried payment gets a fresh reference.
pub fn transaction_reference(booking_id: Uuid, at: DateTime<Utc>) -> String {
    format!("booking_{}_{}", booking_id.simple(), at.timestamp_millis())
}

pub fn booking_id_from_reference(reference: &str) -> Option<Uuid> {
    let mut parts = reference.split('_');
    if parts.next()? != "booking" {
        return None;
    }
    Uuid::parse_str(parts.next()?).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_carries_booking_id() {
        let booking_id = Uuid::new_v4();
        let at = DateTime::parse_from_rfc3339("2025-06-01T09:00:00Z").unwrap().with_timezone(&Utc);
        let reference = transaction_reference(booking_id, at);

        assert_eq!(reference, format!("booking_{}_1748768400000", booking_id.simple()));
        assert_eq!(booking_id_from_reference(&reference), Some(booking_id));
    }

    #[test]
    fn test_foreign_references_are_rejected() {
        assert_eq!(booking_id_from_reference("order_123_456"), None);
        assert_eq!(booking_id_from_reference("booking_not-a-uuid_1"), None);
        assert_eq!(booking_id_from_reference(""), None);
    }
}
