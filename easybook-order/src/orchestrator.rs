use chrono::{DateTime, Utc};
use easybook_core::payment::{CallbackParams, PaymentRedirect, RedirectRequest};
use easybook_core::repository::BookingRepository;
use easybook_core::{
    Actor, Booking, BookingStatus, CoreError, CoreResult, PaymentGateway, PaymentOutcome,
    PaymentProvider, PaymentStatus, VerifiedPayment,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Re-reads allowed when a concurrent write beats the callback's save.
const SAVE_ATTEMPTS: usize = 3;

/// Result of applying a verified callback.
#[derive(Debug, Clone)]
pub struct CallbackResult {
    pub booking: Booking,
    pub payment: VerifiedPayment,
    /// False when the callback repeated an outcome already recorded
    pub changed: bool,
}

/// Routes payment calls to the gateway registered for each provider tag and
/// applies verified outcomes to bookings.
pub struct PaymentOrchestrator {
    gateways: HashMap<PaymentProvider, Arc<dyn PaymentGateway>>,
    bookings: Arc<dyn BookingRepository>,
}

impl PaymentOrchestrator {
    pub fn new(bookings: Arc<dyn BookingRepository>) -> Self {
        Self { gateways: HashMap::new(), bookings }
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateways.insert(gateway.provider(), gateway);
        self
    }

    fn gateway(&self, provider: PaymentProvider) -> CoreResult<&Arc<dyn PaymentGateway>> {
        self.gateways
            .get(&provider)
            .ok_or_else(|| CoreError::Validation(format!("Payment provider {} is not enabled", provider)))
    }

    /// Build the provider redirect for a booking the caller owns and has not
    /// paid yet.
    pub async fn initialize_payment(
        &self,
        provider: PaymentProvider,
        booking_id: Uuid,
        actor: &Actor,
        return_url: &str,
        client_ip: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<PaymentRedirect> {
        let gateway = self.gateway(provider)?;
        let booking = self
            .bookings
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| CoreError::NotFound("Booking".to_string()))?;

        if !booking.is_owned_by(actor.user_id) {
            return Err(CoreError::Forbidden("You can only pay for your own bookings".to_string()));
        }
        if booking.status != BookingStatus::Pending {
            return Err(CoreError::Conflict(format!(
                "Booking is {} and cannot be paid",
                booking.status
            )));
        }

        let redirect = gateway.build_redirect(&RedirectRequest {
            booking_id: booking.id,
            amount: booking.amount,
            return_url: return_url.to_string(),
            client_ip: client_ip.to_string(),
            requested_at: now,
        })?;

        info!(
            provider = %provider,
            booking_id = %booking.id,
            reference = %redirect.reference,
            "Payment redirect created"
        );
        Ok(redirect)
    }

    /// Verify a provider callback and record its outcome. A bad signature
    /// returns before anything is read or written.
    pub async fn handle_callback(
        &self,
        provider: PaymentProvider,
        params: &CallbackParams,
        now: DateTime<Utc>,
    ) -> CoreResult<CallbackResult> {
        let payment = match self.gateway(provider)?.verify_callback(params) {
            Ok(payment) => payment,
            Err(e) => {
                warn!(provider = %provider, error = %e, "Rejected payment callback");
                return Err(e);
            }
        };

        for _ in 0..SAVE_ATTEMPTS {
            let mut booking = self
                .bookings
                .get_booking(payment.booking_id)
                .await?
                .ok_or_else(|| CoreError::NotFound("Booking".to_string()))?;

            if let Some(amount) = payment.amount {
                if amount != booking.amount {
                    warn!(
                        provider = %provider,
                        booking_id = %booking.id,
                        expected = booking.amount,
                        received = amount,
                        "Payment amount mismatch"
                    );
                    return Err(CoreError::Validation(format!(
                        "Paid amount {} does not match booking amount {}",
                        amount, booking.amount
                    )));
                }
            }

            if booking.payment_status == PaymentStatus::Paid {
                if payment.outcome == PaymentOutcome::Paid
                    && booking.payment_id.as_deref() != Some(payment.reference.as_str())
                {
                    warn!(
                        booking_id = %booking.id,
                        recorded = ?booking.payment_id,
                        reference = %payment.reference,
                        "Second payment for an already paid booking"
                    );
                }
                return Ok(CallbackResult { booking, payment, changed: false });
            }

            let expected = booking.state();
            match payment.outcome {
                PaymentOutcome::Paid => booking.mark_paid(&payment.reference),
                PaymentOutcome::Failed => booking.mark_payment_failed(),
            }
            booking.expire_if_past(now);
            if !self.bookings.save_booking(&booking, expected).await? {
                debug!(booking_id = %booking.id, "Booking changed during callback, re-reading");
                continue;
            }

            info!(
                provider = %provider,
                booking_id = %booking.id,
                outcome = ?payment.outcome,
                status = %booking.status,
                "Payment callback applied"
            );
            return Ok(CallbackResult { booking, payment, changed: true });
        }

        Err(CoreError::Conflict(format!(
            "Booking {} kept changing while applying the payment callback",
            payment.booking_id
        )))
    }
}
