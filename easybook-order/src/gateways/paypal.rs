use easybook_core::payment::{
    booking_id_from_reference, transaction_reference, CallbackParams, PaymentRedirect,
    RedirectRequest,
};
use easybook_core::{CoreError, CoreResult, PaymentGateway, PaymentOutcome, PaymentProvider, VerifiedPayment};
use easybook_store::app_config::PaypalConfig;
use url::Url;

use super::{parse_amount, required, sign, verify, Digest};

const COMPLETED: &str = "Completed";

/// Website Payments Standard `_xclick` checkout. Our own HMAC travels in
/// `custom` and comes back as `cm` on the return URL.
pub struct PaypalGateway {
    config: PaypalConfig,
}

impl PaypalGateway {
    pub fn new(config: PaypalConfig) -> Self {
        Self { config }
    }

    /// Fixed order, not lexicographic.
    fn signed_fields(item_number: &str, amount: &str, currency: &str) -> String {
        format!("item_number={}&amount={}&currency_code={}", item_number, amount, currency)
    }
}

impl PaymentGateway for PaypalGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Paypal
    }

    fn build_redirect(&self, request: &RedirectRequest) -> CoreResult<PaymentRedirect> {
        let reference = transaction_reference(request.booking_id, request.requested_at);
        let amount = request.amount.to_string();
        let signature = sign(
            Digest::Sha256,
            &self.config.client_secret,
            &Self::signed_fields(&reference, &amount, &self.config.currency),
        )?;

        let item_name = format!("Booking {}", request.booking_id);
        let url = Url::parse_with_params(
            &self.config.url,
            [
                ("cmd", "_xclick"),
                ("business", self.config.business.as_str()),
                ("item_name", item_name.as_str()),
                ("item_number", reference.as_str()),
                ("amount", amount.as_str()),
                ("currency_code", self.config.currency.as_str()),
                ("return", request.return_url.as_str()),
                ("cancel_return", request.return_url.as_str()),
                ("custom", signature.as_str()),
            ],
        )
        .map_err(|e| CoreError::Internal(format!("invalid PayPal url {}: {}", self.config.url, e)))?;

        Ok(PaymentRedirect {
            provider: PaymentProvider::Paypal,
            payment_url: url.into(),
            reference,
            payment_data: None,
        })
    }

    fn verify_callback(&self, params: &CallbackParams) -> CoreResult<VerifiedPayment> {
        let provided = params
            .get("cm")
            .ok_or(CoreError::SignatureInvalid(PaymentProvider::Paypal))?;
        let field = |key: &str| params.get(key).map(String::as_str).unwrap_or_default();

        let data = Self::signed_fields(field("item_number"), field("amt"), field("cc"));
        if !verify(Digest::Sha256, &self.config.client_secret, &data, provided) {
            return Err(CoreError::SignatureInvalid(PaymentProvider::Paypal));
        }

        let item_number = required(params, "item_number", PaymentProvider::Paypal)?;
        let booking_id = booking_id_from_reference(item_number).ok_or_else(|| {
            CoreError::Validation(format!("Unknown transaction reference {}", item_number))
        })?;
        let outcome = if field("st") == COMPLETED {
            PaymentOutcome::Paid
        } else {
            PaymentOutcome::Failed
        };

        // `tx` is PayPal's transaction id; a cancelled checkout has none.
        let reference = match params.get("tx").filter(|tx| !tx.is_empty()) {
            Some(tx) => tx.clone(),
            None if outcome == PaymentOutcome::Failed => item_number.to_string(),
            None => return Err(CoreError::Validation("paypal callback is missing tx".to_string())),
        };

        Ok(VerifiedPayment {
            provider: PaymentProvider::Paypal,
            booking_id,
            reference,
            outcome,
            amount: parse_amount(field("amt")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    const SECRET: &str = "paypal-client-secret";

    fn gateway() -> PaypalGateway {
        PaypalGateway::new(PaypalConfig {
            business: "merchant@easybook.vn".to_string(),
            client_secret: SECRET.to_string(),
            url: "https://www.sandbox.paypal.com/cgi-bin/webscr".to_string(),
            currency: "VND".to_string(),
        })
    }

    fn request(booking_id: Uuid) -> RedirectRequest {
        RedirectRequest {
            booking_id,
            amount: 800_000,
            return_url: "https://easybook.vn/payment/return".to_string(),
            client_ip: "127.0.0.1".to_string(),
            requested_at: DateTime::parse_from_rfc3339("2025-06-01T02:30:00Z").unwrap().with_timezone(&Utc),
        }
    }

    /// What PayPal appends to the return URL after checkout.
    fn return_params(redirect: &PaymentRedirect, status: &str) -> CallbackParams {
        let url = Url::parse(&redirect.payment_url).unwrap();
        let sent: CallbackParams = url.query_pairs().into_owned().collect();

        let mut params = CallbackParams::new();
        params.insert("tx".to_string(), "8AB12345CD678901E".to_string());
        params.insert("st".to_string(), status.to_string());
        params.insert("amt".to_string(), sent["amount"].clone());
        params.insert("cc".to_string(), sent["currency_code"].clone());
        params.insert("item_number".to_string(), sent["item_number"].clone());
        params.insert("cm".to_string(), sent["custom"].clone());
        params
    }

    #[test]
    fn test_signature_uses_fixed_field_order() {
        let booking_id = Uuid::new_v4();
        let redirect = gateway().build_redirect(&request(booking_id)).unwrap();
        let url = Url::parse(&redirect.payment_url).unwrap();
        let sent: CallbackParams = url.query_pairs().into_owned().collect();

        assert_eq!(sent["cmd"], "_xclick");
        assert_eq!(sent["item_number"], redirect.reference);
        let expected = sign(
            Digest::Sha256,
            SECRET,
            &format!("item_number={}&amount=800000&currency_code=VND", redirect.reference),
        )
        .unwrap();
        assert_eq!(sent["custom"], expected);

        let sorted = sign(
            Digest::Sha256,
            SECRET,
            &format!("amount=800000&currency_code=VND&item_number={}", redirect.reference),
        )
        .unwrap();
        assert_ne!(sent["custom"], sorted);
    }

    #[test]
    fn test_completed_return_is_paid() {
        let booking_id = Uuid::new_v4();
        let redirect = gateway().build_redirect(&request(booking_id)).unwrap();
        let verified = gateway().verify_callback(&return_params(&redirect, "Completed")).unwrap();

        assert_eq!(verified.booking_id, booking_id);
        assert_eq!(verified.outcome, PaymentOutcome::Paid);
        assert_eq!(verified.reference, "8AB12345CD678901E");
        assert_eq!(verified.amount, Some(800_000));

        let pending = gateway().verify_callback(&return_params(&redirect, "Pending")).unwrap();
        assert_eq!(pending.outcome, PaymentOutcome::Failed);
    }

    #[test]
    fn test_tampered_return_is_rejected() {
        let redirect = gateway().build_redirect(&request(Uuid::new_v4())).unwrap();
        let params = return_params(&redirect, "Completed");

        for field in ["amt", "cc", "item_number", "cm"] {
            let mut tampered = params.clone();
            tampered.get_mut(field).unwrap().push('0');
            assert!(
                matches!(
                    gateway().verify_callback(&tampered),
                    Err(CoreError::SignatureInvalid(PaymentProvider::Paypal))
                ),
                "tampering {field} must fail"
            );
        }
    }
}
