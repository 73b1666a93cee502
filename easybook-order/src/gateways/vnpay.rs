use chrono::{Duration, FixedOffset};
use easybook_core::payment::{
    booking_id_from_reference, transaction_reference, CallbackParams, PaymentRedirect,
    RedirectRequest,
};
use easybook_core::{CoreError, CoreResult, PaymentGateway, PaymentOutcome, PaymentProvider, VerifiedPayment};
use easybook_store::app_config::VnpayConfig;
use std::collections::BTreeMap;

use super::{form_encode, parse_amount, required, sign, verify, Digest};

const VERSION: &str = "2.1.0";
const SUCCESS_CODE: &str = "00";
/// VNPAY timestamps are GMT+7 regardless of where we run.
const VNPAY_UTC_OFFSET_SECONDS: i32 = 7 * 3600;
const EXPIRE_AFTER_MINUTES: i64 = 15;

pub struct VnpayGateway {
    config: VnpayConfig,
}

impl VnpayGateway {
    pub fn new(config: VnpayConfig) -> Self {
        Self { config }
    }
}

/// Sorted `key=value` pairs, values form-encoded, empty values dropped.
fn sign_data(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| format!("{}={}", form_encode(key), form_encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

impl PaymentGateway for VnpayGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Vnpay
    }

    fn build_redirect(&self, request: &RedirectRequest) -> CoreResult<PaymentRedirect> {
        let offset = FixedOffset::east_opt(VNPAY_UTC_OFFSET_SECONDS)
            .ok_or_else(|| CoreError::Internal("invalid VNPAY offset".to_string()))?;
        let created = request.requested_at.with_timezone(&offset);
        let expires = created + Duration::minutes(EXPIRE_AFTER_MINUTES);
        let reference = transaction_reference(request.booking_id, request.requested_at);

        let mut params = BTreeMap::new();
        params.insert("vnp_Version".to_string(), VERSION.to_string());
        params.insert("vnp_Command".to_string(), "pay".to_string());
        params.insert("vnp_TmnCode".to_string(), self.config.tmn_code.clone());
        let scaled = request
            .amount
            .checked_mul(100)
            .ok_or_else(|| CoreError::Validation(format!("Amount {} is too large for VNPAY", request.amount)))?;
        params.insert("vnp_Amount".to_string(), scaled.to_string());
        params.insert("vnp_CurrCode".to_string(), "VND".to_string());
        params.insert("vnp_TxnRef".to_string(), reference.clone());
        params.insert(
            "vnp_OrderInfo".to_string(),
            format!("Thanh toan booking {}", request.booking_id),
        );
        params.insert("vnp_OrderType".to_string(), "other".to_string());
        params.insert("vnp_Locale".to_string(), "vn".to_string());
        params.insert("vnp_ReturnUrl".to_string(), request.return_url.clone());
        params.insert("vnp_IpAddr".to_string(), request.client_ip.clone());
        params.insert("vnp_CreateDate".to_string(), created.format("%Y%m%d%H%M%S").to_string());
        params.insert("vnp_ExpireDate".to_string(), expires.format("%Y%m%d%H%M%S").to_string());

        let query = sign_data(&params);
        let signature = sign(Digest::Sha512, &self.config.hash_secret, &query)?;

        Ok(PaymentRedirect {
            provider: PaymentProvider::Vnpay,
            payment_url: format!("{}?{}&vnp_SecureHash={}", self.config.url, query, signature),
            reference,
            payment_data: None,
        })
    }

    fn verify_callback(&self, params: &CallbackParams) -> CoreResult<VerifiedPayment> {
        let provided = params
            .get("vnp_SecureHash")
            .ok_or(CoreError::SignatureInvalid(PaymentProvider::Vnpay))?;

        let signed: BTreeMap<String, String> = params
            .iter()
            .filter(|(key, _)| key.starts_with("vnp_"))
            .filter(|(key, _)| *key != "vnp_SecureHash" && *key != "vnp_SecureHashType")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        if !verify(Digest::Sha512, &self.config.hash_secret, &sign_data(&signed), provided) {
            return Err(CoreError::SignatureInvalid(PaymentProvider::Vnpay));
        }

        let reference = required(params, "vnp_TxnRef", PaymentProvider::Vnpay)?;
        let booking_id = booking_id_from_reference(reference).ok_or_else(|| {
            CoreError::Validation(format!("Unknown transaction reference {}", reference))
        })?;
        let amount = params
            .get("vnp_Amount")
            .and_then(|raw| parse_amount(raw))
            .map(|minor| minor / 100);
        let outcome = match params.get("vnp_ResponseCode").map(String::as_str) {
            Some(SUCCESS_CODE) => PaymentOutcome::Paid,
            _ => PaymentOutcome::Failed,
        };

        Ok(VerifiedPayment {
            provider: PaymentProvider::Vnpay,
            booking_id,
            reference: reference.to_string(),
            outcome,
            amount,
        })
    }
}
