use easybook_core::payment::{
    booking_id_from_reference, transaction_reference, CallbackParams, PaymentRedirect,
    RedirectRequest,
};
use easybook_core::{CoreError, CoreResult, PaymentGateway, PaymentOutcome, PaymentProvider, VerifiedPayment};
use easybook_store::app_config::MomoConfig;
use serde_json::json;

use super::{parse_amount, required, sign, verify, Digest};

const PARTNER_NAME: &str = "Test";
const STORE_ID: &str = "MomoTestStore";
const REQUEST_TYPE: &str = "captureWallet";

/// IPN fields covered by the signature, in signing order. `accessKey` comes
/// from our own config, never from the request.
const IPN_SIGNED_FIELDS: [&str; 12] = [
    "amount",
    "extraData",
    "message",
    "orderId",
    "orderInfo",
    "orderType",
    "partnerCode",
    "payType",
    "requestId",
    "responseTime",
    "resultCode",
    "transId",
];

pub struct MomoGateway {
    config: MomoConfig,
}

impl MomoGateway {
    pub fn new(config: MomoConfig) -> Self {
        Self { config }
    }

    fn ipn_raw_signature(&self, params: &CallbackParams) -> String {
        let mut raw = format!("accessKey={}", self.config.access_key);
        for field in IPN_SIGNED_FIELDS {
            raw.push('&');
            raw.push_str(field);
            raw.push('=');
            raw.push_str(params.get(field).map(String::as_str).unwrap_or_default());
        }
        raw
    }
}

impl PaymentGateway for MomoGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Momo
    }

    fn build_redirect(&self, request: &RedirectRequest) -> CoreResult<PaymentRedirect> {
        let reference = transaction_reference(request.booking_id, request.requested_at);
        let order_info = format!("Thanh toan booking {}", request.booking_id);
        let extra_data = "";

        let raw = format!(
            "accessKey={}&amount={}&extraData={}&ipnUrl={}&orderId={}&orderInfo={}&partnerCode={}&redirectUrl={}&requestId={}&requestType={}",
            self.config.access_key,
            request.amount,
            extra_data,
            self.config.ipn_url,
            reference,
            order_info,
            self.config.partner_code,
            request.return_url,
            reference,
            REQUEST_TYPE,
        );
        let signature = sign(Digest::Sha256, &self.config.secret_key, &raw)?;

        let payload = json!({
            "partnerCode": self.config.partner_code,
            "partnerName": PARTNER_NAME,
            "storeId": STORE_ID,
            "requestId": reference,
            "amount": request.amount,
            "orderId": reference,
            "orderInfo": order_info,
            "redirectUrl": request.return_url,
            "ipnUrl": self.config.ipn_url,
            "lang": "vi",
            "extraData": extra_data,
            "requestType": REQUEST_TYPE,
            "signature": signature,
        });

        Ok(PaymentRedirect {
            provider: PaymentProvider::Momo,
            payment_url: self.config.endpoint.clone(),
            reference,
            payment_data: Some(payload),
        })
    }

    fn verify_callback(&self, params: &CallbackParams) -> CoreResult<VerifiedPayment> {
        let provided = params
            .get("signature")
            .ok_or(CoreError::SignatureInvalid(PaymentProvider::Momo))?;

        if !verify(Digest::Sha256, &self.config.secret_key, &self.ipn_raw_signature(params), provided) {
            return Err(CoreError::SignatureInvalid(PaymentProvider::Momo));
        }

        let reference = required(params, "orderId", PaymentProvider::Momo)?;
        let booking_id = booking_id_from_reference(reference).ok_or_else(|| {
            CoreError::Validation(format!("Unknown transaction reference {}", reference))
        })?;
        let outcome = match params.get("resultCode").map(|code| code.trim()) {
            Some("0") => PaymentOutcome::Paid,
            _ => PaymentOutcome::Failed,
        };

        Ok(VerifiedPayment {
            provider: PaymentProvider::Momo,
            booking_id,
            reference: reference.to_string(),
            outcome,
            amount: params.get("amount").and_then(|raw| parse_amount(raw)),
        })
    }
}
