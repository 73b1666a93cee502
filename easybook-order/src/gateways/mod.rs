//! Provider signing schemes behind the `PaymentGateway` trait.

pub mod momo;
pub mod paypal;
pub mod vnpay;

pub use momo::MomoGateway;
pub use paypal::PaypalGateway;
pub use vnpay::VnpayGateway;

use easybook_core::payment::CallbackParams;
use easybook_core::{CoreError, CoreResult, PaymentProvider};
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

#[derive(Debug, Clone, Copy)]
pub(crate) enum Digest {
    Sha256,
    Sha512,
}

/// Lowercase hex HMAC of `data` under `key`.
pub(crate) fn sign(digest: Digest, key: &str, data: &str) -> CoreResult<String> {
    let bytes = match digest {
        Digest::Sha256 => {
            let mut mac = HmacSha256::new_from_slice(key.as_bytes())
                .map_err(|e| CoreError::Internal(e.to_string()))?;
            mac.update(data.as_bytes());
            mac.finalize().into_bytes().to_vec()
        }
        Digest::Sha512 => {
            let mut mac = HmacSha512::new_from_slice(key.as_bytes())
                .map_err(|e| CoreError::Internal(e.to_string()))?;
            mac.update(data.as_bytes());
            mac.finalize().into_bytes().to_vec()
        }
    };
    Ok(hex::encode(bytes))
}

/// Constant-time check of a hex signature (either case). Anything that is not
/// valid hex fails.
pub(crate) fn verify(digest: Digest, key: &str, data: &str, provided_hex: &str) -> bool {
    let Ok(provided) = hex::decode(provided_hex.trim()) else {
        return false;
    };
    match digest {
        Digest::Sha256 => match HmacSha256::new_from_slice(key.as_bytes()) {
            Ok(mut mac) => {
                mac.update(data.as_bytes());
                mac.verify_slice(&provided).is_ok()
            }
            Err(_) => false,
        },
        Digest::Sha512 => match HmacSha512::new_from_slice(key.as_bytes()) {
            Ok(mut mac) => {
                mac.update(data.as_bytes());
                mac.verify_slice(&provided).is_ok()
            }
            Err(_) => false,
        },
    }
}

/// application/x-www-form-urlencoded, space as `+`
pub(crate) fn form_encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

pub(crate) fn required<'a>(
    params: &'a CallbackParams,
    key: &str,
    provider: PaymentProvider,
) -> CoreResult<&'a str> {
    params
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CoreError::Validation(format!("{} callback is missing {}", provider, key)))
}

/// Provider amounts may arrive as `800000` or `800000.00`.
pub(crate) fn parse_amount(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(whole) = raw.parse::<i64>() {
        return Some(whole);
    }
    let value = raw.parse::<f64>().ok()?;
    value.is_finite().then(|| value.round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_then_verify_both_digests() {
        for digest in [Digest::Sha256, Digest::Sha512] {
            let signature = sign(digest, "secret", "a=1&b=2").unwrap();
            assert!(verify(digest, "secret", "a=1&b=2", &signature));
            assert!(verify(digest, "secret", "a=1&b=2", &signature.to_uppercase()));
            assert!(!verify(digest, "secret", "a=1&b=3", &signature));
            assert!(!verify(digest, "other", "a=1&b=2", &signature));
            assert!(!verify(digest, "secret", "a=1&b=2", "zz-not-hex"));
        }
    }

    #[test]
    fn test_known_sha256_vector() {
        // RFC 4231 test case 2
        let signature = sign(Digest::Sha256, "Jefe", "what do ya want for nothing?").unwrap();
        assert_eq!(signature, "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843");
    }

    #[test]
    fn test_form_encode_uses_plus_for_space() {
        assert_eq!(form_encode("Thanh toan booking 1"), "Thanh+toan+booking+1");
        assert_eq!(form_encode("https://a.vn/return?x=1"), "https%3A%2F%2Fa.vn%2Freturn%3Fx%3D1");
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("800000"), Some(800_000));
        assert_eq!(parse_amount("800000.00"), Some(800_000));
        assert_eq!(parse_amount("abc"), None);
    }
}
