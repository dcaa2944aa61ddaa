use anyhow::Context;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use utoipa::ToSchema;

use crate::{api::ApiUrls, core::app_error::AppError, core::config};

type HmacSha256 = Hmac<Sha256>;

/// A payment intent created on the gateway. `id` is what the checkout widget
/// needs to open.
#[derive(Deserialize, Serialize, Debug, Clone, ToSchema)]
pub struct PaymentIntent {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
}

#[derive(Serialize, Debug)]
struct CreateOrderRequest<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

#[derive(Clone)]
pub struct RazorpayClient {
    http: Client,
    base_url: String,
}

impl RazorpayClient {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            base_url: ApiUrls::get_razorpay_base_url(),
        }
    }

    /// Creates a gateway order for `amount` rupees. Razorpay wants the amount
    /// in paise.
    pub async fn create_payment_intent(
        &self,
        amount: f32,
        receipt: &str,
    ) -> Result<PaymentIntent, AppError> {
        let key_id = config::require("RAZORPAY_KEY_ID")?;
        let key_secret = config::require("RAZORPAY_KEY_SECRET")?;

        let body = CreateOrderRequest {
            amount: to_paise(amount),
            currency: "INR",
            receipt,
        };

        let response = self
            .http
            .post(format!("{}/v1/orders", self.base_url))
            .basic_auth(&key_id, Some(&key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|_| AppError::ServiceUnreachable("Razorpay".to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::UpstreamRejected(format!(
                "Razorpay refused the order ({status}): {detail}"
            )));
        }

        let intent = response
            .json()
            .await
            .context("Failed to parse Razorpay order response")?;
        Ok(intent)
    }
}

/// Checks the checkout-widget callback signature:
/// `hex(hmac_sha256("<order_ref>|<payment_ref>", key_secret))`.
pub fn verify_payment_signature(
    order_ref: &str,
    payment_ref: &str,
    signature: &str,
    key_secret: &str,
) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(key_secret.as_bytes()) else {
        return false;
    };
    mac.update(format!("{order_ref}|{payment_ref}").as_bytes());

    match hex::decode(signature) {
        Ok(signature) => mac.verify_slice(&signature).is_ok(),
        Err(_) => false,
    }
}

pub fn to_paise(amount: f32) -> i64 {
    (f64::from(amount) * 100.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(order_ref: &str, payment_ref: &str, secret: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{order_ref}|{payment_ref}").as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_the_gateway_signature() {
        let signature = sign("order_N9xBq", "pay_O3kLm", "secret");
        assert!(verify_payment_signature(
            "order_N9xBq",
            "pay_O3kLm",
            &signature,
            "secret"
        ));
    }

    #[test]
    fn rejects_a_signature_for_another_payment() {
        let signature = sign("order_N9xBq", "pay_O3kLm", "secret");
        assert!(!verify_payment_signature(
            "order_N9xBq",
            "pay_other",
            &signature,
            "secret"
        ));
        assert!(!verify_payment_signature(
            "order_N9xBq",
            "pay_O3kLm",
            &signature,
            "wrong-secret"
        ));
    }

    #[test]
    fn rejects_non_hex_signatures() {
        assert!(!verify_payment_signature("o", "p", "zz-not-hex", "secret"));
    }

    #[test]
    fn converts_rupees_to_paise() {
        assert_eq!(to_paise(1.0), 100);
        assert_eq!(to_paise(2499.0), 249_900);
        assert_eq!(to_paise(0.35), 35);
        // 70% advance on a 999 order.
        assert_eq!(to_paise(999.0 * 0.7), 69_930);
    }
}
