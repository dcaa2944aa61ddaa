use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::future::BoxFuture;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::api::ApiUrls;

/// Shiprocket issues 10-day bearer tokens; we treat ours as stale after 9
/// days so a token never expires mid-flight.
const TOKEN_TTL_DAYS: i64 = 9;

#[derive(Error, Debug)]
pub enum ShiprocketError {
    #[error("Missing configuration: {0}")]
    Config(String),

    #[error("Courier authentication failed ({0})")]
    Auth(StatusCode),

    #[error("Courier rejected the request: {0}")]
    Validation(String),

    #[error("Waybill assignment failed: {0}")]
    Awb(String),

    #[error("Courier request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected courier response ({status}): {body}")]
    Unexpected { status: StatusCode, body: String },
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    issued_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now - self.issued_at < Duration::days(TOKEN_TTL_DAYS)
    }
}

/// Seam between the retry policy and token acquisition so the policy is
/// testable without a live courier account.
#[async_trait]
pub trait TokenSource {
    async fn token(&self, force_refresh: bool) -> Result<String, ShiprocketError>;
}

/// Runs `op` with a bearer token. On 401/403 the token is force-refreshed
/// once and `op` retried exactly once; a second auth failure and every
/// non-auth failure propagate unchanged.
pub async fn with_retry<'a, T, S, F>(source: &S, op: F) -> Result<T, ShiprocketError>
where
    S: TokenSource,
    F: Fn(String) -> BoxFuture<'a, Result<T, ShiprocketError>>,
{
    let token = source.token(false).await?;
    match op(token).await {
        Err(ShiprocketError::Auth(_)) => {
            let token = source.token(true).await?;
            op(token).await
        }
        result => result,
    }
}

// Wire types

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ShipmentOrderItem {
    pub name: String,
    pub sku: String,
    pub units: i32,
    pub selling_price: f32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ShipmentOrderRequest {
    pub order_id: String,
    pub order_date: String,
    pub pickup_location: String,
    pub billing_customer_name: String,
    pub billing_last_name: String,
    pub billing_address: String,
    pub billing_address_2: String,
    pub billing_city: String,
    pub billing_pincode: String,
    pub billing_state: String,
    pub billing_country: String,
    pub billing_email: String,
    pub billing_phone: String,
    pub shipping_is_billing: bool,
    pub order_items: Vec<ShipmentOrderItem>,
    pub payment_method: String,
    pub sub_total: f32,
    pub length: f32,
    pub breadth: f32,
    pub height: f32,
    pub weight: f32,
}

#[derive(Deserialize, Debug)]
pub struct ShipmentOrderResponse {
    pub order_id: i64,
    pub shipment_id: i64,
    pub status: Option<String>,
}

#[derive(Serialize, Debug, Clone)]
pub struct AddPickupLocationRequest {
    pub pickup_location: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub address_2: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub pin_code: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct PickupLocation {
    pub id: i64,
    pub pickup_location: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub pin_code: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AwbData {
    pub awb_code: String,
    pub courier_name: String,
}

#[derive(Deserialize, Debug)]
struct LoginResponse {
    token: String,
}

#[derive(Deserialize, Debug)]
struct PickupLocationsResponse {
    data: PickupLocationsData,
}

#[derive(Deserialize, Debug)]
struct PickupLocationsData {
    shipping_address: Vec<PickupLocation>,
}

#[derive(Deserialize, Debug)]
struct AwbAssignResponse {
    awb_assign_status: i32,
    response: Option<AwbResponseBody>,
}

#[derive(Deserialize, Debug)]
struct AwbResponseBody {
    data: Option<AwbData>,
}

#[derive(Serialize, Debug)]
struct AssignAwbRequest {
    shipment_id: i64,
}

#[derive(Clone)]
pub struct ShiprocketClient {
    http: Client,
    base_url: String,
    token: Arc<RwLock<Option<CachedToken>>>,
}

impl ShiprocketClient {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            base_url: ApiUrls::get_shiprocket_base_url(),
            token: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn create_order(
        &self,
        request: &ShipmentOrderRequest,
    ) -> Result<ShipmentOrderResponse, ShiprocketError> {
        with_retry(self, |token| {
            Box::pin(async move {
                self.execute(
                    self.http
                        .post(format!(
                            "{}/v1/external/orders/create/adhoc",
                            self.base_url
                        ))
                        .bearer_auth(token)
                        .json(request),
                )
                .await
            })
        })
        .await
    }

    pub async fn get_pickup_locations(&self) -> Result<Vec<PickupLocation>, ShiprocketError> {
        let response: PickupLocationsResponse = with_retry(self, |token| {
            Box::pin(async move {
                self.execute(
                    self.http
                        .get(format!(
                            "{}/v1/external/settings/company/pickup",
                            self.base_url
                        ))
                        .bearer_auth(token),
                )
                .await
            })
        })
        .await?;

        Ok(response.data.shipping_address)
    }

    pub async fn add_pickup_location(
        &self,
        request: &AddPickupLocationRequest,
    ) -> Result<(), ShiprocketError> {
        let _: serde_json::Value = with_retry(self, |token| {
            Box::pin(async move {
                self.execute(
                    self.http
                        .post(format!(
                            "{}/v1/external/settings/company/addpickup",
                            self.base_url
                        ))
                        .bearer_auth(token)
                        .json(request),
                )
                .await
            })
        })
        .await?;

        Ok(())
    }

    pub async fn assign_awb(&self, shipment_id: i64) -> Result<AwbData, ShiprocketError> {
        let response: AwbAssignResponse = with_retry(self, |token| {
            Box::pin(async move {
                self.execute(
                    self.http
                        .post(format!("{}/v1/external/courier/assign/awb", self.base_url))
                        .bearer_auth(token)
                        .json(&AssignAwbRequest { shipment_id }),
                )
                .await
            })
        })
        .await?;

        if response.awb_assign_status != 1 {
            return Err(ShiprocketError::Awb(format!(
                "assign status {} for shipment {shipment_id}",
                response.awb_assign_status
            )));
        }

        response
            .response
            .and_then(|body| body.data)
            .ok_or_else(|| {
                ShiprocketError::Awb(format!("no waybill returned for shipment {shipment_id}"))
            })
    }

    async fn login(&self) -> Result<CachedToken, ShiprocketError> {
        let email = credential("SHIPROCKET_EMAIL")?;
        let password = credential("SHIPROCKET_PASSWORD")?;

        let response: LoginResponse = self
            .execute(
                self.http
                    .post(format!("{}/v1/external/auth/login", self.base_url))
                    .json(&serde_json::json!({ "email": email, "password": password })),
            )
            .await?;

        Ok(CachedToken {
            value: response.token,
            issued_at: Utc::now(),
        })
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ShiprocketError> {
        let response = request.send().await?;
        let status = response.status();

        match status {
            status if status.is_success() => Ok(response.json().await?),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ShiprocketError::Auth(status)),
            StatusCode::UNPROCESSABLE_ENTITY => Err(ShiprocketError::Validation(
                response.text().await.unwrap_or_default(),
            )),
            status => Err(ShiprocketError::Unexpected {
                status,
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

#[async_trait]
impl TokenSource for ShiprocketClient {
    async fn token(&self, force_refresh: bool) -> Result<String, ShiprocketError> {
        if !force_refresh {
            if let Some(cached) = self.token.read().await.as_ref() {
                if cached.is_fresh(Utc::now()) {
                    return Ok(cached.value.clone());
                }
            }
        }

        let fresh = self.login().await?;
        let value = fresh.value.clone();
        *self.token.write().await = Some(fresh);
        Ok(value)
    }
}

fn credential(key: &str) -> Result<String, ShiprocketError> {
    std::env::var(key).map_err(|_| ShiprocketError::Config(format!("{key} is not set")))
}

impl From<ShiprocketError> for crate::core::app_error::AppError {
    fn from(err: ShiprocketError) -> Self {
        use crate::core::app_error::AppError;

        match err {
            ShiprocketError::Config(msg) => AppError::Config(msg),
            ShiprocketError::Validation(detail) => AppError::UpstreamRejected(detail),
            ShiprocketError::Http(_) => AppError::ServiceUnreachable("Shiprocket".to_string()),
            err @ (ShiprocketError::Auth(_)
            | ShiprocketError::Awb(_)
            | ShiprocketError::Unexpected { .. }) => AppError::Other(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn token_is_fresh_within_nine_days() {
        let token = CachedToken {
            value: "t".to_string(),
            issued_at: Utc::now(),
        };
        assert!(token.is_fresh(token.issued_at + Duration::days(8)));
        assert!(!token.is_fresh(token.issued_at + Duration::days(9)));
        assert!(!token.is_fresh(token.issued_at + Duration::days(30)));
    }

    #[tokio::test]
    async fn cached_token_is_reused_without_reauthentication() {
        // No credentials are set in the test environment, so any login
        // attempt would fail with a Config error. A fresh cached token must
        // therefore be served straight from the cache.
        let client = ShiprocketClient::new(Client::new());
        *client.token.write().await = Some(CachedToken {
            value: "cached-token".to_string(),
            issued_at: Utc::now(),
        });

        let token = client.token(false).await.unwrap();
        assert_eq!(token, "cached-token");
    }

    struct FakeTokenSource {
        issued: AtomicUsize,
        forced: AtomicUsize,
        fail_refresh: bool,
    }

    impl FakeTokenSource {
        fn new() -> Self {
            Self {
                issued: AtomicUsize::new(0),
                forced: AtomicUsize::new(0),
                fail_refresh: false,
            }
        }
    }

    #[async_trait]
    impl TokenSource for FakeTokenSource {
        async fn token(&self, force_refresh: bool) -> Result<String, ShiprocketError> {
            self.issued.fetch_add(1, Ordering::SeqCst);
            if force_refresh {
                self.forced.fetch_add(1, Ordering::SeqCst);
                if self.fail_refresh {
                    return Err(ShiprocketError::Auth(StatusCode::UNAUTHORIZED));
                }
            }
            Ok(format!(
                "token-{}",
                self.issued.load(Ordering::SeqCst)
            ))
        }
    }

    #[tokio::test]
    async fn success_does_not_refresh() {
        let source = FakeTokenSource::new();
        let calls = AtomicUsize::new(0);

        let result = with_retry(&source, |_token| {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok::<_, ShiprocketError>(7) })
        })
        .await
        .unwrap();

        assert_eq!(result, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.forced.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn auth_failure_refreshes_once_and_retries_once() {
        let source = FakeTokenSource::new();
        let calls = AtomicUsize::new(0);

        let result: i32 = with_retry(&source, |token| {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if attempt == 0 {
                    Err(ShiprocketError::Auth(StatusCode::UNAUTHORIZED))
                } else {
                    assert_eq!(token, "token-2");
                    Ok(7)
                }
            })
        })
        .await
        .unwrap();

        assert_eq!(result, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(source.forced.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn second_auth_failure_is_terminal() {
        let source = FakeTokenSource::new();
        let calls = AtomicUsize::new(0);

        let result = with_retry(&source, |_token| {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err::<i32, _>(ShiprocketError::Auth(StatusCode::FORBIDDEN)) })
        })
        .await;

        assert!(matches!(result, Err(ShiprocketError::Auth(_))));
        // One original attempt, one retry, never a third.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(source.forced.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn validation_errors_propagate_without_retry() {
        let source = FakeTokenSource::new();
        let calls = AtomicUsize::new(0);

        let result = with_retry(&source, |_token| {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {
                Err::<i32, _>(ShiprocketError::Validation("pincode is invalid".to_string()))
            })
        })
        .await;

        assert!(matches!(result, Err(ShiprocketError::Validation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.forced.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_refresh_is_terminal() {
        let source = FakeTokenSource {
            fail_refresh: true,
            ..FakeTokenSource::new()
        };
        let calls = AtomicUsize::new(0);

        let result = with_retry(&source, |_token| {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err::<i32, _>(ShiprocketError::Auth(StatusCode::UNAUTHORIZED)) })
        })
        .await;

        assert!(matches!(result, Err(ShiprocketError::Auth(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
