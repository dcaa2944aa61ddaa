use axum::{extract::Request, http::header, middleware::Next, response::Response};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::core::{app_error::AppError, config};

pub const ROLE_CUSTOMER: &str = "customer";
pub const ROLE_ARTISAN: &str = "artisan";
pub const ROLE_ADMIN: &str = "admin";

type HmacSha256 = Hmac<Sha256>;

/// Claims carried by the session token minted by the hosted auth flow.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: i32,
    pub email: String,
    pub role: String,
    pub exp: i64,
}

/// Requires a valid session of any role. Injects the caller id and the full
/// claims as request extensions.
pub async fn users_authorization(mut req: Request, next: Next) -> Result<Response, AppError> {
    let claims = claims_from_request(&req)?;
    req.extensions_mut().insert(claims.sub);
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Storefront routes: every signed-in user shops as a customer.
pub async fn customers_authorization(mut req: Request, next: Next) -> Result<Response, AppError> {
    let claims = claims_from_request(&req)?;
    req.extensions_mut().insert(claims.sub);
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

pub async fn artisans_authorization(mut req: Request, next: Next) -> Result<Response, AppError> {
    let claims = claims_from_request(&req)?;
    if claims.role != ROLE_ARTISAN {
        return Err(AppError::ForbiddenResource(
            "Artisan role required".to_string(),
        ));
    }
    req.extensions_mut().insert(claims.sub);
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

pub async fn admins_authorization(mut req: Request, next: Next) -> Result<Response, AppError> {
    let claims = claims_from_request(&req)?;
    if claims.role != ROLE_ADMIN {
        return Err(AppError::ForbiddenResource(
            "Admin role required".to_string(),
        ));
    }
    req.extensions_mut().insert(claims.sub);
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

fn claims_from_request(req: &Request) -> Result<SessionClaims, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;

    let secret = config::require("SESSION_SECRET")?;
    verify_session(token, &secret)
}

/// Token layout: `hex(claims_json) "." hex(hmac_sha256(claims_json))`.
pub fn sign_session(claims: &SessionClaims, secret: &str) -> Result<String, AppError> {
    let payload = serde_json::to_vec(claims)
        .map_err(|err| AppError::Other(anyhow::anyhow!("Failed to encode claims: {err}")))?;
    let mac = mac_for(&payload, secret)?;
    Ok(format!("{}.{}", hex::encode(&payload), hex::encode(mac)))
}

pub fn verify_session(token: &str, secret: &str) -> Result<SessionClaims, AppError> {
    let invalid = || AppError::Unauthorized("Invalid session token".to_string());

    let (payload_hex, mac_hex) = token.split_once('.').ok_or_else(invalid)?;
    let payload = hex::decode(payload_hex).map_err(|_| invalid())?;
    let mac_bytes = hex::decode(mac_hex).map_err(|_| invalid())?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Config("SESSION_SECRET is unusable".to_string()))?;
    mac.update(&payload);
    mac.verify_slice(&mac_bytes).map_err(|_| invalid())?;

    let claims: SessionClaims = serde_json::from_slice(&payload).map_err(|_| invalid())?;
    if claims.exp < chrono::Utc::now().timestamp() {
        return Err(AppError::Unauthorized("Session expired".to_string()));
    }

    Ok(claims)
}

fn mac_for(payload: &[u8], secret: &str) -> Result<Vec<u8>, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Config("SESSION_SECRET is unusable".to_string()))?;
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: &str, exp: i64) -> SessionClaims {
        SessionClaims {
            sub: 42,
            email: "maya@costerbox.in".to_string(),
            role: role.to_string(),
            exp,
        }
    }

    #[test]
    fn round_trips_a_valid_token() {
        let far_future = chrono::Utc::now().timestamp() + 3600;
        let token = sign_session(&claims(ROLE_ARTISAN, far_future), "s3cret").unwrap();

        let verified = verify_session(&token, "s3cret").unwrap();
        assert_eq!(verified.sub, 42);
        assert_eq!(verified.role, ROLE_ARTISAN);
    }

    #[test]
    fn rejects_a_tampered_payload() {
        let far_future = chrono::Utc::now().timestamp() + 3600;
        let token = sign_session(&claims(ROLE_CUSTOMER, far_future), "s3cret").unwrap();

        // Swap the payload for one claiming the admin role, keep the old MAC.
        let forged_payload =
            hex::encode(serde_json::to_vec(&claims(ROLE_ADMIN, far_future)).unwrap());
        let mac = token.split_once('.').unwrap().1;
        let forged = format!("{forged_payload}.{mac}");

        assert!(verify_session(&forged, "s3cret").is_err());
    }

    #[test]
    fn rejects_a_wrong_secret() {
        let far_future = chrono::Utc::now().timestamp() + 3600;
        let token = sign_session(&claims(ROLE_CUSTOMER, far_future), "s3cret").unwrap();
        assert!(verify_session(&token, "other").is_err());
    }

    #[test]
    fn rejects_an_expired_token() {
        let past = chrono::Utc::now().timestamp() - 60;
        let token = sign_session(&claims(ROLE_CUSTOMER, past), "s3cret").unwrap();

        let err = verify_session(&token, "s3cret").unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn rejects_garbage() {
        assert!(verify_session("not-a-token", "s3cret").is_err());
        assert!(verify_session("abc.def", "s3cret").is_err());
    }
}
