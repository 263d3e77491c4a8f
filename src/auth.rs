//! Identity resolution for checkout and order endpoints.
//!
//! Authentication token issuance lives in a separate service; this module
//! only verifies the credential attached to a request. Invalid or expired
//! credentials fail closed: the caller is treated as a guest rather than
//! rejected, because guest checkout is a supported flow.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::errors::ApiError;
use crate::AppState;

/// Claims carried by a caller credential.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    /// Role claim; `admin` unlocks the admin order surface
    #[serde(default)]
    pub role: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

/// Pulls the raw bearer token from a request, accepting both the
/// `Authorization: Bearer` header and the legacy `token` header.
fn bearer_token(parts: &Parts) -> Option<String> {
    if let Some(value) = parts.headers.get(header::AUTHORIZATION) {
        if let Ok(raw) = value.to_str() {
            if let Some(token) = raw.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    parts
        .headers
        .get("token")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

fn decode_claims(token: &str, secret: &str) -> Option<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    match decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    ) {
        Ok(data) => Some(data.claims),
        Err(err) => {
            debug!(error = %err, "Credential verification failed; treating caller as guest");
            None
        }
    }
}

fn resolve_identity(parts: &Parts, secret: &str) -> Option<Claims> {
    let token = bearer_token(parts)?;
    let claims = decode_claims(&token, secret)?;
    // A claims set whose subject is not a well-formed id is useless downstream.
    Uuid::parse_str(&claims.sub).ok()?;
    Some(claims)
}

/// Optional caller identity; `None` denotes anonymous/guest checkout.
#[derive(Debug, Clone, Copy)]
pub struct OptionalIdentity(pub Option<Uuid>);

#[async_trait]
impl<S> FromRequestParts<S> for OptionalIdentity
where
    S: Send + Sync,
    AppState: axum::extract::FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app = AppState::from_ref(state);
        let identity = resolve_identity(parts, &app.config.jwt_secret)
            .and_then(|claims| Uuid::parse_str(&claims.sub).ok());
        Ok(OptionalIdentity(identity))
    }
}

/// Caller identity that must be present and valid.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
    AppState: axum::extract::FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app = AppState::from_ref(state);
        let claims =
            resolve_identity(parts, &app.config.jwt_secret).ok_or(ApiError::Unauthorized)?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| ApiError::Unauthorized)?;
        Ok(AuthenticatedUser(user_id))
    }
}

/// Caller identity that must carry the `admin` role.
#[derive(Debug, Clone, Copy)]
pub struct AdminUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    AppState: axum::extract::FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app = AppState::from_ref(state);
        let claims =
            resolve_identity(parts, &app.config.jwt_secret).ok_or(ApiError::Unauthorized)?;

        if claims.role.as_deref() != Some("admin") {
            return Err(ApiError::Forbidden);
        }

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| ApiError::Unauthorized)?;
        Ok(AdminUser(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";

    fn make_token(sub: &str, role: Option<&str>, exp_offset_secs: i64) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: sub.to_string(),
            role: role.map(|r| r.to_string()),
            iat: now,
            exp: now + exp_offset_secs,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn parts_with_header(name: &str, value: String) -> Parts {
        let req = Request::builder()
            .header(name, value)
            .body(())
            .unwrap();
        req.into_parts().0
    }

    #[test]
    fn valid_bearer_token_resolves_identity() {
        let user_id = Uuid::new_v4();
        let token = make_token(&user_id.to_string(), None, 3600);
        let parts = parts_with_header("authorization", format!("Bearer {}", token));

        let claims = resolve_identity(&parts, SECRET).expect("identity expected");
        assert_eq!(claims.sub, user_id.to_string());
    }

    #[test]
    fn legacy_token_header_is_accepted() {
        let user_id = Uuid::new_v4();
        let token = make_token(&user_id.to_string(), None, 3600);
        let parts = parts_with_header("token", token);

        assert!(resolve_identity(&parts, SECRET).is_some());
    }

    #[test]
    fn expired_token_fails_closed() {
        let token = make_token(&Uuid::new_v4().to_string(), None, -3600);
        let parts = parts_with_header("authorization", format!("Bearer {}", token));

        assert!(resolve_identity(&parts, SECRET).is_none());
    }

    #[test]
    fn garbage_token_fails_closed() {
        let parts = parts_with_header("authorization", "Bearer not.a.jwt".to_string());
        assert!(resolve_identity(&parts, SECRET).is_none());
    }

    #[test]
    fn non_uuid_subject_fails_closed() {
        let token = make_token("guest", None, 3600);
        let parts = parts_with_header("authorization", format!("Bearer {}", token));
        assert!(resolve_identity(&parts, SECRET).is_none());
    }
}
