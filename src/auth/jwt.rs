use axum::{
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use tracing::{debug, warn};

use super::claims::{CallerRole, Claims};
use crate::{config::JwtConfig, state::AppState};

#[derive(Clone)]
pub struct JwtKeys {
    #[cfg(test)]
    pub encoding: jsonwebtoken::EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        JwtKeys::new(&state.config.jwt)
    }
}

impl JwtKeys {
    pub fn new(config: &JwtConfig) -> Self {
        let JwtConfig {
            secret,
            issuer,
            audience,
        } = config.clone();
        Self {
            #[cfg(test)]
            encoding: jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            audience,
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(sub = %data.claims.sub, role = ?data.claims.role, "jwt verified");
        Ok(data.claims)
    }

    /// Service tokens are minted by whoever provisions the collaborators;
    /// only tests sign here.
    #[cfg(test)]
    pub fn sign(&self, sub: &str, role: CallerRole, ttl_secs: i64) -> String {
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        let claims = Claims {
            sub: sub.into(),
            iat: now as usize,
            exp: (now + ttl_secs) as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            role,
        };
        jsonwebtoken::encode(&jsonwebtoken::Header::default(), &claims, &self.encoding)
            .expect("sign test token")
    }
}

fn authorize(parts: &Parts, keys: &JwtKeys, role: CallerRole) -> Result<Claims, (StatusCode, String)> {
    let auth_header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or((
            StatusCode::UNAUTHORIZED,
            "Missing Authorization header".to_string(),
        ))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))
        .ok_or((
            StatusCode::UNAUTHORIZED,
            "Invalid Authorization header".to_string(),
        ))?;

    let claims = keys.verify(token).map_err(|e| {
        warn!(error = %e, "invalid or expired token");
        (
            StatusCode::UNAUTHORIZED,
            "Invalid or expired token".to_string(),
        )
    })?;

    if claims.role != role {
        warn!(sub = %claims.sub, have = ?claims.role, need = ?role, "caller role rejected");
        return Err((StatusCode::FORBIDDEN, "Caller role not permitted".to_string()));
    }
    Ok(claims)
}

/// A verified chat front-end caller.
pub struct FrontendCaller(pub Claims);

/// A verified payment service caller.
pub struct PaymentsCaller(pub Claims);

#[axum::async_trait]
impl<S> FromRequestParts<S> for FrontendCaller
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        authorize(parts, &keys, CallerRole::Frontend).map(FrontendCaller)
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for PaymentsCaller
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        authorize(parts, &keys, CallerRole::Payments).map(PaymentsCaller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys(secret: &str, issuer: &str, audience: &str) -> JwtKeys {
        JwtKeys::new(&JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
        })
    }

    fn parts_with(token: Option<&str>) -> Parts {
        let mut builder = axum::http::Request::builder();
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn sign_and_verify_service_token() {
        let keys = make_keys("dev-secret", "test-issuer", "test-aud");
        let token = keys.sign("chat-frontend", CallerRole::Frontend, 300);
        let claims = keys.verify(&token).expect("verify token");
        assert_eq!(claims.sub, "chat-frontend");
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.role, CallerRole::Frontend);
    }

    #[test]
    fn verify_rejects_wrong_issuer_or_audience() {
        let good_keys = make_keys("same-secret", "good-iss", "good-aud");
        let bad_keys = make_keys("same-secret", "bad-iss", "bad-aud");
        let token = good_keys.sign("chat-frontend", CallerRole::Frontend, 300);
        assert!(bad_keys.verify(&token).is_err());
    }

    #[test]
    fn verify_rejects_expired_token() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let token = keys.sign("chat-frontend", CallerRole::Frontend, -3600);
        assert!(keys.verify(&token).is_err());
    }

    #[test]
    fn authorize_checks_header_and_role() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let frontend = keys.sign("chat-frontend", CallerRole::Frontend, 300);

        let err = authorize(&parts_with(None), &keys, CallerRole::Frontend).unwrap_err();
        assert_eq!(err.0, StatusCode::UNAUTHORIZED);

        let err = authorize(&parts_with(Some("garbage")), &keys, CallerRole::Frontend).unwrap_err();
        assert_eq!(err.0, StatusCode::UNAUTHORIZED);

        let err = authorize(&parts_with(Some(&frontend)), &keys, CallerRole::Payments).unwrap_err();
        assert_eq!(err.0, StatusCode::FORBIDDEN);

        let claims = authorize(&parts_with(Some(&frontend)), &keys, CallerRole::Frontend).unwrap();
        assert_eq!(claims.role, CallerRole::Frontend);
    }
}
