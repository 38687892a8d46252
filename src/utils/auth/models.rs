use axum::{async_trait, extract::FromRequestParts};
use http::header::AUTHORIZATION;
use http::request::Parts;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use time::Duration;
use uuid::Uuid;

use crate::config::tokens::JwtSettings;
use crate::utils::auth::errors::AuthError;

/// Access-token claims. Login and token issuance live in the account service;
/// this crate only verifies the bearer token and reads who is submitting,
/// along with their preferred timezone when the client set one.
#[derive(Serialize, Deserialize, Debug)]
pub struct Claims {
    pub jti: Uuid,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    pub exp: u64,
}

impl Claims {
    pub fn new(user_id: impl Into<String>, timezone: Option<String>, duration: Duration) -> Self {
        Self {
            jti: Uuid::new_v4(),
            user_id: user_id.into(),
            timezone,
            exp: jsonwebtoken::get_current_timestamp() + duration.whole_seconds().unsigned_abs(),
        }
    }

    pub fn generate_jwt(&self, key: &Secret<String>) -> Result<String, AuthError> {
        encode(
            &Header::default(),
            &self,
            &EncodingKey::from_secret(key.expose_secret().as_bytes()),
        )
        .map_err(|_| AuthError::InvalidToken)
    }

    pub fn decode_jwt(token: &str, key: &Secret<String>) -> Result<Self, AuthError> {
        let mut validation = Validation::default();
        validation.leeway = 5;

        let data = decode::<Self>(
            token,
            &DecodingKey::from_secret(key.expose_secret().as_bytes()),
            &validation,
        )
        .map_err(|_| AuthError::InvalidToken)?;

        Ok(data.claims)
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Claims {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let jwt = parts
            .extensions
            .get::<JwtSettings>()
            .expect("Missing jwt settings extension")
            .clone();

        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingToken)?
            .to_str()
            .map_err(|_| AuthError::InvalidToken)?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidToken)?;

        Claims::decode_jwt(token, &jwt.secret)
    }
}

#[cfg(test)]
mod claims_tests {
    use super::*;

    #[test]
    fn round_trips_through_jwt() {
        let secret = Secret::new("SECRET".to_string());
        let claims = Claims::new("user-1", Some("+02:00".to_string()), Duration::minutes(5));
        let token = claims.generate_jwt(&secret).unwrap();
        let decoded = Claims::decode_jwt(&token, &secret).unwrap();
        assert_eq!(decoded.user_id, "user-1");
        assert_eq!(decoded.timezone.as_deref(), Some("+02:00"));
    }

    #[test]
    fn rejects_wrong_secret() {
        let claims = Claims::new("user-1", None, Duration::minutes(5));
        let token = claims.generate_jwt(&Secret::new("SECRET".to_string())).unwrap();
        assert!(Claims::decode_jwt(&token, &Secret::new("OTHER".to_string())).is_err());
    }
}
