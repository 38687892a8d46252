use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use std::convert::Infallible;
use uuid::Uuid;

use crate::utils::activities::errors::X_CORRELATION_ID;
use crate::utils::activities::models::CorrelationId;

pub const X_ACTIVITIES_VERSION: &str = "x-activities-version";

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CorrelationId {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(X_CORRELATION_ID)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok());

        // A malformed client id gets replaced rather than rejected; the
        // response header tells the client which one the server used.
        Ok(id.map_or_else(CorrelationId::generate, CorrelationId))
    }
}

/// Per-request opt-in to the v2 submission pipeline.
#[derive(Debug, Clone, Copy)]
pub struct ApiVersion {
    pub v2_requested: bool,
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ApiVersion {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let v2_requested = parts
            .headers
            .get(X_ACTIVITIES_VERSION)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim() == "2")
            .unwrap_or(false);

        Ok(ApiVersion { v2_requested })
    }
}
