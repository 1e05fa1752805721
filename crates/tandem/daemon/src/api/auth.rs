//! Bearer credential extraction

use crate::error::ApiError;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tandem_types::{CoordinationError, Credential};

/// The caller's credential, from `Authorization: Bearer <token>`.
pub struct Bearer(pub Credential);

#[async_trait]
impl<S> FromRequestParts<S> for Bearer
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or_else(|| unauthorized("missing Authorization header"))?
            .to_str()
            .map_err(|_| unauthorized("Authorization header is not text"))?;

        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| unauthorized("expected a Bearer credential"))?;

        Ok(Bearer(Credential::new(token)))
    }
}

fn unauthorized(detail: &str) -> ApiError {
    ApiError::Coordination(CoordinationError::Unauthorized(detail.to_string()))
}
