use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header::AUTHORIZATION, request::Parts, HeaderValue};
use common_http_errors::ApiError;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::config::ServiceConfig;

/// Proof that the caller presented the configured admin bearer token.
#[derive(Debug, Clone, Copy)]
pub struct AdminAuth;

#[async_trait]
impl<S> FromRequestParts<S> for AdminAuth
where
    Arc<ServiceConfig>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = Arc::<ServiceConfig>::from_ref(state);

        let header_value = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(ApiError::Unauthorized {
                code: "missing_authorization",
            })?;

        let token = parse_bearer(header_value)?;
        let matches: bool = token.as_bytes().ct_eq(config.admin_token.as_bytes()).into();
        if !matches {
            warn!(path = %parts.uri.path(), "rejected admin token");
            return Err(ApiError::Unauthorized {
                code: "invalid_token",
            });
        }

        Ok(AdminAuth)
    }
}

fn parse_bearer(value: &HeaderValue) -> Result<String, ApiError> {
    let invalid = ApiError::Unauthorized {
        code: "invalid_authorization",
    };
    let raw = match value.to_str() {
        Ok(raw) => raw.trim(),
        Err(_) => return Err(invalid),
    };

    let token = match raw.strip_prefix("Bearer ") {
        Some(token) => token.trim(),
        None => return Err(invalid),
    };

    if token.is_empty() {
        return Err(invalid);
    }

    Ok(token.to_owned())
}
