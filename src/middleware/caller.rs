//! Caller identity extraction
//!
//! Authentication happens upstream; by the time a request reaches this
//! service the gateway has stamped it with `X-User-ID` and `X-User-Role`.

use crate::error::AppError;
use crate::middleware::error::get_request_id_from_headers;
use crate::payments::types::{Caller, UserRole};
use axum::{extract::FromRequestParts, http::request::Parts};
use std::str::FromStr;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let reject = |reason: &str| {
            let error = AppError::unauthorized(reason);
            match get_request_id_from_headers(&parts.headers) {
                Some(id) => error.with_request_id(id),
                None => error,
            }
        };

        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| reject("missing X-User-ID header"))?
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|id| *id > 0)
            .ok_or_else(|| reject("X-User-ID is not a positive integer"))?;

        let role = parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| reject("missing X-User-Role header"))
            .and_then(|v| UserRole::from_str(v.trim()).map_err(|_| reject("unknown X-User-Role")))?;

        Ok(Caller::new(user_id, role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(headers: &[(&str, &str)]) -> Result<Caller, AppError> {
        let mut builder = Request::builder().uri("/api/payments");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        Caller::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn reads_id_and_role() {
        let caller = extract(&[("x-user-id", "7"), ("x-user-role", "applicant")])
            .await
            .unwrap();
        assert_eq!(caller, Caller::new(7, UserRole::Applicant));
    }

    #[tokio::test]
    async fn missing_identity_is_unauthorized() {
        let err = extract(&[("x-user-role", "admin")]).await.unwrap_err();
        assert_eq!(err.status_code(), 401);
    }

    #[tokio::test]
    async fn unknown_role_is_unauthorized() {
        let err = extract(&[("x-user-id", "7"), ("x-user-role", "root")])
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 401);
    }

    #[tokio::test]
    async fn non_numeric_id_is_unauthorized() {
        let err = extract(&[("x-user-id", "abc"), ("x-user-role", "admin")])
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 401);
    }
}
