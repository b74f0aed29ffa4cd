use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use tracing::debug;

use crate::auth::{self, AuthResult};
use crate::state::AppState;

/// Extractor that validates the `Authorization: Bearer` header.
pub struct Authenticated(pub AuthResult);

impl FromRequestParts<Arc<AppState>> for Authenticated {
    type Rejection = StatusCode;

    fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let bearer = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(auth::extract_bearer)
            .map(|s| s.to_string());

        let result = auth::validate_auth(&state.config, bearer.as_deref());

        async move {
            match result {
                Some(auth) => Ok(Authenticated(auth)),
                None => {
                    debug!("Rejected unauthenticated request");
                    Err(StatusCode::UNAUTHORIZED)
                }
            }
        }
    }
}
