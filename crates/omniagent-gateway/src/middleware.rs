use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::auth;
use crate::protocol::ApiError;
use crate::state::AppState;

/// Extractor that validates the bearer header or `?token=` query param.
pub struct Authenticated;

impl FromRequestParts<Arc<AppState>> for Authenticated {
    type Rejection = ApiError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let bearer = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "));
        let query_token = auth::extract_token_from_query(parts.uri.query().unwrap_or(""));

        let ok = auth::validate_auth(&state.config, bearer, query_token);

        async move {
            if ok {
                Ok(Authenticated)
            } else {
                Err(ApiError::unauthorized())
            }
        }
    }
}
