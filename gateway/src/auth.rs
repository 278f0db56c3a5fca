//! Axum extractor wiring for [`UserContext`] (spec §4.C9): every `/api/*`
//! handler that needs identity takes `AuthUser` as an argument and gets a
//! decoded, not-yet-authorized context; each handler still checks its own
//! permission before mutating.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use registry_types::UserContext;

pub struct AuthUser(pub UserContext);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let ctx = state.identity.decode(header)?;
        Ok(AuthUser(ctx))
    }
}
