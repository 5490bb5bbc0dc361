use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use axum_extra::extract::CookieJar;

use crate::api::response::ApiError;
use crate::auth::{self, Claims};
use crate::storage::Viewer;
use crate::AppState;

/// The caller of a request, resolved from the session cookie or a
/// `Authorization: Bearer <token>` header.
///
/// Missing or invalid tokens resolve to an anonymous caller; handlers that
/// mutate call [`Caller::require_user`].
pub struct Caller {
    pub claims: Option<Claims>,
    pub viewer: Viewer,
}

impl Caller {
    /// The authenticated user id, or 401.
    pub fn require_user(&self) -> Result<&str, ApiError> {
        self.viewer.user_id.as_deref().ok_or_else(ApiError::unauthorized)
    }

    pub fn require_claims(&self) -> Result<&Claims, ApiError> {
        self.claims.as_ref().ok_or_else(ApiError::unauthorized)
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(&state.config.auth.session_cookie)
            .map(|c| c.value().to_string())
            .or_else(|| bearer_token(parts));

        let Some(token) = token else {
            return Ok(Caller {
                claims: None,
                viewer: Viewer::anonymous(),
            });
        };

        let claims = match auth::verify(&state.config.auth.jwt_secret, &token) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::debug!(error = %e, "Rejected session token");
                return Ok(Caller {
                    claims: None,
                    viewer: Viewer::anonymous(),
                });
            }
        };

        let group_user_ids = state.db.group_user_ids(&claims.sub)?;
        Ok(Caller {
            viewer: Viewer::user(claims.sub.clone(), group_user_ids),
            claims: Some(claims),
        })
    }
}
