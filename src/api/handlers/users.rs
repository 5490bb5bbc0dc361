use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::auth::Caller;
use crate::api::response::{ApiError, JSend};
use crate::storage::models::UserRecord;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub avatar: Option<String>,
    pub email: String,
    pub group_id: Option<String>,
    pub group_user_ids: Vec<String>,
    pub id: String,
    pub name: String,
}

fn me_response(user: UserRecord, group_user_ids: Vec<String>) -> MeResponse {
    MeResponse {
        avatar: user.avatar,
        email: user.email,
        group_id: user.group_id,
        group_user_ids,
        id: user.id,
        name: user.name,
    }
}

/// Mirror the caller's SSO profile into the local user and group tables.
pub async fn sync_user(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<JSend<MeResponse>>, ApiError> {
    let claims = caller.require_claims()?;
    let user = state.db.upsert_user(claims.profile())?;
    let group_user_ids = state.db.group_user_ids(&user.id)?;

    tracing::debug!(user_id = %user.id, group = ?user.group_id, "Synced user");
    Ok(JSend::success(me_response(user, group_user_ids)))
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<JSend<MeResponse>>, ApiError> {
    let user_id = caller.require_user()?;
    let user = state
        .db
        .get_user(user_id)?
        .ok_or_else(|| ApiError::not_found("Record not found"))?;
    Ok(JSend::success(me_response(user, caller.viewer.group_user_ids.clone())))
}
