use axum::{Extension, Json, extract::State, response::IntoResponse};
use uuid::Uuid;

use assembly_types::api::{Claims, DataResponse, ProfileQuery, VerifyRequest};
use assembly_types::models::{Profile, Role};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::require_admin;

/// The caller's profile, re-read from the db. A token for a deleted profile is unauthorized.
pub(crate) async fn current_profile(state: &AppState, claims: &Claims) -> Result<Profile, ApiError> {
    let id = claims.sub;
    blocking(state, move |state| {
        state
            .db
            .get_profile(id)?
            .ok_or_else(|| ApiError::unauthorized("profile no longer exists"))
    })
    .await
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = current_profile(&state, &claims).await?;
    Ok(Json(DataResponse { data: profile }))
}

pub async fn list_profiles(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiQuery(query): ApiQuery<ProfileQuery>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&claims)?;

    let profiles = blocking(&state, move |state| {
        Ok(state.db.list_profiles(query.role, query.verified)?)
    })
    .await?;
    Ok(Json(DataResponse { data: profiles }))
}

/// Representatives waiting for an admin to verify them.
pub async fn list_pending(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&claims)?;

    let profiles = blocking(&state, |state| {
        Ok(state.db.list_profiles(Some(Role::Representative), Some(false))?)
    })
    .await?;
    Ok(Json(DataResponse { data: profiles }))
}

/// POST /api/profiles/{id}/verify: verify a representative and bind them to a server.
pub async fn verify_representative(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(profile_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<VerifyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&claims)?;

    let profile = blocking(&state, move |state| {
        state.db.verify_representative(profile_id, req.server_id)?;
        state
            .db
            .get_profile(profile_id)?
            .ok_or_else(|| ApiError::not_found("profile not found"))
    })
    .await?;
    Ok(Json(DataResponse { data: profile }))
}
