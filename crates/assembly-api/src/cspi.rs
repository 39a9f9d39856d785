use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use uuid::Uuid;

use assembly_types::api::{
    Claims, ComputeSnapshotRequest, DataResponse, DeclareCspiRequest, PeriodQuery,
};
use assembly_types::models::MAX_CSPI_SCORE;

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery};
use crate::middleware::require_admin;
use crate::profiles::current_profile;
use crate::validation;

const COMMENT_MAX: usize = 1_000;

/// POST /api/cspi/declarations: the representative's score for their server this period.
pub async fn declare(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<DeclareCspiRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let period = validation::period(&req.period)?;
    if req.score > MAX_CSPI_SCORE {
        return Err(ApiError::validation(format!(
            "score must be between 0 and {}",
            MAX_CSPI_SCORE
        )));
    }
    let comment = req
        .comment
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(|c| validation::text("comment", c, 1, COMMENT_MAX))
        .transpose()?;

    let profile = current_profile(&state, &claims).await?;
    let server_id = profile.active_server().ok_or_else(|| {
        ApiError::forbidden("only verified representatives with a server can declare CSPI")
    })?;

    let declaration = blocking(&state, move |state| {
        Ok(state.db.upsert_declaration(
            Uuid::new_v4(),
            server_id,
            profile.id,
            &period,
            req.score,
            comment.as_deref(),
        )?)
    })
    .await?;
    Ok(Json(DataResponse { data: declaration }))
}

pub async fn list_declarations(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PeriodQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let period = query.period.as_deref().map(validation::period).transpose()?;

    let declarations = blocking(&state, move |state| {
        Ok(state.db.list_declarations(period.as_deref())?)
    })
    .await?;
    Ok(Json(DataResponse { data: declarations }))
}

pub async fn compute_snapshot(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<ComputeSnapshotRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&claims)?;
    let period = validation::period(&req.period)?;

    let snapshot = blocking(&state, move |state| {
        Ok(state.db.compute_snapshot(Uuid::new_v4(), &period)?)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: snapshot })))
}

pub async fn list_snapshots(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let snapshots = blocking(&state, |state| Ok(state.db.list_snapshots()?)).await?;
    Ok(Json(DataResponse { data: snapshots }))
}

pub async fn latest_snapshot(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let snapshot = blocking(&state, |state| {
        state
            .db
            .latest_snapshot()?
            .ok_or_else(|| ApiError::not_found("no CSPI snapshot has been computed yet"))
    })
    .await?;
    Ok(Json(DataResponse { data: snapshot }))
}
