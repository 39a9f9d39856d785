use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use uuid::Uuid;

use assembly_types::api::{
    AssignRepresentativeRequest, Claims, CreateServerRequest, DataResponse,
    RemoveRepresentativeResponse, ServerQuery, UpdateServerRequest,
};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::require_admin;
use crate::validation;

const NAME_MAX: usize = 64;
const REGION_MAX: usize = 32;

pub async fn list_servers(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ServerQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let servers = blocking(&state, move |state| {
        Ok(state.db.list_servers(query.active, query.unassigned)?)
    })
    .await?;
    Ok(Json(DataResponse { data: servers }))
}

pub async fn get_server(
    State(state): State<AppState>,
    ApiPath(server_id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let server = blocking(&state, move |state| {
        state
            .db
            .get_server(server_id)?
            .ok_or_else(|| ApiError::not_found("server not found"))
    })
    .await?;
    Ok(Json(DataResponse { data: server }))
}

pub async fn create_server(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CreateServerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&claims)?;
    let name = validation::text("name", &req.name, 1, NAME_MAX)?;
    let region = validation::text("region", &req.region, 1, REGION_MAX)?;

    let server = blocking(&state, move |state| {
        Ok(state
            .db
            .create_server(Uuid::new_v4(), &name, &region, req.active)?)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: server })))
}

pub async fn update_server(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(server_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateServerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&claims)?;
    let name = req
        .name
        .as_deref()
        .map(|n| validation::text("name", n, 1, NAME_MAX))
        .transpose()?;
    let region = req
        .region
        .as_deref()
        .map(|r| validation::text("region", r, 1, REGION_MAX))
        .transpose()?;

    let server = blocking(&state, move |state| {
        Ok(state
            .db
            .update_server(server_id, name.as_deref(), region.as_deref(), req.active)?)
    })
    .await?;
    Ok(Json(DataResponse { data: server }))
}

pub async fn delete_server(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(server_id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&claims)?;

    let detached = blocking(&state, move |state| Ok(state.db.delete_server(server_id)?)).await?;
    Ok(Json(DataResponse {
        data: json!({ "id": server_id, "representative_id": detached }),
    }))
}

/// POST /api/servers/{id}/assign-representative
pub async fn assign_representative(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(server_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<AssignRepresentativeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&claims)?;

    let server = blocking(&state, move |state| {
        state
            .db
            .assign_representative(server_id, req.representative_id)?;
        state
            .db
            .get_server(server_id)?
            .ok_or_else(|| ApiError::not_found("server not found"))
    })
    .await?;
    Ok(Json(DataResponse { data: server }))
}

/// POST /api/servers/{id}/remove-representative
pub async fn remove_representative(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(server_id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&claims)?;

    let representative_id =
        blocking(&state, move |state| Ok(state.db.remove_representative(server_id)?)).await?;
    Ok(Json(DataResponse {
        data: RemoveRepresentativeResponse {
            server_id,
            representative_id,
        },
    }))
}

/// POST /api/servers/{id}/reassign-representative
pub async fn reassign_representative(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(server_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<AssignRepresentativeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&claims)?;

    let (server, previous) = blocking(&state, move |state| {
        let previous = state
            .db
            .reassign_representative(server_id, req.representative_id)?;
        let server = state
            .db
            .get_server(server_id)?
            .ok_or_else(|| ApiError::not_found("server not found"))?;
        Ok((server, previous))
    })
    .await?;
    Ok(Json(DataResponse {
        data: json!({ "server": server, "previous_representative_id": previous }),
    }))
}
