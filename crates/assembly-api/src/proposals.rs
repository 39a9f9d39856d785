use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use uuid::Uuid;

use assembly_types::api::{
    CastVoteRequest, Claims, CloseProposalResponse, CreateProposalRequest, DataResponse,
    ProposalQuery, TransitionRequest,
};
use assembly_types::models::{Profile, Proposal, Role};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::require_admin;
use crate::profiles::current_profile;
use crate::validation;

const TITLE_MAX: usize = 200;
const BODY_MAX: usize = 10_000;

async fn load_proposal(state: &AppState, id: Uuid) -> Result<Proposal, ApiError> {
    blocking(state, move |state| {
        state
            .db
            .get_proposal(id)?
            .ok_or_else(|| ApiError::not_found("proposal not found"))
    })
    .await
}

fn can_manage(claims: &Claims, proposal: &Proposal) -> bool {
    claims.role == Role::Admin || proposal.author_id == claims.sub
}

/// Admins speak for no server; representatives must be verified and bound.
fn acting_server(profile: &Profile, action: &str) -> Result<Option<Uuid>, ApiError> {
    if profile.is_admin() {
        return Ok(None);
    }
    profile.active_server().map(Some).ok_or_else(|| {
        ApiError::forbidden(format!(
            "only verified representatives with a server can {}",
            action
        ))
    })
}

pub async fn list_proposals(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ProposalQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let proposals =
        blocking(&state, move |state| Ok(state.db.list_proposals(query.status)?)).await?;
    Ok(Json(DataResponse { data: proposals }))
}

pub async fn get_proposal(
    State(state): State<AppState>,
    ApiPath(proposal_id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let proposal = load_proposal(&state, proposal_id).await?;
    Ok(Json(DataResponse { data: proposal }))
}

pub async fn create_proposal(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CreateProposalRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = validation::text("title", &req.title, 1, TITLE_MAX)?;
    let body = validation::text("body", &req.body, 1, BODY_MAX)?;

    let profile = current_profile(&state, &claims).await?;
    let server_id = acting_server(&profile, "submit proposals")?;

    let proposal = blocking(&state, move |state| {
        Ok(state
            .db
            .create_proposal(Uuid::new_v4(), profile.id, server_id, &title, &body)?)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: proposal })))
}

/// POST /api/proposals/{id}/status: authors and admins open drafts and start
/// voting; only admins may decide the outcome.
pub async fn transition_proposal(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(proposal_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<TransitionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let proposal = load_proposal(&state, proposal_id).await?;
    if req.status.is_terminal() {
        require_admin(&claims)?;
    } else if !can_manage(&claims, &proposal) {
        return Err(ApiError::forbidden("only the author or an admin can change this proposal"));
    }

    let updated = blocking(&state, move |state| {
        Ok(state.db.transition_proposal(proposal_id, req.status)?)
    })
    .await?;
    Ok(Json(DataResponse { data: updated }))
}

/// POST /api/proposals/{id}/close: resolve a vote by majority.
pub async fn close_proposal(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(proposal_id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&claims)?;

    let (proposal, tally) =
        blocking(&state, move |state| Ok(state.db.close_proposal(proposal_id)?)).await?;
    Ok(Json(DataResponse {
        data: CloseProposalResponse { proposal, tally },
    }))
}

pub async fn delete_proposal(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(proposal_id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let proposal = load_proposal(&state, proposal_id).await?;
    if !can_manage(&claims, &proposal) {
        return Err(ApiError::forbidden("only the author or an admin can delete this proposal"));
    }

    blocking(&state, move |state| Ok(state.db.delete_proposal(proposal_id)?)).await?;
    Ok(Json(DataResponse {
        data: json!({ "id": proposal_id }),
    }))
}

pub async fn list_votes(
    State(state): State<AppState>,
    ApiPath(proposal_id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let (votes, tally) = blocking(&state, move |state| {
        if state.db.get_proposal(proposal_id)?.is_none() {
            return Err(ApiError::not_found("proposal not found"));
        }
        Ok((state.db.list_votes(proposal_id)?, state.db.tally_votes(proposal_id)?))
    })
    .await?;
    Ok(Json(DataResponse {
        data: json!({ "tally": tally, "votes": votes }),
    }))
}

/// POST /api/proposals/{id}/votes: one vote per server, cast by its representative.
pub async fn cast_vote(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(proposal_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<CastVoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = current_profile(&state, &claims).await?;
    let server_id = profile
        .active_server()
        .ok_or_else(|| ApiError::forbidden("only verified representatives with a server can vote"))?;

    let vote = blocking(&state, move |state| {
        Ok(state
            .db
            .cast_vote(Uuid::new_v4(), proposal_id, profile.id, server_id, req.choice)?)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: vote })))
}
