use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use uuid::Uuid;

use assembly_types::api::{Claims, DataResponse, FeedbackQuery, SubmitFeedbackRequest};
use assembly_types::models::FeedbackCategory;

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery};
use crate::middleware::require_admin;
use crate::profiles::current_profile;
use crate::validation;

const MESSAGE_MAX: usize = 5_000;

/// Any signed-in profile may leave feedback. Without an explicit server it is
/// filed under the caller's own server, if they have one.
pub async fn submit_feedback(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<SubmitFeedbackRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = validation::text("message", &req.message, 1, MESSAGE_MAX)?;
    let category = req.category.unwrap_or(FeedbackCategory::General);

    let profile = current_profile(&state, &claims).await?;
    let server_id = req.server_id.or(profile.server_id);

    let feedback = blocking(&state, move |state| {
        if let Some(server_id) = server_id {
            if state.db.get_server(server_id)?.is_none() {
                return Err(ApiError::not_found("server not found"));
            }
        }
        Ok(state
            .db
            .insert_feedback(Uuid::new_v4(), profile.id, server_id, category, &message)?)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: feedback })))
}

pub async fn list_feedback(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiQuery(query): ApiQuery<FeedbackQuery>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&claims)?;

    let feedback =
        blocking(&state, move |state| Ok(state.db.list_feedback(query.category)?)).await?;
    Ok(Json(DataResponse { data: feedback }))
}
