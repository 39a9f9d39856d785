pub mod auth;
pub mod cspi;
pub mod error;
pub mod extract;
pub mod feedback;
pub mod middleware;
pub mod profiles;
pub mod proposals;
pub mod servers;
pub mod validation;

use axum::{
    Json, Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use serde_json::json;
use tracing::error;

use assembly_types::api::DataResponse;

use crate::auth::{AppState, AppStateInner};
use crate::error::ApiError;
use crate::middleware::require_auth;

/// Builds the `/api` router. Everything except health and auth needs a bearer token.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/health", get(health))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/api/profiles", get(profiles::list_profiles))
        .route("/api/profiles/me", get(profiles::me))
        .route("/api/profiles/pending", get(profiles::list_pending))
        .route("/api/profiles/{id}/verify", post(profiles::verify_representative))
        .route(
            "/api/servers",
            get(servers::list_servers).post(servers::create_server),
        )
        .route(
            "/api/servers/{id}",
            get(servers::get_server)
                .put(servers::update_server)
                .delete(servers::delete_server),
        )
        .route(
            "/api/servers/{id}/assign-representative",
            post(servers::assign_representative),
        )
        .route(
            "/api/servers/{id}/remove-representative",
            post(servers::remove_representative),
        )
        .route(
            "/api/servers/{id}/reassign-representative",
            post(servers::reassign_representative),
        )
        .route(
            "/api/proposals",
            get(proposals::list_proposals).post(proposals::create_proposal),
        )
        .route(
            "/api/proposals/{id}",
            get(proposals::get_proposal).delete(proposals::delete_proposal),
        )
        .route("/api/proposals/{id}/status", post(proposals::transition_proposal))
        .route("/api/proposals/{id}/close", post(proposals::close_proposal))
        .route(
            "/api/proposals/{id}/votes",
            get(proposals::list_votes).post(proposals::cast_vote),
        )
        .route(
            "/api/feedback",
            get(feedback::list_feedback).post(feedback::submit_feedback),
        )
        .route(
            "/api/cspi/declarations",
            get(cspi::list_declarations).post(cspi::declare),
        )
        .route(
            "/api/cspi/snapshots",
            get(cspi::list_snapshots).post(cspi::compute_snapshot),
        )
        .route("/api/cspi/snapshots/latest", get(cspi::latest_snapshot))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn health() -> Json<DataResponse<serde_json::Value>> {
    Json(DataResponse {
        data: json!({ "status": "ok" }),
    })
}

/// Runs blocking DB work off the async runtime.
pub(crate) async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&AppStateInner) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&*state))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::internal("internal error")
        })?
}
