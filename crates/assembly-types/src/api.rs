use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    FeedbackCategory, Profile, Proposal, ProposalStatus, Role, VoteChoice, VoteTally,
};

// -- JWT Claims --

/// Bearer token claims. Role is carried for cheap admin checks; anything that
/// can change after login (verified flag, server binding) is re-read from the db.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    pub exp: usize,
}

/// Success envelope: every 2xx body is `{ "data": ... }`.
#[derive(Debug, Serialize, Deserialize)]
pub struct DataResponse<T> {
    pub data: T,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub profile: Profile,
}

// -- Profiles --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyRequest {
    pub server_id: Uuid,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProfileQuery {
    pub role: Option<Role>,
    pub verified: Option<bool>,
}

// -- Servers --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateServerRequest {
    pub name: String,
    pub region: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateServerRequest {
    pub name: Option<String>,
    pub region: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServerQuery {
    pub active: Option<bool>,
    pub unassigned: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssignRepresentativeRequest {
    pub representative_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RemoveRepresentativeResponse {
    pub server_id: Uuid,
    pub representative_id: Uuid,
}

fn default_true() -> bool {
    true
}

// -- Proposals --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateProposalRequest {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransitionRequest {
    pub status: ProposalStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProposalQuery {
    pub status: Option<ProposalStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CloseProposalResponse {
    pub proposal: Proposal,
    pub tally: VoteTally,
}

// -- Votes --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CastVoteRequest {
    pub choice: VoteChoice,
}

// -- Feedback --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitFeedbackRequest {
    #[serde(default)]
    pub category: Option<FeedbackCategory>,
    pub message: String,
    #[serde(default)]
    pub server_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FeedbackQuery {
    pub category: Option<FeedbackCategory>,
}

// -- CSPI --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeclareCspiRequest {
    pub period: String,
    pub score: u8,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComputeSnapshotRequest {
    pub period: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PeriodQuery {
    pub period: Option<String>,
}
