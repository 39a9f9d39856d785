//! API error type.
//!
//! Every failure leaves the API as `{ "error": { "code", "message" } }` with the
//! status implied by the code. Database details are logged, never returned.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::error;

use assembly_db::{AssignmentError, ProposalError, ServerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    InvalidRole,
    Unverified,
    Unauthorized,
    Forbidden,
    NotFound,
    AlreadyHasRepresentative,
    AlreadyAssigned,
    NoRepresentative,
    ServerInactive,
    Conflict,
    InvalidTransition,
    VotingClosed,
    AlreadyVoted,
    DatabaseError,
    InternalError,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationError | ErrorCode::InvalidRole | ErrorCode::Unverified => {
                StatusCode::BAD_REQUEST
            }
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::AlreadyHasRepresentative
            | ErrorCode::AlreadyAssigned
            | ErrorCode::NoRepresentative
            | ErrorCode::ServerInactive
            | ErrorCode::Conflict
            | ErrorCode::InvalidTransition
            | ErrorCode::VotingClosed
            | ErrorCode::AlreadyVoted => StatusCode::CONFLICT,
            ErrorCode::DatabaseError | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{code:?}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a ApiError,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    fn database(err: &anyhow::Error) -> Self {
        error!("Database error: {:#}", err);
        Self::new(ErrorCode::DatabaseError, "Database operation failed")
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(ErrorBody { error: &self })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::database(&err)
    }
}

impl From<AssignmentError> for ApiError {
    fn from(err: AssignmentError) -> Self {
        let code = match &err {
            AssignmentError::ServerNotFound(_) | AssignmentError::ProfileNotFound(_) => {
                ErrorCode::NotFound
            }
            AssignmentError::ServerInactive(_) => ErrorCode::ServerInactive,
            AssignmentError::AlreadyHasRepresentative(_) => ErrorCode::AlreadyHasRepresentative,
            AssignmentError::NoRepresentative(_) => ErrorCode::NoRepresentative,
            AssignmentError::InvalidRole(_) => ErrorCode::InvalidRole,
            AssignmentError::Unverified(_) => ErrorCode::Unverified,
            AssignmentError::AlreadyAssigned(_) => ErrorCode::AlreadyAssigned,
            AssignmentError::Database(e) => return Self::database(e),
        };
        Self::new(code, err.to_string())
    }
}

impl From<ServerError> for ApiError {
    fn from(err: ServerError) -> Self {
        let code = match &err {
            ServerError::NotFound(_) => ErrorCode::NotFound,
            ServerError::NameTaken(_) | ServerError::HasRepresentative(_) => ErrorCode::Conflict,
            ServerError::Database(e) => return Self::database(e),
        };
        Self::new(code, err.to_string())
    }
}

impl From<ProposalError> for ApiError {
    fn from(err: ProposalError) -> Self {
        let code = match &err {
            ProposalError::NotFound(_) => ErrorCode::NotFound,
            ProposalError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            ProposalError::NotDraft(_) => ErrorCode::Conflict,
            ProposalError::VotingClosed(_) => ErrorCode::VotingClosed,
            ProposalError::AlreadyVoted(_) => ErrorCode::AlreadyVoted,
            ProposalError::Database(e) => return Self::database(e),
        };
        Self::new(code, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}
