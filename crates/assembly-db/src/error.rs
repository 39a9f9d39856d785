use assembly_types::models::ProposalStatus;
use uuid::Uuid;

/// Why an assign / remove / reassign / verify was refused. Every variant except
/// `Database` is raised before anything is written.
#[derive(Debug, thiserror::Error)]
pub enum AssignmentError {
    #[error("server {0} not found")]
    ServerNotFound(Uuid),

    #[error("profile {0} not found")]
    ProfileNotFound(Uuid),

    #[error("server {0} is not active")]
    ServerInactive(Uuid),

    #[error("server {0} already has a representative")]
    AlreadyHasRepresentative(Uuid),

    #[error("server {0} has no representative")]
    NoRepresentative(Uuid),

    #[error("profile {0} is not a representative")]
    InvalidRole(Uuid),

    #[error("representative {0} is not verified")]
    Unverified(Uuid),

    #[error("representative {0} is already assigned to a server")]
    AlreadyAssigned(Uuid),

    #[error("database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for AssignmentError {
    fn from(e: rusqlite::Error) -> Self {
        AssignmentError::Database(e.into())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("server {0} not found")]
    NotFound(Uuid),

    #[error("server name '{0}' is already taken")]
    NameTaken(String),

    #[error("server {0} still has a representative")]
    HasRepresentative(Uuid),

    #[error("database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for ServerError {
    fn from(e: rusqlite::Error) -> Self {
        ServerError::Database(e.into())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProposalError {
    #[error("proposal {0} not found")]
    NotFound(Uuid),

    #[error("cannot move proposal from {from} to {to}")]
    InvalidTransition {
        from: ProposalStatus,
        to: ProposalStatus,
    },

    #[error("only draft proposals can be deleted (status is {0})")]
    NotDraft(ProposalStatus),

    #[error("proposal is not open for voting (status is {0})")]
    VotingClosed(ProposalStatus),

    #[error("server {0} has already voted on this proposal")]
    AlreadyVoted(Uuid),

    #[error("database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for ProposalError {
    fn from(e: rusqlite::Error) -> Self {
        ProposalError::Database(e.into())
    }
}
