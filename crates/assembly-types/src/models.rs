use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Returned by the `FromStr` impls below when a stored or submitted value
/// is not one of the known variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

/// Defines a lowercase string enum stored as TEXT and sent as a JSON string.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant { kind: $kind, value: other.to_string() }),
                }
            }
        }
    };
}

text_enum!(
    /// Account role. Representatives speak for one game server; admins run the assembly.
    Role, "role" {
        Representative => "representative",
        Admin => "admin",
    }
);

text_enum!(
    /// Lifecycle of a proposal. See [`ProposalStatus::can_transition_to`].
    ProposalStatus, "proposal status" {
        Draft => "draft",
        Active => "active",
        Voting => "voting",
        Approved => "approved",
        Rejected => "rejected",
    }
);

text_enum!(
    VoteChoice, "vote choice" {
        For => "for",
        Against => "against",
        Abstain => "abstain",
    }
);

text_enum!(
    FeedbackCategory, "feedback category" {
        General => "general",
        Bug => "bug",
        Suggestion => "suggestion",
        Complaint => "complaint",
    }
);

impl ProposalStatus {
    /// draft -> active -> voting -> approved | rejected. Nothing leaves a terminal state.
    pub fn can_transition_to(self, next: ProposalStatus) -> bool {
        use ProposalStatus::*;
        matches!(
            (self, next),
            (Draft, Active) | (Active, Voting) | (Voting, Approved) | (Voting, Rejected)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ProposalStatus::Approved | ProposalStatus::Rejected)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub id: Uuid,
    pub name: String,
    pub region: String,
    pub representative_id: Option<Uuid>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// A representative or admin account. The password hash never leaves the db crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub verified: bool,
    pub server_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub last_active: Option<DateTime<Utc>>,
}

impl Profile {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Verified representative currently bound to a server.
    pub fn active_server(&self) -> Option<Uuid> {
        match (self.role, self.verified) {
            (Role::Representative, true) => self.server_id,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: Uuid,
    pub author_id: Uuid,
    pub server_id: Option<Uuid>,
    pub title: String,
    pub body: String,
    pub status: ProposalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub id: Uuid,
    pub proposal_id: Uuid,
    pub voter_id: Uuid,
    pub server_id: Uuid,
    pub choice: VoteChoice,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    #[serde(rename = "for")]
    pub for_votes: u32,
    pub against: u32,
    pub abstain: u32,
    pub total: u32,
}

impl VoteTally {
    pub fn record(&mut self, choice: VoteChoice, count: u32) {
        match choice {
            VoteChoice::For => self.for_votes += count,
            VoteChoice::Against => self.against += count,
            VoteChoice::Abstain => self.abstain += count,
        }
        self.total += count;
    }

    /// Simple majority of cast for/against votes. Abstentions and ties reject.
    pub fn outcome(&self) -> ProposalStatus {
        if self.for_votes > self.against {
            ProposalStatus::Approved
        } else {
            ProposalStatus::Rejected
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub id: Uuid,
    pub author_id: Uuid,
    pub server_id: Option<Uuid>,
    pub category: FeedbackCategory,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CspiDeclaration {
    pub id: Uuid,
    pub server_id: Uuid,
    pub representative_id: Uuid,
    pub period: String,
    pub score: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CspiSnapshot {
    pub id: Uuid,
    pub period: String,
    pub index_value: f64,
    pub declaration_count: u32,
    pub server_count: u32,
    pub participation: f64,
    pub created_at: DateTime<Utc>,
}

pub const MAX_CSPI_SCORE: u8 = 100;

/// CSPI periods are calendar months written `YYYY-MM`.
pub fn is_valid_period(period: &str) -> bool {
    let Some((year, month)) = period.split_once('-') else {
        return false;
    };
    if year.len() != 4 || month.len() != 2 {
        return false;
    }
    if !year.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    matches!(month.parse::<u8>(), Ok(1..=12))
}
