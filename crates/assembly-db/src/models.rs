//! Row mapping. Ids and timestamps are stored as TEXT; these helpers turn a
//! malformed column into a conversion error instead of a silent default.

use std::str::FromStr;

use assembly_types::models::{
    CspiDeclaration, CspiSnapshot, Feedback, Profile, Proposal, Server, UnknownVariant, Vote,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use uuid::Uuid;

/// A profile together with its password hash. Only the auth handlers see this.
pub struct ProfileRow {
    pub profile: Profile,
    pub password_hash: String,
}

pub(crate) const SERVER_COLUMNS: &str = "id, name, region, representative_id, active, created_at";

pub(crate) const PROFILE_COLUMNS: &str =
    "id, email, name, role, verified, server_id, created_at, last_active, password";

pub(crate) const PROPOSAL_COLUMNS: &str =
    "id, author_id, server_id, title, body, status, created_at, updated_at";

pub(crate) fn server_from_row(row: &Row) -> rusqlite::Result<Server> {
    Ok(Server {
        id: uuid_col(row, 0)?,
        name: row.get(1)?,
        region: row.get(2)?,
        representative_id: opt_uuid_col(row, 3)?,
        active: row.get(4)?,
        created_at: time_col(row, 5)?,
    })
}

pub(crate) fn profile_row_from_row(row: &Row) -> rusqlite::Result<ProfileRow> {
    Ok(ProfileRow {
        profile: Profile {
            id: uuid_col(row, 0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            role: enum_col(row, 3)?,
            verified: row.get(4)?,
            server_id: opt_uuid_col(row, 5)?,
            created_at: time_col(row, 6)?,
            last_active: opt_time_col(row, 7)?,
        },
        password_hash: row.get(8)?,
    })
}

pub(crate) fn proposal_from_row(row: &Row) -> rusqlite::Result<Proposal> {
    Ok(Proposal {
        id: uuid_col(row, 0)?,
        author_id: uuid_col(row, 1)?,
        server_id: opt_uuid_col(row, 2)?,
        title: row.get(3)?,
        body: row.get(4)?,
        status: enum_col(row, 5)?,
        created_at: time_col(row, 6)?,
        updated_at: time_col(row, 7)?,
    })
}

pub(crate) fn vote_from_row(row: &Row) -> rusqlite::Result<Vote> {
    Ok(Vote {
        id: uuid_col(row, 0)?,
        proposal_id: uuid_col(row, 1)?,
        voter_id: uuid_col(row, 2)?,
        server_id: uuid_col(row, 3)?,
        choice: enum_col(row, 4)?,
        created_at: time_col(row, 5)?,
    })
}

pub(crate) fn feedback_from_row(row: &Row) -> rusqlite::Result<Feedback> {
    Ok(Feedback {
        id: uuid_col(row, 0)?,
        author_id: uuid_col(row, 1)?,
        server_id: opt_uuid_col(row, 2)?,
        category: enum_col(row, 3)?,
        message: row.get(4)?,
        created_at: time_col(row, 5)?,
    })
}

pub(crate) fn declaration_from_row(row: &Row) -> rusqlite::Result<CspiDeclaration> {
    Ok(CspiDeclaration {
        id: uuid_col(row, 0)?,
        server_id: uuid_col(row, 1)?,
        representative_id: uuid_col(row, 2)?,
        period: row.get(3)?,
        score: row.get(4)?,
        comment: row.get(5)?,
        created_at: time_col(row, 6)?,
    })
}

pub(crate) fn snapshot_from_row(row: &Row) -> rusqlite::Result<CspiSnapshot> {
    Ok(CspiSnapshot {
        id: uuid_col(row, 0)?,
        period: row.get(1)?,
        index_value: row.get(2)?,
        declaration_count: row.get(3)?,
        server_count: row.get(4)?,
        participation: row.get(5)?,
        created_at: time_col(row, 6)?,
    })
}

fn conversion_error(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

pub(crate) fn uuid_col(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(idx)?;
    Uuid::parse_str(&text).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn opt_uuid_col(row: &Row, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    row.get::<_, Option<String>>(idx)?
        .map(|text| Uuid::parse_str(&text).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn enum_col<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = UnknownVariant>,
{
    let text: String = row.get(idx)?;
    text.parse().map_err(|e| conversion_error(idx, e))
}

fn time_col(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    parse_timestamp(&text).map_err(|e| conversion_error(idx, e))
}

fn opt_time_col(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<String>>(idx)?
        .map(|text| parse_timestamp(&text).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

/// SQLite's `datetime('now')` yields "YYYY-MM-DD HH:MM:SS" without a zone; it is UTC.
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    text.parse::<DateTime<Utc>>().or_else(|_| {
        NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn parses_sqlite_and_rfc3339_timestamps() {
        let ts = parse_timestamp("2026-10-18 09:30:05").unwrap();
        assert_eq!((ts.year(), ts.month(), ts.day()), (2026, 10, 18));
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (9, 30, 5));

        let ts = parse_timestamp("2026-10-18T09:30:05Z").unwrap();
        assert_eq!(ts.hour(), 9);

        assert!(parse_timestamp("yesterday").is_err());
    }
}
