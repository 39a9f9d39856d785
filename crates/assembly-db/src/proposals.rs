use anyhow::Result;
use assembly_types::models::{Proposal, ProposalStatus, Vote, VoteChoice, VoteTally};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use tracing::info;
use uuid::Uuid;

use crate::error::ProposalError;
use crate::models::{PROPOSAL_COLUMNS, proposal_from_row, vote_from_row};
use crate::{Database, is_unique_failure};

impl Database {
    // -- Proposals --

    pub fn create_proposal(
        &self,
        id: Uuid,
        author_id: Uuid,
        server_id: Option<Uuid>,
        title: &str,
        body: &str,
    ) -> Result<Proposal> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO proposals (id, author_id, server_id, title, body)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    id.to_string(),
                    author_id.to_string(),
                    server_id.map(|s| s.to_string()),
                    title,
                    body
                ],
            )?;
            query_proposal(conn, id)?
                .ok_or_else(|| anyhow::anyhow!("proposal {} vanished after insert", id))
        })
    }

    pub fn get_proposal(&self, id: Uuid) -> Result<Option<Proposal>> {
        self.with_conn(|conn| query_proposal(conn, id))
    }

    /// Newest first.
    pub fn list_proposals(&self, status: Option<ProposalStatus>) -> Result<Vec<Proposal>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {PROPOSAL_COLUMNS} FROM proposals
                 WHERE (?1 IS NULL OR status = ?1)
                 ORDER BY created_at DESC, rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([status.map(|s| s.as_str())], proposal_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Moves a proposal along its lifecycle. The UPDATE only matches the status
    /// the caller validated against, so a concurrent transition is reported
    /// rather than overwritten.
    pub fn transition_proposal(&self, id: Uuid, to: ProposalStatus) -> Result<Proposal, ProposalError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = query_proposal(&tx, id)?.ok_or(ProposalError::NotFound(id))?;
        if !current.status.can_transition_to(to) {
            return Err(ProposalError::InvalidTransition {
                from: current.status,
                to,
            });
        }
        set_status(&tx, id, current.status, to)?;

        let updated = query_proposal(&tx, id)?.ok_or(ProposalError::NotFound(id))?;
        tx.commit()?;

        info!("Proposal {} moved {} -> {}", id, current.status, to);
        Ok(updated)
    }

    /// Ends voting: approved on a strict for/against majority, rejected otherwise.
    pub fn close_proposal(&self, id: Uuid) -> Result<(Proposal, VoteTally), ProposalError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = query_proposal(&tx, id)?.ok_or(ProposalError::NotFound(id))?;
        if current.status != ProposalStatus::Voting {
            return Err(ProposalError::VotingClosed(current.status));
        }

        let tally = query_tally(&tx, id)?;
        let outcome = tally.outcome();
        set_status(&tx, id, ProposalStatus::Voting, outcome)?;

        let closed = query_proposal(&tx, id)?.ok_or(ProposalError::NotFound(id))?;
        tx.commit()?;

        info!(
            "Proposal {} closed as {} ({} for, {} against, {} abstain)",
            id, outcome, tally.for_votes, tally.against, tally.abstain
        );
        Ok((closed, tally))
    }

    /// Only drafts can be deleted.
    pub fn delete_proposal(&self, id: Uuid) -> Result<(), ProposalError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = query_proposal(&tx, id)?.ok_or(ProposalError::NotFound(id))?;
        if current.status != ProposalStatus::Draft {
            return Err(ProposalError::NotDraft(current.status));
        }
        tx.execute(
            "DELETE FROM proposals WHERE id = ?1 AND status = 'draft'",
            [id.to_string()],
        )?;
        tx.commit()?;
        Ok(())
    }

    // -- Votes --

    /// Records one vote per (proposal, server). The proposal must be in `voting`.
    pub fn cast_vote(
        &self,
        id: Uuid,
        proposal_id: Uuid,
        voter_id: Uuid,
        server_id: Uuid,
        choice: VoteChoice,
    ) -> Result<Vote, ProposalError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let proposal = query_proposal(&tx, proposal_id)?.ok_or(ProposalError::NotFound(proposal_id))?;
        if proposal.status != ProposalStatus::Voting {
            return Err(ProposalError::VotingClosed(proposal.status));
        }

        let inserted = tx.execute(
            "INSERT INTO votes (id, proposal_id, voter_id, server_id, choice)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                id.to_string(),
                proposal_id.to_string(),
                voter_id.to_string(),
                server_id.to_string(),
                choice.as_str()
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_failure(&e) => return Err(ProposalError::AlreadyVoted(server_id)),
            Err(e) => return Err(e.into()),
        }

        let vote = tx.query_row(
            "SELECT id, proposal_id, voter_id, server_id, choice, created_at FROM votes WHERE id = ?1",
            [id.to_string()],
            vote_from_row,
        )?;
        tx.commit()?;
        Ok(vote)
    }

    pub fn list_votes(&self, proposal_id: Uuid) -> Result<Vec<Vote>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, proposal_id, voter_id, server_id, choice, created_at
                 FROM votes WHERE proposal_id = ?1
                 ORDER BY created_at, rowid",
            )?;
            let rows = stmt
                .query_map([proposal_id.to_string()], vote_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn tally_votes(&self, proposal_id: Uuid) -> Result<VoteTally> {
        self.with_conn(|conn| query_tally(conn, proposal_id))
    }
}

fn set_status(
    conn: &Connection,
    id: Uuid,
    from: ProposalStatus,
    to: ProposalStatus,
) -> Result<(), ProposalError> {
    let changed = conn.execute(
        "UPDATE proposals SET status = ?3, updated_at = datetime('now')
         WHERE id = ?1 AND status = ?2",
        [id.to_string(), from.as_str().to_string(), to.as_str().to_string()],
    )?;
    if changed != 1 {
        return Err(ProposalError::InvalidTransition { from, to });
    }
    Ok(())
}

fn query_proposal(conn: &Connection, id: Uuid) -> Result<Option<Proposal>> {
    let sql = format!("SELECT {PROPOSAL_COLUMNS} FROM proposals WHERE id = ?1");
    Ok(conn
        .query_row(&sql, [id.to_string()], proposal_from_row)
        .optional()?)
}

fn query_tally(conn: &Connection, proposal_id: Uuid) -> Result<VoteTally> {
    let mut stmt =
        conn.prepare("SELECT choice, COUNT(*) FROM votes WHERE proposal_id = ?1 GROUP BY choice")?;
    let counts = stmt
        .query_map([proposal_id.to_string()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut tally = VoteTally::default();
    for (choice, count) in counts {
        tally.record(choice.parse()?, count);
    }
    Ok(tally)
}
