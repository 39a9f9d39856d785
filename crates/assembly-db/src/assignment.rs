//! Server <-> representative binding.
//!
//! A binding is stored twice: `servers.representative_id` and
//! `profiles.server_id`. Every operation here checks its preconditions and
//! writes both halves inside one `BEGIN IMMEDIATE` transaction. Each write is
//! a compare-and-swap on the expected prior state; if either one fails to
//! match, the transaction is dropped and neither half is committed.
//!
//! The unique indexes and triggers in migration v1 back this up at the SQL
//! layer.

use anyhow::anyhow;
use assembly_types::models::Role;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::Database;
use crate::error::AssignmentError;
use crate::models::opt_uuid_col;

struct ServerState {
    active: bool,
    representative_id: Option<Uuid>,
}

struct ProfileState {
    role: Role,
    verified: bool,
    server_id: Option<Uuid>,
}

impl Database {
    /// Binds `rep_id` to `server_id`.
    ///
    /// Checked in order: server exists, is active, has no representative;
    /// profile exists, is a representative, is verified, holds no server.
    pub fn assign_representative(&self, server_id: Uuid, rep_id: Uuid) -> Result<(), AssignmentError> {
        self.in_transaction(|tx| {
            ensure_server_available(tx, server_id)?;
            ensure_profile_eligible(tx, rep_id)?;
            link(tx, server_id, rep_id)
        })
        .inspect(|_| info!("Representative {} assigned to server {}", rep_id, server_id))
        .inspect_err(|e| log_refusal("assign", e))
    }

    /// Clears both halves of the server's binding and returns the detached representative.
    pub fn remove_representative(&self, server_id: Uuid) -> Result<Uuid, AssignmentError> {
        self.in_transaction(|tx| {
            let server = load_server(tx, server_id)?.ok_or(AssignmentError::ServerNotFound(server_id))?;
            let rep_id = server
                .representative_id
                .ok_or(AssignmentError::NoRepresentative(server_id))?;
            unlink(tx, server_id, rep_id)?;
            Ok(rep_id)
        })
        .inspect(|rep_id| info!("Representative {} removed from server {}", rep_id, server_id))
        .inspect_err(|e| log_refusal("remove", e))
    }

    /// Replaces the server's representative with `rep_id`, returning the one it
    /// displaced. Re-assigning the current representative is a no-op.
    pub fn reassign_representative(
        &self,
        server_id: Uuid,
        rep_id: Uuid,
    ) -> Result<Option<Uuid>, AssignmentError> {
        self.in_transaction(|tx| {
            let server = load_server(tx, server_id)?.ok_or(AssignmentError::ServerNotFound(server_id))?;
            if !server.active {
                return Err(AssignmentError::ServerInactive(server_id));
            }
            if server.representative_id == Some(rep_id) {
                return Ok(None);
            }

            ensure_profile_eligible(tx, rep_id)?;
            if let Some(previous) = server.representative_id {
                unlink(tx, server_id, previous)?;
            }
            link(tx, server_id, rep_id)?;
            Ok(server.representative_id)
        })
        .inspect(|previous| {
            info!(
                "Server {} reassigned to representative {} (previous: {:?})",
                server_id, rep_id, previous
            )
        })
        .inspect_err(|e| log_refusal("reassign", e))
    }

    /// Marks a pending representative verified and binds them to `server_id`.
    ///
    /// Checked in order: profile exists, is a representative, holds no server;
    /// then the same server checks as `assign_representative`.
    pub fn verify_representative(&self, profile_id: Uuid, server_id: Uuid) -> Result<(), AssignmentError> {
        self.in_transaction(|tx| {
            let profile =
                load_profile(tx, profile_id)?.ok_or(AssignmentError::ProfileNotFound(profile_id))?;
            if profile.role != Role::Representative {
                return Err(AssignmentError::InvalidRole(profile_id));
            }
            if profile.server_id.is_some() {
                return Err(AssignmentError::AlreadyAssigned(profile_id));
            }
            ensure_server_available(tx, server_id)?;

            tx.execute(
                "UPDATE profiles SET verified = 1 WHERE id = ?1 AND role = 'representative'",
                [profile_id.to_string()],
            )?;
            link(tx, server_id, profile_id)
        })
        .inspect(|_| info!("Representative {} verified for server {}", profile_id, server_id))
        .inspect_err(|e| log_refusal("verify", e))
    }

    fn in_transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, AssignmentError>,
    ) -> Result<T, AssignmentError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        // Dropping `tx` on the error path rolls back any half-written binding.
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

fn log_refusal(op: &str, e: &AssignmentError) {
    match e {
        AssignmentError::Database(err) => warn!("{} rolled back: {:#}", op, err),
        other => debug!("{} refused: {}", op, other),
    }
}

fn ensure_server_available(conn: &Connection, server_id: Uuid) -> Result<(), AssignmentError> {
    let server = load_server(conn, server_id)?.ok_or(AssignmentError::ServerNotFound(server_id))?;
    if !server.active {
        return Err(AssignmentError::ServerInactive(server_id));
    }
    if server.representative_id.is_some() {
        return Err(AssignmentError::AlreadyHasRepresentative(server_id));
    }
    Ok(())
}

fn ensure_profile_eligible(conn: &Connection, rep_id: Uuid) -> Result<(), AssignmentError> {
    let profile = load_profile(conn, rep_id)?.ok_or(AssignmentError::ProfileNotFound(rep_id))?;
    if profile.role != Role::Representative {
        return Err(AssignmentError::InvalidRole(rep_id));
    }
    if !profile.verified {
        return Err(AssignmentError::Unverified(rep_id));
    }
    if profile.server_id.is_some() {
        return Err(AssignmentError::AlreadyAssigned(rep_id));
    }
    Ok(())
}

/// Writes both halves. Each UPDATE only matches the expected unbound state.
fn link(conn: &Connection, server_id: Uuid, rep_id: Uuid) -> Result<(), AssignmentError> {
    let changed = conn.execute(
        "UPDATE servers SET representative_id = ?2
         WHERE id = ?1 AND representative_id IS NULL AND active = 1",
        [server_id.to_string(), rep_id.to_string()],
    )?;
    if changed != 1 {
        return Err(AssignmentError::AlreadyHasRepresentative(server_id));
    }

    let changed = conn.execute(
        "UPDATE profiles SET server_id = ?2
         WHERE id = ?1 AND server_id IS NULL AND role = 'representative' AND verified = 1",
        [rep_id.to_string(), server_id.to_string()],
    )?;
    if changed != 1 {
        return Err(AssignmentError::AlreadyAssigned(rep_id));
    }
    Ok(())
}

/// Clears both halves. The profile side is cleared by server id so a
/// half-written binding left by an older writer is repaired too.
fn unlink(conn: &Connection, server_id: Uuid, rep_id: Uuid) -> Result<(), AssignmentError> {
    let changed = conn.execute(
        "UPDATE servers SET representative_id = NULL
         WHERE id = ?1 AND representative_id = ?2",
        [server_id.to_string(), rep_id.to_string()],
    )?;
    if changed != 1 {
        return Err(AssignmentError::Database(anyhow!(
            "server {} no longer bound to {}",
            server_id,
            rep_id
        )));
    }

    conn.execute(
        "UPDATE profiles SET server_id = NULL WHERE server_id = ?1",
        [server_id.to_string()],
    )?;
    Ok(())
}

fn load_server(conn: &Connection, id: Uuid) -> Result<Option<ServerState>, AssignmentError> {
    let state = conn
        .query_row(
            "SELECT active, representative_id FROM servers WHERE id = ?1",
            [id.to_string()],
            |row| {
                Ok(ServerState {
                    active: row.get(0)?,
                    representative_id: opt_uuid_col(row, 1)?,
                })
            },
        )
        .optional()?;
    Ok(state)
}

fn load_profile(conn: &Connection, id: Uuid) -> Result<Option<ProfileState>, AssignmentError> {
    let row = conn
        .query_row(
            "SELECT role, verified, server_id FROM profiles WHERE id = ?1",
            [id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, bool>(1)?,
                    opt_uuid_col(row, 2)?,
                ))
            },
        )
        .optional()?;

    row.map(|(role, verified, server_id)| {
        let role = role
            .parse::<Role>()
            .map_err(|e| AssignmentError::Database(e.into()))?;
        Ok(ProfileState {
            role,
            verified,
            server_id,
        })
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        db: Database,
        server: Uuid,
        rep: Uuid,
    }

    fn add_rep(db: &Database, verified: bool) -> Uuid {
        let id = Uuid::new_v4();
        db.create_profile(
            id,
            &format!("{}@example.com", id),
            "Rep",
            "hash",
            Role::Representative,
            verified,
        )
        .unwrap();
        id
    }

    fn add_server(db: &Database, active: bool) -> Uuid {
        let id = Uuid::new_v4();
        db.create_server(id, &id.to_string(), "EU", active).unwrap();
        id
    }

    fn fixture() -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let server = add_server(&db, true);
        let rep = add_rep(&db, true);
        Fixture { db, server, rep }
    }

    fn binding(db: &Database, server: Uuid, rep: Uuid) -> (Option<Uuid>, Option<Uuid>) {
        (
            db.get_server(server).unwrap().unwrap().representative_id,
            db.get_profile(rep).unwrap().unwrap().server_id,
        )
    }

    #[test]
    fn assign_writes_both_sides() {
        let f = fixture();
        f.db.assign_representative(f.server, f.rep).unwrap();
        assert_eq!(binding(&f.db, f.server, f.rep), (Some(f.rep), Some(f.server)));
    }

    #[test]
    fn assign_rejects_missing_server_and_profile() {
        let f = fixture();
        assert!(matches!(
            f.db.assign_representative(Uuid::new_v4(), f.rep),
            Err(AssignmentError::ServerNotFound(_))
        ));
        assert!(matches!(
            f.db.assign_representative(f.server, Uuid::new_v4()),
            Err(AssignmentError::ProfileNotFound(_))
        ));
        assert_eq!(binding(&f.db, f.server, f.rep), (None, None));
    }

    #[test]
    fn assign_rejects_inactive_server() {
        let f = fixture();
        let inactive = add_server(&f.db, false);
        assert!(matches!(
            f.db.assign_representative(inactive, f.rep),
            Err(AssignmentError::ServerInactive(_))
        ));
    }

    #[test]
    fn assign_rejects_unverified_without_mutation() {
        let f = fixture();
        let pending = add_rep(&f.db, false);
        assert!(matches!(
            f.db.assign_representative(f.server, pending),
            Err(AssignmentError::Unverified(_))
        ));
        assert_eq!(binding(&f.db, f.server, pending), (None, None));
    }

    #[test]
    fn assign_rejects_admin() {
        let f = fixture();
        let admin = Uuid::new_v4();
        f.db.create_profile(admin, "admin@example.com", "Admin", "h", Role::Admin, true)
            .unwrap();
        assert!(matches!(
            f.db.assign_representative(f.server, admin),
            Err(AssignmentError::InvalidRole(_))
        ));
    }

    #[test]
    fn assign_rejects_taken_server_and_assigned_rep() {
        let f = fixture();
        f.db.assign_representative(f.server, f.rep).unwrap();

        let other_rep = add_rep(&f.db, true);
        assert!(matches!(
            f.db.assign_representative(f.server, other_rep),
            Err(AssignmentError::AlreadyHasRepresentative(_))
        ));

        let other_server = add_server(&f.db, true);
        assert!(matches!(
            f.db.assign_representative(other_server, f.rep),
            Err(AssignmentError::AlreadyAssigned(_))
        ));
        assert_eq!(binding(&f.db, other_server, other_rep), (None, None));
        assert_eq!(binding(&f.db, f.server, f.rep), (Some(f.rep), Some(f.server)));
    }

    #[test]
    fn failed_second_write_rolls_back_first() {
        let f = fixture();
        f.db.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER fail_profile_link BEFORE UPDATE OF server_id ON profiles
                 WHEN NEW.server_id IS NOT NULL
                 BEGIN SELECT RAISE(ABORT, 'injected failure'); END;",
            )?;
            Ok(())
        })
        .unwrap();

        let err = f.db.assign_representative(f.server, f.rep).unwrap_err();
        assert!(matches!(err, AssignmentError::Database(_)));
        assert_eq!(binding(&f.db, f.server, f.rep), (None, None));
    }

    #[test]
    fn remove_clears_both_sides() {
        let f = fixture();
        f.db.assign_representative(f.server, f.rep).unwrap();
        assert_eq!(f.db.remove_representative(f.server).unwrap(), f.rep);
        assert_eq!(binding(&f.db, f.server, f.rep), (None, None));

        assert!(matches!(
            f.db.remove_representative(f.server),
            Err(AssignmentError::NoRepresentative(_))
        ));
        assert!(matches!(
            f.db.remove_representative(Uuid::new_v4()),
            Err(AssignmentError::ServerNotFound(_))
        ));
    }

    #[test]
    fn removed_rep_can_take_another_server() {
        let f = fixture();
        let other = add_server(&f.db, true);
        f.db.assign_representative(f.server, f.rep).unwrap();
        f.db.remove_representative(f.server).unwrap();
        f.db.assign_representative(other, f.rep).unwrap();
        assert_eq!(binding(&f.db, other, f.rep), (Some(f.rep), Some(other)));
    }

    #[test]
    fn reassign_swaps_representatives() {
        let f = fixture();
        let next = add_rep(&f.db, true);
        f.db.assign_representative(f.server, f.rep).unwrap();

        let previous = f.db.reassign_representative(f.server, next).unwrap();
        assert_eq!(previous, Some(f.rep));
        assert_eq!(binding(&f.db, f.server, next), (Some(next), Some(f.server)));
        assert_eq!(f.db.get_profile(f.rep).unwrap().unwrap().server_id, None);

        // Same representative again is a no-op.
        assert_eq!(f.db.reassign_representative(f.server, next).unwrap(), None);
        assert_eq!(binding(&f.db, f.server, next), (Some(next), Some(f.server)));
    }

    #[test]
    fn reassign_refusal_keeps_current_binding() {
        let f = fixture();
        let pending = add_rep(&f.db, false);
        f.db.assign_representative(f.server, f.rep).unwrap();

        assert!(matches!(
            f.db.reassign_representative(f.server, pending),
            Err(AssignmentError::Unverified(_))
        ));
        assert_eq!(binding(&f.db, f.server, f.rep), (Some(f.rep), Some(f.server)));
    }

    #[test]
    fn verify_marks_verified_and_binds() {
        let f = fixture();
        let pending = add_rep(&f.db, false);
        f.db.verify_representative(pending, f.server).unwrap();

        let profile = f.db.get_profile(pending).unwrap().unwrap();
        assert!(profile.verified);
        assert_eq!(binding(&f.db, f.server, pending), (Some(pending), Some(f.server)));
    }

    #[test]
    fn verify_refusal_leaves_profile_pending() {
        let f = fixture();
        f.db.assign_representative(f.server, f.rep).unwrap();
        let pending = add_rep(&f.db, false);

        assert!(matches!(
            f.db.verify_representative(pending, f.server),
            Err(AssignmentError::AlreadyHasRepresentative(_))
        ));
        assert!(!f.db.get_profile(pending).unwrap().unwrap().verified);

        assert!(matches!(
            f.db.verify_representative(f.rep, add_server(&f.db, true)),
            Err(AssignmentError::AlreadyAssigned(_))
        ));
    }

    #[test]
    fn deleting_server_detaches_representative() {
        let f = fixture();
        f.db.assign_representative(f.server, f.rep).unwrap();
        assert_eq!(f.db.delete_server(f.server).unwrap(), Some(f.rep));
        assert_eq!(f.db.get_profile(f.rep).unwrap().unwrap().server_id, None);
    }

    #[test]
    fn deactivating_assigned_server_is_refused() {
        let f = fixture();
        f.db.assign_representative(f.server, f.rep).unwrap();
        assert!(matches!(
            f.db.update_server(f.server, None, None, Some(false)),
            Err(crate::ServerError::HasRepresentative(_))
        ));
    }
}
