use crate::error::ServerError;
use crate::models::{
    PROFILE_COLUMNS, ProfileRow, SERVER_COLUMNS, profile_row_from_row, server_from_row,
};
use crate::{Database, is_constraint_violation, is_unique_failure};
use anyhow::Result;
use assembly_types::models::{Profile, Role, Server};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use tracing::info;
use uuid::Uuid;

impl Database {
    // -- Profiles --

    pub fn create_profile(
        &self,
        id: Uuid,
        email: &str,
        name: &str,
        password_hash: &str,
        role: Role,
        verified: bool,
    ) -> Result<Profile> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO profiles (id, email, name, password, role, verified)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    id.to_string(),
                    email,
                    name,
                    password_hash,
                    role.as_str(),
                    verified
                ],
            )?;
            query_profile(conn, id)?
                .map(|row| row.profile)
                .ok_or_else(|| anyhow::anyhow!("profile {} vanished after insert", id))
        })
    }

    pub fn get_profile(&self, id: Uuid) -> Result<Option<Profile>> {
        self.with_conn(|conn| Ok(query_profile(conn, id)?.map(|row| row.profile)))
    }

    pub fn get_profile_by_email(&self, email: &str) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE email = ?1");
            Ok(conn
                .query_row(&sql, [email], profile_row_from_row)
                .optional()?)
        })
    }

    pub fn list_profiles(&self, role: Option<Role>, verified: Option<bool>) -> Result<Vec<Profile>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {PROFILE_COLUMNS} FROM profiles
                 WHERE (?1 IS NULL OR role = ?1)
                   AND (?2 IS NULL OR verified = ?2)
                 ORDER BY created_at, rowid"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    rusqlite::params![role.map(|r| r.as_str()), verified],
                    profile_row_from_row,
                )?
                .map(|r| r.map(|row| row.profile))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn touch_last_active(&self, id: Uuid) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE profiles SET last_active = datetime('now') WHERE id = ?1",
                [id.to_string()],
            )?;
            Ok(())
        })
    }

    // -- Servers --

    pub fn create_server(
        &self,
        id: Uuid,
        name: &str,
        region: &str,
        active: bool,
    ) -> Result<Server, ServerError> {
        let inserted = self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO servers (id, name, region, active) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id.to_string(), name, region, active],
            )?;
            query_server(conn, id)
        });

        match inserted {
            Ok(Some(server)) => {
                info!("Server {} ({}) created", server.name, server.id);
                Ok(server)
            }
            Ok(None) => Err(ServerError::NotFound(id)),
            Err(e) if is_constraint_violation(&e) => Err(ServerError::NameTaken(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_server(&self, id: Uuid) -> Result<Option<Server>> {
        self.with_conn(|conn| query_server(conn, id))
    }

    pub fn list_servers(&self, active: Option<bool>, unassigned: Option<bool>) -> Result<Vec<Server>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {SERVER_COLUMNS} FROM servers
                 WHERE (?1 IS NULL OR active = ?1)
                   AND (?2 IS NULL OR (representative_id IS NULL) = ?2)
                 ORDER BY name"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![active, unassigned], server_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Applies the given changes. Deactivating a server that still has a
    /// representative is refused; remove the representative first.
    pub fn update_server(
        &self,
        id: Uuid,
        name: Option<&str>,
        region: Option<&str>,
        active: Option<bool>,
    ) -> Result<Server, ServerError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = query_server(&tx, id)?.ok_or(ServerError::NotFound(id))?;
        if active == Some(false) && current.representative_id.is_some() {
            return Err(ServerError::HasRepresentative(id));
        }

        let updated = tx.execute(
            "UPDATE servers
             SET name = COALESCE(?2, name),
                 region = COALESCE(?3, region),
                 active = COALESCE(?4, active)
             WHERE id = ?1",
            rusqlite::params![id.to_string(), name, region, active],
        );
        match updated {
            Ok(_) => {}
            Err(e) if is_unique_failure(&e) => {
                return Err(ServerError::NameTaken(name.unwrap_or_default().to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        let server = query_server(&tx, id)?.ok_or(ServerError::NotFound(id))?;
        tx.commit()?;
        Ok(server)
    }

    /// Deletes the server and detaches its representative in the same transaction.
    /// Returns the detached representative, if any.
    pub fn delete_server(&self, id: Uuid) -> Result<Option<Uuid>, ServerError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = query_server(&tx, id)?.ok_or(ServerError::NotFound(id))?;
        tx.execute(
            "UPDATE profiles SET server_id = NULL WHERE server_id = ?1",
            [id.to_string()],
        )?;
        tx.execute("DELETE FROM servers WHERE id = ?1", [id.to_string()])?;
        tx.commit()?;

        info!("Server {} deleted", id);
        Ok(current.representative_id)
    }
}

pub(crate) fn query_server(conn: &Connection, id: Uuid) -> Result<Option<Server>> {
    let sql = format!("SELECT {SERVER_COLUMNS} FROM servers WHERE id = ?1");
    Ok(conn
        .query_row(&sql, [id.to_string()], server_from_row)
        .optional()?)
}

pub(crate) fn query_profile(conn: &Connection, id: Uuid) -> Result<Option<ProfileRow>> {
    let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?1");
    Ok(conn
        .query_row(&sql, [id.to_string()], profile_row_from_row)
        .optional()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn create_and_fetch_server() {
        let db = db();
        let id = Uuid::new_v4();
        let server = db.create_server(id, "Aurora", "EU", true).unwrap();
        assert_eq!(server.id, id);
        assert_eq!(server.representative_id, None);
        assert!(server.active);

        assert_eq!(db.get_server(id).unwrap(), Some(server));
        assert_eq!(db.get_server(Uuid::new_v4()).unwrap(), None);
    }

    #[test]
    fn server_names_are_unique_case_insensitively() {
        let db = db();
        db.create_server(Uuid::new_v4(), "Aurora", "EU", true).unwrap();
        let err = db
            .create_server(Uuid::new_v4(), "aurora", "NA", true)
            .unwrap_err();
        assert!(matches!(err, ServerError::NameTaken(_)));
    }

    #[test]
    fn list_servers_filters() {
        let db = db();
        db.create_server(Uuid::new_v4(), "B-Server", "EU", true).unwrap();
        db.create_server(Uuid::new_v4(), "A-Server", "NA", false).unwrap();

        let all = db.list_servers(None, None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "A-Server");

        let active = db.list_servers(Some(true), None).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "B-Server");

        assert_eq!(db.list_servers(None, Some(true)).unwrap().len(), 2);
        assert!(db.list_servers(None, Some(false)).unwrap().is_empty());
    }

    #[test]
    fn update_server_applies_partial_changes() {
        let db = db();
        let id = Uuid::new_v4();
        db.create_server(id, "Aurora", "EU", true).unwrap();

        let updated = db.update_server(id, None, Some("ASIA"), None).unwrap();
        assert_eq!(updated.name, "Aurora");
        assert_eq!(updated.region, "ASIA");

        let updated = db.update_server(id, None, None, Some(false)).unwrap();
        assert!(!updated.active);

        assert!(matches!(
            db.update_server(Uuid::new_v4(), Some("x"), None, None),
            Err(ServerError::NotFound(_))
        ));
    }

    #[test]
    fn profiles_filter_by_role_and_verification() {
        let db = db();
        db.create_profile(Uuid::new_v4(), "a@x.io", "A", "h", Role::Admin, true)
            .unwrap();
        db.create_profile(Uuid::new_v4(), "r@x.io", "R", "h", Role::Representative, false)
            .unwrap();

        assert_eq!(db.list_profiles(None, None).unwrap().len(), 2);
        let pending = db
            .list_profiles(Some(Role::Representative), Some(false))
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].email, "r@x.io");

        let row = db.get_profile_by_email("R@X.IO").unwrap().unwrap();
        assert_eq!(row.password_hash, "h");
    }

    #[test]
    fn touch_last_active_sets_timestamp() {
        let db = db();
        let id = Uuid::new_v4();
        let profile = db
            .create_profile(id, "a@x.io", "A", "h", Role::Admin, true)
            .unwrap();
        assert!(profile.last_active.is_none());

        db.touch_last_active(id).unwrap();
        assert!(db.get_profile(id).unwrap().unwrap().last_active.is_some());
    }
}
