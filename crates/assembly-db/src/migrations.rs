use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (servers, profiles, assignment backstop)");
        conn.execute_batch(
            "
            CREATE TABLE servers (
                id                  TEXT PRIMARY KEY,
                name                TEXT NOT NULL UNIQUE COLLATE NOCASE,
                region              TEXT NOT NULL,
                representative_id   TEXT REFERENCES profiles(id) ON DELETE SET NULL,
                active              INTEGER NOT NULL DEFAULT 1,
                created_at          TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE profiles (
                id          TEXT PRIMARY KEY,
                email       TEXT NOT NULL UNIQUE COLLATE NOCASE,
                name        TEXT NOT NULL,
                password    TEXT NOT NULL,
                role        TEXT NOT NULL CHECK (role IN ('representative', 'admin')),
                verified    INTEGER NOT NULL DEFAULT 0,
                server_id   TEXT REFERENCES servers(id) ON DELETE SET NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                last_active TEXT
            );

            -- One representative per server, one server per representative.
            CREATE UNIQUE INDEX idx_servers_representative
                ON servers(representative_id) WHERE representative_id IS NOT NULL;
            CREATE UNIQUE INDEX idx_profiles_server
                ON profiles(server_id) WHERE server_id IS NOT NULL;

            CREATE TRIGGER servers_link_eligible
            BEFORE UPDATE OF representative_id ON servers
            WHEN NEW.representative_id IS NOT NULL
            BEGIN
                SELECT RAISE(ABORT, 'server must be active to take a representative')
                    WHERE NEW.active = 0;
                SELECT RAISE(ABORT, 'representative must be a verified representative')
                    WHERE NOT EXISTS (
                        SELECT 1 FROM profiles
                        WHERE id = NEW.representative_id
                          AND role = 'representative'
                          AND verified = 1
                    );
            END;

            CREATE TRIGGER profiles_link_eligible
            BEFORE UPDATE OF server_id ON profiles
            WHEN NEW.server_id IS NOT NULL
            BEGIN
                SELECT RAISE(ABORT, 'only verified representatives can hold a server')
                    WHERE NEW.role <> 'representative' OR NEW.verified = 0;
                SELECT RAISE(ABORT, 'server must be active to take a representative')
                    WHERE NOT EXISTS (
                        SELECT 1 FROM servers WHERE id = NEW.server_id AND active = 1
                    );
            END;

            CREATE TRIGGER servers_deactivate_unassigned
            BEFORE UPDATE OF active ON servers
            WHEN NEW.active = 0 AND NEW.representative_id IS NOT NULL
            BEGIN
                SELECT RAISE(ABORT, 'remove the representative before deactivating the server');
            END;

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (proposals, votes, feedback)");
        conn.execute_batch(
            "
            CREATE TABLE proposals (
                id          TEXT PRIMARY KEY,
                author_id   TEXT NOT NULL REFERENCES profiles(id),
                server_id   TEXT REFERENCES servers(id) ON DELETE SET NULL,
                title       TEXT NOT NULL,
                body        TEXT NOT NULL,
                status      TEXT NOT NULL DEFAULT 'draft'
                            CHECK (status IN ('draft', 'active', 'voting', 'approved', 'rejected')),
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_proposals_status ON proposals(status, created_at);

            CREATE TABLE votes (
                id          TEXT PRIMARY KEY,
                proposal_id TEXT NOT NULL REFERENCES proposals(id) ON DELETE CASCADE,
                voter_id    TEXT NOT NULL REFERENCES profiles(id),
                server_id   TEXT NOT NULL REFERENCES servers(id) ON DELETE CASCADE,
                choice      TEXT NOT NULL CHECK (choice IN ('for', 'against', 'abstain')),
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(proposal_id, server_id)
            );

            CREATE TABLE feedback (
                id          TEXT PRIMARY KEY,
                author_id   TEXT NOT NULL REFERENCES profiles(id),
                server_id   TEXT REFERENCES servers(id) ON DELETE SET NULL,
                category    TEXT NOT NULL
                            CHECK (category IN ('general', 'bug', 'suggestion', 'complaint')),
                message     TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_feedback_created ON feedback(created_at);

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    if version < 3 {
        info!("Running migration v3 (CSPI)");
        conn.execute_batch(
            "
            CREATE TABLE cspi_declarations (
                id                  TEXT PRIMARY KEY,
                server_id           TEXT NOT NULL REFERENCES servers(id) ON DELETE CASCADE,
                representative_id   TEXT NOT NULL REFERENCES profiles(id),
                period              TEXT NOT NULL,
                score               INTEGER NOT NULL CHECK (score BETWEEN 0 AND 100),
                comment             TEXT,
                created_at          TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(server_id, period)
            );

            CREATE TABLE cspi_snapshots (
                id                  TEXT PRIMARY KEY,
                period              TEXT NOT NULL UNIQUE,
                index_value         REAL NOT NULL,
                declaration_count   INTEGER NOT NULL,
                server_count        INTEGER NOT NULL,
                participation       REAL NOT NULL,
                created_at          TEXT NOT NULL DEFAULT (datetime('now'))
            );

            INSERT INTO schema_version (version) VALUES (3);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 3);
    }

    #[test]
    fn trigger_rejects_linking_unverified_profile() {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        run(&conn).unwrap();

        conn.execute_batch(
            "
            INSERT INTO servers (id, name, region) VALUES ('s1', 'One', 'EU');
            INSERT INTO profiles (id, email, name, password, role)
                VALUES ('p1', 'p1@example.com', 'P1', 'x', 'representative');
            ",
        )
        .unwrap();

        let err = conn
            .execute("UPDATE servers SET representative_id = 'p1' WHERE id = 's1'", [])
            .unwrap_err();
        assert!(err.to_string().contains("verified representative"));

        let err = conn
            .execute("UPDATE profiles SET server_id = 's1' WHERE id = 'p1'", [])
            .unwrap_err();
        assert!(err.to_string().contains("verified representatives"));
    }

    #[test]
    fn unique_index_blocks_second_server_for_same_representative() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();

        conn.execute_batch(
            "
            INSERT INTO servers (id, name, region) VALUES ('s1', 'One', 'EU');
            INSERT INTO servers (id, name, region) VALUES ('s2', 'Two', 'EU');
            INSERT INTO profiles (id, email, name, password, role, verified)
                VALUES ('p1', 'p1@example.com', 'P1', 'x', 'representative', 1);
            UPDATE servers SET representative_id = 'p1' WHERE id = 's1';
            ",
        )
        .unwrap();

        assert!(
            conn.execute("UPDATE servers SET representative_id = 'p1' WHERE id = 's2'", [])
                .is_err()
        );
    }
}
