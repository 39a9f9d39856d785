//! Community Spending Propensity Index.
//!
//! Each representative declares a 0..=100 score for their server once per
//! month; a snapshot averages the declarations of currently active servers.

use anyhow::Result;
use assembly_types::models::{CspiDeclaration, CspiSnapshot};
use rusqlite::{OptionalExtension, TransactionBehavior};
use tracing::info;
use uuid::Uuid;

use crate::Database;
use crate::models::{declaration_from_row, snapshot_from_row};

const DECLARATION_COLUMNS: &str =
    "id, server_id, representative_id, period, score, comment, created_at";

const SNAPSHOT_COLUMNS: &str =
    "id, period, index_value, declaration_count, server_count, participation, created_at";

impl Database {
    /// Re-declaring for the same server and period replaces the earlier score.
    pub fn upsert_declaration(
        &self,
        id: Uuid,
        server_id: Uuid,
        representative_id: Uuid,
        period: &str,
        score: u8,
        comment: Option<&str>,
    ) -> Result<CspiDeclaration> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO cspi_declarations (id, server_id, representative_id, period, score, comment)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(server_id, period) DO UPDATE SET
                     representative_id = excluded.representative_id,
                     score = excluded.score,
                     comment = excluded.comment,
                     created_at = datetime('now')",
                rusqlite::params![
                    id.to_string(),
                    server_id.to_string(),
                    representative_id.to_string(),
                    period,
                    score,
                    comment
                ],
            )?;
            let sql = format!(
                "SELECT {DECLARATION_COLUMNS} FROM cspi_declarations
                 WHERE server_id = ?1 AND period = ?2"
            );
            Ok(conn.query_row(
                &sql,
                [server_id.to_string(), period.to_string()],
                declaration_from_row,
            )?)
        })
    }

    pub fn list_declarations(&self, period: Option<&str>) -> Result<Vec<CspiDeclaration>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {DECLARATION_COLUMNS} FROM cspi_declarations
                 WHERE (?1 IS NULL OR period = ?1)
                 ORDER BY period DESC, created_at, rowid"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([period], declaration_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Recomputes the snapshot for `period`, replacing any earlier one.
    pub fn compute_snapshot(&self, id: Uuid, period: &str) -> Result<CspiSnapshot> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let (mean, declaration_count): (Option<f64>, u32) = tx.query_row(
                "SELECT AVG(d.score), COUNT(*)
                 FROM cspi_declarations d
                 JOIN servers s ON s.id = d.server_id
                 WHERE d.period = ?1 AND s.active = 1",
                [period],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            let server_count: u32 =
                tx.query_row("SELECT COUNT(*) FROM servers WHERE active = 1", [], |row| {
                    row.get(0)
                })?;

            let index_value = mean.unwrap_or(0.0);
            let participation = if server_count == 0 {
                0.0
            } else {
                f64::from(declaration_count) / f64::from(server_count)
            };

            tx.execute(
                "INSERT INTO cspi_snapshots
                     (id, period, index_value, declaration_count, server_count, participation)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(period) DO UPDATE SET
                     index_value = excluded.index_value,
                     declaration_count = excluded.declaration_count,
                     server_count = excluded.server_count,
                     participation = excluded.participation,
                     created_at = datetime('now')",
                rusqlite::params![
                    id.to_string(),
                    period,
                    index_value,
                    declaration_count,
                    server_count,
                    participation
                ],
            )?;

            let sql = format!("SELECT {SNAPSHOT_COLUMNS} FROM cspi_snapshots WHERE period = ?1");
            let snapshot = tx.query_row(&sql, [period], snapshot_from_row)?;
            tx.commit()?;

            info!(
                "CSPI snapshot {}: index {:.1} from {}/{} servers",
                period, index_value, declaration_count, server_count
            );
            Ok(snapshot)
        })
    }

    /// Newest period first.
    pub fn list_snapshots(&self) -> Result<Vec<CspiSnapshot>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {SNAPSHOT_COLUMNS} FROM cspi_snapshots ORDER BY period DESC");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], snapshot_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn latest_snapshot(&self) -> Result<Option<CspiSnapshot>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {SNAPSHOT_COLUMNS} FROM cspi_snapshots ORDER BY period DESC LIMIT 1"
            );
            Ok(conn.query_row(&sql, [], snapshot_from_row).optional()?)
        })
    }
}
