use anyhow::Result;
use assembly_types::models::{Feedback, FeedbackCategory};
use uuid::Uuid;

use crate::Database;
use crate::models::feedback_from_row;

const FEEDBACK_COLUMNS: &str = "id, author_id, server_id, category, message, created_at";

impl Database {
    pub fn insert_feedback(
        &self,
        id: Uuid,
        author_id: Uuid,
        server_id: Option<Uuid>,
        category: FeedbackCategory,
        message: &str,
    ) -> Result<Feedback> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO feedback (id, author_id, server_id, category, message)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    id.to_string(),
                    author_id.to_string(),
                    server_id.map(|s| s.to_string()),
                    category.as_str(),
                    message
                ],
            )?;
            let sql = format!("SELECT {FEEDBACK_COLUMNS} FROM feedback WHERE id = ?1");
            Ok(conn.query_row(&sql, [id.to_string()], feedback_from_row)?)
        })
    }

    /// Newest first.
    pub fn list_feedback(&self, category: Option<FeedbackCategory>) -> Result<Vec<Feedback>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {FEEDBACK_COLUMNS} FROM feedback
                 WHERE (?1 IS NULL OR category = ?1)
                 ORDER BY created_at DESC, rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([category.map(|c| c.as_str())], feedback_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assembly_types::models::Role;

    #[test]
    fn feedback_is_listed_newest_first_and_filtered() {
        let db = Database::open_in_memory().unwrap();
        let author = Uuid::new_v4();
        db.create_profile(author, "p@x.io", "P", "h", Role::Representative, false)
            .unwrap();

        db.insert_feedback(Uuid::new_v4(), author, None, FeedbackCategory::Bug, "crash on login")
            .unwrap();
        let latest = db
            .insert_feedback(Uuid::new_v4(), author, None, FeedbackCategory::General, "thanks")
            .unwrap();

        let all = db.list_feedback(None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, latest.id);

        let bugs = db.list_feedback(Some(FeedbackCategory::Bug)).unwrap();
        assert_eq!(bugs.len(), 1);
        assert_eq!(bugs[0].message, "crash on login");
    }
}
