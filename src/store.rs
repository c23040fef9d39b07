use crate::db::Db;
use crate::error::{Error, Result};
use crate::vector;
use chrono::{DateTime, Utc};
use log::warn;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One enrolled identity. `name` is the identity key: trimmed, case-sensitive,
/// unique across all records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceRecord {
    pub id: String,
    pub name: String,
    pub vector: Vec<f32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A record without its vector, for listings where the payload matters.
#[derive(Debug, Clone, Serialize)]
pub struct FaceSummary {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Full dump of the store, tagged for downstream consumers.
#[derive(Debug, Serialize)]
pub struct FaceExport {
    pub format: &'static str,
    pub version: &'static str,
    pub exported_at: DateTime<Utc>,
    pub count: usize,
    pub faces: Vec<FaceRecord>,
}

pub const EXPORT_FORMAT: &str = "LBP-256";
pub const EXPORT_VERSION: &str = "1.0";

#[derive(Clone)]
pub struct FaceStore {
    db: Arc<Db>,
}

impl FaceStore {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    /// Insert a new record for `name`, or replace the vector of an existing
    /// one. Returns the record id and whether this was an update.
    ///
    /// The existence check and the write are separate statements; two
    /// concurrent enrolls of the same name can race. Accepted weak point.
    pub fn enroll(&self, name: &str, embedding: &[f32]) -> Result<(String, bool)> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("name must not be empty"));
        }
        vector::validate_embedding("vector", embedding)?;

        let encoded = serde_json::to_string(embedding)
            .map_err(|e| Error::Store(format!("encoding vector: {e}")))?;
        let now = Utc::now();

        let existing: Option<String> = self.db.with(|conn| {
            conn.query_row(
                "SELECT id FROM faces WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
        })?;

        match existing {
            Some(id) => {
                self.db.with(|conn| {
                    conn.execute(
                        "UPDATE faces SET vector = ?1, updated_at = ?2 WHERE id = ?3",
                        params![encoded, now, id],
                    )
                })?;
                Ok((id, true))
            }
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                self.db.with(|conn| {
                    conn.execute(
                        "INSERT INTO faces (id, name, vector, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![id, name, encoded, now, now],
                    )
                })?;
                Ok((id, false))
            }
        }
    }

    /// Every record, sorted by name ascending. A row whose stored vector no
    /// longer parses is skipped with a warning rather than failing the scan.
    pub fn list_all(&self) -> Result<Vec<FaceRecord>> {
        let rows: Vec<(String, String, String, DateTime<Utc>, DateTime<Utc>)> =
            self.db.with(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, vector, created_at, updated_at
                     FROM faces ORDER BY name ASC",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                })?;
                rows.collect()
            })?;

        let mut records = Vec::with_capacity(rows.len());
        for (id, name, encoded, created_at, updated_at) in rows {
            match serde_json::from_str::<Vec<f32>>(&encoded) {
                Ok(embedding) => records.push(FaceRecord {
                    id,
                    name,
                    vector: embedding,
                    created_at,
                    updated_at,
                }),
                Err(e) => warn!("skipping face {id} ({name}): stored vector is corrupt: {e}"),
            }
        }
        Ok(records)
    }

    /// The `limit` most recently created records, newest first, no vectors.
    pub fn recent(&self, limit: u32) -> Result<Vec<FaceSummary>> {
        self.db.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, created_at, updated_at
                 FROM faces ORDER BY created_at DESC, name ASC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], |row| {
                Ok(FaceSummary {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: row.get(2)?,
                    updated_at: row.get(3)?,
                })
            })?;
            rows.collect()
        })
    }

    pub fn count(&self) -> Result<u64> {
        self.db
            .with(|conn| conn.query_row("SELECT COUNT(*) FROM faces", [], |row| row.get::<_, i64>(0)))
            .map(|n| n as u64)
    }

    /// Delete every face and every access log entry in one transaction.
    /// Returns (faces_deleted, logs_deleted).
    pub fn clear_all(&self) -> Result<(u64, u64)> {
        self.db.with(|conn| {
            let tx = conn.unchecked_transaction()?;
            let faces = tx.execute("DELETE FROM faces", [])?;
            let logs = tx.execute("DELETE FROM access_logs", [])?;
            tx.commit()?;
            Ok((faces as u64, logs as u64))
        })
    }

    pub fn export_all(&self) -> Result<FaceExport> {
        let faces = self.list_all()?;
        Ok(FaceExport {
            format: EXPORT_FORMAT,
            version: EXPORT_VERSION,
            exported_at: Utc::now(),
            count: faces.len(),
            faces,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::EMBEDDING_DIM;

    fn store() -> FaceStore {
        FaceStore::new(Arc::new(Db::open_in_memory().unwrap()))
    }

    fn embedding(seed: f32) -> Vec<f32> {
        (0..EMBEDDING_DIM).map(|i| seed + i as f32 * 0.01).collect()
    }

    #[test]
    fn enroll_then_reenroll_keeps_one_record() {
        let store = store();
        let (id1, updated1) = store.enroll("alice", &embedding(1.0)).unwrap();
        assert!(!updated1);

        let (id2, updated2) = store.enroll("alice", &embedding(2.0)).unwrap();
        assert!(updated2);
        assert_eq!(id1, id2);

        let all = store.list_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].vector, embedding(2.0));
        assert!(all[0].updated_at >= all[0].created_at);
    }

    #[test]
    fn names_are_trimmed_and_case_sensitive() {
        let store = store();
        let (id1, _) = store.enroll("  bob  ", &embedding(0.5)).unwrap();
        let (id2, updated) = store.enroll("bob", &embedding(0.6)).unwrap();
        assert_eq!(id1, id2);
        assert!(updated);

        let (id3, updated) = store.enroll("Bob", &embedding(0.7)).unwrap();
        assert_ne!(id1, id3);
        assert!(!updated);
    }

    #[test]
    fn enroll_rejects_bad_input_without_partial_write() {
        let store = store();
        assert!(matches!(
            store.enroll("   ", &embedding(1.0)),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            store.enroll("carol", &[1.0, 2.0]),
            Err(Error::Validation(_))
        ));
        let mut bad = embedding(1.0);
        bad[0] = f32::NAN;
        assert!(matches!(store.enroll("carol", &bad), Err(Error::Validation(_))));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn list_all_sorts_by_name() {
        let store = store();
        store.enroll("zoe", &embedding(1.0)).unwrap();
        store.enroll("abe", &embedding(2.0)).unwrap();
        store.enroll("mia", &embedding(3.0)).unwrap();
        let names: Vec<_> = store.list_all().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["abe", "mia", "zoe"]);
    }

    #[test]
    fn corrupt_vector_rows_are_skipped() {
        let db = Arc::new(Db::open_in_memory().unwrap());
        let store = FaceStore::new(db.clone());
        store.enroll("good", &embedding(1.0)).unwrap();
        db.with(|conn| {
            conn.execute(
                "INSERT INTO faces (id, name, vector, created_at, updated_at)
                 VALUES ('bad-id', 'bad', 'not json', ?1, ?1)",
                params![Utc::now()],
            )
        })
        .unwrap();

        let all = store.list_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "good");
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn clear_all_empties_both_tables() {
        let db = Arc::new(Db::open_in_memory().unwrap());
        let store = FaceStore::new(db.clone());
        store.enroll("alice", &embedding(1.0)).unwrap();
        store.enroll("bob", &embedding(2.0)).unwrap();
        db.with(|conn| {
            conn.execute(
                "INSERT INTO access_logs (action, timestamp) VALUES ('search', ?1)",
                params![Utc::now()],
            )
        })
        .unwrap();

        let (faces, logs) = store.clear_all().unwrap();
        assert_eq!((faces, logs), (2, 1));
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn export_tags_format_and_version() {
        let store = store();
        store.enroll("alice", &embedding(1.0)).unwrap();
        let export = store.export_all().unwrap();
        assert_eq!(export.format, "LBP-256");
        assert_eq!(export.version, "1.0");
        assert_eq!(export.count, 1);
        assert_eq!(export.faces[0].vector.len(), EMBEDDING_DIM);
    }
}
