use crate::db::Db;
use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{params, ToSql};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Hard cap on retained entries, enforced synchronously after every write.
pub const MAX_ENTRIES: u32 = 1000;

/// Default age-based retention window for [`AccessLog::prune_older_than`].
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

/// Largest page the log listing will return.
pub const MAX_PAGE_SIZE: u32 = 100;

/// What a log entry records. The set is closed; `distinct_actions` reports
/// only the tags actually present in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Enroll,
    Update,
    Search,
    Recognize,
    BatchEnroll,
    ClearAll,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Enroll => "enroll",
            Action::Update => "update",
            Action::Search => "search",
            Action::Recognize => "recognize",
            Action::BatchEnroll => "batch_enroll",
            Action::ClearAll => "clear_all",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "enroll" => Some(Action::Enroll),
            "update" => Some(Action::Update),
            "search" => Some(Action::Search),
            "recognize" => Some(Action::Recognize),
            "batch_enroll" => Some(Action::BatchEnroll),
            "clear_all" => Some(Action::ClearAll),
            _ => None,
        }
    }
}

impl ToSql for Action {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for Action {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Action::parse(s).ok_or_else(|| FromSqlError::Other(format!("unknown action {s:?}").into()))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub id: i64,
    pub face_id: Option<String>,
    pub name: Option<String>,
    pub confidence: Option<f32>,
    pub action: Action,
    pub timestamp: DateTime<Utc>,
}

/// Fields supplied by the caller when appending an entry.
#[derive(Debug, Clone, Default)]
pub struct NewEntry {
    pub face_id: Option<String>,
    pub name: Option<String>,
    pub confidence: Option<f32>,
}

#[derive(Debug)]
pub struct LogPage {
    pub entries: Vec<LogEntry>,
    pub total: u64,
    pub has_more: bool,
}

#[derive(Clone)]
pub struct AccessLog {
    db: Arc<Db>,
}

impl AccessLog {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    /// Append one entry, then enforce the count cap: everything beyond the
    /// most-recent [`MAX_ENTRIES`] by timestamp is deleted. Returns the new
    /// entry's id, which the recognition flow uses as a re-tag handle.
    pub fn record(&self, action: Action, entry: NewEntry) -> Result<i64> {
        self.write(|conn| {
            conn.execute(
                "INSERT INTO access_logs (face_id, name, confidence, action, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    entry.face_id,
                    entry.name,
                    entry.confidence.map(f64::from),
                    action,
                    Utc::now()
                ],
            )?;
            let id = conn.last_insert_rowid();
            conn.execute(
                "DELETE FROM access_logs WHERE id NOT IN (
                     SELECT id FROM access_logs
                     ORDER BY timestamp DESC, id DESC LIMIT ?1
                 )",
                params![MAX_ENTRIES],
            )?;
            Ok(id)
        })
    }

    /// Change the action tag of one existing entry. No-op if the entry was
    /// pruned in the meantime.
    pub fn retag(&self, entry_id: i64, action: Action) -> Result<()> {
        self.write(|conn| {
            conn.execute(
                "UPDATE access_logs SET action = ?1 WHERE id = ?2",
                params![action, entry_id],
            )?;
            Ok(())
        })
    }

    /// Log writes get their own error kind so the recognition flow can
    /// swallow them without masking real store failures on the read path.
    fn write<T>(&self, f: impl FnOnce(&rusqlite::Connection) -> rusqlite::Result<T>) -> Result<T> {
        self.db.with(f).map_err(|e| match e {
            Error::Store(msg) => Error::LogWrite(msg),
            other => other,
        })
    }

    /// Age-based retention, independent of the count cap. Idempotent; meant
    /// to be invoked by an external periodic trigger. Returns entries deleted.
    pub fn prune_older_than(&self, age: Duration) -> Result<u64> {
        let cutoff = Utc::now() - age;
        self.db.with(|conn| {
            let deleted = conn.execute(
                "DELETE FROM access_logs WHERE timestamp < ?1",
                params![cutoff],
            )?;
            Ok(deleted as u64)
        })
    }

    /// One page of entries, newest first, optionally filtered by action.
    /// `limit` is clamped to [`MAX_PAGE_SIZE`].
    pub fn list(&self, action: Option<Action>, limit: u32, offset: u32) -> Result<LogPage> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        self.db.with(|conn| {
            let total: i64 = match action {
                Some(a) => conn.query_row(
                    "SELECT COUNT(*) FROM access_logs WHERE action = ?1",
                    params![a],
                    |row| row.get(0),
                )?,
                None => {
                    conn.query_row("SELECT COUNT(*) FROM access_logs", [], |row| row.get(0))?
                }
            };

            let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<LogEntry> {
                Ok(LogEntry {
                    id: row.get(0)?,
                    face_id: row.get(1)?,
                    name: row.get(2)?,
                    confidence: row.get::<_, Option<f64>>(3)?.map(|c| c as f32),
                    action: row.get(4)?,
                    timestamp: row.get(5)?,
                })
            };

            let entries: Vec<LogEntry> = match action {
                Some(a) => {
                    let mut stmt = conn.prepare(
                        "SELECT id, face_id, name, confidence, action, timestamp
                         FROM access_logs WHERE action = ?1
                         ORDER BY timestamp DESC, id DESC LIMIT ?2 OFFSET ?3",
                    )?;
                    let rows = stmt.query_map(params![a, limit, offset], map_row)?;
                    rows.collect::<rusqlite::Result<_>>()?
                }
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT id, face_id, name, confidence, action, timestamp
                         FROM access_logs
                         ORDER BY timestamp DESC, id DESC LIMIT ?1 OFFSET ?2",
                    )?;
                    let rows = stmt.query_map(params![limit, offset], map_row)?;
                    rows.collect::<rusqlite::Result<_>>()?
                }
            };

            let total = total as u64;
            let has_more = u64::from(offset) + (entries.len() as u64) < total;
            Ok(LogPage {
                entries,
                total,
                has_more,
            })
        })
    }

    /// The `limit` newest entries, unfiltered.
    pub fn recent(&self, limit: u32) -> Result<Vec<LogEntry>> {
        Ok(self.list(None, limit, 0)?.entries)
    }

    /// Action tags actually present in the table, ascending.
    pub fn distinct_actions(&self) -> Result<Vec<Action>> {
        self.db.with(|conn| {
            let mut stmt =
                conn.prepare("SELECT DISTINCT action FROM access_logs ORDER BY action ASC")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect()
        })
    }

    pub fn count(&self) -> Result<u64> {
        self.db
            .with(|conn| {
                conn.query_row("SELECT COUNT(*) FROM access_logs", [], |row| {
                    row.get::<_, i64>(0)
                })
            })
            .map(|n| n as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audit() -> AccessLog {
        AccessLog::new(Arc::new(Db::open_in_memory().unwrap()))
    }

    #[test]
    fn record_returns_sequential_handles() {
        let audit = audit();
        let a = audit.record(Action::Search, NewEntry::default()).unwrap();
        let b = audit.record(Action::Search, NewEntry::default()).unwrap();
        assert!(b > a);
    }

    #[test]
    fn count_cap_keeps_most_recent_thousand() {
        let audit = audit();
        let mut first_id = None;
        for _ in 0..(MAX_ENTRIES + 1) {
            let id = audit.record(Action::Search, NewEntry::default()).unwrap();
            first_id.get_or_insert(id);
        }
        assert_eq!(audit.count().unwrap(), u64::from(MAX_ENTRIES));

        // The oldest entry is the one that fell off.
        let page = audit.list(None, MAX_PAGE_SIZE, MAX_ENTRIES - MAX_PAGE_SIZE).unwrap();
        let oldest_kept = page.entries.last().unwrap().id;
        assert!(oldest_kept > first_id.unwrap());
    }

    #[test]
    fn retag_changes_only_the_target_entry() {
        let audit = audit();
        let first = audit.record(Action::Search, NewEntry::default()).unwrap();
        let second = audit.record(Action::Search, NewEntry::default()).unwrap();
        audit.retag(second, Action::Recognize).unwrap();

        let page = audit.list(None, 10, 0).unwrap();
        let get = |id| page.entries.iter().find(|e| e.id == id).unwrap().action;
        assert_eq!(get(first), Action::Search);
        assert_eq!(get(second), Action::Recognize);
    }

    #[test]
    fn prune_older_than_deletes_only_stale_entries() {
        let db = Arc::new(Db::open_in_memory().unwrap());
        let audit = AccessLog::new(db.clone());
        audit.record(Action::Search, NewEntry::default()).unwrap();
        // Backdate one entry past the retention window.
        db.with(|conn| {
            conn.execute(
                "INSERT INTO access_logs (action, timestamp) VALUES ('search', ?1)",
                params![Utc::now() - Duration::days(31)],
            )
        })
        .unwrap();

        let deleted = audit.prune_older_than(Duration::days(DEFAULT_RETENTION_DAYS)).unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(audit.count().unwrap(), 1);
        // Re-running deletes nothing.
        assert_eq!(
            audit.prune_older_than(Duration::days(DEFAULT_RETENTION_DAYS)).unwrap(),
            0
        );
    }

    #[test]
    fn list_paginates_and_reports_has_more() {
        let audit = audit();
        for _ in 0..5 {
            audit.record(Action::Search, NewEntry::default()).unwrap();
        }
        let page = audit.list(None, 2, 0).unwrap();
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.total, 5);
        assert!(page.has_more);
        // Newest first.
        assert!(page.entries[0].id > page.entries[1].id);

        let last = audit.list(None, 2, 4).unwrap();
        assert_eq!(last.entries.len(), 1);
        assert!(!last.has_more);
    }

    #[test]
    fn list_filters_by_action() {
        let audit = audit();
        audit.record(Action::Enroll, NewEntry::default()).unwrap();
        audit.record(Action::Search, NewEntry::default()).unwrap();
        audit.record(Action::Search, NewEntry::default()).unwrap();

        let page = audit.list(Some(Action::Search), 10, 0).unwrap();
        assert_eq!(page.total, 2);
        assert!(page.entries.iter().all(|e| e.action == Action::Search));
    }

    #[test]
    fn limit_is_clamped_to_max_page_size() {
        let audit = audit();
        for _ in 0..3 {
            audit.record(Action::Search, NewEntry::default()).unwrap();
        }
        let page = audit.list(None, 10_000, 0).unwrap();
        assert_eq!(page.entries.len(), 3);
    }

    #[test]
    fn distinct_actions_reflects_present_tags_only() {
        let audit = audit();
        assert!(audit.distinct_actions().unwrap().is_empty());
        audit.record(Action::Search, NewEntry::default()).unwrap();
        audit.record(Action::Enroll, NewEntry::default()).unwrap();
        audit.record(Action::Search, NewEntry::default()).unwrap();
        assert_eq!(
            audit.distinct_actions().unwrap(),
            vec![Action::Enroll, Action::Search]
        );
    }

    #[test]
    fn entry_fields_round_trip() {
        let audit = audit();
        audit
            .record(
                Action::Recognize,
                NewEntry {
                    face_id: Some("face-1".into()),
                    name: Some("alice".into()),
                    confidence: Some(0.97),
                },
            )
            .unwrap();
        let entry = &audit.recent(1).unwrap()[0];
        assert_eq!(entry.face_id.as_deref(), Some("face-1"));
        assert_eq!(entry.name.as_deref(), Some("alice"));
        assert!((entry.confidence.unwrap() - 0.97).abs() < 1e-6);
        assert_eq!(entry.action, Action::Recognize);
    }
}
