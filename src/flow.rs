use crate::access_log::{AccessLog, Action, NewEntry};
use crate::error::Result;
use crate::matcher::{self, MatchResult};
use crate::store::FaceStore;
use log::warn;
use serde::{Deserialize, Serialize};

/// Composes the matcher and the access log. Every audit write here is
/// best-effort: a failed log write is reported and swallowed so the primary
/// operation still succeeds.
#[derive(Clone)]
pub struct Recognizer {
    store: FaceStore,
    audit: AccessLog,
}

#[derive(Debug, Serialize)]
pub struct EnrollOutcome {
    pub id: String,
    pub name: String,
    pub updated: bool,
}

/// One entry of a batch enrollment request. Fields are optional so a
/// malformed entry fails on its own instead of rejecting the whole payload.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchFace {
    pub name: Option<String>,
    pub vector: Option<Vec<f32>>,
}

#[derive(Debug, Serialize)]
pub struct BatchItemError {
    pub index: usize,
    pub name: Option<String>,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct BatchOutcome {
    pub imported: usize,
    pub updated: usize,
    pub failed: usize,
    pub errors: Vec<BatchItemError>,
}

impl Recognizer {
    pub fn new(store: FaceStore, audit: AccessLog) -> Self {
        Self { store, audit }
    }

    /// Passive comparison: find the best candidate and record a `search`
    /// entry, match or not, so the audit trail stays complete.
    pub fn search(&self, query: &[f32], threshold: f32) -> Result<MatchResult> {
        let result = matcher::find_best(&self.store, query, threshold)?;
        self.log_match(&result);
        Ok(result)
    }

    /// Like [`search`](Self::search), but when the result crosses the
    /// threshold the just-written entry is re-tagged to `recognize`. The
    /// entry handle returned by `record` pins the re-tag to the right row
    /// even under concurrent recognitions of the same identity.
    pub fn recognize(&self, query: &[f32], threshold: f32) -> Result<MatchResult> {
        let result = matcher::find_best(&self.store, query, threshold)?;
        let entry_id = self.log_match(&result);
        if result.matched {
            if let Some(id) = entry_id {
                if let Err(e) = self.audit.retag(id, Action::Recognize) {
                    warn!("failed to re-tag log entry {id} as recognize: {e}");
                }
            }
        }
        Ok(result)
    }

    pub fn enroll(&self, name: &str, embedding: &[f32]) -> Result<EnrollOutcome> {
        let (id, updated) = self.store.enroll(name, embedding)?;
        let action = if updated { Action::Update } else { Action::Enroll };
        self.log_best_effort(
            action,
            NewEntry {
                face_id: Some(id.clone()),
                name: Some(name.trim().to_string()),
                confidence: None,
            },
        );
        Ok(EnrollOutcome {
            id,
            name: name.trim().to_string(),
            updated,
        })
    }

    /// Enroll each entry independently; one bad entry never aborts the rest.
    /// Writes a single aggregate `batch_enroll` audit entry.
    pub fn batch_enroll(&self, faces: &[BatchFace]) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome {
            imported: 0,
            updated: 0,
            failed: 0,
            errors: Vec::new(),
        };

        for (index, face) in faces.iter().enumerate() {
            let result = match (&face.name, &face.vector) {
                (None, _) => Err("name is required".to_string()),
                (_, None) => Err("vector is required".to_string()),
                (Some(name), Some(embedding)) => self
                    .store
                    .enroll(name, embedding)
                    .map_err(|e| e.to_string()),
            };
            match result {
                Ok((_, true)) => outcome.updated += 1,
                Ok((_, false)) => outcome.imported += 1,
                Err(error) => {
                    outcome.failed += 1;
                    outcome.errors.push(BatchItemError {
                        index,
                        name: face.name.clone(),
                        error,
                    });
                }
            }
        }

        self.log_best_effort(Action::BatchEnroll, NewEntry::default());
        Ok(outcome)
    }

    /// Wipe faces and logs, then leave the single `clear_all` audit entry.
    pub fn clear_all(&self) -> Result<(u64, u64)> {
        let counts = self.store.clear_all()?;
        self.log_best_effort(Action::ClearAll, NewEntry::default());
        Ok(counts)
    }

    fn log_match(&self, result: &MatchResult) -> Option<i64> {
        self.log_best_effort(
            Action::Search,
            NewEntry {
                face_id: result.id.clone(),
                name: result.id.is_some().then(|| result.name.clone()),
                confidence: Some(result.confidence),
            },
        )
    }

    fn log_best_effort(&self, action: Action, entry: NewEntry) -> Option<i64> {
        match self.audit.record(action, entry) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("access log write failed for {}: {e}", action.as_str());
                None
            }
        }
    }
}
