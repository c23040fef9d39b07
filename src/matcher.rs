use crate::error::Result;
use crate::store::FaceStore;
use crate::vector;
use serde::Serialize;

/// Default minimum confidence for a match to count.
pub const DEFAULT_THRESHOLD: f32 = 0.9;

/// Outcome of one query against the store. Ephemeral, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    pub id: Option<String>,
    pub name: String,
    pub confidence: f32,
    pub threshold: f32,
    #[serde(rename = "match")]
    pub matched: bool,
}

impl MatchResult {
    fn unknown(threshold: f32) -> Self {
        Self {
            id: None,
            name: "Unknown".to_string(),
            confidence: 0.0,
            threshold,
            matched: false,
        }
    }
}

/// Linear scan over every stored face. Strictly-greater comparison on the
/// running maximum, so the first record (name order) to reach the best score
/// wins ties. O(n * d); fine while the enrolled population stays small.
pub fn find_best(store: &FaceStore, query: &[f32], threshold: f32) -> Result<MatchResult> {
    vector::validate_embedding("vector", query)?;

    let records = store.list_all()?;
    let mut best: Option<(usize, f32)> = None;
    for (i, record) in records.iter().enumerate() {
        let score = vector::cosine_similarity(query, &record.vector);
        match best {
            Some((_, top)) if top >= score => {}
            _ => best = Some((i, score)),
        }
    }

    match best {
        Some((i, score)) if score > 0.0 => {
            let record = &records[i];
            Ok(MatchResult {
                id: Some(record.id.clone()),
                name: record.name.clone(),
                confidence: score,
                threshold,
                matched: score >= threshold,
            })
        }
        // Empty store, or nothing with positive similarity.
        _ => Ok(MatchResult::unknown(threshold)),
    }
}
