use crate::error::{Error, Result};

/// Fixed dimension of every face embedding handled by this service.
pub const EMBEDDING_DIM: usize = 256;

/// Cosine similarity between two embeddings, clamped to [-1, 1].
///
/// Returns exactly 0.0 when either slice is empty, the lengths differ, or
/// either norm is zero, so callers never divide by zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    // Simple loop that LLVM can auto-vectorize
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

/// Check that `v` is a well-formed embedding: exactly [`EMBEDDING_DIM`]
/// finite elements. `field` names the offending input in the error message.
pub fn validate_embedding(field: &str, v: &[f32]) -> Result<()> {
    if v.len() != EMBEDDING_DIM {
        return Err(Error::Validation(format!(
            "{field} must contain exactly {EMBEDDING_DIM} elements, got {}",
            v.len()
        )));
    }
    if v.iter().any(|x| !x.is_finite()) {
        return Err(Error::Validation(format!(
            "{field} contains a non-finite value"
        )));
    }
    Ok(())
}
