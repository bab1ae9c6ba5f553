//! Cosine similarity engine.
//!
//! Shared by query-to-corpus search (in-memory backends) and
//! fragment-to-fragment comparisons. Both functions are pure and safe to call
//! from any number of tasks concurrently.

use std::cmp::Ordering;

use crate::error::{Error, Result};

/// Cosine similarity between two vectors, in `[-1, 1]`.
///
/// Returns [`Error::DimensionMismatch`] when the lengths differ. When either
/// vector has zero magnitude the result is `0.0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(Error::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    Ok(similarity.clamp(-1.0, 1.0) as f32)
}

/// Rank candidates against a query vector.
///
/// Keeps candidates whose similarity is strictly above `threshold` (pass
/// `f32::NEG_INFINITY` to keep everything), sorted by descending similarity
/// and truncated to `top_k`. Ties keep the candidates' input order.
pub fn rank_by_similarity<'a, T, I>(
    query: &[f32],
    candidates: I,
    top_k: usize,
    threshold: f32,
) -> Result<Vec<(T, f32)>>
where
    I: IntoIterator<Item = (T, &'a [f32])>,
{
    let mut scored = Vec::new();
    for (item, vector) in candidates {
        let similarity = cosine_similarity(query, vector)?;
        if similarity > threshold {
            scored.push((item, similarity));
        }
    }

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored.truncate(top_k);
    Ok(scored)
}
