//! Nearest-neighbour matching of a query embedding against the reference
//! database.
//!
//! A label's score is the best cosine similarity between the query and any of
//! its references (max-pooling). The label with the highest score wins; ties
//! go to the label that sorts first. A winning score below the threshold is
//! reported as "no match", still carrying the score.

use ndarray::ArrayView1;

use crate::embedding::{self, Embedding, Label};
use crate::error::{Error, Result};
use crate::reference::{ReferenceDatabase, References};

/// Similarity reported when the database has no labels at all.
pub const NO_REFERENCE_SCORE: f32 = -1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// `None` when the query is unknown.
    pub label: Option<Label>,
    pub score: f32,
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        self.label.is_some()
    }
}

/// Cosine similarity in `[-1, 1]`; 0 when either vector has zero length.
///
/// Accumulates in `f64`, so very large or very small finite components still
/// give the exact direction.
pub fn cosine_similarity(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    similarity(
        embedding::dot(a, b),
        embedding::dot(a, a).sqrt(),
        embedding::dot(b, b).sqrt(),
    )
}

fn similarity(dot: f64, norm_a: f64, norm_b: f64) -> f32 {
    let sim = dot / norm_a / norm_b;
    if sim.is_finite() {
        sim.clamp(-1.0, 1.0) as f32
    } else {
        0.0
    }
}

fn label_score(query: ArrayView1<'_, f32>, query_norm: f64, refs: &References) -> f32 {
    refs.matrix()
        .rows()
        .into_iter()
        .zip(refs.norms())
        .map(|(row, &norm)| similarity(embedding::dot(row, query), norm, query_norm))
        .fold(f32::NEG_INFINITY, f32::max)
}

fn check_dimension(query: &Embedding, db: &ReferenceDatabase) -> Result<()> {
    match db.dimension() {
        Some(expected) if expected != query.dim() => Err(Error::DimensionMismatch {
            expected,
            actual: query.dim(),
        }),
        _ => Ok(()),
    }
}

/// Max-pooled score of every label, in label order.
pub fn label_scores<'a>(
    query: &Embedding,
    db: &'a ReferenceDatabase,
) -> Result<Vec<(&'a str, f32)>> {
    check_dimension(query, db)?;
    let norm = query.norm();
    Ok(db
        .iter()
        .map(|(label, refs)| (label, label_score(query.view(), norm, refs)))
        .collect())
}

/// Finds the best-matching label for `query`.
///
/// Fails only when the query's dimensionality differs from the database's.
pub fn match_embedding(
    query: &Embedding,
    db: &ReferenceDatabase,
    threshold: f32,
) -> Result<MatchResult> {
    let mut best: Option<(&str, f32)> = None;
    for (label, score) in label_scores(query, db)? {
        if best.map_or(true, |(_, b)| score > b) {
            best = Some((label, score));
        }
    }

    Ok(match best {
        None => MatchResult {
            label: None,
            score: NO_REFERENCE_SCORE,
        },
        Some((_, score)) if score < threshold => MatchResult { label: None, score },
        Some((label, score)) => MatchResult {
            label: Some(label.to_string()),
            score,
        },
    })
}
