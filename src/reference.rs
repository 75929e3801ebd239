//! Per-label reference embeddings.
//!
//! A [`ReferenceDatabase`] is built once, through [`ReferenceDatabaseBuilder`]
//! or [`ReferenceDatabase::from_corpus`], and is read-only afterwards. Every
//! label it holds has at least one reference embedding and all embeddings
//! share one dimensionality.

use std::collections::BTreeMap;
use std::path::Path;

use log::{debug, info, warn};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::analyzer::FaceAnalyzer;
use crate::corpus::LabelImages;
use crate::embedding::{self, Embedding, Label};
use crate::error::{Error, Result};

/// The reference matrix of one label, rows in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct References {
    matrix: Array2<f32>,
    norms: Array1<f64>,
}

impl References {
    fn new(matrix: Array2<f32>) -> Self {
        let norms = matrix.map_axis(Axis(1), |row| embedding::dot(row, row).sqrt());
        Self { matrix, norms }
    }

    pub fn matrix(&self) -> ArrayView2<'_, f32> {
        self.matrix.view()
    }

    /// L2 norm of every row.
    pub fn norms(&self) -> ArrayView1<'_, f64> {
        self.norms.view()
    }

    pub fn len(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceDatabase {
    entries: BTreeMap<Label, References>,
    dim: Option<usize>,
}

impl ReferenceDatabase {
    pub fn builder() -> ReferenceDatabaseBuilder {
        ReferenceDatabaseBuilder::default()
    }

    /// Builds the database by running `analyzer` over every reference image.
    ///
    /// Only the first face detected in a reference image is kept. Images that
    /// fail to load or contain no face are skipped, and a label left without
    /// any embedding is omitted; both are reported as warnings.
    pub fn from_corpus(
        corpus: &[LabelImages],
        analyzer: &mut dyn FaceAnalyzer,
    ) -> Result<Self> {
        let mut builder = Self::builder();
        for entry in corpus {
            info!("Processing reference label: {}", entry.label);
            let embeddings: Vec<Embedding> = entry
                .images
                .iter()
                .filter_map(|img| first_face(analyzer, img))
                .collect();
            let count = embeddings.len();
            if builder.add(entry.label.clone(), embeddings)? && count > 0 {
                info!("Added {} embedding(s) for {}", count, entry.label);
            }
        }
        Ok(builder.build())
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys().map(String::as_str)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.entries.contains_key(label)
    }

    /// Reference embeddings of `label` in insertion order.
    pub fn embeddings_for(&self, label: &str) -> Option<Vec<Embedding>> {
        let refs = self.entries.get(label)?;
        refs.matrix
            .rows()
            .into_iter()
            .map(|row| Embedding::new(row.to_vec()).ok())
            .collect()
    }

    pub fn references(&self, label: &str) -> Option<&References> {
        self.entries.get(label)
    }

    /// Labels with their references, in lexicographic label order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &References)> + '_ {
        self.entries.iter().map(|(l, r)| (l.as_str(), r))
    }

    /// Embedding dimensionality, `None` while the database is empty.
    pub fn dimension(&self) -> Option<usize> {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn log_summary(&self) {
        info!("=== REFERENCE DATABASE ===");
        for (label, refs) in self.iter() {
            info!("Label: {}, Number of references: {}", label, refs.len());
        }
        if self.is_empty() {
            warn!("reference database is empty; no photo will match");
        }
    }
}

fn first_face(analyzer: &mut dyn FaceAnalyzer, img: &Path) -> Option<Embedding> {
    match analyzer.analyze(img) {
        Ok(faces) if faces.is_empty() => {
            warn!("No faces detected in reference image: {}", img.display());
            None
        }
        Ok(faces) => {
            debug!("Found {} face(s) in {}", faces.len(), img.display());
            faces.into_iter().next()
        }
        Err(e) => {
            warn!("Could not use reference image {}: {:#}", img.display(), e);
            None
        }
    }
}

#[derive(Debug, Default)]
pub struct ReferenceDatabaseBuilder {
    entries: BTreeMap<Label, Vec<Embedding>>,
    dim: Option<usize>,
}

impl ReferenceDatabaseBuilder {
    /// Adds reference embeddings for `label`, appending to any already added.
    ///
    /// Returns `Ok(false)` when `embeddings` is empty and the label was not
    /// already present: the label is skipped with a warning.
    pub fn add(
        &mut self,
        label: impl Into<Label>,
        embeddings: impl IntoIterator<Item = Embedding>,
    ) -> Result<bool> {
        let label = label.into();
        let embeddings: Vec<Embedding> = embeddings.into_iter().collect();

        let dim = self.dim.or_else(|| embeddings.first().map(Embedding::dim));
        if let Some(expected) = dim {
            if let Some(e) = embeddings.iter().find(|e| e.dim() != expected) {
                return Err(Error::DimensionMismatch {
                    expected,
                    actual: e.dim(),
                });
            }
        }

        if embeddings.is_empty() {
            if self.entries.contains_key(&label) {
                return Ok(true);
            }
            warn!("No valid embeddings found for {}, label skipped", label);
            return Ok(false);
        }

        self.dim = dim;
        self.entries.entry(label).or_default().extend(embeddings);
        Ok(true)
    }

    pub fn build(self) -> ReferenceDatabase {
        let Some(dim) = self.dim.filter(|_| !self.entries.is_empty()) else {
            return ReferenceDatabase::default();
        };

        let entries = self
            .entries
            .into_iter()
            .map(|(label, embs)| {
                let matrix = Array2::from_shape_fn((embs.len(), dim), |(r, c)| embs[r].view()[c]);
                (label, References::new(matrix))
            })
            .collect();

        ReferenceDatabase {
            entries,
            dim: Some(dim),
        }
    }
}
