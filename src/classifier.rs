use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::analyzer::FaceAnalyzer;
use crate::embedding::{Embedding, Label};
use crate::error::Result;
use crate::matcher;
use crate::reference::ReferenceDatabase;

/// Labels recognised in one photo.
pub type PhotoLabelSet = BTreeSet<Label>;

/// Matches every face embedding of a photo and collects the accepted labels.
/// A photo without faces yields an empty set.
pub fn classify(
    embeddings: &[Embedding],
    db: &ReferenceDatabase,
    threshold: f32,
) -> Result<PhotoLabelSet> {
    let mut labels = PhotoLabelSet::new();
    for embedding in embeddings {
        if let Some(label) = matcher::match_embedding(embedding, db, threshold)?.label {
            labels.insert(label);
        }
    }
    Ok(labels)
}

/// A shared reference database paired with the acceptance threshold.
#[derive(Debug, Clone)]
pub struct PhotoClassifier {
    db: Arc<ReferenceDatabase>,
    threshold: f32,
}

impl PhotoClassifier {
    pub fn new(db: Arc<ReferenceDatabase>, threshold: f32) -> Self {
        Self { db, threshold }
    }

    pub fn database(&self) -> &ReferenceDatabase {
        &self.db
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn classify(&self, embeddings: &[Embedding]) -> Result<PhotoLabelSet> {
        classify(embeddings, &self.db, self.threshold)
    }

    /// Runs `analyzer` on the photo at `path` and classifies its faces.
    ///
    /// A photo the analyzer cannot handle is logged and yields an empty set.
    pub fn process_photo(
        &self,
        path: &Path,
        analyzer: &mut dyn FaceAnalyzer,
    ) -> Result<PhotoLabelSet> {
        info!("Processing: {}", path.display());
        let faces = match analyzer.analyze(path) {
            Ok(faces) => faces,
            Err(e) => {
                warn!("Skipping {}: {:#}", path.display(), e);
                return Ok(PhotoLabelSet::new());
            }
        };
        if faces.is_empty() {
            info!("No faces detected in {}", path.display());
            return Ok(PhotoLabelSet::new());
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        for (i, face) in faces.iter().enumerate() {
            if log::log_enabled!(log::Level::Debug) {
                for (label, score) in matcher::label_scores(face, &self.db)? {
                    debug!("face #{} - {}: max similarity = {:.4}", i, label, score);
                }
            }
            if log::log_enabled!(log::Level::Info) {
                let result = matcher::match_embedding(face, &self.db, self.threshold)?;
                info!(
                    "{} - face #{}: {} (score={:.4})",
                    name,
                    i,
                    result.label.as_deref().unwrap_or("unknown"),
                    result.score
                );
            }
        }
        self.classify(&faces)
    }
}
