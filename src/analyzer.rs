use std::path::Path;

use facesort_vision::Pipeline;

use crate::embedding::Embedding;

/// Turns an image file into face embeddings.
///
/// This is the seam between the matching core and the detection model: the
/// model is initialised once by the caller and passed in explicitly.
pub trait FaceAnalyzer {
    /// Embeddings for every face found in the image at `path`, in detection
    /// order. An image without faces yields an empty vector.
    fn analyze(&mut self, path: &Path) -> anyhow::Result<Vec<Embedding>>;
}

impl FaceAnalyzer for Pipeline {
    fn analyze(&mut self, path: &Path) -> anyhow::Result<Vec<Embedding>> {
        self.analyze_path(path)?
            .into_iter()
            .map(|v| Ok(Embedding::new(v)?))
            .collect()
    }
}
