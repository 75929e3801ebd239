use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::classifier::PhotoLabelSet;
use crate::embedding;

/// Copies photos into one folder per recognised label.
#[derive(Debug, Clone)]
pub struct OutputRouter {
    root: PathBuf,
}

impl OutputRouter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder of `label` directly under the root. Labels that are not a
    /// single plain path component are refused.
    pub fn label_dir(&self, label: &str) -> Result<PathBuf> {
        embedding::check_label(label)?;
        Ok(self.root.join(label))
    }

    /// Creates `root/<label>` for every label.
    pub fn create_label_dirs<'a>(
        &self,
        labels: impl IntoIterator<Item = &'a str>,
    ) -> Result<Vec<PathBuf>> {
        log::info!("Creating output folders in: {}", self.root.display());
        labels
            .into_iter()
            .map(|label| {
                let dir = self.label_dir(label)?;
                std::fs::create_dir_all(&dir)
                    .with_context(|| format!("creating {}", dir.display()))?;
                log::debug!("Created output folder: {}", dir.display());
                Ok(dir)
            })
            .collect()
    }

    /// Copies `photo` into the folder of `label`, replacing a file of the same name.
    pub fn copy_to_label(&self, photo: &Path, label: &str) -> Result<PathBuf> {
        let name = photo
            .file_name()
            .with_context(|| format!("{} has no file name", photo.display()))?;
        let dir = self.label_dir(label)?;
        std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        let dest = dir.join(name);
        std::fs::copy(photo, &dest)
            .with_context(|| format!("copying {} to {}", photo.display(), dest.display()))?;
        log::info!("Copied {} to {}", photo.display(), dest.display());
        Ok(dest)
    }

    /// Copies `photo` once per label in `labels` and returns the copies made.
    ///
    /// A failed copy is logged and does not stop the remaining labels.
    pub fn route(&self, photo: &Path, labels: &PhotoLabelSet) -> Vec<PathBuf> {
        labels
            .iter()
            .filter_map(|label| match self.copy_to_label(photo, label) {
                Ok(dest) => Some(dest),
                Err(e) => {
                    log::warn!("Could not copy {} for {}: {:#}", photo.display(), label, e);
                    None
                }
            })
            .collect()
    }
}
