use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::embedding::Label;

const PHOTO_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// Reference images of one label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelImages {
    pub label: Label,
    pub images: Vec<PathBuf>,
}

/// Lists `dir/<label>/<image>`: every sub-directory is a label and every
/// regular file inside it a reference image. Both are sorted by name.
pub fn reference_corpus(dir: &Path) -> Result<Vec<LabelImages>> {
    let mut corpus = Vec::new();
    for label_dir in sorted_entries(dir)? {
        if !label_dir.is_dir() {
            continue;
        }
        let Some(label) = label_dir.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        let images = sorted_entries(&label_dir)?
            .into_iter()
            .filter(|p| p.is_file())
            .collect();
        corpus.push(LabelImages { label, images });
    }
    log::info!(
        "Loading reference embeddings from {} ({} label(s))",
        dir.display(),
        corpus.len()
    );
    Ok(corpus)
}

/// Photos directly inside `dir` with a jpg, jpeg, png or bmp extension.
pub fn photo_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let photos: Vec<PathBuf> = sorted_entries(dir)?
        .into_iter()
        .filter(|p| p.is_file() && is_photo(p))
        .collect();
    log::info!("Found {} photo files to process", photos.len());
    Ok(photos)
}

fn is_photo(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| PHOTO_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("reading directory {}", dir.display()))?
        .map(|e| e.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("listing {}", dir.display()))?;
    entries.sort();
    Ok(entries)
}
