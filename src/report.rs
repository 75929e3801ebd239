use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::classifier::PhotoLabelSet;
use crate::embedding::Label;

/// Outcome of a `sort` run, written as JSON when requested.
#[derive(Debug, Default, Serialize)]
pub struct SortReport {
    pub threshold: f32,
    pub labels: Vec<Label>,
    pub photos: Vec<PhotoOutcome>,
}

#[derive(Debug, Serialize)]
pub struct PhotoOutcome {
    pub photo: PathBuf,
    pub labels: PhotoLabelSet,
    pub copies: Vec<PathBuf>,
}

impl SortReport {
    pub fn new(threshold: f32, labels: Vec<Label>) -> Self {
        Self {
            threshold,
            labels,
            photos: Vec::new(),
        }
    }

    pub fn record(&mut self, photo: &Path, labels: PhotoLabelSet, copies: Vec<PathBuf>) {
        self.photos.push(PhotoOutcome {
            photo: photo.to_path_buf(),
            labels,
            copies,
        });
    }

    pub fn matched(&self) -> usize {
        self.photos.iter().filter(|p| !p.labels.is_empty()).count()
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("writing report {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_serializes_label_sets() -> Result<()> {
        let mut report = SortReport::new(0.5, vec!["alice".into(), "bob".into()]);
        report.record(
            Path::new("a.jpg"),
            PhotoLabelSet::from(["bob".to_string(), "alice".to_string()]),
            vec![PathBuf::from("out/alice/a.jpg"), PathBuf::from("out/bob/a.jpg")],
        );
        report.record(Path::new("b.jpg"), PhotoLabelSet::new(), Vec::new());
        assert_eq!(report.matched(), 1);

        let value: serde_json::Value = serde_json::to_value(&report)?;
        assert_eq!(value["threshold"], 0.5);
        assert_eq!(value["photos"][0]["labels"], serde_json::json!(["alice", "bob"]));
        assert_eq!(value["photos"][1]["copies"], serde_json::json!([]));
        Ok(())
    }
}
